#![allow(unused_assignments)] // thiserror/miette proc macros trigger false positives

pub mod addon;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod observer;
pub mod paths;
pub mod plan;
pub mod record;
pub mod wizard;

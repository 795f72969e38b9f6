//! The install workflow engine.
//!
//! Split into three layers: `state` holds the sequence state container and
//! its transition rules, `executor` performs (here: simulates) the work of
//! a single step, and `runner` drives the two together — one step at a
//! time, retrying failed steps in place, publishing events to observers.

pub mod executor;
pub mod runner;
pub mod state;

pub use executor::{SimulatedExecutor, StepExecutor, StepExecutionError};
pub use runner::{run_sequence, RunOutcome, RunnerContext, RunnerOptions};
pub use state::{SequenceEvent, SequenceState, SequenceStatus, Snapshot, Step, StepStatus};

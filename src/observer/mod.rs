//! Rendering layer over engine events.
//!
//! Observers consume `SequenceEvent`s from the runner's broadcast channel
//! and render output. Different implementations handle interactive TTY,
//! plain text, and JSON output modes. The engine never waits on an
//! observer; a slow consumer lags and is warned, never blocks the run.
//!
//! Uses boxed futures for dyn-compatibility — each method returns a
//! `Pin<Box<dyn Future>>` so we can use `Box<dyn Observer>`.

pub mod interactive;
pub mod json;
pub mod plain;
pub mod view;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::broadcast;

use crate::engine::runner::RunOutcome;
use crate::engine::state::SequenceEvent;

/// Controls how step output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Spinners + ring-buffer logs, clear logs on completion.
    Normal,
    /// Like Normal but keeps log lines after step completion.
    Verbose,
    /// Step lines only, no log lines.
    Quiet,
    /// No ANSI — plain println output (for piped/non-TTY).
    Plain,
}

pub trait Observer: Send + 'static {
    /// Handle one engine event. Called sequentially, in publish order.
    fn on_event(&mut self, event: &SequenceEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;

    /// Called once after the runner returns, with the final outcome.
    fn on_finish(&mut self, outcome: &RunOutcome)
    -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Drain events into the observer until the runner drops its sender.
pub async fn run_attached(
    rx: &mut broadcast::Receiver<SequenceEvent>,
    observer: &mut dyn Observer,
) {
    loop {
        match rx.recv().await {
            Ok(event) => observer.on_event(&event).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("observer lagged, missed {n} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

//! Plain text observer — no ANSI, suitable for piped output.

use std::future::Future;
use std::pin::Pin;

use crate::engine::runner::RunOutcome;
use crate::engine::state::{SequenceEvent, Snapshot};

use super::{Observer, OutputMode};

pub struct PlainObserver {
    total: usize,
    titles: Vec<String>,
    show_logs: bool,
}

impl PlainObserver {
    pub fn new(snapshot: &Snapshot, mode: OutputMode) -> Self {
        Self {
            total: snapshot.steps.len(),
            titles: snapshot.steps.iter().map(|s| s.title.clone()).collect(),
            show_logs: mode != OutputMode::Quiet,
        }
    }

    fn prefix(&self, index: usize) -> String {
        format!("[{}/{}]", index + 1, self.total)
    }
}

impl Observer for PlainObserver {
    fn on_event(&mut self, event: &SequenceEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        match event {
            SequenceEvent::StepStarted { index, attempt } => {
                if *attempt > 1 {
                    println!("{} {} (attempt {attempt})", self.prefix(*index), self.titles[*index]);
                } else {
                    println!("{} {}", self.prefix(*index), self.titles[*index]);
                }
            }
            SequenceEvent::StepLog { entry, .. } => {
                if self.show_logs {
                    println!("        {} {}", entry.offset_label(), entry.line);
                }
            }
            SequenceEvent::StepFailed { index, message } => {
                println!("{} \u{2717} {}: {message}", self.prefix(*index), self.titles[*index]);
            }
            SequenceEvent::StepCompleted { index } => {
                println!("{} \u{2713} {}", self.prefix(*index), self.titles[*index]);
            }
            SequenceEvent::StepRetrying { .. }
            | SequenceEvent::SequenceCompleted
            | SequenceEvent::SequenceFailed { .. } => {}
        }
        Box::pin(async {})
    }

    fn on_finish(
        &mut self,
        outcome: &RunOutcome,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        match outcome {
            RunOutcome::Completed => println!("Deployment complete."),
            RunOutcome::Failed { index } => {
                println!("Deployment failed at '{}'.", self.titles[*index]);
            }
            RunOutcome::Cancelled => {
                println!("Installation cancelled — completed steps are preserved.");
            }
        }
        Box::pin(async {})
    }
}

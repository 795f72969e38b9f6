//! JSON-lines observer — structured output for machine consumption.
//!
//! One JSON object per engine event on stdout. All fields are present on
//! every line; fields that don't apply to an event are null.

use std::future::Future;
use std::pin::Pin;

use crate::engine::runner::RunOutcome;
use crate::engine::state::{SequenceEvent, Snapshot};

use super::Observer;

#[derive(facet::Facet)]
struct EventJson {
    event: String,
    step: Option<String>,
    index: Option<u64>,
    attempt: Option<u64>,
    elapsed_ms: Option<u64>,
    line: Option<String>,
    message: Option<String>,
}

impl EventJson {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            step: None,
            index: None,
            attempt: None,
            elapsed_ms: None,
            line: None,
            message: None,
        }
    }
}

pub struct JsonObserver {
    ids: Vec<String>,
}

impl JsonObserver {
    pub fn new(snapshot: &Snapshot) -> Self {
        Self {
            ids: snapshot.steps.iter().map(|s| s.id.clone()).collect(),
        }
    }

    fn emit(&self, mut json: EventJson, index: Option<usize>) {
        if let Some(i) = index {
            json.step = self.ids.get(i).cloned();
            json.index = Some(i as u64);
        }
        println!(
            "{}",
            facet_json::to_string(&json).expect("JSON serialization")
        );
    }
}

impl Observer for JsonObserver {
    fn on_event(&mut self, event: &SequenceEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        match event {
            SequenceEvent::StepStarted { index, attempt } => {
                let mut json = EventJson::new("step_started");
                json.attempt = Some(u64::from(*attempt));
                self.emit(json, Some(*index));
            }
            SequenceEvent::StepLog { index, entry } => {
                let mut json = EventJson::new("step_log");
                json.elapsed_ms = Some(entry.elapsed_ms);
                json.line = Some(entry.line.clone());
                self.emit(json, Some(*index));
            }
            SequenceEvent::StepFailed { index, message } => {
                let mut json = EventJson::new("step_failed");
                json.message = Some(message.clone());
                self.emit(json, Some(*index));
            }
            SequenceEvent::StepRetrying { index, attempt } => {
                let mut json = EventJson::new("step_retrying");
                json.attempt = Some(u64::from(*attempt));
                self.emit(json, Some(*index));
            }
            SequenceEvent::StepCompleted { index } => {
                self.emit(EventJson::new("step_completed"), Some(*index));
            }
            SequenceEvent::SequenceCompleted => {
                self.emit(EventJson::new("sequence_completed"), None);
            }
            SequenceEvent::SequenceFailed { index } => {
                self.emit(EventJson::new("sequence_failed"), Some(*index));
            }
        }
        Box::pin(async {})
    }

    fn on_finish(
        &mut self,
        outcome: &RunOutcome,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        let mut json = EventJson::new("finished");
        json.message = Some(
            match outcome {
                RunOutcome::Completed => "completed",
                RunOutcome::Failed { .. } => "failed",
                RunOutcome::Cancelled => "cancelled",
            }
            .to_string(),
        );
        self.emit(json, None);
        Box::pin(async {})
    }
}

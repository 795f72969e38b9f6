//! Interactive TTY observer — spinners, checkmarks, ring-buffer logs.
//!
//! One spinner bar per attempt. Log lines are encoded as extra lines in
//! the bar's message (multi-line `ProgressBar`). This avoids adding and
//! removing separate bars from the `MultiProgress`, which can cause
//! indicatif to miscount terminal lines and clear too much on redraw.
//! On completion the message collapses back to a single line; a failed
//! attempt is finalized in place and the retry gets a fresh bar, so the
//! failure stays visible in the scrollback.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::engine::runner::RunOutcome;
use crate::engine::state::{SequenceEvent, Snapshot};

use super::{Observer, OutputMode};

const MAX_LOG_LINES: usize = 10;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] {spinner:.cyan} {msg}")
        .unwrap()
}

fn done_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2713} {msg:.green}")
        .unwrap()
}

fn fail_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("[{prefix}] \u{2717} {msg:.red}")
        .unwrap()
}

pub struct InteractiveObserver {
    multi: MultiProgress,
    mode: OutputMode,
    total: usize,
    titles: Vec<String>,
    /// Bar for the attempt currently on screen.
    bar: Option<ProgressBar>,
    /// Recent log lines for the current attempt.
    log_lines: VecDeque<String>,
    label: String,
}

impl InteractiveObserver {
    pub fn new(snapshot: &Snapshot, mode: OutputMode) -> Self {
        Self {
            multi: MultiProgress::new(),
            mode,
            total: snapshot.steps.len(),
            titles: snapshot.steps.iter().map(|s| s.title.clone()).collect(),
            bar: None,
            log_lines: VecDeque::new(),
            label: String::new(),
        }
    }

    fn start_bar(&mut self, index: usize, attempt: u32) {
        self.label = if attempt > 1 {
            format!("{} (attempt {attempt})", self.titles[index])
        } else {
            self.titles[index].clone()
        };
        self.log_lines.clear();

        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_prefix(format!("{}/{}", index + 1, self.total));
        bar.set_message(self.label.clone());
        bar.enable_steady_tick(std::time::Duration::from_millis(80));
        self.bar = Some(bar);
    }

    /// Rebuild the bar's message: label on the first line, then indented
    /// log lines. indicatif tracks the line count per bar and handles the
    /// terminal delta when the count changes.
    fn rebuild_message(&self) {
        let Some(bar) = &self.bar else { return };
        let mut msg = self.label.clone();
        for line in &self.log_lines {
            msg.push_str("\n        ");
            msg.push_str(line);
        }
        bar.set_message(msg);
    }

    /// In Verbose mode, flush log lines above the managed area so they
    /// persist after the bar shrinks back to a single line.
    fn flush_logs_verbose(&mut self) {
        if self.mode == OutputMode::Verbose {
            for line in &self.log_lines {
                self.multi.println(format!("        {line}")).ok();
            }
        }
        self.log_lines.clear();
    }

    fn finalize_bar(&mut self, style: ProgressStyle, message: String) {
        self.flush_logs_verbose();
        if let Some(bar) = self.bar.take() {
            // Setting the message to a single line collapses the bar from
            // N+1 lines back to 1 — indicatif handles the terminal delta.
            bar.set_style(style);
            bar.finish_with_message(message);
        }
    }
}

impl Observer for InteractiveObserver {
    fn on_event(&mut self, event: &SequenceEvent) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        match event {
            SequenceEvent::StepStarted { index, attempt } => {
                self.start_bar(*index, *attempt);
            }
            SequenceEvent::StepLog { entry, .. } => {
                if self.mode != OutputMode::Quiet {
                    if self.log_lines.len() >= MAX_LOG_LINES {
                        self.log_lines.pop_front();
                    }
                    self.log_lines
                        .push_back(format!("{} {}", entry.offset_label(), entry.line));
                    self.rebuild_message();
                }
            }
            SequenceEvent::StepFailed { message, .. } => {
                let label = format!("{} — {message}", self.label);
                self.finalize_bar(fail_style(), label);
            }
            SequenceEvent::StepCompleted { .. } => {
                let label = self.label.clone();
                self.finalize_bar(done_style(), label);
            }
            // The retry notice is visible as the next attempt's bar; the
            // terminal events are summarized in on_finish.
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
        let line = match outcome {
            RunOutcome::Completed => "\u{2713} Deployment complete.".to_string(),
            RunOutcome::Failed { index } => {
                format!("\u{2717} Deployment failed at '{}'.", self.titles[*index])
            }
            RunOutcome::Cancelled => {
                "Installation cancelled — completed steps are preserved.".to_string()
            }
        };
        self.multi.println(line).ok();
        Box::pin(async {})
    }
}

//! Sequence state container and transition rules.
//!
//! `SequenceState` is the single mutable object behind an install run. It
//! is only ever mutated through the transition methods below, each of
//! which checks the step/sequence status it requires and returns the event
//! to publish. The invariants maintained at every point:
//!
//! - at most one step is `Running`; every step before the current index is
//!   `Completed`; every step after it is `Pending`
//! - on failure exactly one step holds `Error` and all following steps
//!   remain `Pending`
//! - per-step logs are append-only and survive retries
//! - the sequence moves `NotStarted → InProgress → {Completed | Failed}`
//!   and never leaves a terminal status

use thiserror::Error;

use crate::plan::{StepCategory, StepPlan};

// ── Step state ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Error => "error",
        }
    }
}

/// One timestamped log line. Timestamps are offsets from sequence start,
/// in milliseconds, so paused-clock tests produce identical transcripts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub elapsed_ms: u64,
    pub line: String,
}

impl LogEntry {
    /// Display label like `+12.4s`.
    pub fn offset_label(&self) -> String {
        format!("+{}.{}s", self.elapsed_ms / 1000, (self.elapsed_ms % 1000) / 100)
    }
}

#[derive(Debug, Clone)]
pub struct Step {
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: StepCategory,
    pub status: StepStatus,
    pub logs: Vec<LogEntry>,
    /// Present iff `status == Error`; cleared on retry.
    pub error: Option<String>,
    /// Number of times this step has entered `Running`.
    pub attempts: u32,
}

impl Step {
    fn from_plan(plan: StepPlan) -> Self {
        Self {
            id: plan.id,
            title: plan.title,
            description: plan.description,
            category: plan.category,
            status: StepStatus::Pending,
            logs: Vec::new(),
            error: None,
            attempts: 0,
        }
    }
}

// ── Sequence state ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceStatus {
    NotStarted,
    InProgress,
    Completed,
    /// Only reachable when a bounded retry budget is configured.
    Failed,
}

impl SequenceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SequenceStatus::Completed | SequenceStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SequenceStatus::NotStarted => "not-started",
            SequenceStatus::InProgress => "in-progress",
            SequenceStatus::Completed => "completed",
            SequenceStatus::Failed => "failed",
        }
    }
}

/// Events published on every state transition. Observers receive these
/// over a broadcast channel; indexes refer to the snapshot the observer
/// was constructed with.
#[derive(Debug, Clone)]
pub enum SequenceEvent {
    StepStarted { index: usize, attempt: u32 },
    StepLog { index: usize, entry: LogEntry },
    StepFailed { index: usize, message: String },
    StepRetrying { index: usize, attempt: u32 },
    StepCompleted { index: usize },
    SequenceCompleted,
    SequenceFailed { index: usize },
}

/// Read-only view of the sequence, safe to hand to renderers.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub steps: Vec<Step>,
    pub current_index: usize,
    pub status: SequenceStatus,
}

/// A transition was requested from a status that does not allow it.
/// These indicate engine bugs, not user errors.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("step {index} is {found}, expected {expected}")]
    WrongStepStatus {
        index: usize,
        found: &'static str,
        expected: &'static str,
    },

    #[error("sequence is {0}, transition not allowed")]
    WrongSequenceStatus(&'static str),
}

pub struct SequenceState {
    steps: Vec<Step>,
    current: usize,
    status: SequenceStatus,
}

impl SequenceState {
    pub fn new(plan: Vec<StepPlan>) -> Self {
        let status = if plan.is_empty() {
            SequenceStatus::Completed
        } else {
            SequenceStatus::NotStarted
        };
        Self {
            steps: plan.into_iter().map(Step::from_plan).collect(),
            current: 0,
            status,
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn status(&self) -> SequenceStatus {
        self.status
    }

    pub fn current_step(&self) -> Option<&Step> {
        self.steps.get(self.current)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            steps: self.steps.clone(),
            current_index: self.current,
            status: self.status,
        }
    }

    // ── Transitions ─────────────────────────────────────────────────

    /// `Pending → Running` for the current step. First call also moves the
    /// sequence `NotStarted → InProgress`.
    pub fn start_current(&mut self, _elapsed_ms: u64) -> Result<SequenceEvent, StateError> {
        if self.status.is_terminal() {
            return Err(StateError::WrongSequenceStatus(self.status.as_str()));
        }
        let index = self.current;
        let step = self.expect_status(index, StepStatus::Pending)?;
        step.status = StepStatus::Running;
        step.attempts += 1;
        let attempt = step.attempts;
        self.status = SequenceStatus::InProgress;
        Ok(SequenceEvent::StepStarted { index, attempt })
    }

    /// Append a log line to the current step. Allowed while the step is
    /// `Running`, or in `Error` (failure detail and retry notices land
    /// there before the step is reset).
    pub fn append_log(
        &mut self,
        line: impl Into<String>,
        elapsed_ms: u64,
    ) -> Result<SequenceEvent, StateError> {
        let index = self.current;
        let status = self.status.as_str();
        let step = self
            .steps
            .get_mut(index)
            .ok_or(StateError::WrongSequenceStatus(status))?;
        if !matches!(step.status, StepStatus::Running | StepStatus::Error) {
            return Err(StateError::WrongStepStatus {
                index,
                found: step.status.as_str(),
                expected: "running",
            });
        }
        let entry = LogEntry {
            elapsed_ms,
            line: line.into(),
        };
        step.logs.push(entry.clone());
        Ok(SequenceEvent::StepLog { index, entry })
    }

    /// `Running → Error` for the current step.
    pub fn fail_current(
        &mut self,
        message: impl Into<String>,
        _elapsed_ms: u64,
    ) -> Result<SequenceEvent, StateError> {
        let index = self.current;
        let step = self.expect_status(index, StepStatus::Running)?;
        let message = message.into();
        step.status = StepStatus::Error;
        step.error = Some(message.clone());
        Ok(SequenceEvent::StepFailed { index, message })
    }

    /// `Error → Pending` for the current step: clears the error, keeps the
    /// logs, and leaves the index in place so the same step runs again.
    pub fn retry_current(&mut self, _elapsed_ms: u64) -> Result<SequenceEvent, StateError> {
        let index = self.current;
        let step = self.expect_status(index, StepStatus::Error)?;
        step.status = StepStatus::Pending;
        step.error = None;
        let attempt = step.attempts + 1;
        Ok(SequenceEvent::StepRetrying { index, attempt })
    }

    /// `Error → sequence Failed` (bounded-retry mode only).
    pub fn give_up(&mut self) -> Result<SequenceEvent, StateError> {
        let index = self.current;
        self.expect_status(index, StepStatus::Error)?;
        self.status = SequenceStatus::Failed;
        Ok(SequenceEvent::SequenceFailed { index })
    }

    /// `Running → Completed` for the current step, advancing the index.
    /// Completing the last step moves the sequence to `Completed`.
    pub fn complete_current(&mut self, _elapsed_ms: u64) -> Result<SequenceEvent, StateError> {
        let index = self.current;
        let step = self.expect_status(index, StepStatus::Running)?;
        step.status = StepStatus::Completed;
        step.error = None;
        if index + 1 < self.steps.len() {
            self.current = index + 1;
        } else {
            self.status = SequenceStatus::Completed;
        }
        Ok(SequenceEvent::StepCompleted { index })
    }

    fn expect_status(
        &mut self,
        index: usize,
        expected: StepStatus,
    ) -> Result<&mut Step, StateError> {
        match self.steps.get_mut(index) {
            Some(step) if step.status == expected => Ok(step),
            Some(step) => Err(StateError::WrongStepStatus {
                index,
                found: step.status.as_str(),
                expected: expected.as_str(),
            }),
            None => Err(StateError::WrongSequenceStatus(self.status.as_str())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::AddonKind;
    use crate::config::DeployMode;
    use crate::plan::build_plan;

    fn new_state() -> SequenceState {
        SequenceState::new(build_plan(DeployMode::Single, &[AddonKind::Monitoring]))
    }

    /// The structural invariant from the data model: prefix completed,
    /// at most one running/error step at the current index, suffix pending.
    fn assert_invariants(state: &SequenceState) {
        let current = state.current_index();
        let mut running = 0;
        let mut errored = 0;
        for (i, step) in state.steps().iter().enumerate() {
            match step.status {
                StepStatus::Running => {
                    running += 1;
                    assert_eq!(i, current);
                }
                StepStatus::Error => {
                    errored += 1;
                    assert_eq!(i, current);
                    assert!(step.error.is_some());
                }
                StepStatus::Completed => assert!(
                    i < current || state.status() == SequenceStatus::Completed,
                    "completed step after current index"
                ),
                StepStatus::Pending => {
                    assert!(i >= current, "pending step before current index");
                    assert!(step.error.is_none());
                }
            }
        }
        assert!(running <= 1);
        assert!(errored <= 1);
        assert!(running + errored <= 1);
    }

    #[test]
    fn fresh_sequence_is_all_pending() {
        let state = new_state();
        assert_eq!(state.status(), SequenceStatus::NotStarted);
        assert_eq!(state.current_index(), 0);
        assert!(state.steps().iter().all(|s| s.status == StepStatus::Pending));
        assert_invariants(&state);
    }

    #[test]
    fn happy_path_walks_every_step() {
        let mut state = new_state();
        let total = state.steps().len();
        for i in 0..total {
            match state.start_current(0).unwrap() {
                SequenceEvent::StepStarted { index, attempt } => {
                    assert_eq!(index, i);
                    assert_eq!(attempt, 1);
                }
                other => panic!("unexpected event {other:?}"),
            }
            assert_invariants(&state);
            state.append_log("working", 10).unwrap();
            state.complete_current(20).unwrap();
            assert_invariants(&state);
        }
        assert_eq!(state.status(), SequenceStatus::Completed);
        assert!(state.steps().iter().all(|s| s.status == StepStatus::Completed));
    }

    #[test]
    fn fail_then_retry_keeps_logs_and_index() {
        let mut state = new_state();
        state.start_current(0).unwrap();
        state.append_log("first attempt", 100).unwrap();
        state.fail_current("simulated fault", 200).unwrap();
        assert_invariants(&state);

        let step = &state.steps()[0];
        assert_eq!(step.status, StepStatus::Error);
        assert_eq!(step.error.as_deref(), Some("simulated fault"));

        // Failure detail may be appended while the step sits in Error.
        state.append_log("Error: simulated fault", 210).unwrap();
        state.retry_current(2200).unwrap();
        assert_invariants(&state);

        let step = &state.steps()[0];
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.error.is_none());
        assert_eq!(step.logs.len(), 2);
        assert_eq!(state.current_index(), 0);

        // Second attempt succeeds.
        match state.start_current(2200).unwrap() {
            SequenceEvent::StepStarted { attempt, .. } => assert_eq!(attempt, 2),
            other => panic!("unexpected event {other:?}"),
        }
        state.complete_current(4000).unwrap();
        assert_eq!(state.steps()[0].status, StepStatus::Completed);
        assert_eq!(state.current_index(), 1);
        // Log history survived the retry.
        assert_eq!(state.steps()[0].logs.len(), 2);
    }

    #[test]
    fn logs_are_append_only() {
        let mut state = new_state();
        state.start_current(0).unwrap();
        state.append_log("a", 1).unwrap();
        let before: Vec<String> = state.steps()[0].logs.iter().map(|l| l.line.clone()).collect();
        state.append_log("b", 2).unwrap();
        let after: Vec<String> = state.steps()[0].logs.iter().map(|l| l.line.clone()).collect();
        assert_eq!(&after[..before.len()], &before[..]);
    }

    #[test]
    fn start_requires_pending() {
        let mut state = new_state();
        state.start_current(0).unwrap();
        assert!(matches!(
            state.start_current(0),
            Err(StateError::WrongStepStatus { .. })
        ));
    }

    #[test]
    fn complete_requires_running() {
        let mut state = new_state();
        assert!(state.complete_current(0).is_err());
    }

    #[test]
    fn retry_requires_error() {
        let mut state = new_state();
        state.start_current(0).unwrap();
        assert!(state.retry_current(0).is_err());
    }

    #[test]
    fn log_rejected_while_pending() {
        let mut state = new_state();
        assert!(state.append_log("early", 0).is_err());
    }

    #[test]
    fn terminal_sequence_rejects_start() {
        let mut state = SequenceState::new(build_plan(DeployMode::Single, &[]));
        for _ in 0..state.steps().len() {
            state.start_current(0).unwrap();
            state.complete_current(0).unwrap();
        }
        assert_eq!(state.status(), SequenceStatus::Completed);
        assert!(matches!(
            state.start_current(0),
            Err(StateError::WrongSequenceStatus(_))
        ));
    }

    #[test]
    fn give_up_marks_sequence_failed() {
        let mut state = new_state();
        state.start_current(0).unwrap();
        state.fail_current("fault", 0).unwrap();
        match state.give_up().unwrap() {
            SequenceEvent::SequenceFailed { index } => assert_eq!(index, 0),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(state.status(), SequenceStatus::Failed);
        assert!(state.status().is_terminal());
    }

    #[test]
    fn give_up_requires_error() {
        let mut state = new_state();
        state.start_current(0).unwrap();
        assert!(state.give_up().is_err());
    }

    #[test]
    fn snapshot_is_detached_from_state() {
        let mut state = new_state();
        state.start_current(0).unwrap();
        let snap = state.snapshot();
        state.append_log("after snapshot", 5).unwrap();
        assert!(snap.steps[0].logs.is_empty());
        assert_eq!(snap.current_index, 0);
        assert_eq!(snap.status, SequenceStatus::InProgress);
    }

    #[test]
    fn offset_label_formats_tenths() {
        let entry = LogEntry { elapsed_ms: 12_345, line: "x".into() };
        assert_eq!(entry.offset_label(), "+12.3s");
        let entry = LogEntry { elapsed_ms: 800, line: "x".into() };
        assert_eq!(entry.offset_label(), "+0.8s");
    }
}

//! Pure projection from a sequence snapshot to display primitives.
//!
//! Renderers decide *how* to draw; this module decides *what* a snapshot
//! looks like: the overall label, one glyph/style per step, and which
//! steps are expanded by default — exactly the step at the current index
//! plus any step sitting in error. User-driven expand/collapse toggles
//! are renderer-local state and never flow back into the engine.

use crate::engine::state::{Snapshot, SequenceStatus, StepStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStyle {
    Pending,
    Active,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct StepView {
    pub index: usize,
    pub title: String,
    pub glyph: &'static str,
    pub style: StepStyle,
    pub expanded: bool,
}

#[derive(Debug, Clone)]
pub struct SequenceView {
    pub overall: &'static str,
    pub steps: Vec<StepView>,
}

pub fn project(snapshot: &Snapshot) -> SequenceView {
    let overall = match snapshot.status {
        SequenceStatus::NotStarted => "not started",
        SequenceStatus::InProgress => "in progress",
        SequenceStatus::Completed => "completed",
        SequenceStatus::Failed => "failed",
    };

    let steps = snapshot
        .steps
        .iter()
        .enumerate()
        .map(|(index, step)| {
            let (glyph, style) = match step.status {
                StepStatus::Pending => ("·", StepStyle::Pending),
                StepStatus::Running => ("›", StepStyle::Active),
                StepStatus::Completed => ("\u{2713}", StepStyle::Done),
                StepStatus::Error => ("\u{2717}", StepStyle::Failed),
            };
            let expanded = step.status == StepStatus::Error
                || (index == snapshot.current_index && !snapshot.status.is_terminal());
            StepView {
                index,
                title: step.title.clone(),
                glyph,
                style,
                expanded,
            }
        })
        .collect();

    SequenceView { overall, steps }
}

//! The step runner.
//!
//! Drives a `SequenceState` through an executor one step at a time:
//! mark running, forward executor log lines into the state, then either
//! advance on success or fail/wait/reset/re-run the same step. Every
//! transition is published to observers over a broadcast channel; send
//! errors are ignored (no subscribers is fine).
//!
//! The runner is the only writer of the sequence state, and it suspends
//! only at the step-duration boundary and the post-failure retry delay.
//! Cancellation is checked at every suspension point; a cancelled run
//! abandons observation without rolling anything back.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::executor::{StepExecutor, StepLogs, StepRun};
use super::state::{SequenceEvent, SequenceState, SequenceStatus, Snapshot, StateError};

/// Pause between a step failing and the same step re-entering `Pending`.
pub const RETRY_DELAY: Duration = Duration::from_millis(2000);

pub struct RunnerOptions {
    pub retry_delay: Duration,
    /// `None` retries failed steps indefinitely. `Some(n)` moves the
    /// sequence to a terminal `Failed` status once a step has failed `n`
    /// attempts.
    pub max_attempts: Option<u32>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            retry_delay: RETRY_DELAY,
            max_attempts: None,
        }
    }
}

/// Invoked exactly once, when the sequence reaches `Completed`.
pub type CompletionHook = Box<dyn FnOnce(&Snapshot) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// Bounded-retry mode only: a step exhausted its attempt budget.
    Failed { index: usize },
    Cancelled,
}

/// Channels shared between the runner and its observers.
pub struct RunnerContext {
    pub event_tx: broadcast::Sender<SequenceEvent>,
    pub cancel: CancellationToken,
}

impl RunnerContext {
    pub fn new(event_tx: broadcast::Sender<SequenceEvent>, cancel: CancellationToken) -> Self {
        Self { event_tx, cancel }
    }
}

/// Run the sequence to a terminal state (or cancellation).
pub async fn run_sequence(
    state: &mut SequenceState,
    executor: &dyn StepExecutor,
    ctx: &RunnerContext,
    opts: RunnerOptions,
    mut on_complete: Option<CompletionHook>,
) -> Result<RunOutcome, StateError> {
    let started = tokio::time::Instant::now();

    if state.status() == SequenceStatus::Completed {
        return Ok(RunOutcome::Completed);
    }

    loop {
        if ctx.cancel.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        // ── Start the current step ──
        publish(&ctx.event_tx, state.start_current(elapsed_ms(started))?);

        let index = state.current_index();
        let step = &state.steps()[index];
        let title = step.title.clone();
        let run = StepRun {
            index,
            id: step.id.clone(),
            title: title.clone(),
            category: step.category,
            attempt: step.attempts,
        };

        tracing::debug!("step '{}' started (attempt {})", run.id, run.attempt);
        publish(
            &ctx.event_tx,
            state.append_log(format!("Starting: {title}"), elapsed_ms(started))?,
        );

        // ── Drive the executor, forwarding its log lines ──
        let (logs, mut log_rx) = StepLogs::channel();
        let mut work = executor.execute(run, &logs);

        let result = loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Ok(RunOutcome::Cancelled),
                Some(line) = log_rx.recv() => {
                    publish(&ctx.event_tx, state.append_log(line, elapsed_ms(started))?);
                }
                result = &mut work => break result,
            }
        };
        drop(work);
        drop(logs);

        // Lines sent just before the step future resolved.
        while let Ok(line) = log_rx.try_recv() {
            publish(&ctx.event_tx, state.append_log(line, elapsed_ms(started))?);
        }

        match result {
            Ok(()) => {
                publish(
                    &ctx.event_tx,
                    state.append_log(format!("Completed: {title}"), elapsed_ms(started))?,
                );
                publish(&ctx.event_tx, state.complete_current(elapsed_ms(started))?);

                if state.status() == SequenceStatus::Completed {
                    publish(&ctx.event_tx, SequenceEvent::SequenceCompleted);
                    if let Some(hook) = on_complete.take() {
                        hook(&state.snapshot());
                    }
                    return Ok(RunOutcome::Completed);
                }
            }
            Err(e) => {
                tracing::warn!("step '{}' failed: {}", e.step_id, e.message);
                publish(
                    &ctx.event_tx,
                    state.fail_current(e.message.clone(), elapsed_ms(started))?,
                );
                publish(
                    &ctx.event_tx,
                    state.append_log(format!("Error: {}", e.message), elapsed_ms(started))?,
                );

                let attempts = state.steps()[index].attempts;
                if let Some(max) = opts.max_attempts
                    && attempts >= max
                {
                    publish(&ctx.event_tx, state.give_up()?);
                    return Ok(RunOutcome::Failed { index });
                }

                tokio::select! {
                    _ = ctx.cancel.cancelled() => return Ok(RunOutcome::Cancelled),
                    _ = tokio::time::sleep(opts.retry_delay) => {}
                }

                publish(
                    &ctx.event_tx,
                    state.append_log(format!("Retrying: {title}"), elapsed_ms(started))?,
                );
                publish(&ctx.event_tx, state.retry_current(elapsed_ms(started))?);
            }
        }
    }
}

fn elapsed_ms(started: tokio::time::Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn publish(tx: &broadcast::Sender<SequenceEvent>, event: SequenceEvent) {
    // Ignore send error — no subscribers is fine.
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::AddonKind;
    use crate::config::DeployMode;
    use crate::engine::executor::StepExecutionError;
    use crate::engine::state::StepStatus;
    use crate::plan::build_plan;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic executor: fixed duration, one log line per attempt,
    /// failures scripted by `(step index, attempt)`.
    struct ScriptedExecutor {
        duration: Duration,
        fail_attempts: Vec<(usize, u32)>,
    }

    impl StepExecutor for ScriptedExecutor {
        fn execute<'a>(
            &'a self,
            run: StepRun,
            logs: &'a StepLogs,
        ) -> Pin<Box<dyn Future<Output = Result<(), StepExecutionError>> + Send + 'a>> {
            Box::pin(async move {
                logs.log(format!("working on {} (attempt {})", run.id, run.attempt));
                tokio::time::sleep(self.duration).await;
                if self.fail_attempts.contains(&(run.index, run.attempt)) {
                    Err(StepExecutionError {
                        step_id: run.id,
                        message: "scripted failure".into(),
                    })
                } else {
                    Ok(())
                }
            })
        }
    }

    fn harness() -> (RunnerContext, broadcast::Receiver<SequenceEvent>) {
        let (event_tx, event_rx) = broadcast::channel(1024);
        (RunnerContext::new(event_tx, CancellationToken::new()), event_rx)
    }

    fn drain(rx: &mut broadcast::Receiver<SequenceEvent>) -> Vec<SequenceEvent> {
        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn happy_path_completes_every_step() {
        let mut state = SequenceState::new(build_plan(DeployMode::Single, &[]));
        let executor = ScriptedExecutor {
            duration: Duration::from_millis(100),
            fail_attempts: vec![],
        };
        let (ctx, mut rx) = harness();

        let outcome = run_sequence(&mut state, &executor, &ctx, RunnerOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(state.status(), SequenceStatus::Completed);
        assert!(state.steps().iter().all(|s| s.status == StepStatus::Completed));
        assert!(state.steps().iter().all(|s| s.attempts == 1));

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(SequenceEvent::SequenceCompleted)));
        // Steps start in order, 0..6.
        let started: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SequenceEvent::StepStarted { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![0, 1, 2, 3, 4, 5]);
        // No step completes out of order.
        let completed: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                SequenceEvent::StepCompleted { index } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(completed, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_step_is_retried_in_place() {
        let mut state =
            SequenceState::new(build_plan(DeployMode::Single, &[AddonKind::Monitoring]));
        let executor = ScriptedExecutor {
            duration: Duration::from_millis(100),
            fail_attempts: vec![(1, 1)],
        };
        let (ctx, mut rx) = harness();

        let outcome = run_sequence(&mut state, &executor, &ctx, RunnerOptions::default(), None)
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Completed);
        let step = &state.steps()[1];
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.attempts, 2);
        assert!(step.error.is_none());

        // The log preserves failure, retry, and eventual success.
        let lines: Vec<&str> = step.logs.iter().map(|l| l.line.as_str()).collect();
        assert!(lines.iter().any(|l| l.starts_with("Error:")));
        assert!(lines.iter().any(|l| l.starts_with("Retrying:")));
        assert!(lines.iter().any(|l| l.starts_with("Completed:")));

        // Index advanced past the failed step.
        assert!(state.current_index() > 1);

        let events = drain(&mut rx);
        let step1_starts: Vec<u32> = events
            .iter()
            .filter_map(|e| match e {
                SequenceEvent::StepStarted { index: 1, attempt } => Some(*attempt),
                _ => None,
            })
            .collect();
        assert_eq!(step1_starts, vec![1, 2]);
        assert!(events.iter().any(|e| matches!(e, SequenceEvent::StepFailed { index: 1, .. })));
        assert!(events.iter().any(|e| matches!(e, SequenceEvent::StepRetrying { index: 1, attempt: 2 })));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_waits_the_configured_delay() {
        let mut state = SequenceState::new(build_plan(DeployMode::Single, &[]));
        let executor = ScriptedExecutor {
            duration: Duration::from_millis(100),
            fail_attempts: vec![(1, 1)],
        };
        let (ctx, _rx) = harness();

        run_sequence(&mut state, &executor, &ctx, RunnerOptions::default(), None)
            .await
            .unwrap();

        let step = &state.steps()[1];
        let error_at = step
            .logs
            .iter()
            .find(|l| l.line.starts_with("Error:"))
            .map(|l| l.elapsed_ms)
            .unwrap();
        let retry_at = step
            .logs
            .iter()
            .find(|l| l.line.starts_with("Retrying:"))
            .map(|l| l.elapsed_ms)
            .unwrap();
        assert!(
            retry_at >= error_at + RETRY_DELAY.as_millis() as u64,
            "retry at {retry_at}ms, error at {error_at}ms"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn completion_hook_fires_exactly_once_with_final_snapshot() {
        let mut state = SequenceState::new(build_plan(DeployMode::Cluster, &[AddonKind::Alerting]));
        let executor = ScriptedExecutor {
            duration: Duration::from_millis(50),
            fail_attempts: vec![],
        };
        let (ctx, _rx) = harness();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_hook = calls.clone();
        let hook: CompletionHook = Box::new(move |snapshot| {
            calls_in_hook.fetch_add(1, Ordering::SeqCst);
            assert_eq!(snapshot.status, SequenceStatus::Completed);
            assert!(snapshot.steps.iter().all(|s| s.status == StepStatus::Completed));
        });

        run_sequence(&mut state, &executor, &ctx, RunnerOptions::default(), Some(hook))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn max_attempts_ends_in_terminal_failure_without_hook() {
        let mut state = SequenceState::new(build_plan(DeployMode::Single, &[]));
        let executor = ScriptedExecutor {
            duration: Duration::from_millis(50),
            fail_attempts: vec![(2, 1), (2, 2), (2, 3)],
        };
        let (ctx, mut rx) = harness();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_hook = calls.clone();
        let hook: CompletionHook = Box::new(move |_| {
            calls_in_hook.fetch_add(1, Ordering::SeqCst);
        });

        let opts = RunnerOptions {
            max_attempts: Some(3),
            ..Default::default()
        };
        let outcome = run_sequence(&mut state, &executor, &ctx, opts, Some(hook))
            .await
            .unwrap();

        assert_eq!(outcome, RunOutcome::Failed { index: 2 });
        assert_eq!(state.status(), SequenceStatus::Failed);
        assert_eq!(state.steps()[2].attempts, 3);
        assert_eq!(state.steps()[2].status, StepStatus::Error);
        // Steps after the failed one never left pending.
        assert!(state.steps()[3..].iter().all(|s| s.status == StepStatus::Pending));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let events = drain(&mut rx);
        assert!(matches!(events.last(), Some(SequenceEvent::SequenceFailed { index: 2 })));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_mid_step_without_further_events() {
        let plan = build_plan(DeployMode::Single, &[]);
        let mut state = SequenceState::new(plan);
        let (event_tx, mut rx) = broadcast::channel(1024);
        let cancel = CancellationToken::new();
        let ctx = RunnerContext::new(event_tx, cancel.clone());

        let runner = tokio::spawn(async move {
            let executor = ScriptedExecutor {
                duration: Duration::from_secs(10),
                fail_attempts: vec![],
            };
            let outcome =
                run_sequence(&mut state, &executor, &ctx, RunnerOptions::default(), None)
                    .await
                    .unwrap();
            (outcome, state)
        });

        // Let the first step get underway, then cancel.
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let (outcome, state) = runner.await.unwrap();

        assert_eq!(outcome, RunOutcome::Cancelled);
        // The interrupted step is still marked running; nothing advanced.
        assert_eq!(state.current_index(), 0);
        assert!(!state.status().is_terminal());

        let events = drain(&mut rx);
        assert!(!events.iter().any(|e| matches!(
            e,
            SequenceEvent::StepCompleted { .. } | SequenceEvent::SequenceCompleted
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn executor_log_lines_reach_state_in_order() {
        let mut state = SequenceState::new(build_plan(DeployMode::Single, &[]));
        let executor = ScriptedExecutor {
            duration: Duration::from_millis(100),
            fail_attempts: vec![],
        };
        let (ctx, _rx) = harness();

        run_sequence(&mut state, &executor, &ctx, RunnerOptions::default(), None)
            .await
            .unwrap();

        for step in state.steps() {
            let lines: Vec<&str> = step.logs.iter().map(|l| l.line.as_str()).collect();
            assert_eq!(lines.len(), 3, "{lines:?}");
            assert!(lines[0].starts_with("Starting:"));
            assert!(lines[1].starts_with("working on"));
            assert!(lines[2].starts_with("Completed:"));
            // Offsets never decrease.
            assert!(step.logs.windows(2).all(|w| w[0].elapsed_ms <= w[1].elapsed_ms));
        }
    }
}

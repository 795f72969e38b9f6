//! Step execution.
//!
//! `StepExecutor` is the seam between the runner and whatever actually
//! performs a step. The shipped implementation simulates the work:
//! a bounded random duration, periodic log phrases drawn from the step's
//! category pool, and a small failure probability. Swapping in a real
//! provisioning backend means implementing `StepExecutor` — the runner
//! and its state transitions stay untouched.
//!
//! All randomness goes through `SimulationPolicy`, so tests substitute a
//! scripted policy and run under tokio's paused clock.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::plan::StepCategory;

/// Cadence of simulated log output while a step runs.
pub const LOG_TICK: Duration = Duration::from_millis(800);
/// Bounds of the simulated per-step duration.
pub const MIN_STEP_MS: u64 = 2000;
pub const MAX_STEP_MS: u64 = 5000;
/// Probability that a step (other than the first) fails an attempt.
pub const FAILURE_PROBABILITY: f64 = 0.05;

// ── Step I/O ────────────────────────────────────────────────────────

/// What the executor needs to know about the step it is running.
#[derive(Debug, Clone)]
pub struct StepRun {
    pub index: usize,
    pub id: String,
    pub title: String,
    pub category: StepCategory,
    pub attempt: u32,
}

/// Handle for emitting log lines mid-step. Lines are forwarded to the
/// runner, which appends them to the sequence state in arrival order.
#[derive(Clone)]
pub struct StepLogs {
    tx: mpsc::UnboundedSender<String>,
}

impl StepLogs {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn log(&self, line: impl Into<String>) {
        // Receiver gone means the runner was cancelled — nothing to do.
        let _ = self.tx.send(line.into());
    }
}

/// The one error kind a step can produce. Every occurrence is treated as
/// retryable by the runner.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StepExecutionError {
    pub step_id: String,
    pub message: String,
}

/// Performs the work of a single step.
///
/// Boxed futures keep the trait dyn-compatible (`Box<dyn StepExecutor>`).
/// The future owns every resource it acquires — in the simulated
/// implementation that includes the log-tick interval, so dropping the
/// future on any exit path (success, failure, cancellation) stops the
/// ticker with it.
pub trait StepExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        run: StepRun,
        logs: &'a StepLogs,
    ) -> Pin<Box<dyn Future<Output = Result<(), StepExecutionError>> + Send + 'a>>;
}

// ── Simulation policy ───────────────────────────────────────────────

/// Decision source for the simulated executor.
pub trait SimulationPolicy: Send {
    /// How long this attempt takes.
    fn step_duration(&mut self, run: &StepRun) -> Duration;

    /// `Some(message)` to fail this attempt, `None` to succeed.
    fn failure(&mut self, run: &StepRun) -> Option<String>;

    /// Pick a phrase index from a pool of `pool_len` entries.
    fn phrase_index(&mut self, pool_len: usize) -> usize;
}

/// Default policy: uniform random duration, 5% failure rate with the
/// first step of the sequence exempt, uniform phrase choice.
pub struct RandomPolicy {
    rng: StdRng,
}

impl RandomPolicy {
    pub fn new() -> Self {
        Self { rng: StdRng::from_entropy() }
    }

    /// Seeded variant for reproducible runs (`install --seed`).
    pub fn seeded(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationPolicy for RandomPolicy {
    fn step_duration(&mut self, _run: &StepRun) -> Duration {
        Duration::from_millis(self.rng.gen_range(MIN_STEP_MS..=MAX_STEP_MS))
    }

    fn failure(&mut self, run: &StepRun) -> Option<String> {
        if run.index == 0 {
            // The opening step never fails — matches the observed
            // behavior users expect from the wizard.
            return None;
        }
        if self.rng.gen_bool(FAILURE_PROBABILITY) {
            let pool = run.category.failure_phrases();
            let pick = self.rng.gen_range(0..pool.len());
            Some(pool[pick].to_string())
        } else {
            None
        }
    }

    fn phrase_index(&mut self, pool_len: usize) -> usize {
        self.rng.gen_range(0..pool_len)
    }
}

// ── Simulated executor ──────────────────────────────────────────────

/// Timer-driven fake backend. The policy sits behind a mutex so the
/// executor can be shared as `&dyn StepExecutor`; critical sections never
/// hold the lock across an await.
pub struct SimulatedExecutor {
    policy: Mutex<Box<dyn SimulationPolicy>>,
}

impl SimulatedExecutor {
    pub fn new(policy: impl SimulationPolicy + 'static) -> Self {
        Self {
            policy: Mutex::new(Box::new(policy)),
        }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(RandomPolicy::new())
    }
}

impl StepExecutor for SimulatedExecutor {
    fn execute<'a>(
        &'a self,
        run: StepRun,
        logs: &'a StepLogs,
    ) -> Pin<Box<dyn Future<Output = Result<(), StepExecutionError>> + Send + 'a>> {
        Box::pin(async move {
            let (total, verdict) = {
                let mut policy = self.policy.lock().unwrap();
                (policy.step_duration(&run), policy.failure(&run))
            };

            let start = tokio::time::Instant::now();
            let deadline = start + total;
            let mut ticker = tokio::time::interval_at(start + LOG_TICK, LOG_TICK);
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            // The ticker lives exactly as long as this loop: when the
            // duration elapses (or the future is dropped), no further
            // ticks can reach a later step.
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    _ = ticker.tick() => {
                        let pool = run.category.log_phrases();
                        let pick = self.policy.lock().unwrap().phrase_index(pool.len());
                        logs.log(pool[pick]);
                    }
                }
            }

            match verdict {
                Some(message) => Err(StepExecutionError {
                    step_id: run.id.clone(),
                    message,
                }),
                None => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addon::AddonKind;

    /// Fixed durations and scripted failures, first phrase every tick.
    struct ScriptedPolicy {
        duration_ms: u64,
        fail_attempts: Vec<(usize, u32)>,
    }

    impl SimulationPolicy for ScriptedPolicy {
        fn step_duration(&mut self, _run: &StepRun) -> Duration {
            Duration::from_millis(self.duration_ms)
        }

        fn failure(&mut self, run: &StepRun) -> Option<String> {
            if self.fail_attempts.contains(&(run.index, run.attempt)) {
                Some("scripted failure".into())
            } else {
                None
            }
        }

        fn phrase_index(&mut self, _pool_len: usize) -> usize {
            0
        }
    }

    fn run(index: usize, attempt: u32) -> StepRun {
        StepRun {
            index,
            id: "install-core".into(),
            title: "Install core server".into(),
            category: StepCategory::Core,
            attempt,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn emits_one_phrase_per_tick() {
        let executor = SimulatedExecutor::new(ScriptedPolicy {
            duration_ms: 3000,
            fail_attempts: vec![],
        });
        let (logs, mut rx) = StepLogs::channel();

        executor.execute(run(1, 1), &logs).await.unwrap();

        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        // 3000 ms at an 800 ms cadence: ticks at 800, 1600, 2400.
        assert_eq!(lines.len(), 3);
        let pool = StepCategory::Core.log_phrases();
        assert!(lines.iter().all(|l| l == pool[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn short_step_emits_no_phrases() {
        let executor = SimulatedExecutor::new(ScriptedPolicy {
            duration_ms: 500,
            fail_attempts: vec![],
        });
        let (logs, mut rx) = StepLogs::channel();

        executor.execute(run(0, 1), &logs).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn scripted_failure_is_reported() {
        let executor = SimulatedExecutor::new(ScriptedPolicy {
            duration_ms: 1000,
            fail_attempts: vec![(2, 1)],
        });
        let (logs, _rx) = StepLogs::channel();

        let err = executor.execute(run(2, 1), &logs).await.unwrap_err();
        assert_eq!(err.step_id, "install-core");
        assert_eq!(err.message, "scripted failure");

        // Same step, second attempt: not scripted to fail.
        executor.execute(run(2, 2), &logs).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn random_policy_never_fails_first_step() {
        let executor = SimulatedExecutor::new(RandomPolicy::seeded(7));
        let (logs, _rx) = StepLogs::channel();

        for attempt in 1..=20 {
            executor
                .execute(run(0, attempt), &logs)
                .await
                .expect("first step must not fail");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_policy_is_reproducible() {
        let collect = |seed: u64| async move {
            let executor = SimulatedExecutor::new(RandomPolicy::seeded(seed));
            let (logs, mut rx) = StepLogs::channel();
            let step = StepRun {
                index: 3,
                id: "addon-alerting".into(),
                title: "Install alerting engine".into(),
                category: StepCategory::Addon(AddonKind::Alerting),
                attempt: 1,
            };
            let result = executor.execute(step, &logs).await;
            let mut lines = Vec::new();
            while let Ok(line) = rx.try_recv() {
                lines.push(line);
            }
            (result.is_ok(), lines)
        };

        let a = collect(42).await;
        let b = collect(42).await;
        assert_eq!(a, b);
    }

    #[test]
    fn dropping_the_future_stops_the_ticker() {
        // Constructing and dropping the future without polling must not
        // leave anything behind that could later log.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        rt.block_on(async {
            let executor = SimulatedExecutor::new(ScriptedPolicy {
                duration_ms: 5000,
                fail_attempts: vec![],
            });
            let (logs, mut rx) = StepLogs::channel();
            let fut = executor.execute(run(1, 1), &logs);
            drop(fut);
            drop(logs);
            assert!(rx.recv().await.is_none());
        });
    }
}

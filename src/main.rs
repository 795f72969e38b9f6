use std::io::IsTerminal;

use clap::Parser;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use vigil::cli::{Cli, Command, OutputFormat};
use vigil::config::{self, DeployConfig};
use vigil::engine::executor::{RandomPolicy, SimulatedExecutor};
use vigil::engine::runner::{
    CompletionHook, RunOutcome, RunnerContext, RunnerOptions, run_sequence,
};
use vigil::engine::state::{SequenceEvent, SequenceState, Snapshot};
use vigil::error::VigilError;
use vigil::logging;
use vigil::observer::{self, Observer, OutputMode};
use vigil::paths;
use vigil::plan;
use vigil::record;

/// Completed run transcripts kept per deployment.
const KEEP_RUN_LOGS: usize = 20;

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let output_format = resolve_output_format(&cli.output);
    let mode = resolve_output_mode(&output_format, cli.verbose, cli.quiet);

    // Terminal layer: suppress tracing when the progress UI manages the
    // terminal (Normal/Quiet). Tracing output to stderr corrupts indicatif's
    // terminal line tracking, causing redraws to clear completed steps.
    let terminal_filter = match mode {
        OutputMode::Verbose => EnvFilter::new("debug"),
        OutputMode::Normal | OutputMode::Quiet => EnvFilter::new("off"),
        OutputMode::Plain => EnvFilter::from_default_env()
            .add_directive("vigil=info".parse().expect("valid log directive")),
    };

    let terminal_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    // File layer: always captures vigil=debug, initially discards until activated
    let (file_writer, file_handle) = logging::DeferredFileWriter::new();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_filter(EnvFilter::new("vigil=debug"));

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();

    // Handle init before loading config — it creates the config
    if let Command::Init { defaults } = cli.command {
        return vigil::wizard::run(defaults).map_err(Into::into);
    }

    let deploy = config::load_config(&cli.config)?;

    // Activate file logging for commands that run the engine
    let logs_dir = paths::logs_dir(&deploy.id, deploy.name.as_deref());
    if matches!(cli.command, Command::Install { .. }) {
        std::fs::create_dir_all(&logs_dir).ok();
        file_handle.set_file(&logs_dir.join("vigil.log")).ok();
    }

    match cli.command {
        Command::Init { .. } => unreachable!(),
        Command::Plan => run_plan(&deploy, &output_format),
        Command::Install { seed, max_attempts } => {
            run_install(deploy, &output_format, mode, seed, max_attempts).await?
        }
        Command::Status => run_status(&deploy, &output_format)?,
        Command::Log { failed, all, debug } => {
            handle_log_command(&logs_dir, failed, all, debug)?
        }
    }

    Ok(())
}

// ── plan ────────────────────────────────────────────────────────────

fn run_plan(deploy: &DeployConfig, output_format: &OutputFormat) {
    let steps = plan::build_plan(deploy.mode, &deploy.addons);

    if matches!(output_format, OutputFormat::Json) {
        let json = PlanJson {
            deployment: deploy.display_name().to_string(),
            mode: deploy.mode.as_str().to_string(),
            steps: steps
                .iter()
                .enumerate()
                .map(|(i, s)| PlanStepJson {
                    index: i as u64 + 1,
                    id: s.id.clone(),
                    title: s.title.clone(),
                })
                .collect(),
        };
        println!(
            "{}",
            facet_json::to_string(&json).expect("JSON serialization")
        );
        return;
    }

    println!(
        "Install plan for '{}' ({} mode), {} steps:",
        deploy.display_name(),
        deploy.mode.as_str(),
        steps.len()
    );
    for (i, step) in steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step.title);
        println!("     {}", step.description);
    }
}

// ── install ─────────────────────────────────────────────────────────

async fn run_install(
    deploy: DeployConfig,
    output_format: &OutputFormat,
    mode: OutputMode,
    seed: Option<u64>,
    max_attempts: Option<u32>,
) -> Result<(), VigilError> {
    let steps = plan::build_plan(deploy.mode, &deploy.addons);
    let mut state = SequenceState::new(steps);
    let initial = state.snapshot();

    let (event_tx, mut observer_rx) = broadcast::channel(256);
    let transcript_rx = event_tx.subscribe();
    let cancel = CancellationToken::new();

    let mut obs: Box<dyn Observer> = match output_format {
        OutputFormat::Json => Box::new(observer::json::JsonObserver::new(&initial)),
        OutputFormat::Plain => Box::new(observer::plain::PlainObserver::new(&initial, mode)),
        OutputFormat::Interactive | OutputFormat::Auto => {
            Box::new(observer::interactive::InteractiveObserver::new(&initial, mode))
        }
    };

    // Transcript task: mirrors every event into the run log file.
    let logs_dir = paths::logs_dir(&deploy.id, deploy.name.as_deref());
    let run_logger = logging::RunLogger::new(&logs_dir).map_err(|source| VigilError::Io {
        context: format!("creating run log in {}", logs_dir.display()),
        source,
    })?;
    let transcript = tokio::spawn(write_transcript(transcript_rx, initial, run_logger));

    // Ctrl+C abandons observation; completed steps stay completed.
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_on_signal.cancel();
        }
    });

    // Completion hook: persist the deployment record exactly once.
    let record_path = paths::record_path(&deploy.id, deploy.name.as_deref());
    let hook_deploy = deploy.clone();
    let hook: CompletionHook = Box::new(move |snapshot: &Snapshot| {
        let rec = record::DeploymentRecord {
            name: hook_deploy.display_name().to_string(),
            mode: hook_deploy.mode.as_str().to_string(),
            organization: hook_deploy.config.deployment.organization.clone(),
            region: hook_deploy.config.deployment.region.clone(),
            addons: hook_deploy.addons.iter().map(|k| k.id().to_string()).collect(),
            completed_at: logging::utc_timestamp(),
            steps: snapshot.steps.len() as u64,
            attempts: snapshot.steps.iter().map(|s| u64::from(s.attempts)).sum(),
        };
        if let Err(e) = record::save(&rec, &record_path) {
            tracing::warn!("failed to persist deployment record: {e}");
        }
    });

    // Run the engine in a spawned task, observer in the foreground.
    let ctx = RunnerContext::new(event_tx, cancel.clone());
    let policy = match seed {
        Some(s) => RandomPolicy::seeded(s),
        None => RandomPolicy::new(),
    };
    let executor = SimulatedExecutor::new(policy);
    let opts = RunnerOptions {
        max_attempts,
        ..Default::default()
    };
    let runner = tokio::spawn(async move {
        let outcome = run_sequence(&mut state, &executor, &ctx, opts, Some(hook)).await;
        (outcome, state)
    });

    observer::run_attached(&mut observer_rx, &mut *obs).await;

    let (outcome, state) = runner.await.map_err(|e| VigilError::Engine {
        message: format!("runner panicked: {e}"),
    })?;
    let outcome = outcome?;

    let logger = transcript.await.map_err(|e| VigilError::Engine {
        message: format!("transcript task panicked: {e}"),
    })?;
    logger.finish(outcome == RunOutcome::Completed);
    logging::rotate_logs(&logs_dir, KEEP_RUN_LOGS);

    obs.on_finish(&outcome).await;

    match outcome {
        RunOutcome::Completed | RunOutcome::Cancelled => Ok(()),
        RunOutcome::Failed { index } => {
            if !matches!(output_format, OutputFormat::Json) {
                print_failure_summary(&state.snapshot());
            }
            let step = &state.steps()[index];
            Err(VigilError::InstallFailed {
                step: step.id.clone(),
                attempts: step.attempts,
            })
        }
    }
}

/// Render the final sequence view after a terminal failure: one line per
/// step, with the log tail and error detail for the expanded (failed) one.
fn print_failure_summary(snapshot: &Snapshot) {
    let view = observer::view::project(snapshot);
    eprintln!();
    eprintln!("Deployment {}:", view.overall);
    for step_view in &view.steps {
        eprintln!("  {} {}", step_view.glyph, step_view.title);
        if step_view.expanded {
            let step = &snapshot.steps[step_view.index];
            let tail = step.logs.iter().rev().take(5).collect::<Vec<_>>();
            for entry in tail.into_iter().rev() {
                eprintln!("      {} {}", entry.offset_label(), entry.line);
            }
            if let Some(error) = &step.error {
                eprintln!("      error: {error}");
            }
        }
    }
}

/// Mirror engine events into the run log file; returns the logger so the
/// caller can finalize it once the outcome is known.
async fn write_transcript(
    mut rx: broadcast::Receiver<SequenceEvent>,
    snapshot: Snapshot,
    mut logger: logging::RunLogger,
) -> logging::RunLogger {
    let total = snapshot.steps.len();
    loop {
        match rx.recv().await {
            Ok(event) => match event {
                SequenceEvent::StepStarted { index, attempt } => {
                    logger.write_line(&format!(
                        "== [{}/{total}] {} (attempt {attempt})",
                        index + 1,
                        snapshot.steps[index].title
                    ));
                }
                SequenceEvent::StepLog { entry, .. } => {
                    logger.write_line(&format!("   {} {}", entry.offset_label(), entry.line));
                }
                SequenceEvent::StepFailed { index, message } => {
                    logger.write_line(&format!(
                        "!! '{}' failed: {message}",
                        snapshot.steps[index].id
                    ));
                }
                SequenceEvent::StepRetrying { .. } => {}
                SequenceEvent::StepCompleted { index } => {
                    logger.write_line(&format!("ok '{}'", snapshot.steps[index].id));
                }
                SequenceEvent::SequenceCompleted => {
                    logger.write_line("deployment completed");
                }
                SequenceEvent::SequenceFailed { index } => {
                    logger.write_line(&format!(
                        "deployment failed at '{}'",
                        snapshot.steps[index].id
                    ));
                }
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                logger.write_line(&format!("... transcript missed {n} events"));
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    logger
}

// ── status ──────────────────────────────────────────────────────────

fn run_status(deploy: &DeployConfig, output_format: &OutputFormat) -> Result<(), VigilError> {
    let path = paths::record_path(&deploy.id, deploy.name.as_deref());
    let rec = record::load(&path)?;

    if matches!(output_format, OutputFormat::Json) {
        let json = match &rec {
            Some(r) => StatusJson {
                name: deploy.display_name().to_string(),
                installed: true,
                mode: Some(r.mode.clone()),
                completed_at: Some(r.completed_at.clone()),
                addons: r.addons.clone(),
            },
            None => StatusJson {
                name: deploy.display_name().to_string(),
                installed: false,
                mode: None,
                completed_at: None,
                addons: Vec::new(),
            },
        };
        println!(
            "{}",
            facet_json::to_string(&json).expect("JSON serialization")
        );
        return Ok(());
    }

    match rec {
        Some(r) => {
            println!("Deployment '{}': installed", deploy.display_name());
            println!("  Mode: {}", r.mode);
            println!("  Organization: {}", r.organization);
            println!("  Region: {}", r.region);
            if r.addons.is_empty() {
                println!("  Add-ons: none");
            } else {
                println!("  Add-ons: {}", r.addons.join(", "));
            }
            println!("  Completed: {} ({} steps, {} attempts)", r.completed_at, r.steps, r.attempts);
        }
        None => {
            println!(
                "Deployment '{}' is not installed. Run `vigil install`.",
                deploy.display_name()
            );
        }
    }
    Ok(())
}

// ── log ─────────────────────────────────────────────────────────────

fn handle_log_command(
    logs_dir: &std::path::Path,
    failed: bool,
    all: bool,
    debug: bool,
) -> Result<(), VigilError> {
    if debug {
        let debug_log_path = logs_dir.join("vigil.log");
        if debug_log_path.exists() {
            let contents =
                std::fs::read_to_string(&debug_log_path).map_err(|source| VigilError::Io {
                    context: format!("reading {}", debug_log_path.display()),
                    source,
                })?;
            print!("{contents}");
        } else {
            println!("No vigil.log found. Run `vigil install` first.");
        }
        return Ok(());
    }

    if all {
        let logs = logging::list_run_logs(logs_dir);
        if logs.is_empty() {
            println!("No install logs found.");
        } else {
            for entry in &logs {
                let status_indicator = if entry.status == "failed" {
                    "FAIL"
                } else {
                    " OK "
                };
                println!(
                    "[{status_indicator}] {} ({})",
                    entry.timestamp,
                    entry.path.display()
                );
            }
        }
        return Ok(());
    }

    // Default / --failed: show the latest run log (optionally failed-only)
    match logging::latest_run_log(logs_dir, failed) {
        Some(path) => {
            let contents = std::fs::read_to_string(&path).map_err(|source| VigilError::Io {
                context: format!("reading {}", path.display()),
                source,
            })?;
            let fname = path.file_name().and_then(|f| f.to_str()).unwrap_or("?");
            println!("--- {fname} ---");
            print!("{contents}");
        }
        None => {
            if failed {
                println!("No failed install logs found.");
            } else {
                println!("No install logs found. Run `vigil install` first.");
            }
        }
    }

    Ok(())
}

// ── JSON output structs ─────────────────────────────────────────────

#[derive(facet::Facet)]
struct PlanJson {
    deployment: String,
    mode: String,
    steps: Vec<PlanStepJson>,
}

#[derive(facet::Facet)]
struct PlanStepJson {
    index: u64,
    id: String,
    title: String,
}

#[derive(facet::Facet)]
struct StatusJson {
    name: String,
    installed: bool,
    mode: Option<String>,
    completed_at: Option<String>,
    addons: Vec<String>,
}

/// Resolve `Auto` to a concrete format based on terminal detection.
fn resolve_output_format(format: &OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto => {
            if !std::io::stdout().is_terminal() || !std::io::stdin().is_terminal() {
                OutputFormat::Plain
            } else {
                OutputFormat::Interactive
            }
        }
        other => other.clone(),
    }
}

/// Map the resolved output format (plus `--verbose`/`--quiet` modifiers)
/// into the internal `OutputMode` used by the renderers.
fn resolve_output_mode(format: &OutputFormat, verbose: bool, quiet: bool) -> OutputMode {
    match format {
        OutputFormat::Json => {
            // JSON mode: always emit everything, ignore --verbose/--quiet.
            if verbose || quiet {
                eprintln!("warning: --verbose/--quiet ignored in JSON output mode");
            }
            OutputMode::Plain
        }
        OutputFormat::Plain => {
            if quiet {
                OutputMode::Quiet
            } else if verbose {
                OutputMode::Verbose
            } else {
                OutputMode::Plain
            }
        }
        OutputFormat::Interactive => {
            if quiet {
                OutputMode::Quiet
            } else if verbose {
                OutputMode::Verbose
            } else {
                OutputMode::Normal
            }
        }
        OutputFormat::Auto => {
            // Already resolved by resolve_output_format, but handle defensively
            OutputMode::Normal
        }
    }
}

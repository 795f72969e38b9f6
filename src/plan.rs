//! Install sequence generation.
//!
//! `build_plan` is a pure function from `(deployment mode, selected
//! add-ons)` to an ordered list of step plans: a fixed four-step prefix,
//! one step per selected add-on (selection order preserved), and a fixed
//! two-step suffix. Step ids and count depend only on the add-on set;
//! deployment mode affects display text only.

use crate::addon::AddonKind;
use crate::config::DeployMode;

// ── Step categories ─────────────────────────────────────────────────

/// Category of an install step. Resolved at generation time so the
/// executor looks up log/failure phrases through the enum rather than by
/// step-id string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepCategory {
    Prepare,
    Core,
    Configure,
    Storage,
    Addon(AddonKind),
    Verify,
    Start,
}

impl StepCategory {
    /// Log lines emitted while a step of this category is running.
    pub fn log_phrases(self) -> &'static [&'static str] {
        match self {
            StepCategory::Prepare => &[
                "Checking system requirements",
                "Resolving package sources",
                "Creating service user and directories",
                "Fetching release manifest",
            ],
            StepCategory::Core => &[
                "Unpacking server binaries",
                "Installing shared libraries",
                "Linking service units",
                "Applying file permissions",
            ],
            StepCategory::Configure => &[
                "Rendering configuration templates",
                "Writing server configuration",
                "Registering organization credentials",
                "Applying region settings",
            ],
            StepCategory::Storage => &[
                "Creating database schema",
                "Running storage migrations",
                "Seeding reference data",
                "Building history indexes",
            ],
            StepCategory::Addon(kind) => kind.log_phrases(),
            StepCategory::Verify => &[
                "Probing service endpoints",
                "Checking component versions",
                "Running self-diagnostics",
                "Validating configuration checksums",
            ],
            StepCategory::Start => &[
                "Starting server processes",
                "Waiting for listeners to bind",
                "Announcing deployment to agents",
            ],
        }
    }

    /// Failure messages the simulated backend can report for this category.
    pub fn failure_phrases(self) -> &'static [&'static str] {
        match self {
            StepCategory::Prepare => &[
                "package source is unreachable",
                "insufficient disk space in staging directory",
            ],
            StepCategory::Core => &[
                "checksum mismatch on server archive",
                "service unit registration failed",
            ],
            StepCategory::Configure => &[
                "configuration template rendering failed",
                "credential registration was rejected",
            ],
            StepCategory::Storage => &[
                "storage migration deadlocked",
                "schema version conflict detected",
            ],
            StepCategory::Addon(kind) => kind.failure_phrases(),
            StepCategory::Verify => &[
                "health probe timed out",
                "component version mismatch",
            ],
            StepCategory::Start => &[
                "listener failed to bind",
                "process exited during startup",
            ],
        }
    }
}

// ── Step plans ──────────────────────────────────────────────────────

/// One planned step: identity and display text, no runtime state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepPlan {
    /// Stable identifier, unique within the sequence.
    pub id: String,
    pub title: String,
    pub description: String,
    pub category: StepCategory,
}

/// Number of fixed steps before the add-on section.
pub const PREFIX_LEN: usize = 4;
/// Number of fixed steps after the add-on section.
pub const SUFFIX_LEN: usize = 2;

/// Build the install sequence for a deployment.
///
/// Deterministic: identical `(mode, addons)` always yields identical ids
/// and ordering. Mode only substitutes title/description text.
pub fn build_plan(mode: DeployMode, addons: &[AddonKind]) -> Vec<StepPlan> {
    let mut steps = Vec::with_capacity(PREFIX_LEN + addons.len() + SUFFIX_LEN);

    steps.push(StepPlan {
        id: "prepare".into(),
        title: "Prepare installation environment".into(),
        description: format!("Stage packages and directories for a {} deployment", mode.label()),
        category: StepCategory::Prepare,
    });
    steps.push(StepPlan {
        id: "install-core".into(),
        title: match mode {
            DeployMode::Single => "Install core server".into(),
            DeployMode::Cluster => "Install core server cluster".into(),
            DeployMode::Distributed => "Install distributed core nodes".into(),
        },
        description: "Unpack and register the core server components".into(),
        category: StepCategory::Core,
    });
    steps.push(StepPlan {
        id: "configure".into(),
        title: "Apply base configuration".into(),
        description: "Render and install server configuration from the wizard answers".into(),
        category: StepCategory::Configure,
    });
    steps.push(StepPlan {
        id: "init-storage".into(),
        title: match mode {
            DeployMode::Single => "Initialize local storage".into(),
            DeployMode::Cluster => "Initialize replicated storage".into(),
            DeployMode::Distributed => "Initialize federated storage".into(),
        },
        description: "Create the schema and run storage migrations".into(),
        category: StepCategory::Storage,
    });

    for kind in addons {
        steps.push(StepPlan {
            id: format!("addon-{}", kind.id()),
            title: kind.install_title(),
            description: kind.description().into(),
            category: StepCategory::Addon(*kind),
        });
    }

    steps.push(StepPlan {
        id: "verify".into(),
        title: "Verify deployment health".into(),
        description: "Probe installed components and check versions".into(),
        category: StepCategory::Verify,
    });
    steps.push(StepPlan {
        id: "start".into(),
        title: "Start services".into(),
        description: "Bring the deployment online".into(),
        category: StepCategory::Start,
    });

    steps
}

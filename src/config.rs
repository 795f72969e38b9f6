use std::path::{Path, PathBuf};

use facet::Facet;

use crate::addon::{AddonKind, CATALOG};
use crate::error::VigilError;

// ── TOML schema ───────────────────────────────────────────

/// Maximum length for free-text fields (organization, region).
const MAX_TEXT_LEN: usize = 64;

#[derive(Debug, Clone, Facet)]
pub struct Config {
    pub deployment: DeploymentSection,
    #[facet(default)]
    pub credentials: CredentialsSection,
    /// Add-on ids from the fixed catalog, in selection order.
    #[facet(default)]
    pub addons: Vec<String>,
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct DeploymentSection {
    #[facet(default = "single")]
    pub mode: String,
    #[facet(default)]
    pub organization: String,
    #[facet(default)]
    pub region: String,
}

impl Default for DeploymentSection {
    fn default() -> Self {
        Self {
            mode: "single".into(),
            organization: String::new(),
            region: String::new(),
        }
    }
}

#[derive(Debug, Clone, Facet)]
#[facet(default)]
pub struct CredentialsSection {
    #[facet(default = "admin")]
    pub username: String,
    #[facet(default = "changeme")]
    pub password: String,
}

impl Default for CredentialsSection {
    fn default() -> Self {
        Self {
            username: "admin".into(),
            password: "changeme".into(),
        }
    }
}

// ── Deployment mode ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    Single,
    Cluster,
    Distributed,
}

pub const MODES: [DeployMode; 3] = [DeployMode::Single, DeployMode::Cluster, DeployMode::Distributed];

impl DeployMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(DeployMode::Single),
            "cluster" => Some(DeployMode::Cluster),
            "distributed" => Some(DeployMode::Distributed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeployMode::Single => "single",
            DeployMode::Cluster => "cluster",
            DeployMode::Distributed => "distributed",
        }
    }

    /// Human-facing label used in generated text.
    pub fn label(self) -> &'static str {
        match self {
            DeployMode::Single => "single-node",
            DeployMode::Cluster => "clustered",
            DeployMode::Distributed => "distributed",
        }
    }
}

// ── DeployConfig ──────────────────────────────────────────

/// Resolved runtime config combining the parsed TOML with path-derived
/// identity and the parsed mode/add-on vocabulary.
#[derive(Debug, Clone)]
pub struct DeployConfig {
    /// 8-hex-char hash of canonicalized config path + name.
    pub id: String,
    /// Derived from filename: `prod.vigil.toml` → Some("prod"), `vigil.toml` → None.
    pub name: Option<String>,
    /// Canonicalized path to the config file.
    pub config_path: PathBuf,
    /// Parsed TOML config.
    pub config: Config,
    pub mode: DeployMode,
    pub addons: Vec<AddonKind>,
}

impl DeployConfig {
    /// User-facing display name: the derived name if present, otherwise the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ── validation ────────────────────────────────────────────

fn validate_config(config: &Config) -> Result<(), VigilError> {
    if DeployMode::parse(&config.deployment.mode).is_none() {
        let known: Vec<&str> = MODES.iter().map(|m| m.as_str()).collect();
        return Err(VigilError::Validation {
            message: format!(
                "unknown deployment mode '{}' (expected one of {})",
                config.deployment.mode,
                known.join(", ")
            ),
        });
    }

    validate_text("deployment.organization", &config.deployment.organization)?;
    validate_text("deployment.region", &config.deployment.region)?;

    if config.credentials.username.is_empty() {
        return Err(VigilError::Validation {
            message: "credentials.username must not be empty".into(),
        });
    }

    for (i, id) in config.addons.iter().enumerate() {
        if AddonKind::parse(id).is_none() {
            let known: Vec<&str> = CATALOG.iter().map(|k| k.id()).collect();
            return Err(VigilError::Validation {
                message: format!(
                    "unknown add-on '{id}' (available: {})",
                    known.join(", ")
                ),
            });
        }
        if config.addons[i + 1..].contains(id) {
            return Err(VigilError::Validation {
                message: format!("add-on '{id}' is listed more than once"),
            });
        }
    }

    Ok(())
}

fn validate_text(field: &str, value: &str) -> Result<(), VigilError> {
    if value.trim().is_empty() {
        return Err(VigilError::Validation {
            message: format!("{field} must not be empty"),
        });
    }
    if value.chars().count() > MAX_TEXT_LEN {
        return Err(VigilError::Validation {
            message: format!("{field} must be at most {MAX_TEXT_LEN} characters"),
        });
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<(), VigilError> {
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');
    if !valid {
        return Err(VigilError::Validation {
            message: format!("derived name must match [a-zA-Z0-9][a-zA-Z0-9._-]* (got '{name}')"),
        });
    }
    Ok(())
}

// ── helpers ───────────────────────────────────────────────

/// Derive the deployment name from the config filename.
/// `vigil.toml` → None, `prod.vigil.toml` → Some("prod")
fn derive_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem == "vigil" {
        return None;
    }
    // For `prod.vigil.toml`, file_stem gives `prod.vigil`, we want `prod`
    let name = stem.strip_suffix(".vigil").unwrap_or(stem);
    Some(name.to_string())
}

/// Compute an 8-hex-char ID from the canonicalized config path and optional
/// name, so `vigil.toml` and `prod.vigil.toml` in the same dir get
/// different IDs.
fn config_id(canonical_path: &Path, name: Option<&str>) -> String {
    let mut hash: u64 = 0xcbf29ce484222325; // FNV-1a offset basis
    for b in canonical_path.to_string_lossy().bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    if let Some(n) = name {
        for b in n.bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
    }
    format!("{:08x}", hash as u32)
}

// ── public API ────────────────────────────────────────────

pub fn load_config(path: &Path) -> Result<DeployConfig, VigilError> {
    let contents = std::fs::read_to_string(path).map_err(|source| VigilError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let config: Config = facet_toml::from_str(&contents).map_err(|e| VigilError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    validate_config(&config)?;

    let canonical = path.canonicalize().map_err(|source| VigilError::ConfigLoad {
        path: path.display().to_string(),
        source,
    })?;

    let name = derive_name(&canonical);
    if let Some(ref n) = name {
        validate_name(n)?;
    }

    let id = config_id(&canonical, name.as_deref());

    // Infallible after validate_config.
    let mode = DeployMode::parse(&config.deployment.mode).unwrap_or(DeployMode::Single);
    let addons: Vec<AddonKind> = config
        .addons
        .iter()
        .filter_map(|id| AddonKind::parse(id))
        .collect();

    Ok(DeployConfig {
        id,
        name,
        config_path: canonical,
        config,
        mode,
        addons,
    })
}

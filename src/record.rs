//! Persisted deployment record.
//!
//! Written by the install completion hook, read back by `vigil status`.
//! Absence of the file means the deployment has never completed an
//! install — a cancelled or failed run leaves no record.

use std::path::Path;

use facet::Facet;

use crate::error::VigilError;

#[derive(Debug, Clone, Facet)]
pub struct DeploymentRecord {
    pub name: String,
    pub mode: String,
    pub organization: String,
    pub region: String,
    pub addons: Vec<String>,
    /// UTC timestamp, `YYYY-MM-DDTHH-MM-SS`.
    pub completed_at: String,
    /// Number of steps in the completed sequence.
    pub steps: u64,
    /// Total attempts across all steps (> steps means retries happened).
    pub attempts: u64,
}

pub fn save(record: &DeploymentRecord, path: &Path) -> Result<(), VigilError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| VigilError::Io {
            context: format!("creating {}", parent.display()),
            source,
        })?;
    }
    let json = facet_json::to_string(record).map_err(|e| VigilError::Validation {
        message: format!("serializing deployment record: {e}"),
    })?;
    std::fs::write(path, json).map_err(|source| VigilError::Io {
        context: format!("writing {}", path.display()),
        source,
    })
}

/// Load the record if one exists. `Ok(None)` means never installed.
pub fn load(path: &Path) -> Result<Option<DeploymentRecord>, VigilError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(VigilError::Io {
                context: format!("reading {}", path.display()),
                source,
            });
        }
    };
    let record = facet_json::from_str(&contents).map_err(|e| VigilError::ConfigParse {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(Some(record))
}

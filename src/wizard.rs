use std::path::PathBuf;

use inquire::validator::Validation;
use inquire::{Confirm, MultiSelect, Password, PasswordDisplayMode, Select, Text};

use crate::addon::{AddonKind, CATALOG};
use crate::config::{DeployMode, MODES};
use crate::error::VigilError;

// ── wizard state ─────────────────────────────────────────

struct WizardConfig {
    mode: DeployMode,
    organization: String,
    region: String,
    username: String,
    password: String,
    addons: Vec<AddonKind>,
}

// ── public entry point ───────────────────────────────────

pub fn run(defaults: bool) -> Result<(), VigilError> {
    let output_path = PathBuf::from("vigil.toml");

    if output_path.exists() {
        if defaults {
            return Err(VigilError::Validation {
                message: "vigil.toml already exists (use interactive mode to overwrite)".into(),
            });
        }
        let overwrite = Confirm::new("vigil.toml already exists. Overwrite?")
            .with_default(false)
            .prompt()
            .map_err(map_inquire_err)?;
        if !overwrite {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let config = if defaults {
        default_config()
    } else {
        run_wizard()?
    };

    let toml = generate_toml(&config);
    std::fs::write(&output_path, &toml).map_err(|e| VigilError::ConfigWrite {
        path: output_path.display().to_string(),
        source: e,
    })?;

    println!("Created vigil.toml");
    println!("Run `vigil install` to provision the deployment.");
    Ok(())
}

// ── defaults ─────────────────────────────────────────────

fn default_config() -> WizardConfig {
    WizardConfig {
        mode: DeployMode::Single,
        organization: "default".into(),
        region: "primary".into(),
        username: "admin".into(),
        password: "changeme".into(),
        addons: vec![],
    }
}

// ── wizard step navigation ───────────────────────────────

enum WizardStep {
    Mode,
    Deployment,
    Credentials,
    Addons,
    Done,
}

impl WizardStep {
    fn next(&self) -> Self {
        match self {
            Self::Mode => Self::Deployment,
            Self::Deployment => Self::Credentials,
            Self::Credentials => Self::Addons,
            Self::Addons | Self::Done => Self::Done,
        }
    }

    fn prev(&self) -> Self {
        match self {
            Self::Mode => Self::Mode,
            Self::Deployment => Self::Mode,
            Self::Credentials => Self::Deployment,
            Self::Addons => Self::Credentials,
            Self::Done => Self::Addons,
        }
    }
}

// ── interactive wizard ───────────────────────────────────

fn run_wizard() -> Result<WizardConfig, VigilError> {
    println!();

    let mut mode = DeployMode::Single;
    let mut organization = String::new();
    let mut region = String::new();
    let mut username = "admin".to_string();
    let mut password = "changeme".to_string();
    let mut addons = Vec::new();

    let mut step = WizardStep::Mode;

    loop {
        match step {
            WizardStep::Mode => match prompt_mode() {
                Ok(m) => {
                    mode = m;
                    step = step.next();
                }
                // ESC on the first step cancels the wizard.
                Err(VigilError::InitCancelled) => return Err(VigilError::InitCancelled),
                Err(e) => return Err(e),
            },
            WizardStep::Deployment => match prompt_deployment() {
                Ok((org, reg)) => {
                    organization = org;
                    region = reg;
                    step = step.next();
                }
                Err(VigilError::InitCancelled) => step = step.prev(),
                Err(e) => return Err(e),
            },
            WizardStep::Credentials => match prompt_credentials() {
                Ok((user, pass)) => {
                    username = user;
                    password = pass;
                    step = step.next();
                }
                Err(VigilError::InitCancelled) => step = step.prev(),
                Err(e) => return Err(e),
            },
            WizardStep::Addons => match prompt_addons() {
                Ok(a) => {
                    addons = a;
                    step = step.next();
                }
                Err(VigilError::InitCancelled) => step = step.prev(),
                Err(e) => return Err(e),
            },
            WizardStep::Done => break,
        }
    }

    Ok(WizardConfig {
        mode,
        organization,
        region,
        username,
        password,
        addons,
    })
}

// ── wizard steps ─────────────────────────────────────────

fn prompt_mode() -> Result<DeployMode, VigilError> {
    let labels: Vec<String> = MODES
        .iter()
        .map(|m| match m {
            DeployMode::Single => "single — everything on one host".to_string(),
            DeployMode::Cluster => "cluster — HA pair with replicated storage".to_string(),
            DeployMode::Distributed => "distributed — core nodes across regions".to_string(),
        })
        .collect();

    let choice = Select::new("Deployment mode:", labels)
        .with_help_message("How the monitoring system will be laid out")
        .prompt()
        .map_err(map_inquire_err)?;

    let id = choice.split_whitespace().next().unwrap_or("single");
    Ok(DeployMode::parse(id).unwrap_or(DeployMode::Single))
}

fn prompt_deployment() -> Result<(String, String), VigilError> {
    let organization = Text::new("Organization:")
        .with_help_message("Shown in the dashboard header and on alert notifications")
        .with_validator(|input: &str| match validate_text_field(input) {
            Ok(()) => Ok(Validation::Valid),
            Err(msg) => Ok(Validation::Invalid(msg.into())),
        })
        .prompt()
        .map_err(map_inquire_err)?;

    let region = Text::new("Region:")
        .with_default("primary")
        .with_help_message("Label for this deployment's location, e.g. 'eu-central'")
        .with_validator(|input: &str| match validate_text_field(input) {
            Ok(()) => Ok(Validation::Valid),
            Err(msg) => Ok(Validation::Invalid(msg.into())),
        })
        .prompt()
        .map_err(map_inquire_err)?;

    Ok((organization, region))
}

fn validate_text_field(input: &str) -> Result<(), String> {
    if input.trim().is_empty() {
        return Err("Must not be empty".into());
    }
    if input.chars().count() > 64 {
        return Err("Must be at most 64 characters".into());
    }
    Ok(())
}

fn prompt_credentials() -> Result<(String, String), VigilError> {
    let username = Text::new("Admin username:")
        .with_default("admin")
        .with_validator(|input: &str| {
            if input.is_empty() {
                Ok(Validation::Invalid("Username cannot be empty".into()))
            } else {
                Ok(Validation::Valid)
            }
        })
        .prompt()
        .map_err(map_inquire_err)?;

    let password = Password::new("Admin password:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .with_help_message("Leave empty to keep the default ('changeme')")
        .prompt()
        .map_err(map_inquire_err)?;

    let password = if password.is_empty() {
        "changeme".to_string()
    } else {
        password
    };

    Ok((username, password))
}

fn prompt_addons() -> Result<Vec<AddonKind>, VigilError> {
    let labels: Vec<String> = CATALOG
        .iter()
        .map(|k| format!("{} — {}", k.id(), k.description()))
        .collect();

    let chosen = MultiSelect::new("Add-ons:", labels)
        .with_help_message("Each selected add-on adds one install step")
        .prompt()
        .map_err(map_inquire_err)?;

    let addons = chosen
        .iter()
        .filter_map(|label| {
            let id = label.split(" — ").next()?;
            AddonKind::parse(id)
        })
        .collect();

    Ok(addons)
}

// ── TOML generation ──────────────────────────────────────

fn generate_toml(config: &WizardConfig) -> String {
    let mut out = String::new();

    // Top-level array must precede any table section.
    if !config.addons.is_empty() {
        let quoted: Vec<String> = config
            .addons
            .iter()
            .map(|k| format!("\"{}\"", k.id()))
            .collect();
        out.push_str(&format!("addons = [{}]\n", quoted.join(", ")));
        out.push('\n');
    }

    out.push_str("[deployment]\n");
    out.push_str(&format!("mode = \"{}\"\n", config.mode.as_str()));
    out.push_str(&format!("organization = \"{}\"\n", config.organization));
    out.push_str(&format!("region = \"{}\"\n", config.region));
    out.push('\n');

    let default_credentials = config.username == "admin" && config.password == "changeme";
    if !default_credentials {
        out.push_str("[credentials]\n");
        out.push_str(&format!("username = \"{}\"\n", config.username));
        out.push_str(&format!("password = \"{}\"\n", config.password));
        out.push('\n');
    }

    // commented-out hints
    if config.addons.is_empty() {
        let all: Vec<String> = CATALOG.iter().map(|k| format!("\"{}\"", k.id())).collect();
        out.push_str(&format!("# addons = [{}]\n", all.join(", ")));
        out.push('\n');
    }

    if default_credentials {
        out.push_str("# [credentials]\n");
        out.push_str("# username = \"admin\"\n");
        out.push_str("# password = \"changeme\"\n");
    }

    out
}

// ── error mapping ────────────────────────────────────────

fn map_inquire_err(e: inquire::InquireError) -> VigilError {
    match e {
        inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted => {
            VigilError::InitCancelled
        }
        other => VigilError::Validation {
            message: format!("prompt error: {other}"),
        },
    }
}

// ── tests ────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_toml_default_round_trips() {
        let config = default_config();
        let toml = generate_toml(&config);

        // Must parse back as a valid vigil Config
        let parsed: crate::config::Config = facet_toml::from_str(&toml).unwrap();
        assert_eq!(parsed.deployment.mode, "single");
        assert_eq!(parsed.deployment.organization, "default");
        assert_eq!(parsed.deployment.region, "primary");
        assert!(parsed.addons.is_empty());
        assert_eq!(parsed.credentials.username, "admin");
    }

    #[test]
    fn generate_toml_with_addons_preserves_order() {
        let config = WizardConfig {
            addons: vec![AddonKind::Alerting, AddonKind::Monitoring],
            ..default_config()
        };
        let toml = generate_toml(&config);
        assert!(toml.contains(r#"addons = ["alerting", "monitoring"]"#));
        // Should not have the commented-out addons hint
        assert!(!toml.contains("# addons"));

        let parsed: crate::config::Config = facet_toml::from_str(&toml).unwrap();
        assert_eq!(parsed.addons, vec!["alerting", "monitoring"]);
    }

    #[test]
    fn generate_toml_default_credentials_stay_commented() {
        let toml = generate_toml(&default_config());
        assert!(toml.contains("# [credentials]"));
        assert!(!toml.contains("\n[credentials]"));
    }

    #[test]
    fn generate_toml_custom_credentials_emitted() {
        let config = WizardConfig {
            username: "operator".into(),
            password: "hunter2".into(),
            ..default_config()
        };
        let toml = generate_toml(&config);
        assert!(toml.contains("[credentials]\n"));
        assert!(toml.contains("username = \"operator\""));
        assert!(toml.contains("password = \"hunter2\""));

        let parsed: crate::config::Config = facet_toml::from_str(&toml).unwrap();
        assert_eq!(parsed.credentials.username, "operator");
    }

    #[test]
    fn generate_toml_cluster_mode() {
        let config = WizardConfig {
            mode: DeployMode::Cluster,
            ..default_config()
        };
        let toml = generate_toml(&config);
        assert!(toml.contains("mode = \"cluster\""));

        let parsed: crate::config::Config = facet_toml::from_str(&toml).unwrap();
        assert_eq!(parsed.deployment.mode, "cluster");
    }
}

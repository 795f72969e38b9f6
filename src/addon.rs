//! Fixed catalog of optional deployment add-ons.
//!
//! Each add-on contributes exactly one step to the generated install
//! sequence. The catalog is closed: config validation and the wizard both
//! draw from `CATALOG`, so an unknown add-on id can only come from a
//! hand-edited config file and is rejected at load time.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddonKind {
    /// Metric collectors for the monitored hosts.
    Monitoring,
    /// Alert rule engine + notification dispatch.
    Alerting,
    /// Edge proxy for agents in unroutable networks.
    Proxy,
    /// Connectors to external ticketing/chat systems.
    Integrations,
}

pub const CATALOG: [AddonKind; 4] = [
    AddonKind::Monitoring,
    AddonKind::Alerting,
    AddonKind::Proxy,
    AddonKind::Integrations,
];

impl AddonKind {
    /// Stable identifier used in config files and step ids.
    pub fn id(self) -> &'static str {
        match self {
            AddonKind::Monitoring => "monitoring",
            AddonKind::Alerting => "alerting",
            AddonKind::Proxy => "proxy",
            AddonKind::Integrations => "integrations",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            AddonKind::Monitoring => "Monitoring collectors",
            AddonKind::Alerting => "Alerting engine",
            AddonKind::Proxy => "Proxy gateway",
            AddonKind::Integrations => "External integrations",
        }
    }

    /// Step title for this add-on's install step.
    pub fn install_title(self) -> String {
        format!("Install {}", self.title().to_lowercase())
    }

    pub fn description(self) -> &'static str {
        match self {
            AddonKind::Monitoring => "Collects host and service metrics from deployed agents",
            AddonKind::Alerting => "Evaluates alert rules and dispatches notifications",
            AddonKind::Proxy => "Relays agent traffic from isolated network segments",
            AddonKind::Integrations => "Forwards events to ticketing and chat systems",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        CATALOG.iter().copied().find(|k| k.id() == s)
    }

    /// Log lines emitted while this add-on's install step is running.
    pub fn log_phrases(self) -> &'static [&'static str] {
        match self {
            AddonKind::Monitoring => &[
                "Registering collector templates",
                "Enabling host discovery rules",
                "Scheduling metric pollers",
                "Seeding default dashboards",
            ],
            AddonKind::Alerting => &[
                "Loading default alert rules",
                "Configuring notification channels",
                "Starting escalation scheduler",
                "Validating media type templates",
            ],
            AddonKind::Proxy => &[
                "Generating proxy PSK identity",
                "Registering proxy with core server",
                "Opening relay listener",
                "Syncing proxy configuration cache",
            ],
            AddonKind::Integrations => &[
                "Installing webhook dispatcher",
                "Registering connector endpoints",
                "Verifying outbound connectivity",
                "Importing integration templates",
            ],
        }
    }

    /// Failure messages the simulated backend can report for this add-on.
    pub fn failure_phrases(self) -> &'static [&'static str] {
        match self {
            AddonKind::Monitoring => &[
                "collector template import timed out",
                "poller scheduler failed to start",
            ],
            AddonKind::Alerting => &[
                "notification channel test delivery failed",
                "alert rule compilation failed",
            ],
            AddonKind::Proxy => &[
                "proxy registration rejected by core server",
                "relay listener port already in use",
            ],
            AddonKind::Integrations => &[
                "webhook endpoint returned an unexpected status",
                "connector handshake failed",
            ],
        }
    }
}

impl fmt::Display for AddonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

//! Managed service models

use std::fmt;

use serde::{Deserialize, Serialize};

/// Observed state of an OS-managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    Running,
    Stopped,
    Failed,
    Unknown,
    Timeout,
    NotConfigured,
}

impl ServiceState {
    /// Map the output of `systemctl is-active`
    pub fn from_is_active(stdout: &str, exit_ok: bool) -> Self {
        match stdout.trim() {
            "active" if exit_ok => ServiceState::Running,
            "inactive" => ServiceState::Stopped,
            "failed" => ServiceState::Failed,
            _ => ServiceState::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        *self == ServiceState::Running
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceState::Running => "RUNNING",
            ServiceState::Stopped => "STOPPED",
            ServiceState::Failed => "FAILED",
            ServiceState::Unknown => "UNKNOWN",
            ServiceState::Timeout => "TIMEOUT",
            ServiceState::NotConfigured => "NOT_CONFIGURED",
        };
        f.write_str(s)
    }
}

/// A configured service slot. `name` is `None` when the operator left the
/// slot unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSlot {
    /// Role of the service (e.g. "web server")
    pub role: String,

    /// Service unit name
    pub name: Option<String>,
}

impl ServiceSlot {
    pub fn new(role: impl Into<String>, name: Option<String>) -> Self {
        Self {
            role: role.into(),
            name,
        }
    }

    /// Name used in reports: the unit name, or the role when unset
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.role)
    }
}

/// Result of a single service state query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheckResult {
    pub service_name: String,
    pub state: ServiceState,

    /// Raw output or error text behind the state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ServiceCheckResult {
    pub fn new(service_name: impl Into<String>, state: ServiceState) -> Self {
        Self {
            service_name: service_name.into(),
            state,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn not_configured(slot: &ServiceSlot) -> Self {
        Self::new(slot.label(), ServiceState::NotConfigured).with_details("Service name not set")
    }
}

/// Outcome of restarting one service during a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRestartOutcome {
    pub service_name: String,

    /// Whether the restart converged to an active state
    pub success: bool,

    /// State observed after the restart
    pub state: ServiceState,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

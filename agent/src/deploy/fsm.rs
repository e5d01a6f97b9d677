//! Finite State Machine for deployment steps

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::deployment::{StepDetail, StepName};

/// Deployment settings
#[derive(Debug, Clone)]
pub struct DeploySettings {
    /// Attempts for the pull step
    pub pull_attempts: u32,

    /// Delay between pull attempts
    pub pull_retry_delay: Duration,

    /// Timeout for a single pull attempt
    pub pull_timeout: Duration,

    /// Timeout for the dependency installer
    pub install_timeout: Duration,

    /// Timeout for a single service restart
    pub restart_timeout: Duration,

    /// Timeout for a single service state query
    pub status_timeout: Duration,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            pull_attempts: 3,
            pull_retry_delay: Duration::from_secs(5),
            pull_timeout: Duration::from_secs(120),
            install_timeout: Duration::from_secs(300),
            restart_timeout: Duration::from_secs(60),
            status_timeout: Duration::from_secs(10),
        }
    }
}

/// Step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not started
    Pending,

    /// Executing
    Running,

    /// Completed successfully
    Success,

    /// Completed with an error
    Failed,
}

/// Step event
#[derive(Debug, Clone)]
pub enum StepEvent {
    /// Begin executing the step
    Start,

    /// Step completed
    Succeed(StepDetail),

    /// Step failed
    Fail {
        error: String,
        detail: Option<StepDetail>,
    },
}

/// A deployment step and its state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStep {
    pub name: StepName,
    pub status: StepStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<StepDetail>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeploymentStep {
    /// Create a new step in pending state
    pub fn new(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            detail: None,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: StepEvent) -> Result<(), String> {
        let new_status = match (self.status, event) {
            (StepStatus::Pending, StepEvent::Start) => StepStatus::Running,

            (StepStatus::Running, StepEvent::Succeed(detail)) => {
                self.detail = Some(detail);
                StepStatus::Success
            }
            (StepStatus::Running, StepEvent::Fail { error, detail }) => {
                self.error = Some(if error.is_empty() {
                    format!("{} failed", self.name)
                } else {
                    error
                });
                self.detail = detail;
                StepStatus::Failed
            }

            // Success and Failed are terminal
            (status, event) => {
                return Err(format!(
                    "Invalid transition for {:?}: {:?} -> {:?}",
                    self.name, status, event
                ));
            }
        };

        self.status = new_status;
        Ok(())
    }
}

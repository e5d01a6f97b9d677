//! Service manager (systemd) operations

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::errors::AgentError;
use crate::exec::runner::{CommandRunner, CommandSpec};
use crate::models::service::{ServiceCheckResult, ServiceRestartOutcome, ServiceState};

/// Restarts and queries OS-managed services
#[derive(Clone)]
pub struct ServiceManager {
    runner: Arc<dyn CommandRunner>,
    use_sudo: bool,
    restart_timeout: Duration,
    status_timeout: Duration,
}

impl ServiceManager {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        use_sudo: bool,
        restart_timeout: Duration,
        status_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            use_sudo,
            restart_timeout,
            status_timeout,
        }
    }

    fn restart_spec(&self, name: &str) -> CommandSpec {
        if self.use_sudo {
            CommandSpec::new("sudo", self.restart_timeout).args(["systemctl", "restart", name])
        } else {
            CommandSpec::new("systemctl", self.restart_timeout).args(["restart", name])
        }
    }

    /// Issue a restart; a non-zero exit is an error
    pub async fn restart(&self, name: &str) -> Result<(), AgentError> {
        info!("Restarting service: {}", name);
        let spec = self.restart_spec(name);
        self.runner.run(&spec).await?.check(&spec)?;
        Ok(())
    }

    /// Query whether the service is active
    pub async fn status(&self, name: &str) -> ServiceCheckResult {
        let spec = CommandSpec::new("systemctl", self.status_timeout).args(["is-active", name]);

        match self.runner.run(&spec).await {
            Ok(output) => {
                let state = ServiceState::from_is_active(&output.stdout, output.success());
                debug!("Service {} is {}", name, state);
                let details = match state {
                    ServiceState::Running => "Active".to_string(),
                    ServiceState::Stopped => "Inactive".to_string(),
                    ServiceState::Failed => "Failed".to_string(),
                    _ => output.stdout.trim().to_string(),
                };
                ServiceCheckResult::new(name, state).with_details(details)
            }
            Err(e) if e.is_timeout() => {
                warn!("Status check for {} timed out", name);
                ServiceCheckResult::new(name, ServiceState::Timeout).with_details("Check timed out")
            }
            Err(e) => {
                warn!("Status check for {} failed: {}", name, e);
                ServiceCheckResult::new(name, ServiceState::Unknown).with_details(e.to_string())
            }
        }
    }

    /// Restart a service, then confirm it converged to an active state
    pub async fn restart_and_confirm(&self, name: &str) -> ServiceRestartOutcome {
        if let Err(e) = self.restart(name).await {
            warn!("Restart of {} failed: {}", name, e);
            return ServiceRestartOutcome {
                service_name: name.to_string(),
                success: false,
                state: ServiceState::Unknown,
                error: Some(e.to_string()),
            };
        }

        let check = self.status(name).await;
        let success = check.state.is_running();
        if !success {
            warn!("Service {} is {} after restart", name, check.state);
        }
        ServiceRestartOutcome {
            service_name: name.to_string(),
            success,
            state: check.state,
            error: (!success).then(|| {
                format!("Service restart failed verification (state: {})", check.state)
            }),
        }
    }
}

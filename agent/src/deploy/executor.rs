//! Deployment executor
//!
//! Runs the ordered deployment steps for one commit: pull, update
//! dependencies (when the manifest changed), restart services, verify.
//! The first failing step halts the run; the returned [`DeploymentRun`]
//! records exactly how far the deployment got.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::deploy::fsm::{DeploySettings, DeploymentStep, StepEvent};
use crate::deploy::git::GitRepo;
use crate::deploy::services::ServiceManager;
use crate::errors::AgentError;
use crate::exec::runner::{CommandRunner, CommandSpec};
use crate::models::deployment::{CommitRef, DeploymentRun, StepDetail, StepName};
use crate::models::service::{ServiceCheckResult, ServiceSlot};

/// Why a step failed, with whatever detail it gathered before failing
#[derive(Debug)]
struct StepFailure {
    error: String,
    detail: Option<StepDetail>,
}

impl StepFailure {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: StepDetail) -> Self {
        self.detail = Some(detail);
        self
    }
}

impl From<AgentError> for StepFailure {
    fn from(err: AgentError) -> Self {
        StepFailure::new(err.to_string())
    }
}

/// Deployment executor
pub struct DeploymentExecutor {
    git: GitRepo,
    services: ServiceManager,
    runner: Arc<dyn CommandRunner>,
    project_root: PathBuf,
    install_command: String,
    service_slots: Vec<ServiceSlot>,
    settings: DeploySettings,
}

impl DeploymentExecutor {
    /// Create a new executor.
    ///
    /// `service_slots` are restarted and verified in order.
    pub fn new(
        git: GitRepo,
        services: ServiceManager,
        runner: Arc<dyn CommandRunner>,
        install_command: impl Into<String>,
        service_slots: Vec<ServiceSlot>,
        settings: DeploySettings,
    ) -> Self {
        let project_root = git.root().to_path_buf();
        Self {
            git,
            services,
            runner,
            project_root,
            install_command: install_command.into(),
            service_slots,
            settings,
        }
    }

    /// Steps a run will attempt, in order
    pub fn plan(dependency_manifest_changed: bool) -> Vec<StepName> {
        let mut steps = vec![StepName::Pull];
        if dependency_manifest_changed {
            steps.push(StepName::UpdateDependencies);
        }
        steps.push(StepName::RestartServices);
        steps.push(StepName::Verify);
        steps
    }

    /// Deploy a commit.
    ///
    /// Ordinary deployment failure is reported through the returned run,
    /// never as an error.
    pub async fn run_deployment(
        &self,
        commit: CommitRef,
        dependency_manifest_changed: bool,
    ) -> DeploymentRun {
        info!(
            "Deploying commit {} (dependency manifest changed: {})",
            commit.short(),
            dependency_manifest_changed
        );
        let mut run = DeploymentRun::new(commit, dependency_manifest_changed);

        for name in Self::plan(dependency_manifest_changed) {
            let index = run.steps.len();
            run.steps.push(DeploymentStep::new(name));
            transition(&mut run, index, StepEvent::Start);
            info!("Step started: {}", name);

            match self.execute_step(name).await {
                Ok(detail) => {
                    transition(&mut run, index, StepEvent::Succeed(detail));
                    info!("Step succeeded: {}", name);
                }
                Err(failure) => {
                    error!("Step failed: {}: {}", name, failure.error);
                    let message = failure.error.clone();
                    transition(
                        &mut run,
                        index,
                        StepEvent::Fail {
                            error: failure.error,
                            detail: failure.detail,
                        },
                    );
                    run.fail(message);
                    return run;
                }
            }
        }

        run.succeed();
        info!("Deployment of {} completed successfully", run.commit.short());
        run
    }

    async fn execute_step(&self, name: StepName) -> Result<StepDetail, StepFailure> {
        match name {
            StepName::Pull => self.pull().await,
            StepName::UpdateDependencies => self.update_dependencies().await,
            StepName::RestartServices => self.restart_services().await,
            StepName::Verify => self.verify().await,
        }
    }

    async fn pull(&self) -> Result<StepDetail, StepFailure> {
        let attempts = self.settings.pull_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            info!("Pulling changes (attempt {}/{})", attempt, attempts);
            match self.git.pull(self.settings.pull_timeout).await {
                Ok(output) => {
                    return Ok(StepDetail::Pull {
                        attempts: attempt,
                        output,
                    });
                }
                Err(e) => {
                    warn!("Git pull failed on attempt {}: {}", attempt, e);
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.settings.pull_retry_delay).await;
                    }
                }
            }
        }

        Err(AgentError::TransientError(format!(
            "git pull failed after {} attempts: {}",
            attempts, last_error
        ))
        .into())
    }

    async fn update_dependencies(&self) -> Result<StepDetail, StepFailure> {
        info!("Updating dependencies");
        let spec = CommandSpec::new("bash", self.settings.install_timeout)
            .args(["-c", self.install_command.as_str()])
            .current_dir(&self.project_root);

        let output = self.runner.run(&spec).await?;
        if !output.success() {
            let stderr = output.stderr.trim().to_string();
            return Err(StepFailure::new(format!("Dependency update failed: {}", stderr))
                .with_detail(StepDetail::Dependencies {
                    output: output.stdout.trim().to_string(),
                }));
        }

        Ok(StepDetail::Dependencies {
            output: output.stdout.trim().to_string(),
        })
    }

    async fn restart_services(&self) -> Result<StepDetail, StepFailure> {
        let mut outcomes = Vec::new();
        let mut failed_services = Vec::new();

        // Every service is attempted, even after a failure
        for slot in &self.service_slots {
            let Some(name) = slot.name.as_deref() else {
                warn!("Skipping restart of {}: service name not configured", slot.role);
                continue;
            };
            let outcome = self.services.restart_and_confirm(name).await;
            if !outcome.success {
                failed_services.push(outcome.service_name.clone());
            }
            outcomes.push(outcome);
        }

        let detail = StepDetail::Restart {
            services: outcomes,
            failed_services: failed_services.clone(),
        };
        if failed_services.is_empty() {
            Ok(detail)
        } else {
            Err(StepFailure::new(format!(
                "Service restart failed for: {}",
                failed_services.join(", ")
            ))
            .with_detail(detail))
        }
    }

    async fn verify(&self) -> Result<StepDetail, StepFailure> {
        let mut checks: Vec<ServiceCheckResult> = Vec::new();
        for slot in &self.service_slots {
            if let Some(name) = slot.name.as_deref() {
                checks.push(self.services.status(name).await);
            }
        }

        let inactive: Vec<&str> = checks
            .iter()
            .filter(|c| !c.state.is_running())
            .map(|c| c.service_name.as_str())
            .collect();

        if inactive.is_empty() {
            Ok(StepDetail::Verify { services: checks })
        } else {
            let error = AgentError::VerificationError(format!(
                "inactive services: {}",
                inactive.join(", ")
            ));
            Err(StepFailure::from(error).with_detail(StepDetail::Verify { services: checks }))
        }
    }
}

fn transition(run: &mut DeploymentRun, index: usize, event: StepEvent) {
    if let Err(e) = run.steps[index].process(event) {
        error!("{}", e);
    }
}

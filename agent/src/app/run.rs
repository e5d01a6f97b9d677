//! Cycle drivers for the two operating modes

use std::sync::Arc;

use colored::Colorize;
use tracing::{error, info};

use crate::app::options::Mode;
use crate::deploy::executor::DeploymentExecutor;
use crate::deploy::git::GitRepo;
use crate::deploy::services::ServiceManager;
use crate::deploy::watcher::CommitWatcher;
use crate::errors::AgentError;
use crate::exec::runner::CommandRunner;
use crate::notify::{Notifier, Report, ReportVariant};
use crate::storage::settings::AgentConfig;
use crate::storage::state::DeploymentStateStore;
use crate::telemetry::HealthCollector;

/// How a cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Report delivered, or deployment succeeded
    Succeeded,

    /// Watch cycle found nothing to deploy
    NoChanges,

    /// The cycle failed; an alert or failure report was attempted
    Failed,
}

impl CycleOutcome {
    pub fn is_failure(&self) -> bool {
        *self == CycleOutcome::Failed
    }
}

/// Components wired for one agent invocation
pub struct Agent {
    notifier: Arc<dyn Notifier>,
    store: Arc<DeploymentStateStore>,
    watcher: CommitWatcher,
    executor: DeploymentExecutor,
    collector: HealthCollector,
}

impl Agent {
    /// Wire every component from the validated configuration
    pub fn new(
        config: &AgentConfig,
        runner: Arc<dyn CommandRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let git = GitRepo::new(
            runner.clone(),
            &config.project_root,
            &config.git_remote,
            &config.git_branch,
        );
        let services = ServiceManager::new(
            runner.clone(),
            config.services.use_sudo,
            config.deploy.restart_timeout,
            config.deploy.status_timeout,
        );
        let store = Arc::new(DeploymentStateStore::new(
            config.layout.last_deployed_file(),
            git.clone(),
        ));

        Self {
            notifier,
            watcher: CommitWatcher::new(git.clone(), store.clone(), &config.dependency_manifest),
            executor: DeploymentExecutor::new(
                git,
                services.clone(),
                runner,
                &config.install_command,
                config.services.deploy.clone(),
                config.deploy.clone(),
            ),
            collector: HealthCollector::new(services, config.services.monitored.clone()),
            store,
        }
    }

    /// Replace the health collector (e.g. to shorten CPU sampling)
    pub fn with_collector(mut self, collector: HealthCollector) -> Self {
        self.collector = collector;
        self
    }

    /// Run the selected mode once. Never returns an error: failures are
    /// logged, alerted and reflected in the outcome.
    pub async fn run(&self, mode: Mode, variant: ReportVariant) -> CycleOutcome {
        match mode {
            Mode::HealthCheck => self.run_health_check(variant).await,
            Mode::GitWatch => self.run_git_watch().await,
        }
    }

    /// Collect host health and send the report. An undeliverable report
    /// fails the cycle.
    pub async fn run_health_check(&self, variant: ReportVariant) -> CycleOutcome {
        info!("Starting {:?} health check", variant);

        let snapshot = self.collector.collect().await;
        info!("Health check completed");

        match self.notifier.send(&Report::Health { variant, snapshot }).await {
            Ok(receipt) => {
                info!("Health report sent to {} recipients", receipt.recipients);
                println!("{} {:?} health report sent successfully", "✓".green(), variant);
                CycleOutcome::Succeeded
            }
            Err(e) => {
                let message = format!("Failed to send health report: {}", e);
                error!("{}", message);
                println!("{} {}", "✗".red(), message);
                CycleOutcome::Failed
            }
        }
    }

    /// Check for new commits and deploy them
    pub async fn run_git_watch(&self) -> CycleOutcome {
        info!("Starting git watch cycle");

        match self.watch_and_deploy().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!("Git watch cycle failed: {}", e);
                error!("{}", message);
                println!("{} {}", "✗".red(), message);
                self.alert("git_watch", &message).await;
                CycleOutcome::Failed
            }
        }
    }

    async fn watch_and_deploy(&self) -> Result<CycleOutcome, AgentError> {
        let watch = self.watcher.run_watch_cycle().await?;

        let Some(commit) = watch.latest_commit.filter(|_| watch.has_new_commits) else {
            info!("No new commits detected");
            println!("{} No new commits detected", "ℹ".blue());
            return Ok(CycleOutcome::NoChanges);
        };

        info!("New commits detected: {} ({} commits)", commit.short(), watch.commit_count);
        println!("{} New commits detected, starting deployment...", "→".cyan());

        let run = self
            .executor
            .run_deployment(commit.clone(), watch.dependency_manifest_changed)
            .await;
        if let Ok(json) = serde_json::to_string(&run) {
            info!("Deployment log: {}", json);
        }

        // Only a fully successful run moves the baseline
        let persisted = if run.success {
            self.store.write_last_deployed(&commit).await.map(|_| {
                info!("Last deployed commit updated to {}", commit.short());
            })
        } else {
            Ok(())
        };

        let success = run.success;
        let delivered = match self.notifier.send(&Report::Deployment(run)).await {
            Ok(receipt) => {
                info!("Deployment report sent to {} recipients", receipt.recipients);
                true
            }
            Err(e) => {
                error!("Failed to send deployment report: {}", e);
                false
            }
        };

        persisted?;

        if success {
            let suffix = if delivered { "and report sent" } else { "(report not delivered)" };
            println!("{} Deployment completed {}", "✓".green(), suffix);
            Ok(CycleOutcome::Succeeded)
        } else {
            println!("{} Deployment failed - check email for details", "✗".red());
            Ok(CycleOutcome::Failed)
        }
    }

    async fn alert(&self, context: &str, message: &str) {
        match self.notifier.send(&Report::error_alert(context, message)).await {
            Ok(_) => info!("Error alert sent"),
            Err(e) => error!("Failed to send error alert: {}", e),
        }
    }
}

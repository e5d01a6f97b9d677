//! Remote branch watcher

use std::sync::Arc;

use tracing::{debug, info};

use crate::deploy::git::GitRepo;
use crate::errors::AgentError;
use crate::models::deployment::WatchResult;
use crate::storage::state::DeploymentStateStore;

/// Detects commits on the remote branch that have not been deployed
pub struct CommitWatcher {
    git: GitRepo,
    store: Arc<DeploymentStateStore>,
    dependency_manifest: String,
}

impl CommitWatcher {
    pub fn new(
        git: GitRepo,
        store: Arc<DeploymentStateStore>,
        dependency_manifest: impl Into<String>,
    ) -> Self {
        Self {
            git,
            store,
            dependency_manifest: dependency_manifest.into(),
        }
    }

    /// Fetch, compare against the last deployed commit and decide whether
    /// a deployment should run.
    ///
    /// Any git failure fails the cycle: a stale remote view or a rewritten
    /// history must not be mistaken for "nothing to do" or "deploy all".
    pub async fn run_watch_cycle(&self) -> Result<WatchResult, AgentError> {
        self.git.fetch().await?;

        let last_deployed = self.store.read_last_deployed().await?;
        debug!("Last deployed commit: {}", last_deployed);

        let new_commits = self.git.commits_between(&last_deployed).await?;
        let Some(latest) = new_commits.first().cloned() else {
            info!("No new commits on {}", self.git.remote_ref());
            return Ok(WatchResult::no_changes());
        };

        let changed = self
            .git
            .changed_paths(&last_deployed, &latest, &self.dependency_manifest)
            .await?;
        // The pathspec already limits the diff to the manifest
        let dependency_manifest_changed = !changed.is_empty();

        info!(
            "{} new commit(s) on {}, tip {} (dependency manifest changed: {})",
            new_commits.len(),
            self.git.remote_ref(),
            latest.short(),
            dependency_manifest_changed
        );

        Ok(WatchResult {
            has_new_commits: true,
            latest_commit: Some(latest),
            commit_count: new_commits.len(),
            dependency_manifest_changed,
        })
    }
}

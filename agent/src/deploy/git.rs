//! Git operations on the deployed working tree

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::errors::AgentError;
use crate::exec::runner::{CommandRunner, CommandSpec};
use crate::models::deployment::CommitRef;

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);
const FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// A git working tree tracking one remote branch
#[derive(Clone)]
pub struct GitRepo {
    runner: Arc<dyn CommandRunner>,
    root: PathBuf,
    remote: String,
    branch: String,
}

impl GitRepo {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        root: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            root: root.into(),
            remote: remote.into(),
            branch: branch.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<remote>/<branch>`
    pub fn remote_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }

    fn git(&self, timeout: Duration) -> CommandSpec {
        CommandSpec::new("git", timeout).current_dir(&self.root)
    }

    async fn run_checked(&self, spec: CommandSpec) -> Result<String, AgentError> {
        let output = self.runner.run(&spec).await?.check(&spec)?;
        Ok(output.stdout)
    }

    /// Current commit of the working tree
    pub async fn head(&self) -> Result<CommitRef, AgentError> {
        let spec = self.git(QUERY_TIMEOUT).args(["rev-parse", "HEAD"]);
        let stdout = self.run_checked(spec.clone()).await?;
        CommitRef::parse(&stdout).ok_or_else(|| AgentError::ToolError {
            command: spec.display(),
            detail: "empty output".to_string(),
        })
    }

    /// Fetch the configured remote
    pub async fn fetch(&self) -> Result<(), AgentError> {
        info!("Fetching from remote: {}", self.remote);
        let spec = self.git(FETCH_TIMEOUT).args(["fetch", self.remote.as_str()]);
        self.run_checked(spec).await?;
        debug!("Fetched {}", self.remote);
        Ok(())
    }

    /// Commits reachable from the remote branch but not from `base`,
    /// newest first
    pub async fn commits_between(&self, base: &CommitRef) -> Result<Vec<CommitRef>, AgentError> {
        let range = format!("{}..{}", base, self.remote_ref());
        let spec = self.git(QUERY_TIMEOUT).args(["rev-list".to_string(), range]);
        let stdout = self.run_checked(spec).await?;
        Ok(stdout.lines().filter_map(CommitRef::parse).collect())
    }

    /// Paths under `path` that differ between two commits, relative to
    /// the project root
    pub async fn changed_paths(
        &self,
        from: &CommitRef,
        to: &CommitRef,
        path: &str,
    ) -> Result<Vec<String>, AgentError> {
        let spec = self.git(QUERY_TIMEOUT).args([
            "diff",
            "--name-only",
            "--relative",
            from.as_str(),
            to.as_str(),
            "--",
            path,
        ]);
        let stdout = self.run_checked(spec).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Fetch and merge the remote branch into the working tree.
    ///
    /// Returns git's stdout.
    pub async fn pull(&self, timeout: Duration) -> Result<String, AgentError> {
        let spec = self
            .git(timeout)
            .args(["pull", self.remote.as_str(), self.branch.as_str()]);
        let stdout = self.run_checked(spec).await?;
        Ok(stdout.trim().to_string())
    }
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepo")
            .field("root", &self.root)
            .field("remote", &self.remote)
            .field("branch", &self.branch)
            .finish()
    }
}

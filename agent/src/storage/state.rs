//! Persisted deployment state

use tracing::{info, warn};

use crate::deploy::git::GitRepo;
use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::models::deployment::CommitRef;

/// Holds the hash of the last successfully deployed commit.
///
/// The file contains the raw hash and nothing else. Overlapping agent
/// invocations are not guarded against here; the scheduler must not
/// start a cycle while another one is running.
#[derive(Debug, Clone)]
pub struct DeploymentStateStore {
    file: File,
    git: GitRepo,
}

impl DeploymentStateStore {
    pub fn new(file: File, git: GitRepo) -> Self {
        Self { file, git }
    }

    /// Read the last deployed commit.
    ///
    /// On first run there is no file: the current repository tip becomes
    /// the baseline and is persisted, so existing history is never
    /// redeployed.
    pub async fn read_last_deployed(&self) -> Result<CommitRef, AgentError> {
        if self.file.exists().await {
            let contents = self.file.read_string().await.map_err(|e| {
                AgentError::StorageError(format!(
                    "Failed to read {}: {}",
                    self.file.path().display(),
                    e
                ))
            })?;
            if let Some(commit) = CommitRef::parse(&contents) {
                return Ok(commit);
            }
            warn!(
                "State file {} is empty, re-establishing baseline",
                self.file.path().display()
            );
        }

        let head = self.git.head().await?;
        info!("No deployment state found, using current tip {} as baseline", head.short());
        self.write_last_deployed(&head).await?;
        Ok(head)
    }

    /// Persist a new last deployed commit
    pub async fn write_last_deployed(&self, commit: &CommitRef) -> Result<(), AgentError> {
        self.file
            .write_atomic(commit.as_str().as_bytes())
            .await
            .map_err(|e| {
                AgentError::StorageError(format!(
                    "Failed to write {}: {}",
                    self.file.path().display(),
                    e
                ))
            })
    }
}

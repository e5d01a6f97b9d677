//! Deployment models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deploy::fsm::DeploymentStep;
use crate::models::service::{ServiceCheckResult, ServiceRestartOutcome};

/// Identifier of a commit in the monitored repository
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitRef(String);

impl CommitRef {
    /// Parse a commit hash from command output or a state file.
    ///
    /// Returns `None` for blank input.
    pub fn parse(raw: &str) -> Option<Self> {
        let hash = raw.trim();
        if hash.is_empty() {
            None
        } else {
            Some(Self(hash.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated hash for display
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one watch cycle. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchResult {
    pub has_new_commits: bool,

    /// Tip of the remote branch when new commits exist
    pub latest_commit: Option<CommitRef>,

    /// Number of commits reachable from the remote tip but not from the
    /// last deployed commit
    pub commit_count: usize,

    pub dependency_manifest_changed: bool,
}

impl WatchResult {
    /// A cycle that found nothing to deploy
    pub fn no_changes() -> Self {
        Self {
            has_new_commits: false,
            latest_commit: None,
            commit_count: 0,
            dependency_manifest_changed: false,
        }
    }
}

/// Deployment step name, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    Pull,
    UpdateDependencies,
    RestartServices,
    Verify,
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepName::Pull => "Pull changes",
            StepName::UpdateDependencies => "Update dependencies",
            StepName::RestartServices => "Restart services",
            StepName::Verify => "Verify deployment",
        };
        f.write_str(s)
    }
}

/// Structured payload recorded by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepDetail {
    Pull {
        /// Attempt number that produced this result
        attempts: u32,
        output: String,
    },
    Dependencies {
        output: String,
    },
    Restart {
        services: Vec<ServiceRestartOutcome>,
        failed_services: Vec<String>,
    },
    Verify {
        services: Vec<ServiceCheckResult>,
    },
}

/// One orchestrated deployment, from first step to final verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRun {
    pub id: Uuid,
    pub commit: CommitRef,
    pub dependency_manifest_changed: bool,

    /// Steps in execution order; a step appears once it has started
    pub steps: Vec<DeploymentStep>,

    pub success: bool,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DeploymentRun {
    /// Start a new, empty run
    pub fn new(commit: CommitRef, dependency_manifest_changed: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            commit,
            dependency_manifest_changed,
            steps: Vec::new(),
            success: false,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Look up a step by name
    pub fn step(&self, name: StepName) -> Option<&DeploymentStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// The step that halted the run, if any
    pub fn failed_step(&self) -> Option<&DeploymentStep> {
        self.steps.iter().find(|s| s.is_failed())
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Finalize as successful
    pub fn succeed(&mut self) {
        self.success = true;
        self.error = None;
        self.finished_at = Some(Utc::now());
    }

    /// Finalize as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.error = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Wall-clock duration, once finished
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::file::File;

/// File name of the persisted last-deployed commit
pub const LAST_DEPLOYED_FILE: &str = "last_deployed_commit";

/// Storage layout for the agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    /// Directory holding persisted deployment state
    pub state_dir: PathBuf,

    /// Directory holding the agent log file
    pub log_dir: PathBuf,
}

impl StorageLayout {
    /// Create a new storage layout
    pub fn new(state_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            state_dir: state_dir.into(),
            log_dir: log_dir.into(),
        }
    }

    /// Get the last-deployed commit file
    pub fn last_deployed_file(&self) -> File {
        File::new(self.state_dir.join(LAST_DEPLOYED_FILE))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new(default_state_dir(), default_log_dir())
    }
}

pub fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/serverangel")
}

pub fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/serverangel")
}

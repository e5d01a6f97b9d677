//! Deployment state persistence tests

use std::sync::Arc;

use serverangel::filesys::file::File;
use serverangel::models::deployment::CommitRef;
use serverangel::storage::layout::LAST_DEPLOYED_FILE;
use serverangel::storage::state::DeploymentStateStore;
use tempfile::TempDir;

use crate::common::{git_repo, Reply, ScriptedRunner};

fn store(dir: &TempDir, runner: Arc<ScriptedRunner>) -> DeploymentStateStore {
    DeploymentStateStore::new(File::new(dir.path().join(LAST_DEPLOYED_FILE)), git_repo(runner))
}

#[tokio::test]
async fn test_first_run_bootstraps_from_head() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new().on("git rev-parse HEAD", vec![Reply::ok("a1b2c3d4e5f6\n")]),
    );
    let store = store(&dir, runner.clone());

    let commit = store.read_last_deployed().await.unwrap();
    assert_eq!(commit.as_str(), "a1b2c3d4e5f6");

    let written = std::fs::read_to_string(dir.path().join(LAST_DEPLOYED_FILE)).unwrap();
    assert_eq!(written, "a1b2c3d4e5f6");

    // Second read comes from the file
    store.read_last_deployed().await.unwrap();
    assert_eq!(runner.count("git rev-parse"), 1);
}

#[tokio::test]
async fn test_read_trims_whitespace() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(LAST_DEPLOYED_FILE), "  cafe0123\n").unwrap();
    let runner = Arc::new(ScriptedRunner::new());

    let commit = store(&dir, runner.clone()).read_last_deployed().await.unwrap();
    assert_eq!(commit.as_str(), "cafe0123");
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_empty_file_is_rebootstrapped() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join(LAST_DEPLOYED_FILE), "\n").unwrap();
    let runner = Arc::new(
        ScriptedRunner::new().on("git rev-parse HEAD", vec![Reply::ok("beef4567\n")]),
    );

    let commit = store(&dir, runner).read_last_deployed().await.unwrap();
    assert_eq!(commit.as_str(), "beef4567");
}

#[tokio::test]
async fn test_bootstrap_fails_when_head_unavailable() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new().on("git rev-parse HEAD", vec![Reply::fail("not a git repository")]),
    );

    let err = store(&dir, runner).read_last_deployed().await.unwrap_err();
    assert!(err.to_string().contains("not a git repository"));
    assert!(!dir.path().join(LAST_DEPLOYED_FILE).exists());
}

#[tokio::test]
async fn test_write_replaces_previous_commit() {
    let dir = TempDir::new().unwrap();
    let store = store(&dir, Arc::new(ScriptedRunner::new()));

    store.write_last_deployed(&CommitRef::parse("11111111").unwrap()).await.unwrap();
    store.write_last_deployed(&CommitRef::parse("22222222").unwrap()).await.unwrap();

    assert_eq!(store.read_last_deployed().await.unwrap().as_str(), "22222222");
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(leftovers, vec![std::ffi::OsString::from(LAST_DEPLOYED_FILE)]);
}

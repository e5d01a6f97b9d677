//! End-to-end cycle tests

use std::sync::Arc;
use std::time::Duration;

use serverangel::app::options::Mode;
use serverangel::app::run::{Agent, CycleOutcome};
use serverangel::deploy::services::ServiceManager;
use serverangel::models::deployment::StepName;
use serverangel::models::service::ServiceState;
use serverangel::notify::{Report, ReportKind, ReportVariant};
use serverangel::storage::layout::LAST_DEPLOYED_FILE;
use serverangel::telemetry::HealthCollector;
use tempfile::TempDir;

use crate::common::{healthy_runner, test_config, RecordingNotifier, Reply, ScriptedRunner};

fn agent(dir: &TempDir, runner: &Arc<ScriptedRunner>, notifier: &Arc<RecordingNotifier>) -> Agent {
    let config = test_config(dir.path());
    let services = ServiceManager::new(
        runner.clone(),
        false,
        Duration::from_secs(1),
        Duration::from_secs(1),
    );
    let collector = HealthCollector::new(services, config.services.monitored.clone())
        .with_cpu_sample(Duration::from_millis(10));
    Agent::new(&config, runner.clone(), notifier.clone()).with_collector(collector)
}

fn deployed(dir: &TempDir) -> String {
    std::fs::read_to_string(dir.path().join(LAST_DEPLOYED_FILE)).unwrap()
}

fn set_deployed(dir: &TempDir, commit: &str) {
    std::fs::write(dir.path().join(LAST_DEPLOYED_FILE), commit).unwrap();
}

#[tokio::test]
async fn test_watch_without_changes_sends_nothing() {
    let dir = TempDir::new().unwrap();
    set_deployed(&dir, "aaaa0000");
    let runner = Arc::new(healthy_runner("aaaa0000", &[], false));
    let notifier = Arc::new(RecordingNotifier::new());

    let agent = agent(&dir, &runner, &notifier);

    let outcome = agent.run(Mode::GitWatch, ReportVariant::Daily).await;
    assert_eq!(outcome, CycleOutcome::NoChanges);
    assert!(!outcome.is_failure());

    // Same answer again with the remote unchanged
    assert_eq!(agent.run(Mode::GitWatch, ReportVariant::Daily).await, CycleOutcome::NoChanges);

    assert_eq!(runner.count("git fetch"), 2);
    assert!(notifier.reports().is_empty());
    assert_eq!(runner.count("git pull"), 0);
    assert_eq!(deployed(&dir), "aaaa0000");
}

#[tokio::test]
async fn test_first_run_records_baseline_without_deploying() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(healthy_runner("aaaa0000", &[], false));
    let notifier = Arc::new(RecordingNotifier::new());

    let outcome = agent(&dir, &runner, &notifier).run_git_watch().await;

    assert_eq!(outcome, CycleOutcome::NoChanges);
    assert_eq!(deployed(&dir), "aaaa0000");
    assert_eq!(runner.count("git pull"), 0);
}

#[tokio::test]
async fn test_deploys_new_commits_and_advances_state() {
    let dir = TempDir::new().unwrap();
    set_deployed(&dir, "aaaa0000");
    let runner = Arc::new(
        healthy_runner("aaaa0000", &["dddd0000", "cccc0000", "bbbb0000"], false)
            .on("git rev-list dddd0000..", vec![Reply::ok("")]),
    );
    let notifier = Arc::new(RecordingNotifier::new());
    let agent = agent(&dir, &runner, &notifier);

    assert_eq!(agent.run_git_watch().await, CycleOutcome::Succeeded);
    assert_eq!(deployed(&dir), "dddd0000");

    let reports = notifier.reports();
    assert_eq!(reports.len(), 1);
    match &reports[0] {
        Report::Deployment(run) => {
            assert!(run.success);
            assert_eq!(run.commit.as_str(), "dddd0000");
            assert!(run.step(StepName::UpdateDependencies).is_none());
        }
        other => panic!("unexpected report: {:?}", other.kind()),
    }

    // Nothing left to deploy on the next cycle
    assert_eq!(agent.run_git_watch().await, CycleOutcome::NoChanges);
    assert_eq!(runner.count("git pull"), 1);
    assert_eq!(notifier.reports().len(), 1);
}

#[tokio::test]
async fn test_manifest_change_installs_dependencies() {
    let dir = TempDir::new().unwrap();
    set_deployed(&dir, "aaaa0000");
    let runner = Arc::new(healthy_runner("aaaa0000", &["bbbb0000"], true));
    let notifier = Arc::new(RecordingNotifier::new());

    let outcome = agent(&dir, &runner, &notifier).run_git_watch().await;

    assert_eq!(outcome, CycleOutcome::Succeeded);
    assert_eq!(runner.count("bash -c source '/srv/app/venv/bin/activate'"), 1);
    match &notifier.reports()[0] {
        Report::Deployment(run) => {
            assert!(run.dependency_manifest_changed);
            assert!(run.step(StepName::UpdateDependencies).unwrap().is_success());
        }
        other => panic!("unexpected report: {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_failed_deployment_keeps_state_and_retries_next_cycle() {
    let dir = TempDir::new().unwrap();
    set_deployed(&dir, "aaaa0000");
    let runner = Arc::new(healthy_runner("aaaa0000", &["bbbb0000"], false).on(
        "systemctl is-active nginx",
        vec![Reply::ok("active\n"), Reply::ok("inactive\n")],
    ));
    let notifier = Arc::new(RecordingNotifier::new());
    let agent = agent(&dir, &runner, &notifier);

    let outcome = agent.run_git_watch().await;

    assert_eq!(outcome, CycleOutcome::Failed);
    assert!(outcome.is_failure());
    assert_eq!(deployed(&dir), "aaaa0000");
    match &notifier.reports()[0] {
        Report::Deployment(run) => {
            assert!(!run.success);
            assert_eq!(run.failed_step().unwrap().name, StepName::Verify);
        }
        other => panic!("unexpected report: {:?}", other.kind()),
    }

    // The same commit is attempted again
    runner.script("systemctl is-active nginx", vec![Reply::ok("active\n")]);
    assert_eq!(agent.run_git_watch().await, CycleOutcome::Succeeded);
    assert_eq!(deployed(&dir), "bbbb0000");
}

#[tokio::test]
async fn test_pull_exhaustion_reports_failure() {
    let dir = TempDir::new().unwrap();
    set_deployed(&dir, "aaaa0000");
    let runner = Arc::new(
        healthy_runner("aaaa0000", &["bbbb0000"], false)
            .on("git pull", vec![Reply::fail("Could not resolve host")]),
    );
    let notifier = Arc::new(RecordingNotifier::new());

    let outcome = agent(&dir, &runner, &notifier).run_git_watch().await;

    assert_eq!(outcome, CycleOutcome::Failed);
    assert_eq!(runner.count("git pull"), 3);
    assert_eq!(runner.count("systemctl"), 0);
    assert_eq!(deployed(&dir), "aaaa0000");
    assert_eq!(notifier.kinds(), vec![ReportKind::DeploymentReport]);
}

#[tokio::test]
async fn test_watch_error_sends_alert() {
    let dir = TempDir::new().unwrap();
    set_deployed(&dir, "aaaa0000");
    let runner = Arc::new(
        healthy_runner("aaaa0000", &["bbbb0000"], false)
            .on("git fetch", vec![Reply::fail("Permission denied (publickey)")]),
    );
    let notifier = Arc::new(RecordingNotifier::new());

    let outcome = agent(&dir, &runner, &notifier).run_git_watch().await;

    assert_eq!(outcome, CycleOutcome::Failed);
    assert_eq!(runner.count("git pull"), 0);
    match &notifier.reports()[..] {
        [Report::ErrorAlert { context, message }] => {
            assert_eq!(context, "git_watch");
            assert!(message.contains("Permission denied"), "{}", message);
        }
        other => panic!("unexpected reports: {}", other.len()),
    }
}

#[tokio::test]
async fn test_delivery_failure_does_not_undo_deployment() {
    let dir = TempDir::new().unwrap();
    set_deployed(&dir, "aaaa0000");
    let runner = Arc::new(healthy_runner("aaaa0000", &["bbbb0000"], false));
    let notifier = Arc::new(RecordingNotifier::failing());

    let outcome = agent(&dir, &runner, &notifier).run_git_watch().await;

    assert_eq!(outcome, CycleOutcome::Succeeded);
    assert_eq!(deployed(&dir), "bbbb0000");
}

#[tokio::test]
async fn test_health_check_reports_every_service() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .on("systemctl is-active", vec![Reply::ok("active\n")])
            .on("systemctl is-active redis", vec![Reply::Exit(3, String::new())])
            .on("systemctl is-active celery", vec![Reply::Timeout]),
    );
    let notifier = Arc::new(RecordingNotifier::new());

    let outcome = agent(&dir, &runner, &notifier)
        .run(Mode::HealthCheck, ReportVariant::Morning)
        .await;

    assert_eq!(outcome, CycleOutcome::Succeeded);
    assert_eq!(runner.count("git"), 0);
    match &notifier.reports()[..] {
        [Report::Health { variant, snapshot }] => {
            assert_eq!(*variant, ReportVariant::Morning);
            let states: Vec<(&str, ServiceState)> = snapshot
                .services
                .iter()
                .map(|s| (s.service_name.as_str(), s.state))
                .collect();
            assert_eq!(
                states,
                vec![
                    ("nginx", ServiceState::Running),
                    ("gunicorn", ServiceState::Running),
                    ("redis", ServiceState::Unknown),
                    ("celery", ServiceState::Timeout),
                ]
            );
            assert!(snapshot.system.memory_total > 0);
        }
        other => panic!("unexpected reports: {}", other.len()),
    }
}

#[tokio::test]
async fn test_health_check_delivery_failure() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedRunner::new().on("systemctl is-active", vec![Reply::ok("active\n")]));
    let notifier = Arc::new(RecordingNotifier::failing());

    let outcome = agent(&dir, &runner, &notifier).run_health_check(ReportVariant::Evening).await;

    assert_eq!(outcome, CycleOutcome::Failed);
    assert_eq!(notifier.kinds(), vec![ReportKind::HealthReport]);
}

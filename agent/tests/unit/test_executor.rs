//! Deployment executor tests

use std::sync::Arc;
use std::time::Duration;

use serverangel::deploy::executor::DeploymentExecutor;
use serverangel::deploy::fsm::{DeploySettings, StepStatus};
use serverangel::deploy::services::ServiceManager;
use serverangel::models::deployment::{CommitRef, StepDetail, StepName};
use serverangel::models::service::{ServiceSlot, ServiceState};

use crate::common::{git_repo, healthy_runner, Reply, ScriptedRunner};

const INSTALL: &str = "source '/srv/app/venv/bin/activate' && pip install -r 'requirements.txt'";

fn slots() -> Vec<ServiceSlot> {
    vec![
        ServiceSlot::new("application server", Some("gunicorn".to_string())),
        ServiceSlot::new("web server", Some("nginx".to_string())),
    ]
}

fn executor_with(runner: Arc<ScriptedRunner>, slots: Vec<ServiceSlot>) -> DeploymentExecutor {
    let settings = DeploySettings {
        pull_retry_delay: Duration::ZERO,
        ..Default::default()
    };
    let services = ServiceManager::new(
        runner.clone(),
        false,
        settings.restart_timeout,
        settings.status_timeout,
    );
    DeploymentExecutor::new(git_repo(runner.clone()), services, runner, INSTALL, slots, settings)
}

fn executor(runner: Arc<ScriptedRunner>) -> DeploymentExecutor {
    executor_with(runner, slots())
}

fn commit() -> CommitRef {
    CommitRef::parse("dddd0000ffff").unwrap()
}

fn step_names(run: &serverangel::models::deployment::DeploymentRun) -> Vec<StepName> {
    run.steps.iter().map(|s| s.name).collect()
}

#[test]
fn test_plan_includes_dependencies_only_when_manifest_changed() {
    assert_eq!(
        DeploymentExecutor::plan(false),
        vec![StepName::Pull, StepName::RestartServices, StepName::Verify]
    );
    assert_eq!(
        DeploymentExecutor::plan(true),
        vec![
            StepName::Pull,
            StepName::UpdateDependencies,
            StepName::RestartServices,
            StepName::Verify
        ]
    );
}

#[tokio::test]
async fn test_successful_deployment_without_dependency_changes() {
    let runner = Arc::new(healthy_runner("aaaa0000", &[], false));

    let run = executor(runner.clone()).run_deployment(commit(), false).await;

    assert!(run.success);
    assert!(run.error.is_none());
    assert!(run.is_finished());
    assert_eq!(
        step_names(&run),
        vec![StepName::Pull, StepName::RestartServices, StepName::Verify]
    );
    assert!(run.steps.iter().all(|s| s.status == StepStatus::Success));
    assert_eq!(runner.count("bash"), 0);
    assert_eq!(
        runner.calls(),
        vec![
            "git pull origin main",
            "systemctl restart gunicorn",
            "systemctl is-active gunicorn",
            "systemctl restart nginx",
            "systemctl is-active nginx",
            "systemctl is-active gunicorn",
            "systemctl is-active nginx",
        ]
    );
}

#[tokio::test]
async fn test_dependency_step_runs_installer() {
    let runner = Arc::new(
        healthy_runner("aaaa0000", &[], true)
            .on("bash -c", vec![Reply::ok("Successfully installed requests-2.32\n")]),
    );

    let run = executor(runner.clone()).run_deployment(commit(), true).await;

    assert!(run.success);
    let step = run.step(StepName::UpdateDependencies).unwrap();
    assert!(step.is_success());
    assert_eq!(
        step.detail,
        Some(StepDetail::Dependencies {
            output: "Successfully installed requests-2.32".to_string()
        })
    );
    assert_eq!(runner.calls()[1], format!("bash -c {}", INSTALL));
}

#[tokio::test]
async fn test_dependency_failure_halts_before_restart() {
    let runner = Arc::new(
        healthy_runner("aaaa0000", &[], true).on(
            "bash -c",
            vec![Reply::fail("ERROR: No matching distribution found for foo==9.9")],
        ),
    );

    let run = executor(runner.clone()).run_deployment(commit(), true).await;

    assert!(!run.success);
    assert_eq!(step_names(&run), vec![StepName::Pull, StepName::UpdateDependencies]);
    assert_eq!(run.failed_step().unwrap().name, StepName::UpdateDependencies);
    assert!(run
        .error
        .as_deref()
        .unwrap()
        .starts_with("Dependency update failed: ERROR: No matching distribution"));
    assert_eq!(runner.count("systemctl"), 0);
}

#[tokio::test]
async fn test_pull_retries_then_succeeds() {
    let runner = Arc::new(healthy_runner("aaaa0000", &[], false).on(
        "git pull",
        vec![Reply::fail("Connection reset"), Reply::ok("Fast-forward")],
    ));

    let run = executor(runner.clone()).run_deployment(commit(), false).await;

    assert!(run.success);
    assert_eq!(runner.count("git pull"), 2);
    assert!(matches!(
        run.step(StepName::Pull).unwrap().detail,
        Some(StepDetail::Pull { attempts: 2, .. })
    ));
}

#[tokio::test]
async fn test_pull_gives_up_after_three_attempts() {
    let runner = Arc::new(
        healthy_runner("aaaa0000", &[], false)
            .on("git pull", vec![Reply::fail("Could not resolve host")]),
    );

    let run = executor(runner.clone()).run_deployment(commit(), false).await;

    assert!(!run.success);
    assert_eq!(runner.count("git pull"), 3);
    assert_eq!(step_names(&run), vec![StepName::Pull]);
    let error = run.error.as_deref().unwrap();
    assert!(error.contains("after 3 attempts"), "{}", error);
    assert!(error.contains("Could not resolve host"), "{}", error);
    assert_eq!(run.steps[0].error.as_deref(), Some(error));
    assert_eq!(runner.count("systemctl"), 0);
}

#[tokio::test]
async fn test_pull_timeout_counts_as_attempt() {
    let runner = Arc::new(healthy_runner("aaaa0000", &[], false).on(
        "git pull",
        vec![Reply::Timeout, Reply::Timeout, Reply::ok("Fast-forward")],
    ));

    let run = executor(runner.clone()).run_deployment(commit(), false).await;

    assert!(run.success);
    assert_eq!(runner.count("git pull"), 3);
}

#[tokio::test]
async fn test_restart_attempts_every_service() {
    let runner = Arc::new(
        healthy_runner("aaaa0000", &[], false)
            .on("systemctl restart gunicorn", vec![Reply::fail("Unit gunicorn.service not found.")]),
    );

    let run = executor(runner.clone()).run_deployment(commit(), false).await;

    assert!(!run.success);
    assert_eq!(runner.count("systemctl restart nginx"), 1);
    assert_eq!(run.error.as_deref(), Some("Service restart failed for: gunicorn"));
    assert!(run.step(StepName::Verify).is_none());

    match &run.step(StepName::RestartServices).unwrap().detail {
        Some(StepDetail::Restart { services, failed_services }) => {
            assert_eq!(failed_services, &vec!["gunicorn".to_string()]);
            assert_eq!(services.len(), 2);
            assert!(!services[0].success);
            assert!(services[1].success);
        }
        other => panic!("unexpected detail: {:?}", other),
    }
}

#[tokio::test]
async fn test_restart_fails_when_service_does_not_come_up() {
    let runner = Arc::new(
        healthy_runner("aaaa0000", &[], false)
            .on("systemctl is-active nginx", vec![Reply::Exit(3, String::new())]),
    );

    let run = executor(runner).run_deployment(commit(), false).await;

    assert!(!run.success);
    assert_eq!(run.error.as_deref(), Some("Service restart failed for: nginx"));
}

#[tokio::test]
async fn test_verify_failure_names_inactive_services() {
    // Up right after restart, down by verification
    let runner = Arc::new(healthy_runner("aaaa0000", &[], false).on(
        "systemctl is-active nginx",
        vec![Reply::ok("active\n"), Reply::ok("failed\n")],
    ));

    let run = executor(runner).run_deployment(commit(), false).await;

    assert!(!run.success);
    let verify = run.step(StepName::Verify).unwrap();
    assert!(verify.is_failed());
    assert_eq!(
        run.error.as_deref(),
        Some("Deployment verification failed: inactive services: nginx")
    );
    match &verify.detail {
        Some(StepDetail::Verify { services }) => {
            assert_eq!(services[0].state, ServiceState::Running);
            assert_eq!(services[1].state, ServiceState::Failed);
        }
        other => panic!("unexpected detail: {:?}", other),
    }
}

#[tokio::test]
async fn test_unconfigured_slots_are_skipped() {
    let runner = Arc::new(healthy_runner("aaaa0000", &[], false));
    let slots = vec![
        ServiceSlot::new("application server", None),
        ServiceSlot::new("web server", Some("nginx".to_string())),
    ];

    let run = executor_with(runner.clone(), slots).run_deployment(commit(), false).await;

    assert!(run.success);
    assert_eq!(runner.count("systemctl restart"), 1);
    assert_eq!(runner.count("systemctl restart nginx"), 1);
}

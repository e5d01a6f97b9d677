//! Plain-text report rendering

use std::fmt::Write;

use chrono::Utc;

use crate::deploy::fsm::StepStatus;
use crate::models::deployment::{DeploymentRun, StepDetail};
use crate::models::service::ServiceState;
use crate::notify::{Report, ReportVariant};
use crate::telemetry::HealthSnapshot;
use crate::utils::{format_bytes, format_uptime, version_info};

const SUBJECT_PREFIX: &str = "[Server Angel]";

/// Subject and body of an email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub subject: String,
    pub body: String,
}

/// Render a report for the given host
pub fn render(report: &Report, host: &str) -> RenderedReport {
    let mut rendered = match report {
        Report::Health { variant, snapshot } => render_health(*variant, snapshot, host),
        Report::Deployment(run) => render_deployment(run, host),
        Report::ErrorAlert { context, message } => render_error(context, message, host),
    };

    let version = version_info();
    let _ = write!(
        rendered.body,
        "\n--\nServer Angel {} ({})\n",
        version.version, version.git_hash
    );
    rendered
}

fn variant_title(variant: ReportVariant) -> &'static str {
    match variant {
        ReportVariant::Morning => "Morning",
        ReportVariant::Evening => "Evening",
        ReportVariant::Daily => "Daily",
    }
}

fn render_health(variant: ReportVariant, snapshot: &HealthSnapshot, host: &str) -> RenderedReport {
    let degraded: Vec<&str> = snapshot
        .services
        .iter()
        .filter(|s| !matches!(s.state, ServiceState::Running | ServiceState::NotConfigured))
        .map(|s| s.service_name.as_str())
        .collect();
    let status = if degraded.is_empty() { "OK" } else { "ATTENTION" };

    let subject = format!(
        "{} {} Health Report - {} - {} [{}]",
        SUBJECT_PREFIX,
        variant_title(variant),
        host,
        snapshot.collected_at.format("%Y-%m-%d"),
        status
    );

    let system = &snapshot.system;
    let mut body = String::new();
    let _ = writeln!(body, "{} health report for {}", variant_title(variant), host);
    let _ = writeln!(body, "Collected at: {}", snapshot.collected_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(body);
    let _ = writeln!(body, "SYSTEM");
    let _ = writeln!(body, "  CPU usage:    {:.1}%", system.cpu_usage);
    let _ = writeln!(
        body,
        "  Memory usage: {:.1}% ({} / {})",
        system.memory_percent(),
        format_bytes(system.memory_used),
        format_bytes(system.memory_total)
    );
    let _ = writeln!(
        body,
        "  Disk usage:   {:.1}% ({} / {})",
        system.disk_percent(),
        format_bytes(system.disk_used),
        format_bytes(system.disk_total)
    );
    let _ = writeln!(body, "  Uptime:       {}", format_uptime(system.uptime_secs));
    let _ = writeln!(body);
    let _ = writeln!(body, "SERVICES");
    for service in &snapshot.services {
        let _ = write!(body, "  {:<16} {}", service.service_name, service.state);
        match &service.details {
            Some(details) if !details.is_empty() => {
                let _ = writeln!(body, " ({})", details);
            }
            _ => {
                let _ = writeln!(body);
            }
        }
    }
    if !degraded.is_empty() {
        let _ = writeln!(body);
        let _ = writeln!(body, "Needs attention: {}", degraded.join(", "));
    }

    RenderedReport { subject, body }
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "PENDING",
        StepStatus::Running => "RUNNING",
        StepStatus::Success => "SUCCESS",
        StepStatus::Failed => "FAILED",
    }
}

fn render_deployment(run: &DeploymentRun, host: &str) -> RenderedReport {
    let outcome = if run.success { "SUCCESS" } else { "FAILED" };
    let subject = format!(
        "{} Deployment {} - {} - {}",
        SUBJECT_PREFIX,
        outcome,
        host,
        run.commit.short()
    );

    let mut body = String::new();
    let _ = writeln!(body, "Deployment {} on {}", outcome, host);
    let _ = writeln!(body, "Commit:                {}", run.commit);
    let _ = writeln!(body, "Run ID:                {}", run.id);
    let _ = writeln!(body, "Dependencies changed:  {}", if run.dependency_manifest_changed { "yes" } else { "no" });
    let _ = writeln!(body, "Started:               {}", run.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(duration) = run.duration() {
        let _ = writeln!(body, "Duration:              {}s", duration.num_seconds());
    }
    let _ = writeln!(body);
    let _ = writeln!(body, "STEPS");

    for (i, step) in run.steps.iter().enumerate() {
        let _ = writeln!(body, "  {}. {} - {}", i + 1, step.name, status_label(step.status));
        if let Some(error) = &step.error {
            let _ = writeln!(body, "     Error: {}", error);
        }
        match &step.detail {
            Some(StepDetail::Pull { attempts, .. }) if *attempts > 1 => {
                let _ = writeln!(body, "     Succeeded on attempt {}", attempts);
            }
            Some(StepDetail::Restart { services, .. }) => {
                for service in services {
                    let mark = if service.success { "ok" } else { "FAILED" };
                    let _ = writeln!(body, "     {} {} ({})", service.service_name, mark, service.state);
                }
            }
            Some(StepDetail::Verify { services }) => {
                for service in services {
                    let _ = writeln!(body, "     {} {}", service.service_name, service.state);
                }
            }
            _ => {}
        }
    }

    if let Some(error) = &run.error {
        let _ = writeln!(body);
        let _ = writeln!(body, "ERROR: {}", error);
        let _ = writeln!(body, "No rollback was performed. The last deployed commit is unchanged.");
    }

    RenderedReport { subject, body }
}

fn render_error(context: &str, message: &str, host: &str) -> RenderedReport {
    let subject = format!("{} ERROR ALERT - {} - {}", SUBJECT_PREFIX, context, host);

    let mut body = String::new();
    let _ = writeln!(body, "An error occurred on {} during {}.", host, context);
    let _ = writeln!(body, "Time: {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(body);
    let _ = writeln!(body, "{}", message);

    RenderedReport { subject, body }
}

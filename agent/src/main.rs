//! Server Angel - Entry Point
//!
//! Runs a single health-check or git-watch cycle and exits. Scheduling is
//! left to cron or a systemd timer.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tracing::{error, info};

use serverangel::app::options::CliOptions;
use serverangel::app::run::Agent;
use serverangel::exec::runner::ProcessRunner;
use serverangel::logs::{init_logging, LogOptions};
use serverangel::notify::mailer::SmtpMailer;
use serverangel::storage::settings::Settings;
use serverangel::telemetry::host_name;
use serverangel::utils::version_info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let options = CliOptions::parse();

    // A missing .env file is fine
    dotenv::dotenv().ok();

    let settings = match Settings::load(options.config.as_deref()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: Some(settings.storage.log_dir.clone()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let version = version_info();
    info!("Server Angel {} ({})", version.version, version.git_hash);

    let config = match settings.validate() {
        Ok(config) => config,
        Err(issues) => {
            for issue in &issues {
                error!("Configuration error: {}", issue);
                eprintln!("{} {}", "✗".red(), issue);
            }
            return ExitCode::FAILURE;
        }
    };

    let mailer = match SmtpMailer::new(&config.email, host_name()) {
        Ok(mailer) => mailer,
        Err(e) => {
            error!("Configuration error: {}", e);
            eprintln!("{} {}", "✗".red(), e);
            return ExitCode::FAILURE;
        }
    };

    info!("Running {:?} for {}", options.mode, config.project_root.display());
    let agent = Agent::new(&config, Arc::new(ProcessRunner::new()), Arc::new(mailer));
    let outcome = agent.run(options.mode, options.report_type).await;
    info!("Cycle finished: {:?}", outcome);

    if options.fail_on_error && outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

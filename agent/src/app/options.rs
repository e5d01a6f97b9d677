//! Command line options

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::notify::ReportVariant;

/// Operation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Collect host health and email a report
    HealthCheck,

    /// Check the remote branch and deploy new commits
    GitWatch,
}

/// Server automation agent: health reports and unattended git pull deployments.
///
/// Runs one cycle and exits; an external scheduler decides when.
#[derive(Debug, Clone, Parser)]
#[command(name = "serverangel", version, about)]
pub struct CliOptions {
    /// Operation mode
    #[arg(long, value_enum)]
    pub mode: Mode,

    /// Health report variant (health-check mode)
    #[arg(long, value_enum, default_value_t = ReportVariant::Daily)]
    pub report_type: ReportVariant,

    /// JSON settings file; environment variables override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Exit non-zero when the cycle fails
    #[arg(long)]
    pub fail_on_error: bool,
}

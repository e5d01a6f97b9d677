//! Report delivery
//!
//! Every cycle ends by handing a [`Report`] to a [`Notifier`]. Delivery is
//! best effort: callers log a failed delivery and carry on.

pub mod mailer;
pub mod report;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::models::deployment::DeploymentRun;
use crate::telemetry::HealthSnapshot;

/// Health report variant, chosen by the scheduler entry that invoked us
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportVariant {
    Morning,
    Evening,
    #[default]
    Daily,
}

/// Kind of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    HealthReport,
    DeploymentReport,
    ErrorAlert,
}

/// Payload handed to a notifier
#[derive(Debug, Clone)]
pub enum Report {
    Health {
        variant: ReportVariant,
        snapshot: HealthSnapshot,
    },
    Deployment(DeploymentRun),
    ErrorAlert {
        /// Cycle that failed, e.g. `git_watch`
        context: String,
        message: String,
    },
}

impl Report {
    pub fn kind(&self) -> ReportKind {
        match self {
            Report::Health { .. } => ReportKind::HealthReport,
            Report::Deployment(_) => ReportKind::DeploymentReport,
            Report::ErrorAlert { .. } => ReportKind::ErrorAlert,
        }
    }

    pub fn error_alert(context: impl Into<String>, message: impl Into<String>) -> Self {
        Report::ErrorAlert {
            context: context.into(),
            message: message.into(),
        }
    }
}

/// Confirmation of a delivered report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub recipients: usize,
}

/// Delivers reports to operators
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, report: &Report) -> Result<DeliveryReceipt, AgentError>;
}

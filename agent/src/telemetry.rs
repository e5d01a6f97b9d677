//! Host health collection

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, System};

use crate::deploy::services::ServiceManager;
use crate::models::service::{ServiceCheckResult, ServiceSlot};
use crate::utils::percent;

/// System metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    /// CPU usage percentage (0-100)
    pub cpu_usage: f32,

    /// Memory usage in bytes
    pub memory_used: u64,

    /// Total memory in bytes
    pub memory_total: u64,

    /// Disk usage in bytes
    pub disk_used: u64,

    /// Total disk space in bytes
    pub disk_total: u64,

    /// System uptime in seconds
    pub uptime_secs: u64,

    /// Hostname
    pub hostname: String,
}

impl SystemMetrics {
    pub fn memory_percent(&self) -> f32 {
        percent(self.memory_used, self.memory_total)
    }

    pub fn disk_percent(&self) -> f32 {
        percent(self.disk_used, self.disk_total)
    }
}

/// Point-in-time host health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub collected_at: DateTime<Utc>,
    pub system: SystemMetrics,
    pub services: Vec<ServiceCheckResult>,
}

/// Collect system metrics, sampling CPU usage over `cpu_sample`
pub async fn collect_metrics(cpu_sample: Duration) -> SystemMetrics {
    let mut sys = System::new();
    sys.refresh_cpu_usage();
    tokio::time::sleep(cpu_sample.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let disks = Disks::new_with_refreshed_list();
    let root = disks.iter().find(|d| d.mount_point() == Path::new("/"));

    // Prefer the root filesystem; fall back to the sum of all disks
    let (disk_used, disk_total) = match root {
        Some(disk) => (
            disk.total_space().saturating_sub(disk.available_space()),
            disk.total_space(),
        ),
        None => disks.iter().fold((0u64, 0u64), |(used, total), disk| {
            (
                used + disk.total_space().saturating_sub(disk.available_space()),
                total + disk.total_space(),
            )
        }),
    };

    SystemMetrics {
        cpu_usage: sys.global_cpu_usage(),
        memory_used: sys.used_memory(),
        memory_total: sys.total_memory(),
        disk_used,
        disk_total,
        uptime_secs: System::uptime(),
        hostname: host_name(),
    }
}

/// Host name, or `unknown`
pub fn host_name() -> String {
    System::host_name().unwrap_or_else(|| "unknown".to_string())
}

/// Produces health snapshots for the health report
pub struct HealthCollector {
    services: ServiceManager,
    monitored: Vec<ServiceSlot>,
    cpu_sample: Duration,
}

impl HealthCollector {
    pub fn new(services: ServiceManager, monitored: Vec<ServiceSlot>) -> Self {
        Self {
            services,
            monitored,
            cpu_sample: Duration::from_secs(1),
        }
    }

    /// Override the CPU sampling interval
    pub fn with_cpu_sample(mut self, cpu_sample: Duration) -> Self {
        self.cpu_sample = cpu_sample;
        self
    }

    /// Collect system metrics and the state of every monitored service
    pub async fn collect(&self) -> HealthSnapshot {
        let system = collect_metrics(self.cpu_sample).await;

        let mut services = Vec::with_capacity(self.monitored.len());
        for slot in &self.monitored {
            let result = match slot.name.as_deref() {
                Some(name) => self.services.status(name).await,
                None => ServiceCheckResult::not_configured(slot),
            };
            services.push(result);
        }

        HealthSnapshot {
            collected_at: Utc::now(),
            system,
            services,
        }
    }
}

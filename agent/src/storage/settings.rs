//! Settings loading and validation
//!
//! Settings come from an optional JSON file, then environment variables
//! (a `.env` file is loaded into the environment by the binary first).
//! [`Settings::validate`] turns them into an immutable [`AgentConfig`] or
//! reports every problem at once.

use std::fmt;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploySettings;
use crate::errors::AgentError;
use crate::filesys::file::File;
use crate::logs::LogLevel;
use crate::models::service::ServiceSlot;
use crate::storage::layout::{default_log_dir, default_state_dir, StorageLayout};
use crate::utils::shell_quote;

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Deployed project
    #[serde(default)]
    pub project: ProjectSettings,

    /// Watched remote branch
    #[serde(default)]
    pub git: GitSettings,

    /// Managed services
    #[serde(default)]
    pub services: ServiceSettings,

    /// Email delivery
    #[serde(default)]
    pub email: EmailSettings,

    /// State and log locations
    #[serde(default)]
    pub storage: StorageSettings,

    /// Problems found while applying environment overrides
    #[serde(skip)]
    env_issues: Vec<ConfigIssue>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            project: ProjectSettings::default(),
            git: GitSettings::default(),
            services: ServiceSettings::default(),
            email: EmailSettings::default(),
            storage: StorageSettings::default(),
            env_issues: Vec::new(),
        }
    }
}

/// Project settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Root of the git working tree that is deployed
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Virtual environment the dependency installer runs in
    #[serde(default)]
    pub venv_path: Option<PathBuf>,

    /// Dependency manifest, relative to the project root
    #[serde(default = "default_manifest")]
    pub dependency_manifest: String,

    /// Shell command replacing the default virtualenv installer
    #[serde(default)]
    pub install_command: Option<String>,
}

fn default_manifest() -> String {
    "requirements.txt".to_string()
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            root: None,
            venv_path: None,
            dependency_manifest: default_manifest(),
            install_command: None,
        }
    }
}

/// Git settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            branch: default_branch(),
        }
    }
}

/// Service unit names. `None` leaves the slot unconfigured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    #[serde(default = "default_web_server")]
    pub web_server: Option<String>,

    #[serde(default = "default_app_server")]
    pub app_server: Option<String>,

    #[serde(default = "default_cache")]
    pub cache: Option<String>,

    #[serde(default = "default_worker")]
    pub worker: Option<String>,

    /// Prefix restarts with `sudo`
    #[serde(default = "default_true")]
    pub use_sudo: bool,
}

fn default_web_server() -> Option<String> {
    Some("nginx".to_string())
}

fn default_app_server() -> Option<String> {
    Some("gunicorn".to_string())
}

fn default_cache() -> Option<String> {
    Some("redis".to_string())
}

fn default_worker() -> Option<String> {
    Some("celery".to_string())
}

fn default_true() -> bool {
    true
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            web_server: default_web_server(),
            app_server: default_app_server(),
            cache: default_cache(),
            worker: default_worker(),
            use_sudo: true,
        }
    }
}

/// Email settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSettings {
    #[serde(default)]
    pub smtp_host: Option<String>,

    /// 465 uses implicit TLS, anything else STARTTLS
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_user: Option<String>,

    #[serde(default, skip_serializing)]
    pub smtp_password: Option<SecretString>,

    #[serde(default = "default_from")]
    pub from: String,

    #[serde(default)]
    pub recipients: Vec<String>,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from() -> String {
    "server-angel@localhost".to_string()
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_user: None,
            smtp_password: None,
            from: default_from(),
            recipients: Vec::new(),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            log_dir: default_log_dir(),
        }
    }
}

/// A single configuration problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssue {
    /// Required value not set
    Missing(&'static str),

    /// Value set but unusable
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigIssue::Missing(field) => write!(f, "{} is not set", field),
            ConfigIssue::Invalid { field, reason } => write!(f, "{} is invalid: {}", field, reason),
        }
    }
}

/// Validated email configuration
#[derive(Debug)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: SecretString,
    pub from: String,
    pub recipients: Vec<String>,
}

/// Validated service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Restarted and verified during a deployment, in order
    pub deploy: Vec<ServiceSlot>,

    /// Reported in health checks
    pub monitored: Vec<ServiceSlot>,

    pub use_sudo: bool,
}

/// Validated agent configuration, built once at startup
#[derive(Debug)]
pub struct AgentConfig {
    pub log_level: LogLevel,
    pub project_root: PathBuf,
    pub dependency_manifest: String,

    /// Shell command run by the dependency step
    pub install_command: String,

    pub git_remote: String,
    pub git_branch: String,
    pub services: ServiceConfig,
    pub email: EmailConfig,
    pub layout: StorageLayout,
    pub deploy: DeploySettings,
}

impl Settings {
    /// Load settings from an optional JSON file, then apply environment
    /// overrides
    pub async fn load(config_file: Option<&Path>) -> Result<Settings, AgentError> {
        let mut settings = match config_file {
            Some(path) => File::new(path).read_json::<Settings>().await.map_err(|e| {
                AgentError::ConfigError(format!(
                    "Unable to read settings file {}: {}",
                    path.display(),
                    e
                ))
            })?,
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Override fields from environment-style variables.
    ///
    /// An empty service name clears that slot.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(level) = non_empty("LOG_LEVEL") {
            match level.parse() {
                Ok(level) => self.log_level = level,
                Err(reason) => self.env_issues.push(ConfigIssue::Invalid {
                    field: "LOG_LEVEL",
                    reason,
                }),
            }
        }

        if let Some(root) = non_empty("PROJECT_ROOT") {
            self.project.root = Some(PathBuf::from(root));
        }
        if let Some(venv) = non_empty("VENV_PATH") {
            self.project.venv_path = Some(PathBuf::from(venv));
        }
        if let Some(manifest) = non_empty("DEPENDENCY_MANIFEST") {
            self.project.dependency_manifest = manifest;
        }
        if let Some(command) = non_empty("INSTALL_COMMAND") {
            self.project.install_command = Some(command);
        }

        if let Some(remote) = non_empty("GIT_REMOTE") {
            self.git.remote = remote;
        }
        if let Some(branch) = non_empty("GIT_BRANCH") {
            self.git.branch = branch;
        }

        let slot = |key: &str, current: &mut Option<String>| {
            if let Some(value) = lookup(key) {
                let value = value.trim();
                *current = (!value.is_empty()).then(|| value.to_string());
            }
        };
        slot("NGINX_SERVICE", &mut self.services.web_server);
        slot("GUNICORN_SERVICE", &mut self.services.app_server);
        slot("REDIS_SERVICE", &mut self.services.cache);
        slot("CELERY_SERVICE", &mut self.services.worker);

        if let Some(value) = non_empty("SERVICE_USE_SUDO") {
            match parse_bool(&value) {
                Some(flag) => self.services.use_sudo = flag,
                None => self.env_issues.push(ConfigIssue::Invalid {
                    field: "SERVICE_USE_SUDO",
                    reason: format!("expected true or false, got {:?}", value),
                }),
            }
        }

        if let Some(host) = non_empty("SMTP_HOST") {
            self.email.smtp_host = Some(host);
        }
        if let Some(port) = non_empty("SMTP_PORT") {
            match port.parse() {
                Ok(port) => self.email.smtp_port = port,
                Err(e) => self.env_issues.push(ConfigIssue::Invalid {
                    field: "SMTP_PORT",
                    reason: format!("{:?}: {}", port, e),
                }),
            }
        }
        if let Some(user) = non_empty("SMTP_USER") {
            self.email.smtp_user = Some(user);
        }
        if let Some(password) = lookup("SMTP_PASSWORD").filter(|v| !v.is_empty()) {
            self.email.smtp_password = Some(SecretString::from(password));
        }
        if let Some(from) = non_empty("EMAIL_FROM") {
            self.email.from = from;
        }
        if let Some(recipients) = non_empty("EMAIL_RECIPIENTS") {
            self.email.recipients = recipients
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(dir) = non_empty("STATE_DIR") {
            self.storage.state_dir = PathBuf::from(dir);
        }
        if let Some(dir) = non_empty("LOG_DIR") {
            self.storage.log_dir = PathBuf::from(dir);
        }
    }

    /// Check every required value and build the agent configuration
    pub fn validate(&self) -> Result<AgentConfig, Vec<ConfigIssue>> {
        let mut issues = self.env_issues.clone();

        let project_root = require(&self.project.root, "PROJECT_ROOT", &mut issues);

        let install_command = match (&self.project.install_command, &self.project.venv_path) {
            (Some(command), _) => Some(command.clone()),
            (None, Some(venv)) => Some(format!(
                "source {} && pip install -r {}",
                shell_quote(&venv.join("bin").join("activate").to_string_lossy()),
                shell_quote(&self.project.dependency_manifest)
            )),
            (None, None) => {
                issues.push(ConfigIssue::Missing("VENV_PATH"));
                None
            }
        };

        if self.project.dependency_manifest.trim().is_empty() {
            issues.push(ConfigIssue::Missing("DEPENDENCY_MANIFEST"));
        }
        if self.git.remote.trim().is_empty() {
            issues.push(ConfigIssue::Missing("GIT_REMOTE"));
        }
        if self.git.branch.trim().is_empty() {
            issues.push(ConfigIssue::Missing("GIT_BRANCH"));
        }

        let smtp_host = require(&self.email.smtp_host, "SMTP_HOST", &mut issues);
        let smtp_user = require(&self.email.smtp_user, "SMTP_USER", &mut issues);
        let smtp_password = require(&self.email.smtp_password, "SMTP_PASSWORD", &mut issues);
        if self.email.smtp_port == 0 {
            issues.push(ConfigIssue::Invalid {
                field: "SMTP_PORT",
                reason: "port 0".to_string(),
            });
        }
        if self.email.recipients.is_empty() {
            issues.push(ConfigIssue::Missing("EMAIL_RECIPIENTS"));
        }
        if self.email.from.trim().is_empty() {
            issues.push(ConfigIssue::Missing("EMAIL_FROM"));
        }

        match (project_root, install_command, smtp_host, smtp_user, smtp_password) {
            (Some(project_root), Some(install_command), Some(smtp_host), Some(smtp_user), Some(smtp_password))
                if issues.is_empty() =>
            {
                Ok(AgentConfig {
                    log_level: self.log_level.clone(),
                    project_root,
                    dependency_manifest: self.project.dependency_manifest.clone(),
                    install_command,
                    git_remote: self.git.remote.clone(),
                    git_branch: self.git.branch.clone(),
                    services: self.service_config(),
                    email: EmailConfig {
                        smtp_host,
                        smtp_port: self.email.smtp_port,
                        smtp_user,
                        smtp_password,
                        from: self.email.from.clone(),
                        recipients: self.email.recipients.clone(),
                    },
                    layout: StorageLayout::new(
                        self.storage.state_dir.clone(),
                        self.storage.log_dir.clone(),
                    ),
                    deploy: DeploySettings::default(),
                })
            }
            _ => Err(issues),
        }
    }

    fn service_config(&self) -> ServiceConfig {
        let web = ServiceSlot::new("web server", self.services.web_server.clone());
        let app = ServiceSlot::new("application server", self.services.app_server.clone());
        let cache = ServiceSlot::new("cache", self.services.cache.clone());
        let worker = ServiceSlot::new("worker", self.services.worker.clone());

        ServiceConfig {
            deploy: vec![app.clone(), web.clone()],
            monitored: vec![web, app, cache, worker],
            use_sudo: self.services.use_sudo,
        }
    }
}

fn require<T: Clone>(value: &Option<T>, field: &'static str, issues: &mut Vec<ConfigIssue>) -> Option<T> {
    if value.is_none() {
        issues.push(ConfigIssue::Missing(field));
    }
    value.clone()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

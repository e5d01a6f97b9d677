//! External command execution with timeouts

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::AgentError;

/// A single external process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute (looked up on `PATH`)
    pub program: String,

    /// Arguments passed verbatim
    pub args: Vec<String>,

    /// Working directory, inherited when unset
    pub working_dir: Option<PathBuf>,

    /// Wall-clock budget before the process is killed
    pub timeout: Duration,
}

impl CommandSpec {
    /// Create a new command with the given time budget
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run inside the given directory
    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// The command line as a single string, for logs and errors
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Whether the process exited with status 0
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Convert a non-zero exit into a [`AgentError::ToolError`]
    pub fn check(self, spec: &CommandSpec) -> Result<CommandOutput, AgentError> {
        if self.success() {
            return Ok(self);
        }

        let stderr = self.stderr.trim();
        let detail = match self.exit_code {
            Some(code) if stderr.is_empty() => format!("exit code {}", code),
            Some(code) => format!("exit code {}: {}", code, stderr),
            None if stderr.is_empty() => "terminated by signal".to_string(),
            None => format!("terminated by signal: {}", stderr),
        };
        Err(AgentError::ToolError {
            command: spec.display(),
            detail,
        })
    }
}

/// Executes external processes.
///
/// Every process the agent starts goes through an implementation of this
/// trait. Implementations never retry; a timeout surfaces as
/// [`AgentError::TimeoutError`] and a non-zero exit is returned as data.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, AgentError>;
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, AgentError> {
        debug!("Running `{}` (timeout {:?})", spec.display(), spec.timeout);

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| AgentError::ToolError {
            command: spec.display(),
            detail: format!("failed to spawn: {}", e),
        })?;

        // Dropping the wait future on expiry drops the child, which kills it.
        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(CommandOutput {
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
            Ok(Err(e)) => Err(AgentError::ToolError {
                command: spec.display(),
                detail: format!("failed to collect output: {}", e),
            }),
            Err(_) => {
                warn!("`{}` exceeded {:?}, killed", spec.display(), spec.timeout);
                Err(AgentError::TimeoutError {
                    command: spec.display(),
                    timeout: spec.timeout,
                })
            }
        }
    }
}

//! Host tool execution
//!
//! Every host tool (lsblk, findmnt, mkfs, mount, umount) goes through the
//! [`CommandRunner`] trait so lifecycle logic can run against a fake.

use std::fmt;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::{DriverError, Result};

/// Captured result of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the command exited with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// stdout followed by stderr, as a shell would interleave them
    pub fn combined(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end()),
            (false, true) => self.stdout.trim_end().to_string(),
            (true, _) => self.stderr.trim_end().to_string(),
        }
    }

    fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit status: {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// A program invocation, kept as data so fakes can match on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HostCommand {
    /// Build an invocation of `program` with `args`
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runs host tools.
///
/// Implementations return `Ok` for any command that ran to completion,
/// whatever its exit code; only a failure to spawn is an `Err`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &HostCommand) -> Result<CommandOutput>;

    /// Run and turn a non-zero exit into [`DriverError::Command`]
    async fn run_checked(&self, command: &HostCommand) -> Result<CommandOutput> {
        let output = self.run(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(DriverError::Command {
                command: command.to_string(),
                status: output.status_text(),
                output: output.combined(),
            })
        }
    }
}

/// Runs commands on the host through `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct HostCommandRunner;

#[async_trait]
impl CommandRunner for HostCommandRunner {
    async fn run(&self, command: &HostCommand) -> Result<CommandOutput> {
        debug!("Running {}", command);

        let output = Command::new(&command.program)
            .args(&command.args)
            .output()
            .await
            .map_err(|e| DriverError::Command {
                command: command.to_string(),
                status: "failed to start".to_string(),
                output: e.to_string(),
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        trace!(code = ?result.code, stdout = %result.stdout, stderr = %result.stderr, "{} finished", command.program);

        Ok(result)
    }
}

//! Host command execution.
//!
//! Mounting and unmounting go through the host's `mount` and `umount`
//! utilities via an [`Executor`]. The session only sees success or failure.

use std::fmt;
use std::process::Stdio;

use armount_common::{ArmountError, ArmountResult};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A program invocation on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostCommand {
    program: String,
    args: Vec<String>,
}

impl HostCommand {
    /// Create a command with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, excluding the program.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Runs host commands on behalf of a mount session.
///
/// Any error is treated as failure of the operation. Implementations must
/// return [`ArmountError::Cancelled`] when `cancel` fires before the command
/// completes.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `command` to completion.
    async fn run(&self, command: &HostCommand, cancel: &CancellationToken) -> ArmountResult<()>;
}

/// Executor that spawns real host processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellExecutor;

#[async_trait]
impl Executor for ShellExecutor {
    async fn run(&self, command: &HostCommand, cancel: &CancellationToken) -> ArmountResult<()> {
        tracing::debug!(command = %command, "Running host command");

        if cancel.is_cancelled() {
            return Err(ArmountError::Cancelled {
                command: command.to_string(),
            });
        }

        let child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ArmountError::CommandFailed {
                command: command.to_string(),
                status: format!("failed to spawn: {e}"),
            })?;

        // Dropping the pending wait kills the child.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            () = cancel.cancelled() => {
                tracing::warn!(command = %command, "Host command cancelled");
                return Err(ArmountError::Cancelled {
                    command: command.to_string(),
                });
            }
        };

        if output.status.success() {
            tracing::debug!(command = %command, "Host command succeeded");
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let status = if stderr.is_empty() {
            output.status.to_string()
        } else {
            format!("{}: {stderr}", output.status)
        };
        Err(ArmountError::CommandFailed {
            command: command.to_string(),
            status,
        })
    }
}

//! Build actions run before browsers are told to reload.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

/// A shell command executed when a watched path changes.
///
/// The command line goes through the platform shell (`sh -c` on Unix,
/// `cmd /C` on Windows), so pipes and redirections work as typed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellAction {
    command: String,
    cwd: Option<PathBuf>,
}

/// Why a build action did not succeed.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ActionError {
    #[error("failed to spawn: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
}

impl ShellAction {
    /// Create an action running `command` in the current directory.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
        }
    }

    /// Run the command in `cwd` instead.
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// The command line.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the command to completion.
    ///
    /// Stdout is logged; stderr is returned in the error on failure.
    pub(crate) async fn run(&self) -> Result<(), ActionError> {
        let mut cmd = shell_command(&self.command);
        if let Some(cwd) = &self.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        let output = cmd.output().await.map_err(ActionError::Spawn)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::info!(command = %self.command, output = %stdout.trim_end(), "Build action output");
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(ActionError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_owned(),
            })
        }
    }
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

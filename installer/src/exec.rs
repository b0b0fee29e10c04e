//! External command execution for privileged filesystem changes.
//!
//! Writing under system binary directories usually needs elevated rights.
//! Rather than escalating itself, the installer hands such operations to a
//! [`CommandExecutor`], relays the command's output to the diagnostics sink,
//! and treats a non-zero exit as fatal for the current stage.

use crate::output::write_stderr_line;
use std::io::Write;
use std::process::{Command, ExitStatus, Output};
use thiserror::Error;

/// Program used to elevate privileged commands.
const SUDO: &str = "sudo";

/// Abstraction for running external commands.
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O errors encountered while spawning or running the command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cish_installer::exec::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let executor = SystemCommandExecutor;
    /// let output = executor.run("chmod", &["0755", "/bin/cish"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), std::io::Error>(())
    /// ```
    fn run(&self, cmd: &str, args: &[&str]) -> std::io::Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> std::io::Result<Output> {
        Command::new(cmd).args(args).output()
    }
}

/// How filesystem changes at the destination are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Privilege {
    /// Use the process's own filesystem rights.
    #[default]
    Direct,
    /// Run each change through `sudo` via a [`CommandExecutor`].
    Sudo,
}

impl Privilege {
    /// Map the `--sudo` flag to a privilege mode.
    #[must_use]
    pub const fn from_sudo_flag(sudo: bool) -> Self {
        if sudo { Self::Sudo } else { Self::Direct }
    }
}

/// Failure of an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command could not be started.
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// The rendered command line.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The command ran but exited unsuccessfully.
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        /// The rendered command line.
        command: String,
        /// The exit status reported by the process.
        status: ExitStatus,
        /// Trimmed standard error output.
        stderr: String,
    },
}

/// Run `program args` through `sudo`, relaying its output to `sink`.
///
/// Standard output and standard error are written to the sink line by line
/// after the command finishes.
///
/// # Errors
///
/// Returns [`CommandError::Spawn`] if the command cannot be started and
/// [`CommandError::Failed`] if it exits with a non-zero status.
///
/// # Examples
///
/// ```no_run
/// use cish_installer::exec::{SystemCommandExecutor, run_privileged};
///
/// let mut stderr = std::io::stderr();
/// run_privileged(&SystemCommandExecutor, "rm", &["-f", "/bin/cish"], &mut stderr)?;
/// # Ok::<(), cish_installer::exec::CommandError>(())
/// ```
pub fn run_privileged(
    executor: &dyn CommandExecutor,
    program: &str,
    args: &[&str],
    sink: &mut dyn Write,
) -> Result<(), CommandError> {
    let mut sudo_args = Vec::with_capacity(args.len() + 1);
    sudo_args.push(program);
    sudo_args.extend_from_slice(args);
    run_checked(executor, SUDO, &sudo_args, sink)
}

/// Run `cmd args`, relay its output to `sink`, and fail on non-zero exit.
///
/// # Errors
///
/// Returns [`CommandError::Spawn`] if the command cannot be started and
/// [`CommandError::Failed`] if it exits with a non-zero status.
pub fn run_checked(
    executor: &dyn CommandExecutor,
    cmd: &str,
    args: &[&str],
    sink: &mut dyn Write,
) -> Result<(), CommandError> {
    let command = render_command(cmd, args);
    log::debug!("running `{command}`");

    let output = executor
        .run(cmd, args)
        .map_err(|source| CommandError::Spawn {
            command: command.clone(),
            source,
        })?;

    relay_lines(&output.stdout, sink);
    relay_lines(&output.stderr, sink);

    if !output.status.success() {
        return Err(CommandError::Failed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(())
}

fn render_command(cmd: &str, args: &[&str]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

fn relay_lines(bytes: &[u8], sink: &mut dyn Write) {
    let text = String::from_utf8_lossy(bytes);
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        write_stderr_line(sink, line);
    }
}

//! CLI argument definitions for the cish installer.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration. The version, destination, and launcher toggle also read the
//! `INPUT_*` variables a CI action runner sets for declared inputs.

use crate::config::{
    DEFAULT_ARTIFACT_NAME, DEFAULT_ARTIFACT_PATH, DEFAULT_BACKOFF_MILLIS, DEFAULT_DESTINATION,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RELEASE_URL, DEFAULT_RUNTIME, DEFAULT_RUNTIME_ARG,
    DEFAULT_TIMEOUT_SECS,
};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Install the cish executable from a published release.
#[derive(Parser, Debug)]
#[command(name = "cish-installer")]
#[command(about)]
#[command(long_about = concat!(
    "Install the cish executable from a published release.\n\n",
    "The release asset is downloaded, staged on disk, and moved into place ",
    "atomically, so an interrupted run never leaves a truncated executable at ",
    "the destination. Transient network failures are retried; any other ",
    "failure aborts the run and names the stage that failed.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install a release to /bin/cish:\n",
    "    $ cish-installer install --version v0.3.0 --sudo\n\n",
    "  Install behind a launcher that pins the Java runtime:\n",
    "    $ cish-installer install --version v0.3.0 --launcher --runtime /usr/bin/java\n\n",
    "  Remove a previous installation:\n",
    "    $ cish-installer uninstall --sudo",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download and install a release.
    Install(InstallArgs),

    /// Remove an installed executable and its launcher target.
    Uninstall(UninstallArgs),
}

/// Arguments for the install command.
#[derive(Parser, Debug, Clone)]
pub struct InstallArgs {
    /// Release tag to install (e.g. v0.3.0).
    #[arg(long, env = "INPUT_VERSION", value_name = "TAG")]
    pub version: String,

    /// Public path of the installed executable.
    #[arg(long, env = "INPUT_DESTINATION", value_name = "PATH", default_value = DEFAULT_DESTINATION)]
    pub destination: Utf8PathBuf,

    /// Download URL template; `{version}` and `{artifact}` are substituted.
    #[arg(long, value_name = "TEMPLATE", default_value = DEFAULT_RELEASE_URL)]
    pub release_url: String,

    /// Name of the release asset.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_ARTIFACT_NAME)]
    pub artifact_name: String,

    /// Install a launcher script at the destination that invokes the runtime explicitly.
    #[arg(long, env = "INPUT_LAUNCHER")]
    pub launcher: bool,

    /// Runtime executable named by the launcher.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_RUNTIME)]
    pub runtime: Utf8PathBuf,

    /// Argument passed to the runtime before the artifact path (repeatable).
    #[arg(
        long = "runtime-arg",
        value_name = "ARG",
        default_value = DEFAULT_RUNTIME_ARG,
        allow_hyphen_values = true
    )]
    pub runtime_args: Vec<String>,

    /// Where the real artifact is installed when a launcher is used.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ARTIFACT_PATH)]
    pub artifact_path: Utf8PathBuf,

    /// Directory for the staging file [default: next to the destination].
    #[arg(long, value_name = "DIR")]
    pub staging_dir: Option<Utf8PathBuf>,

    /// Apply filesystem changes through sudo.
    #[arg(long)]
    pub sudo: bool,

    /// Maximum number of download attempts.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub retries: u32,

    /// Pause between download attempts, in milliseconds.
    #[arg(long, value_name = "MS", default_value_t = DEFAULT_BACKOFF_MILLIS)]
    pub retry_backoff_ms: u64,

    /// Timeout for each HTTP request, in seconds.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,

    /// Suppress progress output (errors still shown).
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the uninstall command.
#[derive(Parser, Debug, Clone)]
pub struct UninstallArgs {
    /// Public path of the installed executable.
    #[arg(long, env = "INPUT_DESTINATION", value_name = "PATH", default_value = DEFAULT_DESTINATION)]
    pub destination: Utf8PathBuf,

    /// Real artifact installed behind a launcher, removed as well.
    #[arg(long, value_name = "PATH")]
    pub artifact_path: Option<Utf8PathBuf>,

    /// Remove files through sudo.
    #[arg(long)]
    pub sudo: bool,

    /// Suppress progress output (errors still shown).
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;

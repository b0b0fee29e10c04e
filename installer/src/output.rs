//! Output formatting for the installer CLI.
//!
//! All user-facing text goes to the diagnostics sink, which is standard error
//! for the binary and an in-memory buffer in tests.

use crate::config::Version;
use crate::facade::InstallOutcome;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt::Display;
use std::io::Write;

/// Write one line to the diagnostics sink, ignoring write failures.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

/// Format a success message after installation.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use cish_installer::config::Version;
/// use cish_installer::output::success_message;
///
/// let version = Version::new("v0.3.0")?;
/// assert_eq!(
///     success_message(&version, Utf8Path::new("/bin/cish")),
///     "Installed cish v0.3.0 to /bin/cish"
/// );
/// # Ok::<(), cish_installer::error::InstallerError>(())
/// ```
#[must_use]
pub fn success_message(version: &Version, destination: &Utf8Path) -> String {
    format!("Installed cish {version} to {destination}")
}

/// Report a completed install on `stderr`.
pub fn report_install(outcome: &InstallOutcome, stderr: &mut dyn Write) {
    write_stderr_line(
        stderr,
        success_message(outcome.version(), outcome.entry_point()),
    );
    if let Some(launcher) = outcome.launcher() {
        write_stderr_line(
            stderr,
            format!(
                "  launcher at {} runs {}",
                launcher.path(),
                outcome.artifact().path()
            ),
        );
    }
}

/// Format the message printed after an uninstall.
#[must_use]
pub fn removal_message(removed: &[Utf8PathBuf]) -> String {
    if removed.is_empty() {
        return "Nothing to remove".to_owned();
    }
    let paths: Vec<&str> = removed.iter().map(|path| path.as_str()).collect();
    format!("Removed {}", paths.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_stderr_line_appends_newline() {
        let mut sink = Vec::new();
        write_stderr_line(&mut sink, "hello");
        assert_eq!(sink, b"hello\n");
    }

    #[test]
    fn removal_message_lists_paths() {
        let msg = removal_message(&[
            Utf8PathBuf::from("/bin/cish"),
            Utf8PathBuf::from("/usr/local/lib/cish/cish.jar"),
        ]);
        assert_eq!(msg, "Removed /bin/cish, /usr/local/lib/cish/cish.jar");
    }

    #[test]
    fn removal_message_handles_nothing_removed() {
        assert_eq!(removal_message(&[]), "Nothing to remove");
    }
}

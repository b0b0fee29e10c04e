//! Error types for the cish installer.
//!
//! Every pipeline stage has its own error type; this module wraps them into
//! [`InstallerError`], whose variants name the stage that failed so the
//! invoking CI step can report it verbatim.

use crate::exec::CommandError;
use crate::placement::PlacementError;
use crate::staging::StagingError;
use crate::status::StatusError;
use crate::transport::TransportError;
use camino::Utf8PathBuf;
use std::fmt;
use thiserror::Error;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Input validation before any I/O.
    Request,
    /// Network retrieval.
    Transport,
    /// HTTP status classification.
    Status,
    /// Writing the response body to the staging file.
    Staging,
    /// Moving the staged file into place and marking it executable.
    Placement,
    /// Writing or installing the launcher script.
    Wrap,
    /// Removing a previous installation.
    Uninstall,
}

impl Stage {
    /// Returns the lower-case stage name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Transport => "transport",
            Self::Status => "status",
            Self::Staging => "staging",
            Self::Placement => "placement",
            Self::Wrap => "wrap",
            Self::Uninstall => "uninstall",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure while producing or installing the launcher script.
#[derive(Debug, Error)]
pub enum WrapError {
    /// The script could not be written to its staging file.
    #[error(transparent)]
    Staging(#[from] StagingError),

    /// The staged script could not be placed at the public path.
    #[error(transparent)]
    Placement(#[from] PlacementError),
}

/// Errors that can occur while installing or removing cish.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The install request was rejected before any I/O happened.
    #[error("request stage failed: {reason}")]
    InvalidRequest {
        /// Description of the invalid input.
        reason: String,
    },

    /// The release could not be retrieved.
    #[error("transport stage failed: {0}")]
    Transport(#[from] TransportError),

    /// The release store answered with a non-success status.
    #[error("status stage failed: {0}")]
    Status(#[from] StatusError),

    /// The response body could not be written to the staging file.
    #[error("staging stage failed: {0}")]
    Staging(#[from] StagingError),

    /// The staged artifact could not be moved into place.
    #[error("placement stage failed: {0}")]
    Placement(#[from] PlacementError),

    /// The launcher script could not be written or installed.
    #[error("wrap stage failed for {path}: {source}")]
    Wrap {
        /// Public path the launcher was meant to occupy.
        path: Utf8PathBuf,
        /// The underlying failure.
        #[source]
        source: WrapError,
    },

    /// A previous installation could not be removed.
    #[error("uninstall stage failed for {path}: {source}")]
    Uninstall {
        /// Path that could not be removed.
        path: Utf8PathBuf,
        /// The underlying failure.
        #[source]
        source: UninstallError,
    },
}

/// Failure while removing an installed file.
#[derive(Debug, Error)]
pub enum UninstallError {
    /// Direct removal failed.
    #[error("failed to remove file: {0}")]
    Io(#[from] std::io::Error),

    /// The privileged removal command failed.
    #[error(transparent)]
    Command(#[from] CommandError),
}

impl InstallerError {
    /// Returns the pipeline stage this error belongs to.
    ///
    /// # Examples
    ///
    /// ```
    /// use cish_installer::error::{InstallerError, Stage};
    /// use cish_installer::status::StatusError;
    ///
    /// let err = InstallerError::from(StatusError { code: 404 });
    /// assert_eq!(err.stage(), Stage::Status);
    /// assert!(err.to_string().starts_with("status stage failed"));
    /// ```
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::InvalidRequest { .. } => Stage::Request,
            Self::Transport(_) => Stage::Transport,
            Self::Status(_) => Stage::Status,
            Self::Staging(_) => Stage::Staging,
            Self::Placement(_) => Stage::Placement,
            Self::Wrap { .. } => Stage::Wrap,
            Self::Uninstall { .. } => Stage::Uninstall,
        }
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn status_error_names_stage_and_code() {
        let err = InstallerError::from(StatusError { code: 404 });
        let msg = err.to_string();
        assert!(msg.contains("status stage"));
        assert!(msg.contains("404"));
    }

    #[test]
    fn wrap_error_names_public_path() {
        let err = InstallerError::Wrap {
            path: Utf8PathBuf::from("/bin/cish"),
            source: WrapError::Staging(StagingError::Write {
                path: Utf8PathBuf::from("/bin/.cish.staged"),
                source: std::io::Error::other("disk full"),
            }),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("wrap stage failed"));
        assert!(msg.contains("/bin/cish"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn uninstall_error_preserves_source() {
        let err = InstallerError::Uninstall {
            path: Utf8PathBuf::from("/bin/cish"),
            source: UninstallError::Io(std::io::Error::other("permission denied")),
        };
        assert_eq!(err.stage(), Stage::Uninstall);
        assert!(err.to_string().contains("permission denied"));
    }

    #[rstest]
    #[case(Stage::Request, "request")]
    #[case(Stage::Transport, "transport")]
    #[case(Stage::Status, "status")]
    #[case(Stage::Staging, "staging")]
    #[case(Stage::Placement, "placement")]
    #[case(Stage::Wrap, "wrap")]
    #[case(Stage::Uninstall, "uninstall")]
    fn stage_display_matches_name(#[case] stage: Stage, #[case] expected: &str) {
        assert_eq!(stage.to_string(), expected);
    }
}

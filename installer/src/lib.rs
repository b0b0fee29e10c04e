//! cish installer library.
//!
//! This crate downloads a released cish executable, verifies the response,
//! stages the bytes on disk, and moves them into place atomically. It is used
//! by the `cish-installer` CLI binary and can be consumed programmatically for
//! testing or custom installation workflows.
//!
//! # Modules
//!
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Validated install configuration and defaults
//! - [`error`] - Stage-labelled error types
//! - [`exec`] - External command execution for privileged changes
//! - [`facade`] - End-to-end install orchestration
//! - [`launcher`] - Launcher script generation for runtime-dependent artifacts
//! - [`output`] - User-facing messages on the diagnostics sink
//! - [`placement`] - Atomic placement with cross-device fallback
//! - [`staging`] - Streaming the response body to a staging file
//! - [`status`] - HTTP status classification
//! - [`transport`] - HTTP retrieval with bounded retries
//! - [`uninstall`] - Removal of a previous installation

pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod facade;
pub mod launcher;
pub mod output;
pub mod placement;
pub mod staging;
pub mod status;
pub mod transport;
pub mod uninstall;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

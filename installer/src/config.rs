//! Install configuration resolved from command-line and CI inputs.
//!
//! [`InstallConfig::from_args`] validates the raw clap arguments once and
//! produces immutable values that the pipeline consumes without further
//! checks.

use crate::cli::InstallArgs;
use crate::error::{InstallerError, Result};
use crate::exec::Privilege;
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;

/// Release download URL pattern; `{version}` and `{artifact}` are substituted.
pub const DEFAULT_RELEASE_URL: &str =
    "https://github.com/alexander-lindner/cish/releases/download/{version}/{artifact}";

/// File name of the released executable.
pub const DEFAULT_ARTIFACT_NAME: &str = "cish";

/// Public entry point of the installed interpreter.
pub const DEFAULT_DESTINATION: &str = "/bin/cish";

/// Runtime the launcher script invokes explicitly.
pub const DEFAULT_RUNTIME: &str = "/usr/bin/java";

/// Runtime argument placed before the artifact path in the launcher.
pub const DEFAULT_RUNTIME_ARG: &str = "-jar";

/// Location of the real artifact when a launcher fronts it.
pub const DEFAULT_ARTIFACT_PATH: &str = "/usr/local/lib/cish/cish.jar";

/// Default number of fetch attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between fetch attempts, in milliseconds.
pub const DEFAULT_BACKOFF_MILLIS: u64 = 500;

/// Default global timeout for one HTTP request, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const VERSION_PLACEHOLDER: &str = "{version}";
const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

/// A non-empty release tag such as `v0.3.0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version(String);

impl Version {
    /// Validate and wrap a release tag.
    ///
    /// Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidRequest`] when the tag is empty or
    /// contains a path separator.
    ///
    /// # Examples
    ///
    /// ```
    /// use cish_installer::config::Version;
    ///
    /// assert_eq!(Version::new(" v0.3.0 ")?.as_str(), "v0.3.0");
    /// assert!(Version::new("").is_err());
    /// # Ok::<(), cish_installer::error::InstallerError>(())
    /// ```
    pub fn new(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InstallerError::InvalidRequest {
                reason: "version must not be empty".to_owned(),
            });
        }
        if trimmed.contains('/') {
            return Err(InstallerError::InvalidRequest {
                reason: format!("version \"{trimmed}\" must not contain '/'"),
            });
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What to fetch and where the public entry point lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    version: Version,
    url_template: String,
    artifact_name: String,
    destination: Utf8PathBuf,
}

impl ArtifactRequest {
    /// Build a request against the default release store.
    #[must_use]
    pub fn new(version: Version, destination: Utf8PathBuf) -> Self {
        Self {
            version,
            url_template: DEFAULT_RELEASE_URL.to_owned(),
            artifact_name: DEFAULT_ARTIFACT_NAME.to_owned(),
            destination,
        }
    }

    /// Replace the release URL template.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidRequest`] if the template has no
    /// `{version}` placeholder.
    pub fn with_url_template(mut self, template: &str) -> Result<Self> {
        if !template.contains(VERSION_PLACEHOLDER) {
            return Err(InstallerError::InvalidRequest {
                reason: format!("release URL \"{template}\" lacks a {VERSION_PLACEHOLDER} placeholder"),
            });
        }
        template.clone_into(&mut self.url_template);
        Ok(self)
    }

    /// Replace the released file name.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidRequest`] if the name is empty.
    pub fn with_artifact_name(mut self, name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(InstallerError::InvalidRequest {
                reason: "artifact name must not be empty".to_owned(),
            });
        }
        name.trim().clone_into(&mut self.artifact_name);
        Ok(self)
    }

    /// Resolve the download URL for this request.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8PathBuf;
    /// use cish_installer::config::{ArtifactRequest, Version};
    ///
    /// let request = ArtifactRequest::new(Version::new("v0.3.0")?, Utf8PathBuf::from("/bin/cish"));
    /// assert_eq!(
    ///     request.url(),
    ///     "https://github.com/alexander-lindner/cish/releases/download/v0.3.0/cish"
    /// );
    /// # Ok::<(), cish_installer::error::InstallerError>(())
    /// ```
    #[must_use]
    pub fn url(&self) -> String {
        self.url_template
            .replace(VERSION_PLACEHOLDER, self.version.as_str())
            .replace(ARTIFACT_PLACEHOLDER, &self.artifact_name)
    }

    /// Returns the requested release tag.
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    /// Returns the released file name.
    #[must_use]
    pub fn artifact_name(&self) -> &str {
        &self.artifact_name
    }

    /// Returns the public destination path.
    #[must_use]
    pub fn destination(&self) -> &Utf8Path {
        &self.destination
    }
}

/// Bounded retry behaviour for transient network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: NonZeroU32,
    backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy with `max_attempts` tries and a linear `backoff`.
    #[must_use]
    pub const fn new(max_attempts: NonZeroU32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Returns the total number of attempts, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts.get()
    }

    /// Pause to observe after the given failed attempt (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use cish_installer::config::RetryPolicy;
    /// use std::num::NonZeroU32;
    /// use std::time::Duration;
    ///
    /// let three = NonZeroU32::new(3).ok_or("zero")?;
    /// let policy = RetryPolicy::new(three, Duration::from_millis(100));
    /// assert_eq!(policy.delay_after(2), Duration::from_millis(200));
    /// # Ok::<(), &'static str>(())
    /// ```
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::MIN.saturating_add(DEFAULT_MAX_ATTEMPTS - 1),
            backoff: Duration::from_millis(DEFAULT_BACKOFF_MILLIS),
        }
    }
}

/// Settings for the launcher script that fronts a runtime-dependent artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Absolute path of the runtime executable.
    pub runtime: Utf8PathBuf,
    /// Arguments placed between the runtime and the artifact path.
    pub runtime_args: Vec<String>,
    /// Where the real artifact is installed.
    pub artifact_path: Utf8PathBuf,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            runtime: Utf8PathBuf::from(DEFAULT_RUNTIME),
            runtime_args: vec![DEFAULT_RUNTIME_ARG.to_owned()],
            artifact_path: Utf8PathBuf::from(DEFAULT_ARTIFACT_PATH),
        }
    }
}

/// Fully validated configuration for one install run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// What to fetch and the public entry point.
    pub request: ArtifactRequest,
    /// Transport retry behaviour.
    pub retry: RetryPolicy,
    /// Global timeout for each HTTP request.
    pub timeout: Duration,
    /// Present when a launcher script must front the artifact.
    pub launcher: Option<LauncherConfig>,
    /// Explicit staging directory, if any.
    pub staging_dir: Option<Utf8PathBuf>,
    /// How filesystem changes are applied.
    pub privilege: Privilege,
    /// Suppress progress output.
    pub quiet: bool,
}

impl InstallConfig {
    /// Create a configuration with defaults for everything except the request.
    #[must_use]
    pub fn new(request: ArtifactRequest) -> Self {
        Self {
            request,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            launcher: None,
            staging_dir: None,
            privilege: Privilege::Direct,
            quiet: false,
        }
    }

    /// Validate clap arguments into a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::InvalidRequest`] for an empty version, a
    /// URL template without `{version}`, an empty artifact name, or zero
    /// retries.
    pub fn from_args(args: &InstallArgs) -> Result<Self> {
        let version = Version::new(&args.version)?;
        let request = ArtifactRequest::new(version, args.destination.clone())
            .with_url_template(&args.release_url)?
            .with_artifact_name(&args.artifact_name)?;

        let max_attempts =
            NonZeroU32::new(args.retries).ok_or_else(|| InstallerError::InvalidRequest {
                reason: "retries must be at least 1".to_owned(),
            })?;

        let launcher = args.launcher.then(|| LauncherConfig {
            runtime: args.runtime.clone(),
            runtime_args: args.runtime_args.clone(),
            artifact_path: args.artifact_path.clone(),
        });

        Ok(Self {
            request,
            retry: RetryPolicy::new(max_attempts, Duration::from_millis(args.retry_backoff_ms)),
            timeout: Duration::from_secs(args.timeout_secs),
            launcher,
            staging_dir: args.staging_dir.clone(),
            privilege: Privilege::from_sudo_flag(args.sudo),
            quiet: args.quiet,
        })
    }

    /// Path at which the downloaded artifact itself is installed.
    ///
    /// This is the public destination unless a launcher fronts the artifact.
    #[must_use]
    pub fn artifact_target(&self) -> &Utf8Path {
        self.launcher
            .as_ref()
            .map_or_else(|| self.request.destination(), |l| l.artifact_path.as_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    fn args(extra: &[&str]) -> InstallArgs {
        let mut argv = vec!["cish-installer", "--version", "v0.3.0"];
        argv.extend_from_slice(extra);
        InstallArgs::parse_from(argv)
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank("   ")]
    #[case::separator("v1/../../etc")]
    fn version_rejects_invalid_tags(#[case] raw: &str) {
        assert!(matches!(
            Version::new(raw),
            Err(InstallerError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn url_substitutes_version_and_artifact() {
        let request = ArtifactRequest::new(
            Version::new("v1.2.3").expect("valid version"),
            Utf8PathBuf::from("/bin/cish"),
        )
        .with_url_template("http://127.0.0.1:9/{version}/{artifact}")
        .expect("valid template")
        .with_artifact_name("cish.jar")
        .expect("valid name");
        assert_eq!(request.url(), "http://127.0.0.1:9/v1.2.3/cish.jar");
    }

    #[test]
    fn template_without_version_is_rejected() {
        let request = ArtifactRequest::new(
            Version::new("v1").expect("valid version"),
            Utf8PathBuf::from("/bin/cish"),
        );
        assert!(request.with_url_template("http://example.test/latest").is_err());
    }

    #[test]
    fn retry_policy_defaults_to_three_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
    }

    #[test]
    fn from_args_applies_defaults() {
        let config = InstallConfig::from_args(&args(&[])).expect("valid args");
        assert_eq!(config.request.version().as_str(), "v0.3.0");
        assert_eq!(config.request.destination(), "/bin/cish");
        assert_eq!(config.retry.max_attempts(), 3);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.launcher.is_none());
        assert_eq!(config.privilege, Privilege::Direct);
        assert_eq!(config.artifact_target(), "/bin/cish");
    }

    #[test]
    fn from_args_builds_launcher_config() {
        let config = InstallConfig::from_args(&args(&[
            "--launcher",
            "--runtime",
            "/opt/jdk/bin/java",
            "--artifact-path",
            "/opt/cish/cish.jar",
        ]))
        .expect("valid args");
        let launcher = config.launcher.as_ref().expect("launcher configured");
        assert_eq!(launcher.runtime, "/opt/jdk/bin/java");
        assert_eq!(launcher.runtime_args, vec!["-jar".to_owned()]);
        assert_eq!(config.artifact_target(), "/opt/cish/cish.jar");
    }

    #[test]
    fn from_args_rejects_zero_retries() {
        let result = InstallConfig::from_args(&args(&["--retries", "0"]));
        assert!(matches!(result, Err(InstallerError::InvalidRequest { .. })));
    }
}

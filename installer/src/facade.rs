//! End-to-end install orchestration.
//!
//! [`InstallerFacade`] runs the pipeline stages in order: fetch, status
//! check, staging, placement, and the optional launcher. Each stage runs only
//! after the previous one succeeded, and the first failure is returned as an
//! [`InstallerError`] naming its stage.

use crate::config::{InstallConfig, Version};
use crate::error::{InstallerError, Result, WrapError};
use crate::exec::{CommandExecutor, Privilege};
use crate::launcher::LauncherSynthesizer;
use crate::output::write_stderr_line;
use crate::placement::{Filesystem, InstalledArtifact, Installer, PlacementStrategy};
use crate::staging::{StagingWriter, discard};
use crate::status;
use crate::transport::{Retrieval, Transport};
use camino::Utf8Path;
use std::io::Write;

/// Result of a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    version: Version,
    artifact: InstalledArtifact,
    launcher: Option<InstalledArtifact>,
}

impl InstallOutcome {
    /// Returns the installed release version.
    #[must_use]
    pub const fn version(&self) -> &Version {
        &self.version
    }

    /// Returns the installed downloaded artifact.
    #[must_use]
    pub const fn artifact(&self) -> &InstalledArtifact {
        &self.artifact
    }

    /// Returns the installed launcher, if one was requested.
    #[must_use]
    pub const fn launcher(&self) -> Option<&InstalledArtifact> {
        self.launcher.as_ref()
    }

    /// Returns the path users invoke: the launcher if present, else the artifact.
    #[must_use]
    pub fn entry_point(&self) -> &Utf8Path {
        self.launcher
            .as_ref()
            .map_or_else(|| self.artifact.path(), InstalledArtifact::path)
    }
}

/// Single entry point that installs a release from an [`InstallConfig`].
#[derive(Clone, Copy)]
pub struct InstallerFacade<'a> {
    transport: &'a dyn Transport,
    filesystem: &'a dyn Filesystem,
    executor: &'a dyn CommandExecutor,
}

impl<'a> InstallerFacade<'a> {
    /// Create a facade over the given collaborators.
    ///
    /// `filesystem` serves direct installs and `executor` serves privileged
    /// ones; which is used depends on [`InstallConfig::privilege`].
    #[must_use]
    pub const fn new(
        transport: &'a dyn Transport,
        filesystem: &'a dyn Filesystem,
        executor: &'a dyn CommandExecutor,
    ) -> Self {
        Self {
            transport,
            filesystem,
            executor,
        }
    }

    /// Download, verify, stage, and place the configured release.
    ///
    /// Progress lines and relayed command output go to `sink`. On failure no
    /// staging file is left behind and the destination holds whatever it held
    /// before the call.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure as an [`InstallerError`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8PathBuf;
    /// use cish_installer::config::{ArtifactRequest, InstallConfig, Version};
    /// use cish_installer::exec::SystemCommandExecutor;
    /// use cish_installer::facade::InstallerFacade;
    /// use cish_installer::placement::LocalFilesystem;
    /// use cish_installer::transport::HttpTransport;
    ///
    /// let request = ArtifactRequest::new(Version::new("v0.3.0")?, Utf8PathBuf::from("/bin/cish"));
    /// let config = InstallConfig::new(request);
    /// let transport = HttpTransport::new(config.timeout, config.retry);
    /// let facade = InstallerFacade::new(&transport, &LocalFilesystem, &SystemCommandExecutor);
    /// let outcome = facade.install(&config, &mut std::io::stderr())?;
    /// assert_eq!(outcome.entry_point(), "/bin/cish");
    /// # Ok::<(), cish_installer::error::InstallerError>(())
    /// ```
    pub fn install(&self, config: &InstallConfig, sink: &mut dyn Write) -> Result<InstallOutcome> {
        check_launcher_paths(config)?;

        let request = &config.request;
        let url = request.url();
        log::debug!("installing cish {} from {url}", request.version());
        if !config.quiet {
            write_stderr_line(
                sink,
                format!("Downloading cish {} from {url}...", request.version()),
            );
        }

        let target = config.artifact_target();
        let staging =
            StagingWriter::for_target(config.staging_dir.as_deref(), target, config.privilege)?;
        let retrieval = match self.fetch_verified(&url) {
            Ok(retrieval) => retrieval,
            Err(err) => {
                // A killed earlier run may have left a file at the staging path.
                discard(staging.path());
                return Err(err);
            }
        };
        let mut body = retrieval.body;
        let staged = staging.stage(&mut *body)?;
        drop(body);

        if !config.quiet {
            write_stderr_line(sink, format!("Installing to {target}..."));
        }
        let installer = Installer::new(self.strategy(config.privilege));
        let artifact = installer.place(staged, target, sink)?;

        let launcher = match &config.launcher {
            Some(settings) => {
                let public_path = request.destination();
                let synthesizer = LauncherSynthesizer::new(settings);
                let script = synthesizer.wrap(artifact.path());
                let wrap_err = |source: WrapError| InstallerError::Wrap {
                    path: public_path.to_owned(),
                    source,
                };
                let staging = StagingWriter::for_target(
                    config.staging_dir.as_deref(),
                    public_path,
                    config.privilege,
                )
                .map_err(|e| wrap_err(WrapError::Staging(e)))?;
                let installed = synthesizer
                    .install(&script, &staging, &installer, public_path, sink)
                    .map_err(wrap_err)?;
                Some(installed)
            }
            None => None,
        };

        Ok(InstallOutcome {
            version: request.version().clone(),
            artifact,
            launcher,
        })
    }

    fn fetch_verified(&self, url: &str) -> Result<Retrieval> {
        let retrieval = self.transport.fetch(url)?;
        status::validate(retrieval.status)?;
        Ok(retrieval)
    }

    fn strategy(&self, privilege: Privilege) -> PlacementStrategy<'a> {
        match privilege {
            Privilege::Direct => PlacementStrategy::Direct(self.filesystem),
            Privilege::Sudo => PlacementStrategy::Privileged(self.executor),
        }
    }
}

/// Reject a launcher that would overwrite the artifact it launches.
fn check_launcher_paths(config: &InstallConfig) -> Result<()> {
    match &config.launcher {
        Some(settings) if settings.artifact_path == config.request.destination() => {
            Err(InstallerError::InvalidRequest {
                reason: format!(
                    "launcher destination and artifact path are both {}",
                    settings.artifact_path
                ),
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
#[path = "facade_tests.rs"]
mod tests;

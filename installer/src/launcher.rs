//! Launcher script generation for runtime-dependent artifacts.
//!
//! When the artifact runs on an external runtime and sits directly in a
//! system binary directory, shebang resolution can pick the wrong runtime.
//! The launcher installed at the public path names the runtime explicitly and
//! forwards a single positional argument to the real artifact.

use crate::config::LauncherConfig;
use crate::error::WrapError;
use crate::placement::{InstalledArtifact, Installer};
use crate::staging::StagingWriter;
use camino::{Utf8Path, Utf8PathBuf};
use std::io::{Cursor, Write};

/// Interpreter line of every launcher script.
pub const LAUNCHER_SHEBANG: &str = "#!/bin/sh";

/// Placeholder forwarding the script's first argument.
const PASSTHROUGH_ARG: &str = "\"$1\"";

/// A generated launcher script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherScript {
    artifact: Utf8PathBuf,
    content: String,
}

impl LauncherScript {
    /// Returns the real artifact the script invokes.
    #[must_use]
    pub fn artifact(&self) -> &Utf8Path {
        &self.artifact
    }

    /// Returns the script text.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Produces and installs launcher scripts.
#[derive(Debug, Clone, Copy)]
pub struct LauncherSynthesizer<'a> {
    config: &'a LauncherConfig,
}

impl<'a> LauncherSynthesizer<'a> {
    /// Create a synthesizer for the given runtime settings.
    #[must_use]
    pub const fn new(config: &'a LauncherConfig) -> Self {
        Self { config }
    }

    /// Generate the launcher for `real_artifact`.
    ///
    /// The output depends only on the runtime settings and the artifact path.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use cish_installer::config::LauncherConfig;
    /// use cish_installer::launcher::LauncherSynthesizer;
    ///
    /// let config = LauncherConfig::default();
    /// let script = LauncherSynthesizer::new(&config)
    ///     .wrap(Utf8Path::new("/usr/local/lib/cish/cish.jar"));
    /// assert_eq!(
    ///     script.content(),
    ///     "#!/bin/sh\nexec '/usr/bin/java' '-jar' '/usr/local/lib/cish/cish.jar' \"$1\"\n"
    /// );
    /// ```
    #[must_use]
    pub fn wrap(&self, real_artifact: &Utf8Path) -> LauncherScript {
        let mut words = Vec::with_capacity(self.config.runtime_args.len() + 3);
        words.push(shell_quote(self.config.runtime.as_str()));
        words.extend(self.config.runtime_args.iter().map(|arg| shell_quote(arg)));
        words.push(shell_quote(real_artifact.as_str()));
        words.push(PASSTHROUGH_ARG.to_owned());

        LauncherScript {
            artifact: real_artifact.to_owned(),
            content: format!("{LAUNCHER_SHEBANG}\nexec {}\n", words.join(" ")),
        }
    }

    /// Stage `script` and place it at `public_path` with `installer`.
    ///
    /// # Errors
    ///
    /// Returns [`WrapError`] if staging or placement fails.
    pub fn install(
        &self,
        script: &LauncherScript,
        staging: &StagingWriter,
        installer: &Installer<'_>,
        public_path: &Utf8Path,
        sink: &mut dyn Write,
    ) -> Result<InstalledArtifact, WrapError> {
        let staged = staging.stage(&mut Cursor::new(script.content.as_bytes()))?;
        Ok(installer.place(staged, public_path, sink)?)
    }
}

/// Quote `word` for a POSIX shell using single quotes.
fn shell_quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

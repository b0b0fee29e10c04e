//! Removal of a previous installation.
//!
//! Removal is idempotent: a path that does not exist counts as removed.
//! Privileged removal runs `sudo rm -f` and relays the command's output to
//! the diagnostics sink.

use crate::error::{InstallerError, Result, UninstallError};
use crate::exec::{CommandExecutor, Privilege, run_privileged};
use crate::placement::Filesystem;
use camino::{Utf8Path, Utf8PathBuf};
use std::io::{ErrorKind, Write};

/// Paths to remove and how to remove them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallPlan {
    /// Public entry point, either the artifact itself or its launcher.
    pub destination: Utf8PathBuf,
    /// Real artifact installed behind a launcher, if any.
    pub artifact_path: Option<Utf8PathBuf>,
    /// How the files are removed.
    pub privilege: Privilege,
}

impl UninstallPlan {
    fn targets(&self) -> impl Iterator<Item = &Utf8Path> {
        std::iter::once(self.destination.as_path()).chain(
            self.artifact_path
                .as_deref()
                .filter(|path| *path != self.destination),
        )
    }
}

/// Remove every path named by `plan`.
///
/// Returns the paths that were removed. Direct removal reports only files
/// that existed; privileged removal cannot tell and reports every target.
///
/// # Errors
///
/// Returns [`InstallerError::Uninstall`] naming the first path that could not
/// be removed.
pub fn uninstall(
    plan: &UninstallPlan,
    filesystem: &dyn Filesystem,
    executor: &dyn CommandExecutor,
    sink: &mut dyn Write,
) -> Result<Vec<Utf8PathBuf>> {
    let mut removed = Vec::new();
    for path in plan.targets() {
        let was_present = remove(path, plan.privilege, filesystem, executor, sink).map_err(
            |source| InstallerError::Uninstall {
                path: path.to_owned(),
                source,
            },
        )?;
        if was_present {
            log::debug!("removed {path}");
            removed.push(path.to_owned());
        }
    }
    Ok(removed)
}

fn remove(
    path: &Utf8Path,
    privilege: Privilege,
    filesystem: &dyn Filesystem,
    executor: &dyn CommandExecutor,
    sink: &mut dyn Write,
) -> std::result::Result<bool, UninstallError> {
    match privilege {
        Privilege::Direct => match filesystem.remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        },
        Privilege::Sudo => {
            run_privileged(executor, "rm", &["-f", path.as_str()], sink)?;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use crate::placement::LocalFilesystem;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output};
    use std::fs;

    fn sandbox() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        (temp, root)
    }

    fn plan(destination: Utf8PathBuf, privilege: Privilege) -> UninstallPlan {
        UninstallPlan {
            destination,
            artifact_path: None,
            privilege,
        }
    }

    #[test]
    fn direct_removal_deletes_installed_files() {
        let (_temp, root) = sandbox();
        let dest = root.join("cish");
        let artifact = root.join("cish.jar");
        fs::write(&dest, b"launcher").expect("seed launcher");
        fs::write(&artifact, b"artifact").expect("seed artifact");
        let plan = UninstallPlan {
            artifact_path: Some(artifact.clone()),
            ..plan(dest.clone(), Privilege::Direct)
        };

        let removed = uninstall(
            &plan,
            &LocalFilesystem,
            &StubExecutor::new(Vec::new()),
            &mut Vec::new(),
        )
        .expect("removal succeeds");

        assert_eq!(removed, vec![dest.clone(), artifact.clone()]);
        assert!(!dest.exists());
        assert!(!artifact.exists());
    }

    #[test]
    fn direct_removal_of_missing_file_is_not_an_error() {
        let (_temp, root) = sandbox();
        let removed = uninstall(
            &plan(root.join("cish"), Privilege::Direct),
            &LocalFilesystem,
            &StubExecutor::new(Vec::new()),
            &mut Vec::new(),
        )
        .expect("missing file is fine");
        assert!(removed.is_empty());
    }

    #[test]
    fn direct_removal_of_directory_fails() {
        let (_temp, root) = sandbox();
        let dest = root.join("cish");
        fs::create_dir(&dest).expect("seed directory");

        let err = uninstall(
            &plan(dest, Privilege::Direct),
            &LocalFilesystem,
            &StubExecutor::new(Vec::new()),
            &mut Vec::new(),
        )
        .expect_err("directories are not removed");
        assert_eq!(err.stage(), Stage::Uninstall);
    }

    #[test]
    fn privileged_removal_runs_sudo_rm_per_target() {
        let plan = UninstallPlan {
            destination: Utf8PathBuf::from("/bin/cish"),
            artifact_path: Some(Utf8PathBuf::from("/usr/local/lib/cish/cish.jar")),
            privilege: Privilege::Sudo,
        };
        let executor = StubExecutor::new(vec![
            ExpectedCall::sudo(&["rm", "-f", "/bin/cish"]),
            ExpectedCall::sudo(&["rm", "-f", "/usr/local/lib/cish/cish.jar"]),
        ]);

        let removed = uninstall(&plan, &LocalFilesystem, &executor, &mut Vec::new())
            .expect("removal succeeds");

        executor.assert_finished();
        assert_eq!(removed.len(), 2);
    }

    #[test]
    fn privileged_failure_relays_stderr_and_names_path() {
        let executor = StubExecutor::new(vec![
            ExpectedCall::sudo(&["rm", "-f", "/bin/cish"])
                .returning(Ok(failure_output("rm: cannot remove '/bin/cish': Read-only file system"))),
        ]);
        let mut sink = Vec::new();

        let err = uninstall(
            &plan(Utf8PathBuf::from("/bin/cish"), Privilege::Sudo),
            &LocalFilesystem,
            &executor,
            &mut sink,
        )
        .expect_err("rm fails");

        executor.assert_finished();
        assert!(err.to_string().contains("/bin/cish"));
        let relayed = String::from_utf8(sink).expect("sink is UTF-8");
        assert!(relayed.contains("Read-only file system"));
    }

    #[test]
    fn artifact_equal_to_destination_is_removed_once() {
        let plan = UninstallPlan {
            artifact_path: Some(Utf8PathBuf::from("/bin/cish")),
            ..plan(Utf8PathBuf::from("/bin/cish"), Privilege::Sudo)
        };
        let executor = StubExecutor::new(vec![ExpectedCall::sudo(&["rm", "-f", "/bin/cish"])]);

        uninstall(&plan, &LocalFilesystem, &executor, &mut Vec::new()).expect("removal succeeds");
        executor.assert_finished();
    }
}

//! Placement of a staged file at its final location.
//!
//! The staged file is renamed over the destination, which readers observe
//! atomically. When the staging file lives on another filesystem the rename
//! fails with the platform's cross-device error; only that error triggers the
//! fallback, which copies into a hidden sibling of the destination and renames
//! the sibling into place before deleting the staged source. Every other
//! rename failure is returned unchanged.
//!
//! The executable bit is applied before the file becomes visible and
//! re-asserted on the destination afterwards.

use crate::exec::{CommandError, CommandExecutor, run_privileged};
use crate::staging::{StagedFile, discard, parent_dir};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::{self, ErrorKind, Write};
use thiserror::Error;

/// Permission bits applied to installed files (rwxr-xr-x).
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Suffix of the hidden sibling used by the cross-device fallback.
const PARTIAL_SUFFIX: &str = ".partial";

/// Filesystem operations used during placement.
///
/// Tests substitute implementations that force particular failures, such as
/// a cross-device rename.
pub trait Filesystem {
    /// Rename `from` to `to`, replacing `to` if it exists.
    ///
    /// # Errors
    ///
    /// Returns the operating system error unchanged.
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()>;

    /// Copy the contents of `from` to `to`, returning the bytes copied.
    ///
    /// # Errors
    ///
    /// Returns the operating system error unchanged.
    fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<u64>;

    /// Delete a file.
    ///
    /// # Errors
    ///
    /// Returns the operating system error unchanged.
    fn remove_file(&self, path: &Utf8Path) -> io::Result<()>;

    /// Create a directory and its missing parents.
    ///
    /// # Errors
    ///
    /// Returns the operating system error unchanged.
    fn create_dir_all(&self, path: &Utf8Path) -> io::Result<()>;

    /// Mark a file as executable.
    ///
    /// # Errors
    ///
    /// Returns the operating system error unchanged.
    fn set_executable(&self, path: &Utf8Path) -> io::Result<()>;
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl Filesystem for LocalFilesystem {
    fn rename(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn copy(&self, from: &Utf8Path, to: &Utf8Path) -> io::Result<u64> {
        fs::copy(from, to)
    }

    fn remove_file(&self, path: &Utf8Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn create_dir_all(&self, path: &Utf8Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn set_executable(&self, path: &Utf8Path) -> io::Result<()> {
        set_executable_mode(path)
    }
}

#[cfg(unix)]
fn set_executable_mode(path: &Utf8Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(EXECUTABLE_MODE);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable_mode(path: &Utf8Path) -> io::Result<()> {
    // Executability follows the file extension here; only require existence.
    fs::metadata(path).map(|_| ())
}

/// Errors raised while placing a staged file.
#[derive(Debug, Error)]
pub enum PlacementError {
    /// The destination directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// The directory that could not be created.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Renaming failed for a reason other than crossing devices.
    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        /// Rename source.
        from: Utf8PathBuf,
        /// Rename destination.
        to: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The cross-device copy failed.
    #[error("failed to copy {from} to {to} across devices: {source}")]
    Copy {
        /// Copy source.
        from: Utf8PathBuf,
        /// Copy destination.
        to: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The staged source could not be deleted after copying.
    #[error("failed to remove staged file {path}: {source}")]
    RemoveStaged {
        /// The staged file.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The executable bit could not be set.
    #[error("failed to mark {path} executable: {source}")]
    Permissions {
        /// The file whose mode could not be changed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A privileged placement command failed.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// How the file reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMethod {
    /// A single rename from the staging path.
    Rename,
    /// Copy into a sibling, then rename, after a cross-device rename failure.
    CrossDeviceCopy,
    /// Privileged copy and rename through the command executor.
    Privileged,
}

/// An executable file at its final path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledArtifact {
    path: Utf8PathBuf,
    method: PlacementMethod,
}

impl InstalledArtifact {
    /// Returns the installed path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns how the file was placed.
    #[must_use]
    pub const fn method(&self) -> PlacementMethod {
        self.method
    }
}

/// Where filesystem changes come from.
#[derive(Clone, Copy)]
pub enum PlacementStrategy<'a> {
    /// Operate on the filesystem with the process's own rights.
    Direct(&'a dyn Filesystem),
    /// Route every change through `sudo`.
    Privileged(&'a dyn CommandExecutor),
}

/// Moves staged files into place.
#[derive(Clone, Copy)]
pub struct Installer<'a> {
    strategy: PlacementStrategy<'a>,
}

impl<'a> Installer<'a> {
    /// Create an installer using `strategy`.
    #[must_use]
    pub const fn new(strategy: PlacementStrategy<'a>) -> Self {
        Self { strategy }
    }

    /// Move `staged` to `dest` and mark it executable.
    ///
    /// Re-running with identical content simply replaces the destination.
    /// The staging file never survives this call: it is renamed away on
    /// success and deleted on failure.
    ///
    /// # Errors
    ///
    /// Returns [`PlacementError`] describing the failing operation.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use camino::Utf8Path;
    /// use cish_installer::placement::{Installer, LocalFilesystem, PlacementStrategy};
    /// use cish_installer::staging::StagingWriter;
    ///
    /// let writer = StagingWriter::new("/bin/.cish.staged".into());
    /// let staged = writer.stage(&mut &b"#!/bin/sh\n"[..])?;
    /// let installer = Installer::new(PlacementStrategy::Direct(&LocalFilesystem));
    /// let installed = installer.place(staged, Utf8Path::new("/bin/cish"), &mut std::io::stderr())?;
    /// assert_eq!(installed.path(), "/bin/cish");
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn place(
        &self,
        staged: StagedFile,
        dest: &Utf8Path,
        sink: &mut dyn Write,
    ) -> Result<InstalledArtifact, PlacementError> {
        let result = match self.strategy {
            PlacementStrategy::Direct(fs) => place_direct(fs, staged.path(), dest),
            PlacementStrategy::Privileged(executor) => {
                place_privileged(executor, staged.path(), dest, sink)
            }
        };
        if result.is_err() {
            discard(staged.path());
        }
        let method = result?;
        log::debug!("placed {} at {dest} via {method:?}", staged.path());
        Ok(InstalledArtifact {
            path: dest.to_owned(),
            method,
        })
    }
}

fn place_direct(
    fs: &dyn Filesystem,
    staged: &Utf8Path,
    dest: &Utf8Path,
) -> Result<PlacementMethod, PlacementError> {
    let dir = parent_dir(dest);
    fs.create_dir_all(dir)
        .map_err(|source| PlacementError::CreateDir {
            path: dir.to_owned(),
            source,
        })?;
    mark_executable(fs, staged)?;

    let method = match fs.rename(staged, dest) {
        Ok(()) => PlacementMethod::Rename,
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            log::debug!("{staged} and {dest} are on different devices; copying");
            copy_across_devices(fs, staged, dest)?;
            PlacementMethod::CrossDeviceCopy
        }
        Err(source) => {
            return Err(PlacementError::Rename {
                from: staged.to_owned(),
                to: dest.to_owned(),
                source,
            });
        }
    };

    mark_executable(fs, dest)?;
    Ok(method)
}

/// Copy into a sibling of `dest` on the destination filesystem, then rename.
fn copy_across_devices(
    fs: &dyn Filesystem,
    staged: &Utf8Path,
    dest: &Utf8Path,
) -> Result<(), PlacementError> {
    let sibling = partial_path_for(dest);
    let exposed = fs
        .copy(staged, &sibling)
        .map(|_| ())
        .map_err(|source| PlacementError::Copy {
            from: staged.to_owned(),
            to: sibling.clone(),
            source,
        })
        .and_then(|()| mark_executable(fs, &sibling))
        .and_then(|()| {
            fs.rename(&sibling, dest)
                .map_err(|source| PlacementError::Rename {
                    from: sibling.clone(),
                    to: dest.to_owned(),
                    source,
                })
        });
    if let Err(err) = exposed {
        if let Err(e) = fs.remove_file(&sibling) {
            log::debug!("no partial copy to remove at {sibling}: {e}");
        }
        return Err(err);
    }

    fs.remove_file(staged)
        .map_err(|source| PlacementError::RemoveStaged {
            path: staged.to_owned(),
            source,
        })
}

fn place_privileged(
    executor: &dyn CommandExecutor,
    staged: &Utf8Path,
    dest: &Utf8Path,
    sink: &mut dyn Write,
) -> Result<PlacementMethod, PlacementError> {
    let dir = parent_dir(dest);
    let sibling = partial_path_for(dest);
    run_privileged(executor, "mkdir", &["-p", dir.as_str()], sink)?;

    let exposed = run_privileged(
        executor,
        "cp",
        &["-f", staged.as_str(), sibling.as_str()],
        sink,
    )
    .and_then(|()| {
        let mode = format!("{EXECUTABLE_MODE:o}");
        run_privileged(executor, "chmod", &[mode.as_str(), sibling.as_str()], sink)
    })
    .and_then(|()| {
        run_privileged(
            executor,
            "mv",
            &["-f", sibling.as_str(), dest.as_str()],
            sink,
        )
    });
    if let Err(err) = exposed {
        if let Err(e) = run_privileged(executor, "rm", &["-f", sibling.as_str()], sink) {
            log::warn!("could not remove partial copy {sibling}: {e}");
        }
        return Err(err.into());
    }

    fs::remove_file(staged).map_err(|source| PlacementError::RemoveStaged {
        path: staged.to_owned(),
        source,
    })?;
    Ok(PlacementMethod::Privileged)
}

fn mark_executable(fs: &dyn Filesystem, path: &Utf8Path) -> Result<(), PlacementError> {
    fs.set_executable(path)
        .map_err(|source| PlacementError::Permissions {
            path: path.to_owned(),
            source,
        })
}

/// Hidden sibling of `dest` used while a copy is in flight.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use cish_installer::placement::partial_path_for;
///
/// assert_eq!(partial_path_for(Utf8Path::new("/bin/cish")), "/bin/.cish.partial");
/// ```
#[must_use]
pub fn partial_path_for(dest: &Utf8Path) -> Utf8PathBuf {
    let name = dest.file_name().unwrap_or("artifact");
    parent_dir(dest).join(format!(".{name}{PARTIAL_SUFFIX}"))
}

#[cfg(test)]
#[path = "placement_tests.rs"]
mod tests;

//! Staging of downloaded bytes before they become visible.
//!
//! The response body is streamed to a fixed, hidden file name next to the
//! final destination where possible, so the later rename stays on one
//! filesystem. Any leftover at the staging path is unlinked and the file is
//! created afresh, so a re-run after an aborted attempt never writes through
//! an existing file or symlink.

use crate::exec::Privilege;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::sync::Arc;
use tempfile::TempDir;
use thiserror::Error;

/// Suffix appended to the hidden staging file name.
pub const STAGING_SUFFIX: &str = ".staged";

/// Prefix of the private directory used for privileged staging.
const PRIVATE_DIR_PREFIX: &str = "cish-staging-";

/// Buffer size used while streaming the body.
const COPY_BUFFER_LEN: usize = 64 * 1024;

/// Permissions of a freshly created staging file.
#[cfg(unix)]
const STAGING_FILE_MODE: u32 = 0o600;

/// Errors raised while staging bytes locally.
#[derive(Debug, Error)]
pub enum StagingError {
    /// No usable staging directory could be determined.
    #[error("cannot determine staging directory: {reason}")]
    Location {
        /// Why the directory could not be determined.
        reason: String,
    },

    /// The staging directory could not be created.
    #[error("failed to create staging directory {path}: {source}")]
    CreateDir {
        /// The directory that could not be created.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Reading the source stream failed.
    #[error("failed to read download stream: {source}")]
    Read {
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing the staging file failed.
    #[error("failed to write staging file {path}: {source}")]
    Write {
        /// The staging file path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// A fully written staging file awaiting placement.
#[derive(Debug, PartialEq, Eq)]
pub struct StagedFile {
    path: Utf8PathBuf,
    len: u64,
}

impl StagedFile {
    /// Returns the staging file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the number of bytes staged.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` when no bytes were staged.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Writes a byte stream to a fixed staging path.
///
/// A writer for a privileged install owns a private temporary directory,
/// which is removed once the last clone of the writer is dropped.
#[derive(Debug, Clone)]
pub struct StagingWriter {
    path: Utf8PathBuf,
    _private_dir: Option<Arc<TempDir>>,
}

impl StagingWriter {
    /// Create a writer for an explicit staging file path.
    #[must_use]
    pub const fn new(path: Utf8PathBuf) -> Self {
        Self {
            path,
            _private_dir: None,
        }
    }

    /// Create a writer for the file that will end up at `target`.
    ///
    /// Without an explicit directory, direct installs stage next to the
    /// target. Privileged installs stage in a freshly created directory under
    /// the system temporary directory, readable only by the current user, so
    /// no other account can swap the bytes handed to `sudo`.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::CreateDir`] if the private directory cannot be
    /// created and [`StagingError::Location`] if its path is not valid UTF-8.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use cish_installer::exec::Privilege;
    /// use cish_installer::staging::StagingWriter;
    ///
    /// let writer = StagingWriter::for_target(None, Utf8Path::new("/bin/cish"), Privilege::Direct)?;
    /// assert_eq!(writer.path(), "/bin/.cish.staged");
    /// # Ok::<(), cish_installer::staging::StagingError>(())
    /// ```
    pub fn for_target(
        staging_dir: Option<&Utf8Path>,
        target: &Utf8Path,
        privilege: Privilege,
    ) -> Result<Self, StagingError> {
        match (staging_dir, privilege) {
            (Some(dir), _) => Ok(Self::new(staging_path_for(dir, target))),
            (None, Privilege::Direct) => Ok(Self::new(staging_path_for(parent_dir(target), target))),
            (None, Privilege::Sudo) => Self::in_private_dir(target),
        }
    }

    fn in_private_dir(target: &Utf8Path) -> Result<Self, StagingError> {
        let root = Utf8PathBuf::try_from(std::env::temp_dir()).map_err(|e| {
            StagingError::Location {
                reason: format!("temporary directory is not valid UTF-8: {e}"),
            }
        })?;
        let temp = tempfile::Builder::new()
            .prefix(PRIVATE_DIR_PREFIX)
            .tempdir_in(&root)
            .map_err(|source| StagingError::CreateDir {
                path: root.clone(),
                source,
            })?;
        let dir = Utf8PathBuf::try_from(temp.path().to_path_buf()).map_err(|e| {
            StagingError::Location {
                reason: format!("private staging directory is not valid UTF-8: {e}"),
            }
        })?;
        log::debug!("staging privileged install in private directory {dir}");
        Ok(Self {
            path: staging_path_for(&dir, target),
            _private_dir: Some(Arc::new(temp)),
        })
    }

    /// Returns the staging file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Stream `source` into the staging file until end of data.
    ///
    /// The file is closed only after the source is drained. On any failure
    /// the partial file is removed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StagingError::Read`] for source failures and
    /// [`StagingError::Write`] or [`StagingError::CreateDir`] for local I/O
    /// failures.
    pub fn stage(&self, source: &mut dyn Read) -> Result<StagedFile, StagingError> {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(dir).map_err(|source| StagingError::CreateDir {
            path: dir.to_owned(),
            source,
        })?;

        let result = self.write_all_from(source);
        if result.is_err() {
            discard(&self.path);
        }
        let len = result?;
        log::debug!("staged {len} bytes at {}", self.path);
        Ok(StagedFile {
            path: self.path.clone(),
            len,
        })
    }

    fn write_all_from(&self, source: &mut dyn Read) -> Result<u64, StagingError> {
        let write_err = |source| StagingError::Write {
            path: self.path.clone(),
            source,
        };

        let mut file = self.create_fresh().map_err(write_err)?;
        let mut buffer = vec![0_u8; COPY_BUFFER_LEN];
        let mut total: u64 = 0;
        loop {
            let read = match source.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(StagingError::Read { source }),
            };
            let chunk = buffer.get(..read).unwrap_or_default();
            file.write_all(chunk).map_err(write_err)?;
            total += chunk.len() as u64;
        }
        file.flush().map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        Ok(total)
    }

    /// Unlink whatever sits at the staging path and create a new file there.
    ///
    /// `create_new` refuses to follow a symlink or reuse a file planted
    /// between the unlink and the open.
    fn create_fresh(&self) -> io::Result<File> {
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("removed leftover staging file {}", self.path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;

            options.mode(STAGING_FILE_MODE);
        }
        options.open(&self.path)
    }
}

/// Hidden staging file name for `target` inside `staging_dir`.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use cish_installer::staging::staging_path_for;
///
/// let path = staging_path_for(Utf8Path::new("/tmp"), Utf8Path::new("/bin/cish"));
/// assert_eq!(path, "/tmp/.cish.staged");
/// ```
#[must_use]
pub fn staging_path_for(staging_dir: &Utf8Path, target: &Utf8Path) -> Utf8PathBuf {
    let name = target.file_name().unwrap_or("artifact");
    staging_dir.join(format!(".{name}{STAGING_SUFFIX}"))
}

/// Remove a staging file, ignoring a file that is already gone.
pub fn discard(path: &Utf8Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("removed staging file {path}"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not remove staging file {path}: {e}"),
    }
}

/// Parent directory of `path`, treating a bare file name as the current directory.
pub(crate) fn parent_dir(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("UTF-8 path");
        (temp, path)
    }

    /// A reader that yields some bytes and then fails.
    struct FailingReader {
        sent: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.sent {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            self.sent = true;
            let data = b"partial";
            let n = data.len().min(buf.len());
            buf.get_mut(..n)
                .expect("buffer slice")
                .copy_from_slice(data.get(..n).expect("data slice"));
            Ok(n)
        }
    }

    #[test]
    fn stage_writes_all_bytes() {
        let (_temp, dir) = temp_dir();
        let writer = StagingWriter::new(dir.join(".cish.staged"));

        let staged = writer
            .stage(&mut Cursor::new(b"0123456789".to_vec()))
            .expect("staging succeeds");
        assert_eq!(staged.len(), 10);
        assert_eq!(
            fs::read(staged.path()).expect("staged file readable"),
            b"0123456789"
        );
    }

    #[test]
    fn stage_overwrites_leftover_file() {
        let (_temp, dir) = temp_dir();
        let path = dir.join(".cish.staged");
        fs::write(&path, b"stale leftovers from an aborted run").expect("seed leftover");

        let staged = StagingWriter::new(path.clone())
            .stage(&mut Cursor::new(b"new".to_vec()))
            .expect("staging succeeds");
        assert_eq!(staged.len(), 3);
        assert_eq!(fs::read(&path).expect("readable"), b"new");
    }

    #[test]
    fn read_failure_removes_partial_file() {
        let (_temp, dir) = temp_dir();
        let path = dir.join(".cish.staged");

        let err = StagingWriter::new(path.clone())
            .stage(&mut FailingReader { sent: false })
            .expect_err("reader fails");
        assert!(matches!(err, StagingError::Read { .. }));
        assert!(!path.exists(), "partial staging file must be removed");
    }

    #[test]
    fn stage_creates_missing_directory() {
        let (_temp, dir) = temp_dir();
        let path = dir.join("nested").join(".cish.staged");

        StagingWriter::new(path.clone())
            .stage(&mut Cursor::new(Vec::new()))
            .expect("staging succeeds");
        assert!(path.exists());
    }

    #[test]
    fn for_target_prefers_explicit_directory() {
        let writer = StagingWriter::for_target(
            Some(Utf8Path::new("/var/tmp")),
            Utf8Path::new("/bin/cish"),
            Privilege::Sudo,
        )
        .expect("explicit directory");
        assert_eq!(writer.path(), "/var/tmp/.cish.staged");
    }

    #[test]
    fn for_target_uses_private_temp_dir_when_privileged() {
        let writer =
            StagingWriter::for_target(None, Utf8Path::new("/bin/cish"), Privilege::Sudo)
                .expect("private dir created");
        let dir = parent_dir(writer.path()).to_owned();

        assert!(writer.path().starts_with(std::env::temp_dir()));
        assert_ne!(dir.as_std_path(), std::env::temp_dir().as_path());
        assert_eq!(writer.path().file_name(), Some(".cish.staged"));
        assert!(dir.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = fs::metadata(&dir).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o077, 0, "private dir must not be shared: {mode:o}");
        }

        drop(writer);
        assert!(!dir.exists(), "private dir removed with the writer");
    }

    #[test]
    fn privileged_writers_do_not_share_a_path() {
        let first = StagingWriter::for_target(None, Utf8Path::new("/bin/cish"), Privilege::Sudo)
            .expect("private dir created");
        let second = StagingWriter::for_target(None, Utf8Path::new("/bin/cish"), Privilege::Sudo)
            .expect("private dir created");
        assert_ne!(first.path(), second.path());
    }

    #[cfg(unix)]
    #[test]
    fn stage_replaces_planted_symlink_without_following_it() {
        let (_temp, dir) = temp_dir();
        let victim = dir.join("victim");
        fs::write(&victim, b"ORIGINAL").expect("seed victim");
        let path = dir.join(".cish.staged");
        std::os::unix::fs::symlink(&victim, &path).expect("plant symlink");

        StagingWriter::new(path.clone())
            .stage(&mut Cursor::new(b"PAYLOAD".to_vec()))
            .expect("staging succeeds");

        assert_eq!(fs::read(&victim).expect("victim readable"), b"ORIGINAL");
        let meta = fs::symlink_metadata(&path).expect("staged metadata");
        assert!(meta.file_type().is_file(), "staging path is a regular file");
        assert_eq!(fs::read(&path).expect("staged readable"), b"PAYLOAD");
    }

    #[cfg(unix)]
    #[test]
    fn staged_file_is_private_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp, dir) = temp_dir();
        let staged = StagingWriter::new(dir.join(".cish.staged"))
            .stage(&mut Cursor::new(b"0123".to_vec()))
            .expect("staging succeeds");
        let mode = fs::metadata(staged.path())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0, "staged file mode {mode:o}");
    }

    #[test]
    fn parent_dir_of_bare_name_is_current_dir() {
        assert_eq!(parent_dir(Utf8Path::new("cish")), ".");
        assert_eq!(parent_dir(Utf8Path::new("/bin/cish")), "/bin");
    }

    #[test]
    fn discard_ignores_missing_file() {
        let (_temp, dir) = temp_dir();
        discard(&dir.join("absent"));
    }
}

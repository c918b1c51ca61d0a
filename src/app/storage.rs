use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Filesystem operations the engine performs.
pub trait FileIo: Send + Sync + 'static {
    /// Reads the whole text of `path`. `Ok(None)` when there is no such file.
    fn read(&self, path: &Path) -> io::Result<Option<String>>;

    /// Replaces the contents of `path` with `contents`.
    ///
    /// On failure the previous contents must be left intact.
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;
}

impl<T: FileIo + ?Sized> FileIo for Arc<T> {
    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        (**self).read(path)
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        (**self).write(path, contents)
    }
}

/// The real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskIo;

impl FileIo for DiskIo {
    fn read(&self, path: &Path) -> io::Result<Option<String>> {
        if !path.is_file() {
            return Ok(None);
        }

        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            // Deleted between the check and the read
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let text = String::from_utf8_lossy(&bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        Ok(Some(text.to_string()))
    }

    fn write(&self, path: &Path, contents: &str) -> io::Result<()> {
        // Symlinked outputs are written through, not replaced.
        let target = match fs::canonicalize(path) {
            Ok(target) => target,
            Err(e) if e.kind() == ErrorKind::NotFound => path.to_path_buf(),
            Err(e) => return Err(e),
        };

        let existing = match fs::metadata(&target) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        // Refuse whatever a create-or-truncate open would refuse.
        if let Some(meta) = &existing {
            if meta.permissions().readonly() {
                return Err(io::Error::new(
                    ErrorKind::PermissionDenied,
                    "output file is read-only",
                ));
            }
            OpenOptions::new().write(true).open(&target)?;
        }

        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        // Stage the full text next to the target, then swap it in.
        let mut staged = match NamedTempFile::new_in(dir) {
            Ok(staged) => staged,
            // Writable file in a read-only directory: the text is fully
            // buffered, so overwrite in place.
            Err(e) if e.kind() == ErrorKind::PermissionDenied && existing.is_some() => {
                return fs::write(&target, contents);
            }
            Err(e) => return Err(e),
        };
        staged.write_all(contents.as_bytes())?;
        staged.as_file().sync_all()?;

        if let Some(meta) = existing {
            staged.as_file().set_permissions(meta.permissions())?;
        }

        staged.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Whether a read failure is expected to clear up on its own (file locked by
/// its writer and the like).
pub fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::ResourceBusy
    ) {
        return true;
    }

    // ERROR_SHARING_VIOLATION, ERROR_LOCK_VIOLATION
    cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33))
}

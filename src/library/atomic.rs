//! Crash-safe file replacement and write journals.
//!
//! Every library file is rewritten by writing the full new content to a
//! temporary file in the same directory, syncing it and renaming it over the
//! target. A [`Journal`] remembers what each touched path held before, so a
//! multi-file operation can be undone as a unit.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{LibraryError, Result};

fn write_failure(path: &Path, source: io::Error) -> LibraryError {
    LibraryError::WriteFailure { path: path.to_path_buf(), source }
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    write_atomic_with(path, |writer| writer.write_all(bytes))
}

/// Replaces `path` with whatever `fill` writes. On any error the target is
/// left untouched and the temp file is removed.
pub fn write_atomic_with<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir).map_err(|e| write_failure(path, e))?;
    {
        let file = temp.as_file_mut();
        #[cfg(test)]
        let result = match fault::take() {
            Some(limit) => fill(&mut fault::FailingWriter { inner: file, remaining: limit }),
            None => fill(file),
        };
        #[cfg(not(test))]
        let result = fill(file);
        result.map_err(|e| write_failure(path, e))?;
    }
    temp.as_file().sync_all().map_err(|e| write_failure(path, e))?;
    temp.persist(path).map_err(|e| write_failure(path, e.error))?;

    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Undo log for a group of file writes.
///
/// Dropping an uncommitted journal restores every recorded path.
#[derive(Debug, Default)]
pub struct Journal {
    files: Vec<(PathBuf, Option<Vec<u8>>)>,
    dirs: Vec<PathBuf>,
    committed: bool,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }

    /// Records the current content of `path` the first time it is touched.
    fn remember(&mut self, path: &Path) -> Result<()> {
        if self.files.iter().any(|(p, _)| p == path) {
            return Ok(());
        }
        let prior = match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(source) => return Err(LibraryError::ReadFailure { path: path.to_path_buf(), source }.into()),
        };
        self.files.push((path.to_path_buf(), prior));
        Ok(())
    }

    pub fn write(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        self.remember(path)?;
        write_atomic(path, bytes)
    }

    pub fn remove_file(&mut self, path: &Path) -> Result<bool> {
        if !path.exists() {
            return Ok(false);
        }
        self.remember(path)?;
        fs::remove_file(path).map_err(|e| write_failure(path, e))?;
        Ok(true)
    }

    /// Creates `dir` if needed; only a directory this journal created is
    /// removed again on rollback.
    pub fn create_dir(&mut self, dir: &Path) -> Result<bool> {
        if dir.is_dir() {
            return Ok(false);
        }
        fs::create_dir_all(dir).map_err(|e| write_failure(dir, e))?;
        self.dirs.push(dir.to_path_buf());
        Ok(true)
    }

    pub fn commit(mut self) {
        self.committed = true;
    }

    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;

        for (path, prior) in self.files.drain(..).rev() {
            let restored = match prior {
                Some(bytes) => write_atomic(&path, &bytes).map_err(|e| e.to_string()),
                None if path.exists() => fs::remove_file(&path).map_err(|e| e.to_string()),
                None => Ok(()),
            };
            match restored {
                Ok(()) => log::debug!("Rolled back {}", path.display()),
                Err(e) => log::error!("Failed to roll back {}: {}", path.display(), e),
            }
        }
        for dir in self.dirs.drain(..).rev() {
            if let Err(e) = fs::remove_dir_all(&dir) {
                if e.kind() != io::ErrorKind::NotFound {
                    log::error!("Failed to remove {}: {}", dir.display(), e);
                }
            }
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        if !self.committed && !self.is_empty() {
            log::warn!("Rolling back {} uncommitted file change(s)", self.files.len() + self.dirs.len());
        }
        self.undo();
    }
}

/// Write fault injection for tests: the next atomic write on this thread
/// fails after the given number of bytes.
#[cfg(test)]
pub(crate) mod fault {
    use std::cell::Cell;
    use std::io::{self, Write};

    thread_local! {
        static FAIL_AFTER: Cell<Option<usize>> = const { Cell::new(None) };
    }

    pub(crate) fn fail_next_write_after(bytes: usize) {
        FAIL_AFTER.with(|cell| cell.set(Some(bytes)));
    }

    pub(super) fn take() -> Option<usize> {
        FAIL_AFTER.with(|cell| cell.take())
    }

    pub(super) struct FailingWriter<'a, W: Write> {
        pub(super) inner: &'a mut W,
        pub(super) remaining: usize,
    }

    impl<W: Write> Write for FailingWriter<'_, W> {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.remaining == 0 {
                return Err(io::Error::other("injected write failure"));
            }
            let n = buf.len().min(self.remaining);
            let written = self.inner.write(&buf[..n])?;
            self.remaining -= written;
            Ok(written)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.inner.flush()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_write_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.kicad_sym");
        fs::write(&path, "original").unwrap();

        fault::fail_next_write_after(3);
        let err = write_atomic(&path, b"replacement content").unwrap_err();
        assert!(err.to_string().contains("Failed to write"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "original");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1, "temp file left behind");
    }

    #[test]
    fn dropped_journal_restores_everything() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("a.txt");
        fs::write(&existing, "before").unwrap();
        let sub = dir.path().join("new.pretty");

        {
            let mut journal = Journal::new();
            journal.write(&existing, b"after").unwrap();
            journal.create_dir(&sub).unwrap();
            journal.write(&sub.join("x.kicad_mod"), b"(footprint)").unwrap();
            assert_eq!(fs::read_to_string(&existing).unwrap(), "after");
        }

        assert_eq!(fs::read_to_string(&existing).unwrap(), "before");
        assert!(!sub.exists());
    }

    #[test]
    fn committed_journal_keeps_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        let mut journal = Journal::new();
        journal.write(&path, b"one").unwrap();
        journal.write(&path, b"two").unwrap();
        journal.commit();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two");
    }
}

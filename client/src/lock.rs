//! Cross-process ownership of a queue database.
//!
//! Only one process may drain or recover a queue file at a time. The owner
//! holds an exclusive lock on a sidecar `<database>.lock` file for as long as
//! its store is open; the OS releases it if the process dies.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, StoreError};

#[derive(Debug)]
pub struct QueueLock {
    file: File,
    path: PathBuf,
}

impl QueueLock {
    /// Take the lock for `database`, failing with [`StoreError::Locked`] if
    /// another owner holds it.
    pub fn acquire(database: &Path) -> Result<Self> {
        let path = lock_path(database);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            return Err(StoreError::Locked(path));
        }

        // PID is informational only
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;

        tracing::debug!(path = %path.display(), "Acquired queue lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for QueueLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release queue lock");
        }
    }
}

/// Sidecar lock file next to `database`.
pub fn lock_path(database: &Path) -> PathBuf {
    let mut name = database.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_path_is_a_sidecar() {
        assert_eq!(
            lock_path(Path::new("/data/queue.db")),
            PathBuf::from("/data/queue.db.lock")
        );
    }

    #[test]
    fn test_second_owner_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("queue.db");

        let first = QueueLock::acquire(&db).unwrap();
        match QueueLock::acquire(&db) {
            Err(StoreError::Locked(path)) => assert_eq!(path.as_path(), first.path()),
            other => panic!("expected Locked, got {:?}", other),
        }

        drop(first);
        assert!(QueueLock::acquire(&db).is_ok());
    }
}

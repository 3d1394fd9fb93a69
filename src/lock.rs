//! Named exclusive process lock.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use fs2::FileExt;

use crate::error::{Error, Result};

/// An exclusive lock backed by a lockfile. `acquire` fails immediately if
/// another process already holds it; `release` is idempotent.
pub struct ProcessLock {
    path: PathBuf,
    file: Option<File>,
}

impl ProcessLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn acquire(&mut self, name: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.path)?;

        file.try_lock_exclusive()
            .map_err(|_| Error::Lock(format!("lock '{}' is already held", name)))?;

        self.file = Some(file);
        Ok(())
    }

    /// Silently succeeds if the lock was never acquired or was already
    /// released — unlocking is idempotent.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_fails_while_first_holds_it() {
        let dir = std::env::temp_dir().join(format!("carver-lock-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("block.lock");

        let mut first = ProcessLock::new(path.clone());
        first.acquire("block").unwrap();

        let mut second = ProcessLock::new(path.clone());
        assert!(second.acquire("block").is_err());

        first.release();
        let mut third = ProcessLock::new(path);
        assert!(third.acquire("block").is_ok());
    }
}

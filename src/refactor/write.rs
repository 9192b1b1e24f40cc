// Per-path mutual exclusion for disk writes

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::compiler::csharp::loader::normalize_path;
use crate::compiler::path_key;
use crate::error::RefactorError;

static GLOBAL: Lazy<Arc<FileWriteCoordinator>> = Lazy::new(|| Arc::new(FileWriteCoordinator::new()));

/// Lock table keyed by absolute, case-insensitive path
#[derive(Default)]
pub struct FileWriteCoordinator {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileWriteCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide table shared by every refactoring context
    pub fn global() -> Arc<Self> {
        GLOBAL.clone()
    }

    pub fn absolute(path: &Path) -> PathBuf {
        if path.is_absolute() {
            normalize_path(path)
        } else {
            let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
            normalize_path(&base.join(path))
        }
    }

    pub fn lock_key(path: &Path) -> String {
        path_key(&Self::absolute(path))
    }

    #[cfg(test)]
    pub fn tracked_paths(&self) -> usize {
        self.locks.len()
    }

    async fn acquire(&self, path: &Path) -> PathLock<'_> {
        let key = Self::lock_key(path);
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        PathLock {
            table: self,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Fails with `StaleDocument` unless the file still holds `expected`
    async fn ensure_unchanged(path: &Path, expected: &str) -> Result<(), RefactorError> {
        let current = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| RefactorError::io(path, e))?;
        if current != expected {
            return Err(RefactorError::StaleDocument {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    /// Replace a file's text, provided nobody changed it since `expected` was read
    pub async fn replace(&self, path: &Path, expected: &str, contents: &str) -> Result<(), RefactorError> {
        let _guard = self.acquire(path).await;
        Self::ensure_unchanged(path, expected).await?;
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| RefactorError::io(path, e))?;
        debug!("Replaced {}", path.display());
        Ok(())
    }

    /// Delete a file, provided it still holds `expected`
    pub async fn remove(&self, path: &Path, expected: &str) -> Result<(), RefactorError> {
        let _guard = self.acquire(path).await;
        Self::ensure_unchanged(path, expected).await?;
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| RefactorError::io(path, e))?;
        debug!("Deleted {}", path.display());
        Ok(())
    }

    /// Create a new file; fails if it already exists
    pub async fn create(&self, path: &Path, contents: &str) -> Result<(), RefactorError> {
        let _guard = self.acquire(path).await;
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(RefactorError::io(
                path,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "file already exists"),
            ));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RefactorError::io(parent, e))?;
        }
        tokio::fs::write(path, contents)
            .await
            .map_err(|e| RefactorError::io(path, e))?;
        debug!("Created {}", path.display());
        Ok(())
    }

    /// Rename a file, holding both locks in key order
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), RefactorError> {
        let (from_key, to_key) = (Self::lock_key(from), Self::lock_key(to));
        let _guards = if from_key == to_key {
            (self.acquire(from).await, None)
        } else if from_key < to_key {
            let first = self.acquire(from).await;
            (first, Some(self.acquire(to).await))
        } else {
            let first = self.acquire(to).await;
            (first, Some(self.acquire(from).await))
        };

        if from_key != to_key && tokio::fs::try_exists(to).await.unwrap_or(false) {
            return Err(RefactorError::io(
                to,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target file already exists"),
            ));
        }
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RefactorError::io(parent, e))?;
        }
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| RefactorError::io(from, e))?;
        debug!("Moved {} -> {}", from.display(), to.display());
        Ok(())
    }
}

/// Held lock on one path; the table entry goes away with its last holder
struct PathLock<'a> {
    table: &'a FileWriteCoordinator,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PathLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.table
            .locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn test_lock_keys_are_case_and_separator_insensitive() {
        assert_eq!(
            FileWriteCoordinator::lock_key(Path::new("/Repo/Src/../Src/Order.cs")),
            FileWriteCoordinator::lock_key(Path::new("/repo/src/ORDER.cs"))
        );
        assert_ne!(
            FileWriteCoordinator::lock_key(Path::new("/repo/a.cs")),
            FileWriteCoordinator::lock_key(Path::new("/repo/b.cs"))
        );
    }

    #[tokio::test]
    async fn test_same_path_shares_one_lock() {
        let dir = tempdir().unwrap();
        let coordinator = Arc::new(FileWriteCoordinator::new());
        let path = dir.path().join("Order.cs");

        let guard = coordinator.acquire(&path).await;
        let other = coordinator.clone();
        let upper = dir.path().join("ORDER.cs");
        let pending = tokio::spawn(async move { other.acquire(&upper).await; });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());
        assert_eq!(coordinator.tracked_paths(), 1);
        drop(guard);
        pending.await.unwrap();
        assert_eq!(coordinator.tracked_paths(), 0);
    }

    #[tokio::test]
    async fn test_lock_table_does_not_grow() {
        let dir = tempdir().unwrap();
        let coordinator = FileWriteCoordinator::new();
        for i in 0..10 {
            let path = dir.path().join(format!("File{}.cs", i));
            coordinator.create(&path, "class A { }").await.unwrap();
            coordinator.replace(&path, "class A { }", "class B { }").await.unwrap();
        }
        assert_eq!(coordinator.tracked_paths(), 0);
    }

    #[tokio::test]
    async fn test_replace_refuses_changed_file() {
        let dir = tempdir().unwrap();
        let coordinator = FileWriteCoordinator::new();
        let path = dir.path().join("Order.cs");
        std::fs::write(&path, "class Order { }\n// local edit\n").unwrap();

        let outcome = coordinator.replace(&path, "class Order { }\n", "class Sale { }\n").await;
        assert!(matches!(outcome, Err(RefactorError::StaleDocument { .. })));
        assert!(matches!(
            coordinator.remove(&path, "class Order { }\n").await,
            Err(RefactorError::StaleDocument { .. })
        ));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "class Order { }\n// local edit\n");

        coordinator
            .replace(&path, "class Order { }\n// local edit\n", "class Sale { }\n")
            .await
            .unwrap();
        coordinator.remove(&path, "class Sale { }\n").await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_write_create_move_delete() {
        let dir = tempdir().unwrap();
        let coordinator = FileWriteCoordinator::new();
        let path = dir.path().join("Models").join("Order.cs");

        coordinator.create(&path, "class Order { }").await.unwrap();
        assert!(coordinator.create(&path, "again").await.is_err());

        coordinator
            .replace(&path, "class Order { }", "class Order { int Id; }")
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "class Order { int Id; }");

        let moved = dir.path().join("Sales").join("Order.cs");
        coordinator.rename(&path, &moved).await.unwrap();
        assert!(!path.exists());
        assert!(moved.exists());

        coordinator.remove(&moved, "class Order { int Id; }").await.unwrap();
        assert!(!moved.exists());
        assert!(matches!(
            coordinator.remove(&moved, "class Order { int Id; }").await,
            Err(RefactorError::Io { .. })
        ));
    }
}

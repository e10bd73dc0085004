//! # Offset store
//!
//! Durable monotonic cursor over `(segment_id, position)`.
//!
//! The in-memory cursor answers the reader's skip filter without awaiting;
//! durability is delegated to an injectable [`OffsetBackend`]. After
//! [`OffsetStore::mark`] returns, a subsequent process start observes at
//! least that value.
//!
//! ## Backends
//!
//! | Backend | Use case |
//! |---------|----------|
//! | [`MemoryOffsetBackend`] | Testing, ephemeral runs |
//! | [`FileOffsetBackend`] | Single-node production |
//!
//! The file backend persists a single line `segmentId:position` written
//! atomically (write-temp + rename).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{CdcError, Result};
use crate::position::CommitLogPosition;

/// Pluggable durability for the offset cursor.
#[async_trait]
pub trait OffsetBackend: Send + Sync {
    /// Read the persisted cursor, or `None` when nothing was ever marked.
    async fn load(&self) -> Result<Option<CommitLogPosition>>;

    /// Persist the cursor. Must be atomic: a crash mid-save leaves either
    /// the previous or the new value readable.
    async fn save(&self, position: CommitLogPosition) -> Result<()>;
}

/// File-backed offset persistence: one line, `segmentId:position`.
pub struct FileOffsetBackend {
    path: PathBuf,
    fsync: bool,
}

impl FileOffsetBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fsync: true,
        }
    }

    pub fn with_fsync(mut self, fsync: bool) -> Self {
        self.fsync = fsync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OffsetBackend for FileOffsetBackend {
    async fn load(&self) -> Result<Option<CommitLogPosition>> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => {
                let position = contents.trim().parse::<CommitLogPosition>()?;
                Ok(Some(position))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CdcError::offset_persist(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    async fn save(&self, position: CommitLogPosition) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CdcError::offset_persist(e.to_string()))?;
        }
        let temp_path = self.path.with_extension("tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await
            .map_err(|e| CdcError::offset_persist(e.to_string()))?;
        file.write_all(position.to_string().as_bytes())
            .await
            .map_err(|e| CdcError::offset_persist(e.to_string()))?;
        if self.fsync {
            file.sync_all()
                .await
                .map_err(|e| CdcError::offset_persist(e.to_string()))?;
        }
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| CdcError::offset_persist(e.to_string()))?;
        debug!("Persisted offset {} to {}", position, self.path.display());
        Ok(())
    }
}

/// In-memory offset backend (for testing or when persistence isn't needed).
#[derive(Debug, Default)]
pub struct MemoryOffsetBackend {
    position: Mutex<Option<CommitLogPosition>>,
}

impl MemoryOffsetBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetBackend for MemoryOffsetBackend {
    async fn load(&self) -> Result<Option<CommitLogPosition>> {
        Ok(*self.position.lock().expect("offset lock poisoned"))
    }

    async fn save(&self, position: CommitLogPosition) -> Result<()> {
        *self.position.lock().expect("offset lock poisoned") = Some(position);
        Ok(())
    }
}

/// Monotonic offset cursor shared by the skip filter and the delivery loop.
///
/// `load` is cheap and callable from any task; `mark` persists through the
/// backend before advancing the in-memory cursor, so the cursor never runs
/// ahead of durable state.
pub struct OffsetStore {
    current: Mutex<CommitLogPosition>,
    backend: Arc<dyn OffsetBackend>,
}

impl OffsetStore {
    /// Open the store, seeding the cursor from the backend.
    pub async fn open(backend: Arc<dyn OffsetBackend>) -> Result<Self> {
        let initial = backend.load().await?.unwrap_or_default();
        info!("Offset store opened at {}", initial);
        Ok(Self {
            current: Mutex::new(initial),
            backend,
        })
    }

    /// Current cursor value.
    pub fn load(&self) -> CommitLogPosition {
        *self.current.lock().expect("offset lock poisoned")
    }

    /// Advance the cursor to `max(current, position)`.
    ///
    /// A failed persist leaves the cursor unchanged and surfaces
    /// [`CdcError::OffsetPersist`]; the caller treats the mutation as
    /// unacknowledged.
    pub async fn mark(&self, position: CommitLogPosition) -> Result<()> {
        if position <= self.load() {
            return Ok(());
        }
        self.backend.save(position).await?;
        let mut current = self.current.lock().expect("offset lock poisoned");
        if position > *current {
            *current = position;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryOffsetBackend::new();
        assert_eq!(backend.load().await.unwrap(), None);

        backend.save(CommitLogPosition::new(7, 100)).await.unwrap();
        assert_eq!(
            backend.load().await.unwrap(),
            Some(CommitLogPosition::new(7, 100))
        );
    }

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offset.dat");
        let backend = FileOffsetBackend::new(&path);

        assert_eq!(backend.load().await.unwrap(), None);
        backend.save(CommitLogPosition::new(42, 1187)).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw, "42:1187");

        // simulates restart
        let backend2 = FileOffsetBackend::new(&path);
        assert_eq!(
            backend2.load().await.unwrap(),
            Some(CommitLogPosition::new(42, 1187))
        );
    }

    #[tokio::test]
    async fn test_file_backend_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offset.dat");
        let backend = FileOffsetBackend::new(&path);
        backend.save(CommitLogPosition::new(1, 1)).await.unwrap();
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_store_is_monotonic() {
        let store = OffsetStore::open(Arc::new(MemoryOffsetBackend::new()))
            .await
            .unwrap();

        store.mark(CommitLogPosition::new(5, 10)).await.unwrap();
        assert_eq!(store.load(), CommitLogPosition::new(5, 10));

        // marking backwards is a no-op
        store.mark(CommitLogPosition::new(4, 999)).await.unwrap();
        assert_eq!(store.load(), CommitLogPosition::new(5, 10));

        store.mark(CommitLogPosition::new(5, 11)).await.unwrap();
        assert_eq!(store.load(), CommitLogPosition::new(5, 11));
    }

    #[tokio::test]
    async fn test_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("offset.dat");

        {
            let store = OffsetStore::open(Arc::new(FileOffsetBackend::new(&path)))
                .await
                .unwrap();
            store.mark(CommitLogPosition::new(9, 512)).await.unwrap();
        }

        let store = OffsetStore::open(Arc::new(FileOffsetBackend::new(&path)))
            .await
            .unwrap();
        assert_eq!(store.load(), CommitLogPosition::new(9, 512));
    }

    struct FailingBackend;

    #[async_trait]
    impl OffsetBackend for FailingBackend {
        async fn load(&self) -> Result<Option<CommitLogPosition>> {
            Ok(None)
        }

        async fn save(&self, _position: CommitLogPosition) -> Result<()> {
            Err(CdcError::offset_persist("disk full"))
        }
    }

    #[tokio::test]
    async fn test_failed_persist_does_not_advance_cursor() {
        let store = OffsetStore::open(Arc::new(FailingBackend)).await.unwrap();
        let err = store.mark(CommitLogPosition::new(1, 1)).await.unwrap_err();
        assert!(matches!(err, CdcError::OffsetPersist(_)));
        assert_eq!(store.load(), CommitLogPosition::default());
    }
}

use crate::entities::commerce::LineItem;
use crate::errors::ServiceError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// File name of the persisted cart inside a storage directory.
pub const CART_STORAGE_SLOT: &str = "cart.json";

/// Durable home of the cart between sessions.
#[async_trait]
pub trait CartStorage: Send + Sync {
    /// Returns the stored rows, or an empty list when nothing was saved yet.
    async fn load(&self) -> Result<Vec<LineItem>, ServiceError>;
    async fn save(&self, items: &[LineItem]) -> Result<(), ServiceError>;
}

/// JSON file storage. Writes go to a sibling temp file that is renamed over
/// the target, so a crash never leaves a truncated cart behind.
#[derive(Debug, Clone)]
pub struct FileCartStorage {
    path: PathBuf,
}

impl FileCartStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CART_STORAGE_SLOT))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| CART_STORAGE_SLOT.into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CartStorage for FileCartStorage {
    async fn load(&self) -> Result<Vec<LineItem>, ServiceError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved cart");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&bytes).map_err(|e| {
            ServiceError::StorageError(format!(
                "Saved cart at {} is unreadable: {}",
                self.path.display(),
                e
            ))
        })
    }

    async fn save(&self, items: &[LineItem]) -> Result<(), ServiceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(items)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body).await?;
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), rows = items.len(), "Cart saved");
        Ok(())
    }
}

/// Process-local storage, used by tests and one-shot sessions.
#[derive(Debug, Default)]
pub struct InMemoryCartStorage {
    items: RwLock<Vec<LineItem>>,
}

impl InMemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<LineItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub async fn snapshot(&self) -> Vec<LineItem> {
        self.items.read().await.clone()
    }
}

#[async_trait]
impl CartStorage for InMemoryCartStorage {
    async fn load(&self) -> Result<Vec<LineItem>, ServiceError> {
        Ok(self.items.read().await.clone())
    }

    async fn save(&self, items: &[LineItem]) -> Result<(), ServiceError> {
        *self.items.write().await = items.to_vec();
        Ok(())
    }
}

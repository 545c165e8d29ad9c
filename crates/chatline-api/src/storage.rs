use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid object name: {0}")]
    InvalidName(String),
}

/// Blob storage addressed by a logical prefix (folder) and an object name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` and return the object's public URL.
    async fn store(&self, prefix: &str, name: &str, bytes: &[u8]) -> Result<String, StorageError>;

    async fn exists(&self, prefix: &str, name: &str) -> Result<bool, StorageError>;

    /// Remove an object. Removing a missing object is not an error.
    async fn delete(&self, prefix: &str, name: &str) -> Result<(), StorageError>;

    fn url(&self, prefix: &str, name: &str) -> String;
}

/// Objects rejected here could escape their prefix directory.
fn validate_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Files under `{dir}/{prefix}/{name}`, served publicly at
/// `{public_url}/{prefix}/{name}`.
pub struct LocalDiskStore {
    dir: PathBuf,
    public_url: String,
}

impl LocalDiskStore {
    pub async fn new(dir: PathBuf, public_url: &str) -> Result<Self, StorageError> {
        fs::create_dir_all(&dir).await?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
        })
    }

    fn object_path(&self, prefix: &str, name: &str) -> Result<PathBuf, StorageError> {
        validate_name(prefix)?;
        validate_name(name)?;
        Ok(self.dir.join(prefix).join(name))
    }
}

#[async_trait]
impl ObjectStore for LocalDiskStore {
    async fn store(&self, prefix: &str, name: &str, bytes: &[u8]) -> Result<String, StorageError> {
        let path = self.object_path(prefix, name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&path).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(self.url(prefix, name))
    }

    async fn exists(&self, prefix: &str, name: &str) -> Result<bool, StorageError> {
        let path = match self.object_path(prefix, name) {
            Ok(path) => path,
            Err(StorageError::InvalidName(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        Ok(fs::try_exists(&path).await?)
    }

    async fn delete(&self, prefix: &str, name: &str) -> Result<(), StorageError> {
        let path = self.object_path(prefix, name)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}/{}", prefix, name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{}/{} already gone", prefix, name);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn url(&self, prefix: &str, name: &str) -> String {
        format!("{}/{}/{}", self.public_url, prefix, name)
    }
}

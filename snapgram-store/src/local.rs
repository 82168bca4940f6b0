use crate::{ObjectStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Keeps objects as plain files below a base directory.
#[derive(Clone, Debug)]
pub struct LocalStore {
    base_dir: PathBuf,
}

impl LocalStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let safe = !key.is_empty()
            && !key.starts_with('/')
            && key
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != ".." && !part.contains('\\'));

        if safe {
            Ok(self.base_dir.join(key))
        } else {
            Err(StoreError::InvalidKey(key.to_owned()))
        }
    }
}

fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        key: key.to_owned(),
        source,
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(key))?;
        }
        tokio::fs::write(&path, &data).await.map_err(io_error(key))?;

        debug!(key, bytes = data.len(), "Stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_owned())),
            Err(e) => Err(io_error(key)(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(key, "Deleted object");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(key)(e)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve(key)?;
        tokio::fs::try_exists(&path).await.map_err(io_error(key))
    }
}

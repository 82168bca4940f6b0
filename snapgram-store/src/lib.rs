//! Storage for uploaded pictures.

mod local;

pub use local::LocalStore;

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Object key is not a safe relative path: {0:?}")]
    InvalidKey(String),
    #[error("Object store I/O failed for {key}: {source}")]
    Io { key: String, source: io::Error },
}

/// A store for opaque blobs keyed by relative, `/`-separated paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write (create or overwrite) an object.
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError>;

    /// Read an object. Returns [`StoreError::NotFound`] if absent.
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// Read an object, returning `None` if it does not exist.
    async fn get_opt(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        match self.get(key).await {
            Ok(data) => Ok(Some(data)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete an object. No-op if absent.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.get_opt(key).await?.is_some())
    }
}

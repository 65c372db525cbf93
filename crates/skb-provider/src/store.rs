// SPDX-License-Identifier: MIT OR Apache-2.0
//! Persistence seams.
//!
//! The core persists nothing itself. Attachment bytes go through a
//! [`BlobStore`] keyed by opaque strings, and the source-id → target-id
//! table a load produces goes through [`IdMapping`]. Production deployments
//! back these with an object store and a database; the in-memory
//! implementations here serve tests and dry runs.

use async_trait::async_trait;
use skb_error::{ErrorCategory, ProviderError};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Opaque blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes, returning the key they live under.
    async fn put(
        &self,
        key: Option<String>,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ProviderError>;
    /// Fetch bytes by key.
    async fn get(&self, key: &str) -> Result<Vec<u8>, ProviderError>;
    /// Delete by key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), ProviderError>;
}

/// Source-id → target-id table produced during a load.
#[async_trait]
pub trait IdMapping: Send + Sync {
    /// Record a mapping.
    async fn put(&self, source_id: &str, target_id: &str) -> Result<(), ProviderError>;
    /// Look up the target id for a source id.
    async fn get(&self, source_id: &str) -> Result<Option<String>, ProviderError>;
    /// Every mapping, sorted by source id.
    async fn iterate(&self) -> Result<Vec<(String, String)>, ProviderError>;
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Blob store held in process memory.
#[derive(Default, Clone)]
pub struct InMemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
}

impl InMemoryBlobStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(
        &self,
        key: Option<String>,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, ProviderError> {
        let key = key.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.blobs
            .lock()
            .await
            .insert(key.clone(), (bytes, content_type.to_string()));
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, ProviderError> {
        self.blobs
            .lock()
            .await
            .get(key)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| {
                ProviderError::new(
                    "blob-store",
                    ErrorCategory::NotFound,
                    format!("no blob under key {key:?}"),
                )
            })
    }

    async fn delete(&self, key: &str) -> Result<(), ProviderError> {
        self.blobs.lock().await.remove(key);
        Ok(())
    }
}

/// Id-mapping table held in process memory.
#[derive(Default, Clone)]
pub struct InMemoryIdMapping {
    entries: Arc<Mutex<BTreeMap<String, String>>>,
}

impl InMemoryIdMapping {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdMapping for InMemoryIdMapping {
    async fn put(&self, source_id: &str, target_id: &str) -> Result<(), ProviderError> {
        self.entries
            .lock()
            .await
            .insert(source_id.to_string(), target_id.to_string());
        Ok(())
    }

    async fn get(&self, source_id: &str) -> Result<Option<String>, ProviderError> {
        Ok(self.entries.lock().await.get(source_id).cloned())
    }

    async fn iterate(&self) -> Result<Vec<(String, String)>, ProviderError> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

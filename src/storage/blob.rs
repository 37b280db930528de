//! Remote blob staging for the background transcription path.
//!
//! Long clips are uploaded to object storage so the provider's job API can
//! reference them by URI. Every upload is paired with exactly one delete via
//! [`BlobLease`]: normal paths release explicitly, and if the request task is
//! cancelled first, the lease's drop spawns the delete so the blob is still
//! removed. A leaked blob is unbounded storage growth, so this pairing is a
//! correctness requirement, not best effort.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::ProcessingError;

/// Stable reference to an uploaded object, usable as job input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobRef(pub String);

impl BlobRef {
    pub fn uri(&self) -> &str {
        &self.0
    }
}

/// Capability interface over remote object storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Uploads a local file, returning a stable reference.
    async fn upload(&self, path: &Path) -> anyhow::Result<BlobRef>;

    /// Removes the remote object. Idempotent: deleting an already-deleted or
    /// never-created blob is not an error.
    async fn delete(&self, blob: &BlobRef) -> anyhow::Result<()>;

    /// Whether the object currently exists.
    async fn exists(&self, blob: &BlobRef) -> anyhow::Result<bool>;
}

/// Scoped ownership of one uploaded blob for the lifetime of one job.
pub struct BlobLease {
    store: Arc<dyn BlobStore>,
    blob: BlobRef,
    released: bool,
}

impl BlobLease {
    /// Uploads the file and takes ownership of the resulting blob.
    ///
    /// # Errors
    /// - [`ProcessingError::BlobStore`] if the upload fails
    pub async fn acquire(store: Arc<dyn BlobStore>, path: &Path) -> Result<Self, ProcessingError> {
        let blob = store
            .upload(path)
            .await
            .map_err(|e| ProcessingError::BlobStore(format!("{e:#}")))?;
        tracing::debug!(blob = blob.uri(), "Blob uploaded");
        Ok(Self {
            store,
            blob,
            released: false,
        })
    }

    pub fn blob(&self) -> &BlobRef {
        &self.blob
    }

    /// Deletes the blob. A delete failure is logged, never propagated, so it
    /// cannot mask the outcome of the job it was staged for.
    pub async fn release(mut self) {
        if let Err(e) = self.store.delete(&self.blob).await {
            tracing::warn!(blob = self.blob.uri(), "Failed to delete blob: {e:#}");
        } else {
            tracing::debug!(blob = self.blob.uri(), "Blob deleted");
        }
        // Marked released only once the delete call has returned. If this
        // future is dropped mid-delete, the drop backstop re-issues the
        // delete; the store's delete is idempotent, so a duplicate is fine.
        self.released = true;
    }
}

impl Drop for BlobLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Reached only when the owning task was cancelled before release.
        let store = Arc::clone(&self.store);
        let blob = self.blob.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = store.delete(&blob).await {
                    tracing::warn!(blob = blob.uri(), "Failed to delete blob on cancel: {e:#}");
                }
            });
        } else {
            tracing::error!(blob = self.blob.uri(), "Blob leaked: no runtime to delete on");
        }
    }
}

//! Photo persistence: a binary store plus a metadata record store.
//!
//! [`PhotoStore`] composes the two backends and owns the rules that span
//! them: storage key layout, newest-first listing with public URLs, and the
//! compensating delete when a metadata write fails after the binary landed.

use crate::types::{OwnerId, Photo, Relationship};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Extension used when the original file name carries no usable one.
const FALLBACK_EXTENSION: &str = "bin";
const MAX_EXTENSION_LEN: usize = 8;

/// Failure reported by a storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("failed to store image: {0}")]
    BlobWrite(String),
    #[error("failed to save photo details: {0}")]
    MetadataWrite(String),
    #[error("failed to save photo details: {cause}; stored image {key} could not be removed: {cleanup}")]
    OrphanedBlob {
        key: String,
        cause: String,
        cleanup: String,
    },
    #[error("failed to load photos: {0}")]
    Query(String),
    #[error("failed to delete image: {0}")]
    BlobDelete(String),
    #[error("failed to delete photo details: {0}")]
    MetadataDelete(String),
    #[error("photo {0} not found")]
    NotFound(Uuid),
}

/// Object storage for image binaries.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), BackendError>;

    /// Remove a binary. Removing a key that does not exist succeeds.
    async fn remove(&self, key: &str) -> Result<(), BackendError>;

    /// Public URL under which the binary for `key` is served.
    fn public_url(&self, key: &str) -> String;
}

/// Metadata row for a stored photo.
#[derive(Debug, Clone, PartialEq)]
pub struct PhotoRecord {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub person_name: String,
    pub relationship: Relationship,
    pub storage_path: String,
    pub created_at: DateTime<Utc>,
}

/// Metadata for a photo about to be recorded. The backend assigns the id
/// and creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPhotoRecord {
    pub owner_id: OwnerId,
    pub person_name: String,
    pub relationship: Relationship,
    pub storage_path: String,
}

/// Relational storage for photo metadata.
#[async_trait]
pub trait PhotoRecords: Send + Sync {
    async fn insert(&self, record: NewPhotoRecord) -> Result<PhotoRecord, BackendError>;

    /// All records owned by `owner`, newest first.
    async fn list(&self, owner: OwnerId) -> Result<Vec<PhotoRecord>, BackendError>;

    async fn find(&self, owner: OwnerId, id: Uuid) -> Result<Option<PhotoRecord>, BackendError>;

    /// Returns `false` when no matching record existed.
    async fn delete(&self, owner: OwnerId, id: Uuid) -> Result<bool, BackendError>;
}

/// An accepted image plus the details collected for it.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub file_name: String,
    pub image: Arc<[u8]>,
    pub person_name: String,
    pub relationship: Relationship,
}

/// Photo store adapter over a [`BlobStore`] and a [`PhotoRecords`] backend.
#[derive(Clone)]
pub struct PhotoStore {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn PhotoRecords>,
}

impl PhotoStore {
    pub fn new(blobs: Arc<dyn BlobStore>, records: Arc<dyn PhotoRecords>) -> Self {
        Self { blobs, records }
    }

    /// Store the binary, then its metadata record.
    ///
    /// If the record cannot be written the binary is removed again; when that
    /// removal fails too the error names the orphaned key.
    pub async fn save(&self, owner: OwnerId, upload: &NewUpload) -> Result<Photo, StoreError> {
        let key = storage_key(owner, &upload.file_name);

        self.blobs
            .put(&key, &upload.image)
            .await
            .map_err(|e| StoreError::BlobWrite(e.0))?;
        tracing::debug!(owner = %owner, key = %key, bytes = upload.image.len(), "image stored");

        let record = NewPhotoRecord {
            owner_id: owner,
            person_name: upload.person_name.clone(),
            relationship: upload.relationship,
            storage_path: key.clone(),
        };

        match self.records.insert(record).await {
            Ok(record) => {
                tracing::info!(owner = %owner, photo = %record.id, "photo saved");
                Ok(self.to_photo(record))
            }
            Err(cause) => {
                tracing::warn!(owner = %owner, key = %key, error = %cause, "metadata write failed; removing stored image");
                match self.blobs.remove(&key).await {
                    Ok(()) => Err(StoreError::MetadataWrite(cause.0)),
                    Err(cleanup) => {
                        tracing::error!(owner = %owner, key = %key, error = %cleanup, "stored image orphaned");
                        Err(StoreError::OrphanedBlob {
                            key,
                            cause: cause.0,
                            cleanup: cleanup.0,
                        })
                    }
                }
            }
        }
    }

    /// All photos owned by `owner`, newest first.
    pub async fn list(&self, owner: OwnerId) -> Result<Vec<Photo>, StoreError> {
        let records = self
            .records
            .list(owner)
            .await
            .map_err(|e| StoreError::Query(e.0))?;
        Ok(records.into_iter().map(|r| self.to_photo(r)).collect())
    }

    pub async fn find(&self, owner: OwnerId, id: Uuid) -> Result<Option<Photo>, StoreError> {
        let record = self
            .records
            .find(owner, id)
            .await
            .map_err(|e| StoreError::Query(e.0))?;
        Ok(record.map(|r| self.to_photo(r)))
    }

    /// Remove the binary, then the metadata record.
    ///
    /// Not atomic: if the record delete fails the binary is already gone, and
    /// retrying is safe because removing an absent binary succeeds.
    pub async fn delete(&self, photo: &Photo) -> Result<(), StoreError> {
        self.blobs
            .remove(&photo.storage_path)
            .await
            .map_err(|e| StoreError::BlobDelete(e.0))?;

        let existed = self
            .records
            .delete(photo.owner_id, photo.id)
            .await
            .map_err(|e| StoreError::MetadataDelete(e.0))?;
        if !existed {
            return Err(StoreError::NotFound(photo.id));
        }

        tracing::info!(owner = %photo.owner_id, photo = %photo.id, "photo deleted");
        Ok(())
    }

    fn to_photo(&self, record: PhotoRecord) -> Photo {
        Photo {
            url: self.blobs.public_url(&record.storage_path),
            id: record.id,
            owner_id: record.owner_id,
            person_name: record.person_name,
            relationship: record.relationship,
            storage_path: record.storage_path,
            created_at: record.created_at,
        }
    }
}

/// `{owner}/{random token}.{ext}`: namespaced by owner, 128 random bits.
pub fn storage_key(owner: OwnerId, file_name: &str) -> String {
    let token: u128 = rand::random();
    format!("{owner}/{token:032x}.{}", file_extension(file_name))
}

/// Lowercase extension of `file_name`, or [`FALLBACK_EXTENSION`].
pub fn file_extension(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

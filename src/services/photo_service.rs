//! src/services/photo_service.rs
//!
//! PhotoService: the upload → label → persist workflow plus retrieval.
//! Every collaborator is handed in at construction time and shared behind
//! `Arc`, so the service is cheap to clone into axum state.

use crate::{
    config::LabelPolicy,
    models::{
        label::{FeatureType, join_labels, label_count},
        photo::Photo,
    },
    services::{
        label_service::{LabelError, LabelService},
        object_store::{ByteStream, ObjectStore, StorageError, write_stream},
        photo_repository::{PhotoRepository, RepositoryError},
    },
};
use bytes::{Bytes, BytesMut};
use futures::{Stream, TryStreamExt};
use std::{io, sync::Arc};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("storing image failed: {0}")]
    Storage(#[from] StorageError),
    #[error("label detection failed: {0}")]
    Label(#[from] LabelError),
    #[error("saving photo metadata failed: {0}")]
    Metadata(#[from] RepositoryError),
}

#[derive(Clone)]
pub struct PhotoService {
    store: Arc<dyn ObjectStore>,
    labels: Arc<dyn LabelService>,
    repo: Arc<dyn PhotoRepository>,
    bucket: String,
    label_policy: LabelPolicy,
}

impl PhotoService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        labels: Arc<dyn LabelService>,
        repo: Arc<dyn PhotoRepository>,
        bucket: impl Into<String>,
        label_policy: LabelPolicy,
    ) -> Self {
        Self {
            store,
            labels,
            repo,
            bucket: bucket.into(),
            label_policy,
        }
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn repository(&self) -> &dyn PhotoRepository {
        self.repo.as_ref()
    }

    /// Object key for the bytes of photo `id`.
    fn object_key(&self, id: &str) -> String {
        format!("{}/{}", self.bucket, id)
    }

    /// Store an uploaded image, label it and register its metadata.
    ///
    /// The record is only written once the bytes are committed. A failure
    /// after the commit leaves the object in place.
    pub async fn upload<S>(&self, stream: S) -> Result<Photo, UploadError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let id = Uuid::new_v4().to_string();
        let target = self.store.writable(&self.object_key(&id))?;

        let mut payload = BytesMut::new();
        let size = write_stream(
            target.as_ref(),
            stream.inspect_ok(|chunk| payload.extend_from_slice(chunk)),
        )
        .await?;

        let label = self.detect_labels(&id, &payload).await?;
        let photo = self.repo.save(Photo::uploaded(id, label)).await?;

        info!(
            id = %photo.id,
            size_bytes = size,
            label_count = label_count(&photo.label),
            "photo uploaded"
        );
        Ok(photo)
    }

    async fn detect_labels(&self, id: &str, image: &[u8]) -> Result<String, UploadError> {
        if image.is_empty() {
            return Ok(String::new());
        }

        match self.labels.analyze(image, FeatureType::LabelDetection).await {
            Ok(annotations) => Ok(join_labels(&annotations)),
            Err(err) => match self.label_policy {
                LabelPolicy::Strict => Err(UploadError::Label(err)),
                LabelPolicy::Lenient => {
                    warn!(id = %id, error = %err, "label detection failed, storing empty label");
                    Ok(String::new())
                }
            },
        }
    }

    /// Persist a caller-supplied record as is.
    pub async fn create(&self, photo: Photo) -> Result<Photo, RepositoryError> {
        self.repo.save(photo).await
    }

    pub async fn find(&self, id: &str) -> Result<Option<Photo>, RepositoryError> {
        self.repo.find_by_id(id).await
    }

    /// Open the stored bytes for `id`, or `None` when nothing is stored.
    ///
    /// Looks only at the object store. Ids that cannot form a valid key are
    /// treated as missing.
    pub async fn open_image(&self, id: &str) -> Result<Option<ByteStream>, StorageError> {
        let readable = match self.store.readable(&self.object_key(id)) {
            Ok(readable) => readable,
            Err(StorageError::InvalidKey(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        if !readable.exists().await? {
            return Ok(None);
        }
        match readable.open().await {
            Ok(stream) => Ok(Some(stream)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

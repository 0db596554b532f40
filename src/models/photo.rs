//! Represents the metadata record for an uploaded photo.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Metadata for a single photo.
///
/// The record never holds the image bytes. Those live in the object store
/// under `<bucket>/<id>`, and `uri` is the HTTP path that serves them back.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
pub struct Photo {
    /// Opaque identifier, generated at upload time.
    pub id: String,

    /// Retrieval path, `/image/{id}` for uploaded photos.
    #[serde(default)]
    pub uri: String,

    /// Comma-joined label descriptions; empty when nothing was detected.
    #[serde(default)]
    pub label: String,
}

impl Photo {
    /// Build the record for a freshly uploaded image.
    ///
    /// The `uri` suffix must equal the id used for the object key, since
    /// retrieval recomputes the key from the id instead of reading `uri`.
    pub fn uploaded(id: impl Into<String>, label: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            uri: image_uri(&id),
            id,
            label: label.into(),
        }
    }
}

/// HTTP path that serves the bytes stored for `id`.
pub fn image_uri(id: &str) -> String {
    format!("/image/{}", id)
}

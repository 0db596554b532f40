//! Label detection backends.
//!
//! The upload workflow only sees [`LabelService`]. [`CloudVisionClient`] talks
//! to the Cloud Vision `images:annotate` endpoint; [`DisabledLabels`] stands in
//! when no API key is configured.

use crate::models::label::{FeatureType, LabelAnnotation, MAX_LABELS};
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("label request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("label API returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("label API error {code}: {message}")]
    Api { code: i32, message: String },
}

pub type LabelResult<T> = Result<T, LabelError>;

#[async_trait]
pub trait LabelService: Send + Sync {
    /// Analyze `image` and return annotations in the backend's ranking order.
    async fn analyze(&self, image: &[u8], feature: FeatureType)
    -> LabelResult<Vec<LabelAnnotation>>;
}

/// Label service used when detection is turned off. Never returns labels.
#[derive(Debug, Default, Clone)]
pub struct DisabledLabels;

#[async_trait]
impl LabelService for DisabledLabels {
    async fn analyze(
        &self,
        _image: &[u8],
        _feature: FeatureType,
    ) -> LabelResult<Vec<LabelAnnotation>> {
        Ok(Vec::new())
    }
}

/// Client for the Cloud Vision REST API.
pub struct CloudVisionClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl CloudVisionClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn annotate_url(&self) -> String {
        format!("{}/v1/images:annotate", self.base_url)
    }
}

#[derive(Serialize)]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Serialize)]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: FeatureType,
    max_results: usize,
}

#[derive(Deserialize, Default)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl LabelService for CloudVisionClient {
    async fn analyze(
        &self,
        image: &[u8],
        feature: FeatureType,
    ) -> LabelResult<Vec<LabelAnnotation>> {
        let request = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: general_purpose::STANDARD.encode(image),
                },
                features: vec![Feature {
                    kind: feature,
                    max_results: MAX_LABELS,
                }],
            }],
        };

        let response = self
            .client
            .post(self.annotate_url())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LabelError::Status { status, body });
        }

        let parsed: AnnotateResponse = response.json().await?;
        let first = parsed.responses.into_iter().next().unwrap_or_default();
        if let Some(err) = first.error {
            return Err(LabelError::Api {
                code: err.code,
                message: err.message,
            });
        }

        Ok(first.label_annotations)
    }
}

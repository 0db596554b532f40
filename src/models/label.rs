//! Label annotations returned by the label service.

use serde::{Deserialize, Serialize};

/// Maximum number of labels copied into `Photo::label`.
pub const MAX_LABELS: usize = 5;

/// Kind of analysis requested from the label service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureType {
    LabelDetection,
}

/// One detected label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelAnnotation {
    /// Knowledge graph id, when the backend provides one.
    #[serde(default)]
    pub mid: Option<String>,

    /// Human readable label text.
    #[serde(default)]
    pub description: String,

    /// Confidence in `[0, 1]`.
    #[serde(default)]
    pub score: f32,

    #[serde(default)]
    pub topicality: f32,
}

impl LabelAnnotation {
    #[cfg(test)]
    pub fn new(description: impl Into<String>, score: f32) -> Self {
        Self {
            mid: None,
            description: description.into(),
            score,
            topicality: score,
        }
    }
}

/// Join the descriptions of the first [`MAX_LABELS`] annotations with `,`.
pub fn join_labels(annotations: &[LabelAnnotation]) -> String {
    annotations
        .iter()
        .take(MAX_LABELS)
        .map(|a| a.description.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// Number of labels in a joined label string.
pub fn label_count(label: &str) -> usize {
    label.split(',').filter(|l| !l.is_empty()).count()
}

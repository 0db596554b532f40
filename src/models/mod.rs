//! Core data models for the photo backend.
//!
//! `Photo` is the metadata record persisted in SQLite and returned as JSON.
//! `LabelAnnotation` is a single label produced by the label service.

pub mod label;
pub mod photo;

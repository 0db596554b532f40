//! HTTP handlers for photo upload, metadata and image retrieval.
//! Uploads are streamed into the object store chunk by chunk; image bodies
//! are streamed back out without buffering.

use crate::{errors::AppError, models::photo::Photo, services::photo_service::PhotoService};
use axum::{
    Json,
    body::Body,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use std::io;
use tokio_util::io::ReaderStream;

/// Multipart field carrying the image.
const FILE_FIELD: &str = "file";

/// `GET /`
pub async fn hello() -> &'static str {
    "hello!"
}

/// `POST /photo`: save a caller-supplied record without touching storage.
pub async fn create_photo(
    State(service): State<PhotoService>,
    payload: Result<Json<Photo>, JsonRejection>,
) -> Result<StatusCode, AppError> {
    let Json(photo) = payload?;
    service.create(photo).await?;
    Ok(StatusCode::OK)
}

/// `GET /photos/{id}`: read a metadata record back.
pub async fn get_photo(
    State(service): State<PhotoService>,
    Path(id): Path<String>,
) -> Result<Json<Photo>, AppError> {
    service
        .find(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("photo `{}` not found", id)))
}

/// `POST /upload`: store, label and register the `file` field.
pub async fn upload_photo(
    State(service): State<PhotoService>,
    mut multipart: Multipart,
) -> Result<Json<Photo>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let stream = field.map_err(io::Error::other);
        let photo = service.upload(stream).await?;
        return Ok(Json(photo));
    }

    Err(AppError::bad_request(format!(
        "missing multipart field `{}`",
        FILE_FIELD
    )))
}

/// `GET /image/{id}`: stream stored bytes, or an empty 404.
pub async fn get_image(
    State(service): State<PhotoService>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let Some(reader) = service.open_image(&id).await? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    let mut response = Response::new(Body::from_stream(ReaderStream::new(reader)));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    Ok(response)
}

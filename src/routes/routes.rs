//! Defines routes for the photo backend.
//!
//! ## Structure
//! - `GET  /`           -> greeting
//! - `POST /photo`      -> save a caller-supplied photo record
//! - `GET  /photos/{id}` -> read a photo record (the record collection path)
//! - `POST /upload`     -> multipart upload (`file` field), returns the new record
//! - `GET  /image/{id}` -> stored image bytes, 404 when absent
//! - `GET  /healthz`, `GET /readyz` -> probes

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        photo_handlers::{create_photo, get_image, get_photo, hello, upload_photo},
    },
    services::photo_service::PhotoService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router; handlers share `PhotoService` as state.
///
/// `max_upload_bytes` caps every request body, uploads included.
pub fn routes(max_upload_bytes: usize) -> Router<PhotoService> {
    Router::new()
        .route("/", get(hello))
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/photo", post(create_photo))
        .route("/photos/{id}", get(get_photo))
        .route("/upload", post(upload_photo))
        .route("/image/{id}", get(get_image))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::LabelPolicy,
        services::{
            label_service::DisabledLabels,
            photo_service::tests::{
                FailingLabels, FailingRepository, Fixture, fixture, service_with, service_with_repo,
            },
        },
    };
    use std::sync::Arc;
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const BOUNDARY: &str = "photo-backend-test-boundary";

    fn app(fx: &Fixture) -> Router {
        routes(1024 * 1024).with_state(fx.service.clone())
    }

    fn multipart_body(field: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"upload.bin\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(field: &str, data: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, data)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn root_greets() {
        let fx = fixture(&[]).await;
        let response = app(&fx).oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, b"hello!");
    }

    #[tokio::test]
    async fn uploaded_image_is_served_back() {
        let fx = fixture(&["text", "font"]).await;
        let app = app(&fx);

        let response = app
            .clone()
            .oneshot(upload_request("file", b"helloworld"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let photo = body_json(response).await;
        let id = photo["id"].as_str().unwrap().to_string();
        assert!(!id.is_empty());
        assert_eq!(photo["uri"], format!("/image/{}", id));
        assert_eq!(photo["label"], "text,font");

        let response = app
            .oneshot(get(photo["uri"].as_str().unwrap()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/octet-stream"
        );
        assert_eq!(body_bytes(response).await, b"helloworld");
    }

    #[tokio::test]
    async fn upload_label_holds_at_most_five_entries() {
        let fx = fixture(&["one", "two", "three", "four", "five", "six"]).await;
        let response = app(&fx)
            .oneshot(upload_request("file", b"img"))
            .await
            .unwrap();
        let photo = body_json(response).await;
        let label = photo["label"].as_str().unwrap();
        assert_eq!(label.split(',').count(), 5);
        assert_eq!(label, "one,two,three,four,five");
    }

    #[tokio::test]
    async fn empty_file_still_creates_photo() {
        let fx = fixture(&["unused"]).await;
        let response = app(&fx).oneshot(upload_request("file", b"")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let photo = body_json(response).await;
        assert_eq!(photo["label"], "");
        assert!(!photo["id"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_without_file_field_is_rejected() {
        let fx = fixture(&[]).await;
        let response = app(&fx)
            .oneshot(upload_request("picture", b"img"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let fx = fixture(&[]).await;
        let app = routes(64).with_state(fx.service.clone());
        let response = app
            .oneshot(upload_request("file", &[7u8; 4096]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn missing_image_is_empty_404() {
        let fx = fixture(&[]).await;
        let app = app(&fx);
        for uri in ["/image/nonexistent-id", "/image/..%2F..%2Fetc"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
            assert!(body_bytes(response).await.is_empty());
        }
    }

    #[tokio::test]
    async fn created_photo_is_readable_without_stored_object() {
        let fx = fixture(&[]).await;
        let app = app(&fx);
        let record = json!({ "id": "x1", "uri": "/image/x1", "label": "cat" });

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/photo")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(record.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_bytes(response).await.is_empty());

        let response = app.clone().oneshot(get("/photos/x1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, record);

        let response = app.oneshot(get("/image/x1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn photo_without_id_is_a_json_400() {
        let fx = fixture(&[]).await;
        let response = app(&fx)
            .oneshot(post_json("/photo", json!({ "uri": "/image/x" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status"], 400);
        assert!(body["error"].as_str().unwrap().contains("id"));
    }

    #[tokio::test]
    async fn metadata_failure_is_a_json_500() {
        let (service, _dir) = service_with_repo(
            Arc::new(DisabledLabels),
            Arc::new(FailingRepository::default()),
            LabelPolicy::Lenient,
        );
        let response = routes(1024 * 1024)
            .with_state(service)
            .oneshot(upload_request("file", b"img"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["status"], 500);
        assert!(!body["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn strict_label_failure_is_a_500() {
        let (service, _dir) = service_with(Arc::new(FailingLabels), LabelPolicy::Strict).await;
        let response = routes(1024 * 1024)
            .with_state(service)
            .oneshot(upload_request("file", b"img"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["status"], 500);
    }

    #[tokio::test]
    async fn unknown_photo_record_is_404() {
        let fx = fixture(&[]).await;
        let response = app(&fx).oneshot(get("/photos/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["status"], 404);
    }

    #[tokio::test]
    async fn probes_report_ok() {
        let fx = fixture(&[]).await;
        let app = app(&fx);

        let response = app.clone().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = app.oneshot(get("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["checks"]["database"]["ok"], true);
        assert_eq!(body["checks"]["storage"]["ok"], true);
    }
}

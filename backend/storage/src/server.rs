//! Standalone storage service speaking the upload/download contract.
//!
//! Routes:
//!   POST /post-image                          upsert an artifact
//!   GET  /download-file/:user_id/:file_name   fetch the newest artifact by name

use anyhow::Result;
use axum::{
    Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use cipherbus_core::{Mode, Operation, decode_image_data};
use serde::Deserialize;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::client::StoredImage;
use crate::mime_detect::content_type_for;
use crate::store::{ImageStore, UpsertOutcome};

/// Every field is optional so a missing one yields a 400 instead of an extractor rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostImageBody {
    user_id: Option<String>,
    operation: Option<String>,
    mode: Option<String>,
    image_name: Option<String>,
    img_base64: Option<String>,
}

impl PostImageBody {
    fn into_image(self) -> Option<StoredImage> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        Some(StoredImage {
            user_id: non_empty(self.user_id)?,
            operation: non_empty(self.operation)?.parse::<Operation>().ok()?,
            mode: non_empty(self.mode)?.parse::<Mode>().ok()?,
            image_name: non_empty(self.image_name)?,
            img_base64: non_empty(self.img_base64)?,
        })
    }
}

/// Build the storage router.
pub fn storage_router(store: ImageStore, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/post-image", post(post_image))
        .route("/download-file/:user_id/:file_name", get(download_file))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(store)
}

pub async fn start_storage_server(
    addr: SocketAddr,
    store: ImageStore,
    max_body_bytes: usize,
) -> Result<()> {
    let app = storage_router(store, max_body_bytes);
    info!("Storage service listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn post_image(State(store): State<ImageStore>, body: Bytes) -> Response {
    let image = serde_json::from_slice::<PostImageBody>(&body)
        .ok()
        .and_then(PostImageBody::into_image);
    let Some(image) = image else {
        return (StatusCode::BAD_REQUEST, "Invalid request body").into_response();
    };

    let outcome = store.upsert(&image).await;
    match outcome {
        UpsertOutcome::Inserted => info!(image = ?image, "Artifact inserted"),
        UpsertOutcome::Updated => info!(image = ?image, "Artifact replaced"),
    }
    (StatusCode::OK, "ok").into_response()
}

async fn download_file(
    Path((user_id, file_name)): Path<(String, String)>,
    State(store): State<ImageStore>,
) -> Response {
    let Some(data) = store.find(&user_id, &file_name).await else {
        debug!(%user_id, %file_name, "Artifact not found");
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    };

    let bytes = match decode_image_data(&data) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%user_id, %file_name, error = %e, "Stored artifact is not decodable");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Stored file is corrupt").into_response();
        }
    };

    let mut headers = HeaderMap::new();
    let content_type = content_type_for(&file_name, &data);
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\"")) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    (StatusCode::OK, headers, bytes).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn app(store: ImageStore) -> Router {
        storage_router(store, 1024 * 1024)
    }

    fn post(json: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/post-image")
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn upload_then_download() {
        let store = ImageStore::new();
        let resp = app(store.clone())
            .oneshot(post(serde_json::json!({
                "userId": "u1",
                "operation": "decrypt",
                "mode": "ECB",
                "imageName": "photo_outputdecrypted.bmp",
                "imgBase64": "Qk0AAQ=="
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(&to_bytes(resp.into_body(), 1024).await.unwrap()[..], b"ok");

        let resp = app(store)
            .oneshot(get("/download-file/u1/photo_outputdecrypted.bmp"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/bmp");
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"photo_outputdecrypted.bmp\""
        );
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"BM\x00\x01");
    }

    #[tokio::test]
    async fn data_url_sets_content_type() {
        let store = ImageStore::new();
        store
            .upsert(&StoredImage {
                user_id: "u1".into(),
                operation: Operation::Encrypt,
                mode: Mode::Cbc,
                image_name: "photo_output.bin".into(),
                img_base64: "data:image/png;base64,AAEC".into(),
            })
            .await;
        let resp = app(store)
            .oneshot(get("/download-file/u1/photo_output.bin"))
            .await
            .unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");
        let body = to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], &[0u8, 1, 2]);
    }

    #[tokio::test]
    async fn missing_field_is_bad_request() {
        let store = ImageStore::new();
        let resp = app(store.clone())
            .oneshot(post(serde_json::json!({
                "userId": "u1",
                "operation": "encrypt",
                "imageName": "photo_output.bin",
                "imgBase64": "AAEC"
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_mode_is_bad_request() {
        let resp = app(ImageStore::new())
            .oneshot(post(serde_json::json!({
                "userId": "u1",
                "operation": "encrypt",
                "mode": "GCM",
                "imageName": "photo_output.bin",
                "imgBase64": "AAEC"
            })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_file_is_not_found() {
        let resp = app(ImageStore::new())
            .oneshot(get("/download-file/u1/ghost.bin"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

//! HTTP server for cache endpoints
//!
//! Provides /health, /entry (GET and PUT), /entries (DELETE) and /audit.

use crate::types::{EntryQuery, HealthResponse};
use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use chrono::{DateTime, Utc};
use offline_disk_cache::{CachedPayload, DiskCache, DiskCacheError};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

/// Stored response status, default 200
pub const STATUS_HEADER: &str = "x-offline-status";
/// Prefix for headers to store and replay with the entry
pub const STORED_HEADER_PREFIX: &str = "x-offline-header-";
/// Prefix for caller metadata kept alongside the entry
pub const USER_INFO_PREFIX: &str = "x-offline-info-";

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: DiskCache,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(cache: DiskCache) -> Self {
        Self {
            cache,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/entry", get(get_entry).put(put_entry))
        .route("/entries", delete(clear_entries))
        .route("/audit", get(audit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache_stats = state.cache.stats().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: cache_stats,
    })
}

/// Replay a cached response
async fn get_entry(
    State(state): State<SharedState>,
    Query(query): Query<EntryQuery>,
) -> Response {
    let Some(payload) = state.cache.lookup::<_, CachedPayload>(&query.url).await else {
        return error_response(StatusCode::NOT_FOUND, "Entry not found");
    };

    let mut headers = HeaderMap::new();
    for (name, value) in &payload.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => debug!(url = %query.url, header = %name, "Skipping unreplayable header"),
        }
    }
    if let Some(mime) = payload.mime_type.as_deref() {
        let content_type = match payload.text_encoding.as_deref() {
            Some(encoding) => format!("{}; charset={}", mime, encoding),
            None => mime.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
    }
    headers.insert(
        HeaderName::from_static("x-cached-status"),
        HeaderValue::from(payload.status),
    );
    headers.insert(
        HeaderName::from_static("x-cache"),
        HeaderValue::from_static("HIT"),
    );

    (StatusCode::OK, headers, Body::from(payload.body)).into_response()
}

/// Store a response body for a URL
async fn put_entry(
    State(state): State<SharedState>,
    Query(query): Query<EntryQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let payload = match payload_from_request(&query.url, &headers, body) {
        Ok(payload) => payload,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    match state.cache.try_store(&query.url, &payload).await {
        Ok(()) => StatusCode::CREATED.into_response(),
        Err(DiskCacheError::PayloadTooLarge { size, max }) => error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("Entry of {} bytes exceeds cache budget of {} bytes", size, max),
        ),
        Err(e) => {
            warn!(url = %query.url, error = %e, "Failed to store entry");
            error_response(StatusCode::INSUFFICIENT_STORAGE, "Entry could not be stored")
        }
    }
}

fn payload_from_request(
    url: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> std::result::Result<CachedPayload, String> {
    let mut payload = CachedPayload::new(url, body.to_vec());

    if let Some(status) = headers.get(STATUS_HEADER) {
        payload.status = status
            .to_str()
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .filter(|s| (100..=999).contains(s))
            .ok_or_else(|| format!("Invalid {} header", STATUS_HEADER))?;
    }

    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        let content_type = content_type
            .to_str()
            .map_err(|_| "Content-Type is not valid text".to_string())?;
        let mut parts = content_type.split(';').map(str::trim);
        if let Some(mime) = parts.next().filter(|m| !m.is_empty()) {
            payload.mime_type = Some(mime.to_string());
        }
        payload.text_encoding = parts
            .filter_map(|p| p.strip_prefix("charset="))
            .map(|c| c.trim_matches('"').to_string())
            .next();
    }

    for (name, value) in headers {
        let name = name.as_str();
        let Ok(value) = value.to_str() else {
            continue;
        };
        if let Some(stored) = name.strip_prefix(STORED_HEADER_PREFIX) {
            payload.headers.insert(stored.to_string(), value.to_string());
        } else if let Some(info) = name.strip_prefix(USER_INFO_PREFIX) {
            payload.user_info.insert(info.to_string(), value.to_string());
        }
    }

    Ok(payload)
}

/// Remove every cached entry
async fn clear_entries(State(state): State<SharedState>) -> Response {
    match state.cache.clear().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            error!(error = %e, "Failed to clear cache");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache could not be cleared")
        }
    }
}

/// Compare the manifest with the cache directory
async fn audit(State(state): State<SharedState>) -> Response {
    match state.cache.audit().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to audit cache");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Cache could not be audited")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;
    use offline_disk_cache::DiskCacheConfig;
    use std::path::Path;
    use tempfile::tempdir;
    use tower::ServiceExt;

    const APP_JS: &str = "/entry?url=https%3A%2F%2Fexample.com%2Fapp.js";

    async fn create_test_state(cache_dir: &Path, max_size: u64) -> SharedState {
        let cache = DiskCache::open(DiskCacheConfig::new(cache_dir, max_size))
            .await
            .unwrap();
        Arc::new(ServerState::new(cache))
    }

    async fn send(state: &SharedState, request: Request<Body>) -> Response {
        create_router(state.clone()).oneshot(request).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), 1024).await;

        let response = send(
            &state,
            Request::builder().uri("/health").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["status"], "ok");
        assert!(json["uptime_secs"].as_u64().is_some());
        assert_eq!(json["cache"]["entries"], 0);
        assert_eq!(json["cache"]["max_size"], 1024);
    }

    #[tokio::test]
    async fn test_missing_entry_is_not_found() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), 1024).await;

        let response = send(
            &state,
            Request::builder().uri(APP_JS).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_put_then_get_replays_response() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), 4096).await;

        let response = send(
            &state,
            Request::builder()
                .method("PUT")
                .uri(APP_JS)
                .header(header::CONTENT_TYPE, "application/javascript; charset=utf-8")
                .header(STATUS_HEADER, "203")
                .header("x-offline-header-etag", "\"abc\"")
                .header("x-offline-info-crawl", "home")
                .body(Body::from("console.log(1);"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let stored: CachedPayload = state
            .cache
            .lookup("https://example.com/app.js")
            .await
            .unwrap();
        assert_eq!(stored.user_info.get("crawl").map(String::as_str), Some("home"));
        assert_eq!(stored.text_encoding.as_deref(), Some("utf-8"));

        let response = send(
            &state,
            Request::builder().uri(APP_JS).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(response.headers()["x-cached-status"], "203");
        assert_eq!(response.headers()["etag"], "\"abc\"");
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/javascript; charset=utf-8"
        );
        assert_eq!(&body_bytes(response).await[..], b"console.log(1);");
    }

    #[tokio::test]
    async fn test_put_without_url_is_rejected() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), 1024).await;

        let response = send(
            &state,
            Request::builder()
                .method("PUT")
                .uri("/entry")
                .body(Body::from("data"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_put_with_bad_status_is_rejected() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), 1024).await;

        let response = send(
            &state,
            Request::builder()
                .method("PUT")
                .uri(APP_JS)
                .header(STATUS_HEADER, "teapot")
                .body(Body::from("data"))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_oversize_put_is_rejected() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), 64).await;

        let response = send(
            &state,
            Request::builder()
                .method("PUT")
                .uri(APP_JS)
                .body(Body::from(vec![b'x'; 128]))
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(state.cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_clear_and_audit() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), 4096).await;
        assert!(
            state
                .cache
                .store("https://example.com/a.css", &CachedPayload::new("a", "body{}"))
                .await
        );

        let response = send(
            &state,
            Request::builder().uri("/audit").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["orphans"].as_array().unwrap().len(), 0);

        let response = send(
            &state,
            Request::builder()
                .method("DELETE")
                .uri("/entries")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.cache.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_state_new() {
        let dir = tempdir().unwrap();
        let state = create_test_state(dir.path(), 1024).await;

        // started_at should be close to now
        let diff = (Utc::now() - state.started_at).num_seconds();
        assert!((0..5).contains(&diff));
    }
}

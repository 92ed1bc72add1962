//! Key HTTP Routes
//!
//! CRUD endpoints over the key-value store. Each handler follows the same
//! pipeline: extract, validate, dispatch to the store, render. Validation
//! failures return before the store is touched.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        rejection::{BytesRejection, PathRejection},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tracing::{error, info};

use crate::storage::{KeyRemover, KeyValueStore, StoreError, ValueGetter, ValueSetter, ValueUpdater};

use super::errors::{ApiError, ApiResult};
use super::response::{GetResponse, Response};
use super::validate::{SaveRequest, UpdateRequest};

pub const X_REQUEST_ID: &str = "x-request-id";

// ==================
// Key Routes
// ==================

/// Create key routes
///
/// `/keys/` is routed explicitly so an empty path key gets a 400 instead of
/// falling through to a bare 404.
pub fn key_routes<S: KeyValueStore>(store: Arc<S>) -> Router {
    Router::new()
        .route("/keys", post(save_handler::<S>))
        .route(
            "/keys/",
            get(get_value_handler::<S>)
                .put(update_handler::<S>)
                .delete(delete_handler::<S>),
        )
        .route(
            "/keys/:key",
            get(get_value_handler::<S>)
                .put(update_handler::<S>)
                .delete(delete_handler::<S>),
        )
        .with_state(store)
}

// ==================
// Helper Functions
// ==================

pub(crate) fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

/// `/keys/` has no path parameter at all; both it and an explicit empty
/// segment are an empty key. Anything else the extractor rejects (bad
/// percent-encoding, invalid UTF-8) is a decode failure.
fn path_key(
    op: &str,
    request_id: &str,
    key: Result<Path<String>, PathRejection>,
) -> ApiResult<String> {
    match key {
        Ok(Path(key)) if !key.is_empty() => Ok(key),
        Ok(_) | Err(PathRejection::MissingPathParams(_)) => {
            info!(op, request_id, "key is empty");
            Err(ApiError::EmptyKey)
        }
        Err(rejection) => {
            error!(op, request_id, error = %rejection, "failed to decode path key");
            Err(ApiError::Decode)
        }
    }
}

fn decode_body<T: DeserializeOwned>(
    op: &str,
    request_id: &str,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<T> {
    let body = body.map_err(|rejection| {
        error!(op, request_id, error = %rejection, "failed to read request body");
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::Decode
        }
    })?;

    if body.iter().all(u8::is_ascii_whitespace) {
        error!(op, request_id, "request body is empty");
        return Err(ApiError::EmptyBody);
    }

    serde_json::from_slice(&body).map_err(|err| {
        error!(op, request_id, error = %err, "failed to decode request body");
        ApiError::Decode
    })
}

// ==================
// Handlers
// ==================

async fn get_value_handler<S: ValueGetter>(
    State(store): State<Arc<S>>,
    headers: HeaderMap,
    key: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<GetResponse>> {
    const OP: &str = "http_server.keys.get";
    let request_id = request_id(&headers);

    let key = path_key(OP, request_id, key)?;

    match store.get_value(&key).await {
        Ok(value) => {
            info!(op = OP, request_id, key = %key, "get value for key");
            Ok(Json(GetResponse::new(value)))
        }
        Err(StoreError::NotFound) => {
            info!(op = OP, request_id, key = %key, "key not found");
            Err(ApiError::NotFound)
        }
        Err(err) => {
            error!(op = OP, request_id, error = %err, "failed to get value");
            Err(ApiError::Internal("failed to get value"))
        }
    }
}

async fn save_handler<S: ValueSetter>(
    State(store): State<Arc<S>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<Response>> {
    const OP: &str = "http_server.keys.save";
    let request_id = request_id(&headers);

    let request: SaveRequest = decode_body(OP, request_id, body)?;
    if let Err(fields) = request.validate() {
        error!(op = OP, request_id, "invalid request");
        return Err(ApiError::Validation(fields));
    }

    match store.set_value(&request.key, &request.value).await {
        Ok(()) => {
            info!(op = OP, request_id, key = %request.key, "value saved");
            Ok(Json(Response::ok()))
        }
        Err(StoreError::AlreadyExists) => {
            info!(op = OP, request_id, key = %request.key, "duplicated key");
            Err(ApiError::Duplicate)
        }
        Err(err) => {
            error!(op = OP, request_id, error = %err, "failed to create");
            Err(ApiError::Internal("failed to create"))
        }
    }
}

async fn update_handler<S: ValueUpdater>(
    State(store): State<Arc<S>>,
    headers: HeaderMap,
    key: Result<Path<String>, PathRejection>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<Json<Response>> {
    const OP: &str = "http_server.keys.update";
    let request_id = request_id(&headers);

    let request: UpdateRequest = decode_body(OP, request_id, body)?;
    if let Err(fields) = request.validate() {
        error!(op = OP, request_id, "invalid request");
        return Err(ApiError::Validation(fields));
    }

    let key = path_key(OP, request_id, key)?;

    match store.update_value(&key, &request.value).await {
        Ok(()) => {
            info!(op = OP, request_id, key = %key, "value updated");
            Ok(Json(Response::ok()))
        }
        Err(StoreError::NotFound) => {
            info!(op = OP, request_id, key = %key, "key not found");
            Err(ApiError::NotFound)
        }
        Err(err) => {
            error!(op = OP, request_id, error = %err, "failed to update value");
            Err(ApiError::Internal("failed to update value"))
        }
    }
}

async fn delete_handler<S: KeyRemover>(
    State(store): State<Arc<S>>,
    headers: HeaderMap,
    key: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<Response>> {
    const OP: &str = "http_server.keys.delete";
    let request_id = request_id(&headers);

    let key = path_key(OP, request_id, key)?;

    match store.delete(&key).await {
        Ok(()) => {
            info!(op = OP, request_id, key = %key, "key deleted");
            Ok(Json(Response::ok()))
        }
        Err(StoreError::NotFound) => {
            info!(op = OP, request_id, key = %key, "key not found");
            Err(ApiError::NotFound)
        }
        Err(err) => {
            error!(op = OP, request_id, error = %err, "failed to delete key");
            Err(ApiError::Internal("failed to delete key"))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn test_request_id_falls_back_to_dash() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id(&headers), "-");

        headers.insert(X_REQUEST_ID, HeaderValue::from_static("abc-123"));
        assert_eq!(request_id(&headers), "abc-123");
    }

    #[test]
    fn test_path_key_rejects_empty() {
        use axum::extract::rejection::MissingPathParams;

        let missing = path_key("test", "-", Err(MissingPathParams::default().into()));
        assert!(matches!(missing, Err(ApiError::EmptyKey)));

        let empty = path_key("test", "-", Ok(Path(String::new())));
        assert!(matches!(empty, Err(ApiError::EmptyKey)));

        assert_eq!(path_key("test", "-", Ok(Path("k".to_string()))).unwrap(), "k");
    }

    fn body(text: &'static str) -> Result<Bytes, BytesRejection> {
        Ok(Bytes::from_static(text.as_bytes()))
    }

    #[test]
    fn test_decode_body_distinguishes_empty_from_malformed() {
        let empty = decode_body::<UpdateRequest>("test", "-", body("  \n"));
        assert!(matches!(empty, Err(ApiError::EmptyBody)));

        let malformed = decode_body::<UpdateRequest>("test", "-", body("{\"value\":"));
        assert!(matches!(malformed, Err(ApiError::Decode)));

        let wrong_type = decode_body::<UpdateRequest>("test", "-", body("{\"value\": 5}"));
        assert!(matches!(wrong_type, Err(ApiError::Decode)));

        let ok = decode_body::<UpdateRequest>("test", "-", body("{\"value\": \"v\"}")).unwrap();
        assert_eq!(ok.value, "v");
    }
}

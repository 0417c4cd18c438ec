pub mod invoices;
pub mod leads;
pub mod projects;
pub mod quotes;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::Json;
use serde::de::DeserializeOwned;

use super::error::CrmError;
use super::response::ApiResponse;

/// Runs a synchronous service call on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, CrmError>
where
    F: FnOnce() -> Result<T, CrmError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

pub(crate) fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::ok(data))
}

pub(crate) fn created<T>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (StatusCode::CREATED, Json(ApiResponse::ok(data)))
}

/// Body for routes whose fields are all optional: an empty body means defaults.
pub(crate) fn optional_json<T>(body: &Bytes) -> Result<T, CrmError>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| CrmError::Validation {
        message: "Malformed request body".to_string(),
        details: vec![e.to_string()],
    })
}

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

pub(crate) async fn healthz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

pub(crate) async fn api_not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

// ABOUTME: Response envelope helpers for the tool server
// ABOUTME: Logical failures are HTTP 200 with success=false; only malformed requests get 4xx/5xx

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

/// Incoming tool-call envelope. `parameters` carries the per-endpoint
/// arguments; the rest is caller bookkeeping echoed in logs only.
#[derive(Debug, serde::Deserialize)]
pub struct ToolRequest {
    pub tool_name: Option<String>,
    #[serde(default)]
    pub parameters: Value,
    pub request_id: Option<String>,
}

pub fn success(fields: Map<String, Value>) -> Response {
    let mut body = Map::new();
    body.insert("success".to_string(), Value::Bool(true));
    body.extend(fields);
    (StatusCode::OK, Json(Value::Object(body))).into_response()
}

/// Operation-level failure. The remote caller reads this as a tool
/// result, so the transport status stays 200.
pub fn failure(error: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(json!({ "success": false, "error": error.into() })),
    )
        .into_response()
}

pub fn bad_request(error: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "success": false, "error": error.into() })),
    )
        .into_response()
}

pub fn internal_error(error: impl Into<String>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": error.into() })),
    )
        .into_response()
}

/// Pull a required string parameter or produce the 400 for the caller.
pub fn require_str<'a>(params: &'a Value, name: &str) -> std::result::Result<&'a str, Response> {
    params
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request(format!("Missing required parameter: {name}")))
}

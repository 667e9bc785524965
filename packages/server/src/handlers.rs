// ABOUTME: Tool server endpoint handlers
// ABOUTME: Every logical failure is shaped into a success=false JSON body

use crate::resolve::{expand_home, resolve_local_path};
use crate::response::{self, ToolRequest};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay_config::SANDBOX_WORK_DIR;
use relay_sandbox::{Language, SandboxAdapter};
use relay_security::{sanitize_sandbox_path, validate_task_input};
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_EXECUTE_TIMEOUT_SECS: u64 = 30;
const MAX_EXECUTE_TIMEOUT_SECS: u64 = 3_600;

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn execute(
    State(adapter): State<Arc<SandboxAdapter>>,
    Json(request): Json<ToolRequest>,
) -> Response {
    let params = &request.parameters;
    let code = match response::require_str(params, "code") {
        Ok(code) => code,
        Err(resp) => return resp,
    };

    let validation = validate_task_input(code);
    for warning in &validation.warnings {
        warn!("Execute input warning: {}", warning);
    }
    if !validation.valid {
        return response::failure(validation.errors.join("; "));
    }

    let language = match params.get("language").and_then(Value::as_str) {
        Some(name) => match Language::from_str(name) {
            Ok(language) => language,
            Err(e) => return response::failure(e),
        },
        None => Language::Python,
    };
    // Clamp before converting to millis so absurd values cannot overflow.
    let timeout_ms = params
        .get("timeout")
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_EXECUTE_TIMEOUT_SECS)
        .min(MAX_EXECUTE_TIMEOUT_SECS)
        * 1_000;

    info!(
        request_id = request.request_id.as_deref().unwrap_or("-"),
        "Executing {} code ({} chars)",
        language.as_str(),
        code.len()
    );
    let result = adapter.execute_code(code, language, timeout_ms).await;

    let error = if result.stderr.is_empty() {
        "Execution failed".to_string()
    } else {
        result.stderr.clone()
    };
    let mut fields = Map::new();
    fields.insert("stdout".to_string(), json!(result.stdout));
    fields.insert("stderr".to_string(), json!(result.stderr));
    fields.insert("exit_code".to_string(), json!(result.exit_code));
    fields.insert("duration".to_string(), json!(result.duration_ms));
    if result.timed_out {
        fields.insert("timeout".to_string(), json!(true));
    }
    if result.success {
        response::success(fields)
    } else {
        let mut body = Map::new();
        body.insert("success".to_string(), json!(false));
        body.insert("error".to_string(), json!(error));
        body.extend(fields);
        (axum::http::StatusCode::OK, Json(Value::Object(body))).into_response()
    }
}

pub async fn upload(
    State(adapter): State<Arc<SandboxAdapter>>,
    Json(request): Json<ToolRequest>,
) -> Response {
    let params = &request.parameters;
    let local_path = match response::require_str(params, "local_path") {
        Ok(path) => path,
        Err(resp) => return resp,
    };

    let resolved = match resolve_local_path(local_path) {
        Some(resolved) => resolved,
        None => return response::failure(format!("Local file not found: {local_path}")),
    };

    let requested_sandbox_path = params
        .get("sandbox_path")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| {
            let name = resolved
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("upload");
            format!("{SANDBOX_WORK_DIR}/{name}")
        });
    let sandbox_path = sanitize_sandbox_path(&requested_sandbox_path);
    let path_sanitized = sandbox_path != requested_sandbox_path;

    match adapter.upload_file(&resolved.path, &sandbox_path).await {
        Ok(size) => {
            let mut fields = Map::new();
            fields.insert("sandbox_path".to_string(), json!(sandbox_path));
            fields.insert(
                "local_path".to_string(),
                json!(resolved.path.display().to_string()),
            );
            fields.insert("size".to_string(), json!(size));
            fields.insert("path_sanitized".to_string(), json!(path_sanitized));
            if resolved.fuzzy_match {
                fields.insert("fuzzy_match".to_string(), json!(true));
                fields.insert("original_path".to_string(), json!(resolved.original_path));
            }
            response::success(fields)
        }
        Err(e) => response::failure(e.to_string()),
    }
}

pub async fn download(
    State(adapter): State<Arc<SandboxAdapter>>,
    Json(request): Json<ToolRequest>,
) -> Response {
    let params = &request.parameters;
    let sandbox_path_param = match response::require_str(params, "sandbox_path") {
        Ok(path) => path,
        Err(resp) => return resp,
    };
    let local_path_param = match response::require_str(params, "local_path") {
        Ok(path) => path,
        Err(resp) => return resp,
    };

    let sandbox_path = sanitize_sandbox_path(sandbox_path_param);
    let path_sanitized = sandbox_path != sandbox_path_param;
    let local_path = expand_home(local_path_param);

    match adapter.download_file(&sandbox_path, &local_path).await {
        Ok(size) => {
            let mut fields = Map::new();
            fields.insert(
                "local_path".to_string(),
                json!(local_path.display().to_string()),
            );
            fields.insert("sandbox_path".to_string(), json!(sandbox_path));
            fields.insert("size".to_string(), json!(size));
            fields.insert("path_sanitized".to_string(), json!(path_sanitized));
            response::success(fields)
        }
        Err(e) => response::failure(e.to_string()),
    }
}

/// Existence and metadata for a local path without side effects, using
/// the same fuzzy resolution as upload.
pub async fn check_file(
    State(_adapter): State<Arc<SandboxAdapter>>,
    Json(request): Json<ToolRequest>,
) -> Response {
    let params = &request.parameters;
    let path = match response::require_str(params, "path") {
        Ok(path) => path,
        Err(resp) => return resp,
    };

    let mut fields = Map::new();
    match resolve_local_path(path) {
        Some(resolved) => {
            let metadata = std::fs::metadata(&resolved.path).ok();
            fields.insert("exists".to_string(), json!(true));
            fields.insert(
                "is_file".to_string(),
                json!(metadata.as_ref().map(|m| m.is_file()).unwrap_or(true)),
            );
            fields.insert(
                "is_directory".to_string(),
                json!(metadata.as_ref().map(|m| m.is_dir()).unwrap_or(false)),
            );
            if let Some(size) = metadata.map(|m| m.len()) {
                fields.insert("size".to_string(), json!(size));
            }
            fields.insert(
                "matched_path".to_string(),
                json!(resolved.path.display().to_string()),
            );
            if resolved.fuzzy_match {
                fields.insert("fuzzy_match".to_string(), json!(true));
            }
        }
        None => {
            let expanded = expand_home(path);
            if expanded.is_dir() {
                fields.insert("exists".to_string(), json!(true));
                fields.insert("is_file".to_string(), json!(false));
                fields.insert("is_directory".to_string(), json!(true));
                fields.insert(
                    "matched_path".to_string(),
                    json!(expanded.display().to_string()),
                );
            } else {
                fields.insert("exists".to_string(), json!(false));
            }
        }
    }
    response::success(fields)
}

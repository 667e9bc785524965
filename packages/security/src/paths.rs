// ABOUTME: Sandbox path sanitization and validation against the path policy
// ABOUTME: Sanitize always returns a safe path; validate reports without rewriting

use crate::validation::ValidationResult;
use relay_config::{ALLOWED_SANDBOX_PREFIXES, BLOCKED_PATH_PATTERNS, SANDBOX_OUTPUT_DIR};
use tracing::warn;

/// Sanitize a caller-supplied sandbox path into one that is guaranteed
/// to sit inside an allow-listed prefix with no blocked pattern left.
///
/// Blocked patterns are stripped to a fixed point (stripping one pattern
/// can splice another into existence), separators are collapsed, a
/// leading `/` is forced, and anything still outside the allow-list is
/// rewritten to `<output-dir>/<basename>`. This function never fails:
/// the enforcement point trades precision for availability, since a
/// remote engine cannot be expected to always name a canonical
/// directory. Idempotent by construction.
pub fn sanitize_sandbox_path(path: &str) -> String {
    let mut cleaned = path.trim().to_string();

    loop {
        let before = cleaned.clone();
        for pattern in BLOCKED_PATH_PATTERNS {
            while cleaned.contains(pattern) {
                cleaned = cleaned.replace(pattern, "");
            }
        }
        if cleaned == before {
            break;
        }
    }

    while cleaned.contains("//") {
        cleaned = cleaned.replace("//", "/");
    }
    if cleaned.ends_with('/') && cleaned.len() > 1 {
        cleaned.pop();
    }
    if !cleaned.starts_with('/') {
        cleaned = format!("/{cleaned}");
    }

    if is_allowed(&cleaned) {
        return cleaned;
    }

    let basename = cleaned
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("file");
    let rewritten = format!("{SANDBOX_OUTPUT_DIR}/{basename}");
    warn!(
        "Sandbox path {:?} outside allowed prefixes, rewritten to {:?}",
        path, rewritten
    );
    rewritten
}

/// Non-mutating check for callers that want to reject rather than
/// rewrite. Blocked patterns are errors; a path outside the allow-list
/// is only a warning, since [`sanitize_sandbox_path`] is the actual
/// enforcement point.
pub fn validate_sandbox_path(path: &str) -> ValidationResult {
    let mut result = ValidationResult::ok();

    if path.trim().is_empty() {
        result.add_error("Sandbox path cannot be empty");
        return result;
    }

    for pattern in BLOCKED_PATH_PATTERNS {
        if path.contains(pattern) {
            result.add_error(format!("Path contains blocked pattern {pattern:?}"));
        }
    }

    let normalized = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    if !is_allowed(&normalized) {
        result.add_warning(format!(
            "Path {path:?} is outside allowed prefixes and will be rewritten on use"
        ));
    }

    result
}

fn is_allowed(path: &str) -> bool {
    ALLOWED_SANDBOX_PREFIXES
        .iter()
        .any(|prefix| path == *prefix || path.starts_with(&format!("{prefix}/")))
}

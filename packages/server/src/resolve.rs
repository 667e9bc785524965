// ABOUTME: Fuzzy resolution of caller-supplied local paths
// ABOUTME: Exact match, then candidate extensions, then sibling basename prefixes

use relay_config::FUZZY_MATCH_EXTENSIONS;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of resolving a caller path against the local filesystem.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub fuzzy_match: bool,
    pub original_path: String,
}

/// Expand a leading `~` against the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Find the file the caller most plausibly meant.
///
/// An exact hit wins. Otherwise the common data-file extensions are
/// tried, then siblings whose names start with the requested basename.
/// Ties go to the shortest file name, then lexicographic order.
pub fn resolve_local_path(input: &str) -> Option<ResolvedPath> {
    let expanded = expand_home(input);

    if expanded.is_file() {
        return Some(ResolvedPath {
            path: expanded,
            fuzzy_match: false,
            original_path: input.to_string(),
        });
    }

    let mut candidates: Vec<PathBuf> = FUZZY_MATCH_EXTENSIONS
        .iter()
        .map(|ext| PathBuf::from(format!("{}.{ext}", expanded.display())))
        .filter(|p| p.is_file())
        .collect();

    if candidates.is_empty() {
        candidates = sibling_prefix_matches(&expanded);
    }

    candidates.sort_by(|a, b| {
        let a_name = file_name(a);
        let b_name = file_name(b);
        a_name.len().cmp(&b_name.len()).then(a_name.cmp(&b_name))
    });

    let best = candidates.into_iter().next()?;
    debug!("Fuzzy-resolved {} to {}", input, best.display());
    Some(ResolvedPath {
        path: best,
        fuzzy_match: true,
        original_path: input.to_string(),
    })
}

fn sibling_prefix_matches(expanded: &Path) -> Vec<PathBuf> {
    let basename = match expanded.file_name().and_then(|n| n.to_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return Vec::new(),
    };
    let dir = match expanded.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    entries
        .flatten()
        .filter(|entry| entry.path().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(&basename))
                .unwrap_or(false)
        })
        .map(|entry| entry.path())
        .collect()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

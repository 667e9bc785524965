// ABOUTME: Extracts file references embedded in natural-language task text
// ABOUTME: Recognizes file:/files: input lists, output: destinations, and quoted paths

use crate::validation::ValidationResult;
use regex::Regex;
use relay_config::{SANDBOX_OUTPUT_DIR, SANDBOX_WORK_DIR};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Whether a reference names a file to upload before execution or a
/// destination to fetch after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Input,
    Output,
}

/// A file reference resolved out of task text.
#[derive(Debug, Clone)]
pub struct ParsedFileReference {
    pub local_path: PathBuf,
    pub sandbox_path: String,
    pub kind: ReferenceKind,
}

fn input_list_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bfiles?:\s*([^\n]+)").expect("static regex"))
}

fn output_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)\boutput:\s*("[^"\n]+"|'[^'\n]+'|\S+)"#).expect("static regex"))
}

fn quoted_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"["'](/[^"'\n]+|~/[^"'\n]+)["']"#).expect("static regex")
    })
}

/// Raw path tokens found in the text, in order of appearance, deduped.
/// No filesystem resolution happens here.
pub fn extract_file_paths(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut paths = Vec::new();
    let mut push = |token: String| {
        if !token.is_empty() && seen.insert(token.clone()) {
            paths.push(token);
        }
    };

    for capture in input_list_re().captures_iter(text) {
        for token in split_list(&capture[1]) {
            push(token);
        }
    }
    for capture in output_re().captures_iter(text) {
        push(unquote(&capture[1]));
    }
    for capture in quoted_path_re().captures_iter(text) {
        push(capture[1].to_string());
    }

    paths
}

/// Resolve file references out of task text.
///
/// Input references must exist locally; missing ones are dropped with a
/// warning rather than failing the task. Output references denote a
/// future artifact and are accepted unconditionally. Globbed input
/// patterns expand against the local filesystem. Deduplicates by
/// resolved local path.
pub fn parse_file_references(text: &str) -> (Vec<ParsedFileReference>, ValidationResult) {
    let mut result = ValidationResult::ok();
    let mut references = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for capture in input_list_re().captures_iter(text) {
        for token in split_list(&capture[1]) {
            resolve_input(&token, &mut references, &mut seen, &mut result);
        }
    }

    for capture in output_re().captures_iter(text) {
        let token = unquote(&capture[1]);
        let local = expand_home(&token);
        if seen.insert(local.clone()) {
            references.push(ParsedFileReference {
                sandbox_path: output_sandbox_path(&local),
                local_path: local,
                kind: ReferenceKind::Output,
            });
        }
    }

    for capture in quoted_path_re().captures_iter(text) {
        resolve_input(&capture[1], &mut references, &mut seen, &mut result);
    }

    (references, result)
}

fn resolve_input(
    token: &str,
    references: &mut Vec<ParsedFileReference>,
    seen: &mut HashSet<PathBuf>,
    result: &mut ValidationResult,
) {
    let expanded = expand_home(token);

    if is_glob(token) {
        let pattern = expanded.to_string_lossy().to_string();
        match glob::glob(&pattern) {
            Ok(matches) => {
                let mut matched_any = false;
                for path in matches.flatten() {
                    if path.is_file() {
                        matched_any = true;
                        push_input(path, references, seen);
                    }
                }
                if !matched_any {
                    result.add_warning(format!("Glob pattern {token:?} matched no files"));
                }
            }
            Err(e) => result.add_warning(format!("Invalid glob pattern {token:?}: {e}")),
        }
        return;
    }

    if expanded.is_file() {
        push_input(expanded, references, seen);
    } else {
        debug!("Dropping missing input reference {:?}", token);
        result.add_warning(format!("Referenced input file {token:?} does not exist"));
    }
}

fn push_input(path: PathBuf, references: &mut Vec<ParsedFileReference>, seen: &mut HashSet<PathBuf>) {
    let resolved = path.canonicalize().unwrap_or(path);
    if seen.insert(resolved.clone()) {
        references.push(ParsedFileReference {
            sandbox_path: input_sandbox_path(&resolved),
            local_path: resolved,
            kind: ReferenceKind::Input,
        });
    }
}

fn input_sandbox_path(local: &Path) -> String {
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    format!("{SANDBOX_WORK_DIR}/{name}")
}

fn output_sandbox_path(local: &Path) -> String {
    let name = local
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    format!("{SANDBOX_OUTPUT_DIR}/{name}")
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|piece| {
            let piece = piece.trim();
            if piece.starts_with('"') || piece.starts_with('\'') {
                unquote(piece)
            } else {
                // An unquoted reference ends at the first whitespace so
                // surrounding prose is not swallowed.
                piece
                    .split_whitespace()
                    .next()
                    .unwrap_or_default()
                    .to_string()
            }
        })
        .filter(|token| !token.is_empty())
        .collect()
}

fn unquote(token: &str) -> String {
    token
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .to_string()
}

fn is_glob(token: &str) -> bool {
    token.contains('*') || token.contains('?') || token.contains('[')
}

fn expand_home(token: &str) -> PathBuf {
    if token == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = token.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(token)
}

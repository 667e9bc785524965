// ABOUTME: Trust boundary between remote-caller-supplied text and local/sandbox filesystems
// ABOUTME: Path sanitization, task input validation, file reference extraction, env filtering

pub mod env;
pub mod input;
pub mod paths;
pub mod references;
pub mod validation;

pub use env::filter_env_vars;
pub use input::validate_task_input;
pub use paths::{sanitize_sandbox_path, validate_sandbox_path};
pub use references::{extract_file_paths, parse_file_references, ParsedFileReference, ReferenceKind};
pub use validation::ValidationResult;

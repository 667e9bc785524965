// ABOUTME: Sandbox capability interface and the execution adapter built on it
// ABOUTME: Owns one remote sandbox per adapter with retried init and non-throwing execution

pub mod adapter;
pub mod http_provider;
pub mod provider;

pub use adapter::{AdapterState, ExecutionResult, Language, SandboxAdapter, SandboxConfig};
pub use http_provider::HttpSandboxProvider;
pub use provider::{FilePayload, FileStat, RunOutput, SandboxHandle, SandboxProvider};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Sandbox service error: {0}")]
    Service(String),

    #[error("Sandbox not found: {0}")]
    NotFound(String),

    #[error("Sandbox not initialized")]
    NotInitialized,

    #[error("File too large: {size} bytes exceeds {limit} byte limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Local file error: {0}")]
    LocalFile(String),

    #[error("Invalid response from sandbox service: {0}")]
    InvalidResponse(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;

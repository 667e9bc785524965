// ABOUTME: Capability interface every sandbox service backend must implement
// ABOUTME: Expiry is part of the contract, with assume-alive expressed as Ok(None)

use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Handle to one provisioned sandbox instance.
#[derive(Debug, Clone)]
pub struct SandboxHandle {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Output of one command run inside a sandbox.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

/// File content crossing the sandbox boundary. Text travels as UTF-8,
/// binary is base64-encoded on the wire by the provider.
#[derive(Debug, Clone)]
pub enum FilePayload {
    Text(String),
    Binary(Vec<u8>),
}

impl FilePayload {
    pub fn len(&self) -> usize {
        match self {
            FilePayload::Text(s) => s.len(),
            FilePayload::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            FilePayload::Text(s) => s.into_bytes(),
            FilePayload::Binary(b) => b,
        }
    }
}

/// Existence and metadata for a sandbox-side path.
#[derive(Debug, Clone, Default)]
pub struct FileStat {
    pub exists: bool,
    pub is_file: bool,
    pub is_directory: bool,
    pub size: Option<u64>,
}

/// Capability interface for the remote sandbox service.
///
/// The service's internal scheduling is out of scope; this trait only
/// names the operations the bridge relies on.
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    /// Provision a fresh sandbox instance.
    async fn create_sandbox(&self) -> Result<SandboxHandle>;

    /// Run a command (argv form, no shell unless the command is one).
    async fn run_command(
        &self,
        sandbox_id: &str,
        command: Vec<String>,
        env: HashMap<String, String>,
        timeout_ms: u64,
    ) -> Result<RunOutput>;

    /// Write a file into the sandbox filesystem.
    async fn write_file(&self, sandbox_id: &str, path: &str, payload: FilePayload) -> Result<()>;

    /// Read a file from the sandbox filesystem.
    async fn read_file(&self, sandbox_id: &str, path: &str) -> Result<Vec<u8>>;

    /// List entries under a sandbox directory.
    async fn list_files(&self, sandbox_id: &str, dir: &str) -> Result<Vec<String>>;

    /// Stat a sandbox path without reading it.
    async fn stat_file(&self, sandbox_id: &str, path: &str) -> Result<FileStat>;

    /// Tear the sandbox down.
    async fn kill_sandbox(&self, sandbox_id: &str) -> Result<()>;

    /// Sandbox-reported expiry, if the service exposes one. `Ok(None)`
    /// means the service has no expiry metadata and callers should
    /// assume the sandbox is alive while the handle exists.
    async fn expires_at(&self, sandbox_id: &str) -> Result<Option<DateTime<Utc>>>;
}

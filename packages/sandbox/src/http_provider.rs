// ABOUTME: SandboxProvider implementation over the sandbox service REST API
// ABOUTME: JSON envelopes with base64 file payloads, stable error wording for retry classification

use crate::provider::{FilePayload, FileStat, RunOutput, SandboxHandle, SandboxProvider};
use crate::{Result, SandboxError};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// HTTP client for the remote sandbox service.
#[derive(Clone)]
pub struct HttpSandboxProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct CreateResponse {
    sandbox_id: String,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct SandboxInfoResponse {
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct ExecRequest {
    command: Vec<String>,
    env: HashMap<String, String>,
    timeout_ms: u64,
}

#[derive(Deserialize)]
struct ExecResponse {
    exit_code: i64,
    #[serde(default)]
    stdout: String,
    #[serde(default)]
    stderr: String,
}

#[derive(Serialize)]
struct WriteFileRequest<'a> {
    path: &'a str,
    content: String,
    encoding: &'static str,
}

#[derive(Deserialize)]
struct ReadFileResponse {
    content: String,
    #[serde(default = "default_encoding")]
    encoding: String,
}

fn default_encoding() -> String {
    "utf8".to_string()
}

#[derive(Deserialize)]
struct ListFilesResponse {
    entries: Vec<String>,
}

#[derive(Deserialize)]
struct StatFileResponse {
    exists: bool,
    #[serde(default)]
    is_file: bool,
    #[serde(default)]
    is_directory: bool,
    #[serde(default)]
    size: Option<u64>,
}

impl HttpSandboxProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == reqwest::StatusCode::NOT_FOUND {
            Err(SandboxError::NotFound(body))
        } else {
            Err(SandboxError::Service(format!("{status}: {body}")))
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| SandboxError::Connection(e.to_string()))?;
        self.check(response).await
    }
}

#[async_trait]
impl SandboxProvider for HttpSandboxProvider {
    async fn create_sandbox(&self) -> Result<SandboxHandle> {
        let response = self
            .send(self.client.post(self.url("/sandboxes")).json(&serde_json::json!({})))
            .await?;

        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;

        if let Some(expires) = created.expires_at {
            debug!("Sandbox {} expires at {}", created.sandbox_id, expires);
        }
        info!("Created sandbox {}", created.sandbox_id);
        Ok(SandboxHandle {
            id: created.sandbox_id,
            created_at: Utc::now(),
        })
    }

    async fn run_command(
        &self,
        sandbox_id: &str,
        command: Vec<String>,
        env: HashMap<String, String>,
        timeout_ms: u64,
    ) -> Result<RunOutput> {
        debug!("Running command in sandbox {}: {:?}", sandbox_id, command);
        let request = ExecRequest {
            command,
            env,
            timeout_ms,
        };

        let response = self
            .send(
                self.client
                    .post(self.url(&format!("/sandboxes/{sandbox_id}/exec")))
                    .json(&request),
            )
            .await?;

        let exec: ExecResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;

        Ok(RunOutput {
            exit_code: exec.exit_code,
            stdout: exec.stdout,
            stderr: exec.stderr,
        })
    }

    async fn write_file(&self, sandbox_id: &str, path: &str, payload: FilePayload) -> Result<()> {
        let (content, encoding) = match payload {
            FilePayload::Text(text) => (text, "utf8"),
            FilePayload::Binary(bytes) => (B64.encode(bytes), "base64"),
        };

        let request = WriteFileRequest {
            path,
            content,
            encoding,
        };

        self.send(
            self.client
                .put(self.url(&format!("/sandboxes/{sandbox_id}/files")))
                .json(&request),
        )
        .await?;
        Ok(())
    }

    async fn read_file(&self, sandbox_id: &str, path: &str) -> Result<Vec<u8>> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/sandboxes/{sandbox_id}/files")))
                    .query(&[("path", path)]),
            )
            .await?;

        let file: ReadFileResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;

        match file.encoding.as_str() {
            "base64" => B64
                .decode(file.content.as_bytes())
                .map_err(|e| SandboxError::InvalidResponse(format!("bad base64 payload: {e}"))),
            _ => Ok(file.content.into_bytes()),
        }
    }

    async fn list_files(&self, sandbox_id: &str, dir: &str) -> Result<Vec<String>> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/sandboxes/{sandbox_id}/files/list")))
                    .query(&[("dir", dir)]),
            )
            .await?;

        let list: ListFilesResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;
        Ok(list.entries)
    }

    async fn stat_file(&self, sandbox_id: &str, path: &str) -> Result<FileStat> {
        let response = self
            .send(
                self.client
                    .get(self.url(&format!("/sandboxes/{sandbox_id}/files/stat")))
                    .query(&[("path", path)]),
            )
            .await?;

        let stat: StatFileResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;

        Ok(FileStat {
            exists: stat.exists,
            is_file: stat.is_file,
            is_directory: stat.is_directory,
            size: stat.size,
        })
    }

    async fn kill_sandbox(&self, sandbox_id: &str) -> Result<()> {
        self.send(self.client.delete(self.url(&format!("/sandboxes/{sandbox_id}"))))
            .await?;
        info!("Killed sandbox {}", sandbox_id);
        Ok(())
    }

    async fn expires_at(&self, sandbox_id: &str) -> Result<Option<DateTime<Utc>>> {
        let response = self
            .send(self.client.get(self.url(&format!("/sandboxes/{sandbox_id}"))))
            .await?;

        let info: SandboxInfoResponse = response
            .json()
            .await
            .map_err(|e| SandboxError::InvalidResponse(e.to_string()))?;
        Ok(info.expires_at)
    }
}

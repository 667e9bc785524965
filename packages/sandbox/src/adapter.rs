// ABOUTME: Execution sandbox adapter owning one sandbox with retried init and liveness math
// ABOUTME: Normalizes every execution into a non-throwing ExecutionResult

use crate::provider::{FilePayload, FileStat, SandboxHandle, SandboxProvider};
use crate::{Result, SandboxError};
use chrono::{DateTime, Utc};
use relay_config::{
    BINARY_EXTENSIONS, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_DURATION_SECS, MAX_TRANSFER_BYTES,
    SANDBOX_OUTPUT_DIR, SANDBOX_WORK_DIR,
};
use relay_retry::{with_retry, RetryOptions};
use relay_security::filter_env_vars;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Scratch directory for source files of compiled-language runs.
const EXEC_SCRATCH_DIR: &str = "/tmp/relay_exec";

/// Adapter lifecycle. CleanedUp is terminal; a new task gets a new adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Initializing,
    Ready,
    CleanedUp,
}

/// Languages the execute endpoint accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Python,
    Bash,
    Javascript,
    Typescript,
    Cpp,
    C,
    Go,
    Rust,
    Ruby,
    Java,
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "bash" | "sh" | "shell" => Ok(Language::Bash),
            "javascript" | "js" | "node" => Ok(Language::Javascript),
            "typescript" | "ts" => Ok(Language::Typescript),
            "cpp" | "c++" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            "go" | "golang" => Ok(Language::Go),
            "rust" => Ok(Language::Rust),
            "ruby" | "rb" => Ok(Language::Ruby),
            "java" => Ok(Language::Java),
            other => Err(format!("Unsupported language: {other}")),
        }
    }
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Bash => "bash",
            Language::Javascript => "javascript",
            Language::Typescript => "typescript",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Ruby => "ruby",
            Language::Java => "java",
        }
    }
}

/// Outcome of one execute call. Immutable once produced; execution
/// failures are reported here, never thrown.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i64,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl ExecutionResult {
    fn failure(message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.into(),
            exit_code: -1,
            duration_ms,
            timed_out: false,
        }
    }
}

/// Adapter configuration.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub max_transfer_bytes: u64,
    pub idle_timeout: Duration,
    pub max_duration: Duration,
    pub work_dir: String,
    pub output_dir: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_transfer_bytes: MAX_TRANSFER_BYTES,
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECS),
            work_dir: SANDBOX_WORK_DIR.to_string(),
            output_dir: SANDBOX_OUTPUT_DIR.to_string(),
        }
    }
}

struct Inner {
    state: AdapterState,
    handle: Option<SandboxHandle>,
    env_vars: HashMap<String, String>,
    created_at: Option<DateTime<Utc>>,
    last_activity: Option<DateTime<Utc>>,
}

/// Owns at most one sandbox instance and every operation against it.
pub struct SandboxAdapter {
    provider: Arc<dyn SandboxProvider>,
    config: SandboxConfig,
    inner: RwLock<Inner>,
}

struct Invocation {
    /// Source file to write before running, for languages that cannot
    /// take the program on the command line.
    source: Option<(String, String)>,
    command: Vec<String>,
}

impl SandboxAdapter {
    pub fn new(provider: Arc<dyn SandboxProvider>, config: SandboxConfig) -> Self {
        Self {
            provider,
            config,
            inner: RwLock::new(Inner {
                state: AdapterState::Uninitialized,
                handle: None,
                env_vars: HashMap::new(),
                created_at: None,
                last_activity: None,
            }),
        }
    }

    pub async fn state(&self) -> AdapterState {
        self.inner.read().await.state
    }

    pub async fn sandbox_id(&self) -> Option<String> {
        self.inner.read().await.handle.as_ref().map(|h| h.id.clone())
    }

    pub async fn created_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.created_at
    }

    pub async fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_activity
    }

    /// Provision the sandbox. Idempotent: a Ready adapter is a no-op.
    /// Creation runs under the sandbox-init retry policy; bootstrap of
    /// working directories is best-effort since many tasks never touch
    /// the filesystem.
    pub async fn initialize(&self) -> Result<()> {
        {
            let mut inner = self.inner.write().await;
            match inner.state {
                AdapterState::Ready => return Ok(()),
                AdapterState::CleanedUp => {
                    return Err(SandboxError::Service(
                        "adapter already cleaned up".to_string(),
                    ))
                }
                AdapterState::Initializing => {
                    return Err(SandboxError::Service(
                        "initialization already in progress".to_string(),
                    ))
                }
                AdapterState::Uninitialized => inner.state = AdapterState::Initializing,
            }
        }

        let options = RetryOptions::sandbox_init();
        let provider = self.provider.clone();
        let created = with_retry(&options, || {
            let provider = provider.clone();
            async move { provider.create_sandbox().await }
        })
        .await;

        let handle = match created {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.write().await.state = AdapterState::Uninitialized;
                return Err(e);
            }
        };

        info!("Sandbox adapter ready with sandbox {}", handle.id);
        let sandbox_id = handle.id.clone();
        {
            let mut inner = self.inner.write().await;
            let now = Utc::now();
            inner.handle = Some(handle);
            inner.created_at = Some(now);
            inner.last_activity = Some(now);
            inner.state = AdapterState::Ready;
        }

        let scratch = EXEC_SCRATCH_DIR.to_string();
        for dir in [&self.config.work_dir, &self.config.output_dir, &scratch] {
            let mkdir = self
                .provider
                .run_command(
                    &sandbox_id,
                    vec!["mkdir".to_string(), "-p".to_string(), dir.clone()],
                    HashMap::new(),
                    10_000,
                )
                .await;
            if let Err(e) = mkdir {
                warn!("Session bootstrap: could not create {}: {}", dir, e);
            }
        }

        Ok(())
    }

    /// Run code in the sandbox and normalize the outcome.
    ///
    /// The provider call is raced against a local timer; on timeout the
    /// caller gets `timed_out = true` immediately while the sandbox-side
    /// process may keep running until the service's own limits apply.
    /// Transient connection errors retry under the code-execution
    /// policy; semantic language errors never do.
    pub async fn execute_code(
        &self,
        code: &str,
        language: Language,
        timeout_ms: u64,
    ) -> ExecutionResult {
        let started = Instant::now();

        let (sandbox_id, env) = {
            let inner = self.inner.read().await;
            if inner.state != AdapterState::Ready {
                return ExecutionResult::failure("sandbox not initialized", 0);
            }
            match &inner.handle {
                Some(handle) => (handle.id.clone(), inner.env_vars.clone()),
                None => return ExecutionResult::failure("sandbox not initialized", 0),
            }
        };

        let invocation = build_invocation(code, language);
        debug!(
            "Executing {} code in sandbox {} (timeout {}ms)",
            language.as_str(),
            sandbox_id,
            timeout_ms
        );

        let options = RetryOptions::code_execution();
        let provider = self.provider.clone();
        let outcome = with_retry(&options, || {
            let provider = provider.clone();
            let sandbox_id = sandbox_id.clone();
            let env = env.clone();
            let command = invocation.command.clone();
            let source = invocation.source.clone();
            async move {
                let attempt = async {
                    if let Some((path, content)) = &source {
                        provider
                            .write_file(&sandbox_id, path, FilePayload::Text(content.clone()))
                            .await?;
                    }
                    provider.run_command(&sandbox_id, command, env, timeout_ms).await
                };

                match tokio::time::timeout(Duration::from_millis(timeout_ms), attempt).await {
                    Ok(result) => result.map(|output| (output, false)),
                    // Local race only; the sandbox-side process is left
                    // to the service's own idle/duration limits.
                    Err(_) => Ok((
                        crate::provider::RunOutput {
                            exit_code: -1,
                            stdout: String::new(),
                            stderr: format!("Execution timed out after {timeout_ms}ms"),
                        },
                        true,
                    )),
                }
            }
        })
        .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok((output, timed_out)) => {
                let success = !timed_out && output.exit_code == 0;
                if success {
                    self.update_activity().await;
                }
                ExecutionResult {
                    success,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    exit_code: output.exit_code,
                    duration_ms,
                    timed_out,
                }
            }
            Err(e) => ExecutionResult::failure(e.to_string(), duration_ms),
        }
    }

    /// Upload a local file into the sandbox. Size-checked before
    /// transfer; binary extensions travel base64, text as UTF-8.
    pub async fn upload_file(&self, local_path: &Path, sandbox_path: &str) -> Result<u64> {
        let sandbox_id = self.require_ready().await?;

        let metadata = tokio::fs::metadata(local_path)
            .await
            .map_err(|e| SandboxError::LocalFile(format!("{}: {e}", local_path.display())))?;
        let size = metadata.len();
        if size > self.config.max_transfer_bytes {
            return Err(SandboxError::FileTooLarge {
                size,
                limit: self.config.max_transfer_bytes,
            });
        }

        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| SandboxError::LocalFile(format!("{}: {e}", local_path.display())))?;

        let payload = if is_binary_path(local_path) {
            FilePayload::Binary(bytes)
        } else {
            match String::from_utf8(bytes) {
                Ok(text) => FilePayload::Text(text),
                // Extension lied; ship bytes rather than corrupt them.
                Err(e) => FilePayload::Binary(e.into_bytes()),
            }
        };

        if let Some(parent) = parent_dir(sandbox_path) {
            let _ = self
                .provider
                .run_command(
                    &sandbox_id,
                    vec!["mkdir".to_string(), "-p".to_string(), parent],
                    HashMap::new(),
                    10_000,
                )
                .await;
        }

        self.provider
            .write_file(&sandbox_id, sandbox_path, payload)
            .await?;
        self.update_activity().await;
        Ok(size)
    }

    /// Download a sandbox file to a local path, creating parent
    /// directories. Size-checked against the transfer ceiling before
    /// the read when the stat reports one, and on the bytes otherwise.
    pub async fn download_file(&self, sandbox_path: &str, local_path: &Path) -> Result<u64> {
        let sandbox_id = self.require_ready().await?;

        let stat = self.provider.stat_file(&sandbox_id, sandbox_path).await?;
        if !stat.exists {
            return Err(SandboxError::NotFound(sandbox_path.to_string()));
        }
        if let Some(size) = stat.size {
            if size > self.config.max_transfer_bytes {
                return Err(SandboxError::FileTooLarge {
                    size,
                    limit: self.config.max_transfer_bytes,
                });
            }
        }

        let bytes = self.provider.read_file(&sandbox_id, sandbox_path).await?;
        // The stat may not carry a size; re-check against the actual bytes.
        if bytes.len() as u64 > self.config.max_transfer_bytes {
            return Err(SandboxError::FileTooLarge {
                size: bytes.len() as u64,
                limit: self.config.max_transfer_bytes,
            });
        }

        if let Some(parent) = local_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SandboxError::LocalFile(format!("{}: {e}", parent.display())))?;
            }
        }
        let written = bytes.len() as u64;
        tokio::fs::write(local_path, bytes)
            .await
            .map_err(|e| SandboxError::LocalFile(format!("{}: {e}", local_path.display())))?;

        self.update_activity().await;
        Ok(written)
    }

    /// Stat a sandbox path without side effects.
    pub async fn check_file(&self, sandbox_path: &str) -> Result<FileStat> {
        let sandbox_id = self.require_ready().await?;
        let stat = self.provider.stat_file(&sandbox_id, sandbox_path).await?;
        self.update_activity().await;
        Ok(stat)
    }

    pub async fn list_files(&self, dir: &str) -> Result<Vec<String>> {
        let sandbox_id = self.require_ready().await?;
        let entries = self.provider.list_files(&sandbox_id, dir).await?;
        self.update_activity().await;
        Ok(entries)
    }

    /// Merge environment variables into the session environment.
    /// Sensitive-looking names are filtered out before they can reach
    /// the sandbox.
    pub async fn set_env_vars(&self, vars: HashMap<String, String>) {
        let filtered = filter_env_vars(vars);
        let mut inner = self.inner.write().await;
        inner.env_vars.extend(filtered);
    }

    pub async fn env_vars(&self) -> HashMap<String, String> {
        self.inner.read().await.env_vars.clone()
    }

    /// Liveness per the provider's expiry metadata, assuming alive when
    /// the service exposes none or the probe itself fails.
    pub async fn is_alive(&self) -> bool {
        let sandbox_id = {
            let inner = self.inner.read().await;
            if inner.state != AdapterState::Ready {
                return false;
            }
            match &inner.handle {
                Some(handle) => handle.id.clone(),
                None => return false,
            }
        };

        match self.provider.expires_at(&sandbox_id).await {
            Ok(Some(expires)) => expires > Utc::now(),
            Ok(None) => true,
            Err(e) => {
                warn!("Could not query sandbox expiry, assuming alive: {}", e);
                true
            }
        }
    }

    pub async fn is_idle_timed_out(&self) -> bool {
        let last = self.inner.read().await.last_activity;
        match last {
            Some(last) => elapsed_since(last) > self.config.idle_timeout,
            None => false,
        }
    }

    pub async fn is_max_duration_exceeded(&self) -> bool {
        let created = self.inner.read().await.created_at;
        match created {
            Some(created) => elapsed_since(created) > self.config.max_duration,
            None => false,
        }
    }

    pub async fn update_activity(&self) {
        self.inner.write().await.last_activity = Some(Utc::now());
    }

    /// Kill the sandbox and enter the terminal state. Teardown errors
    /// are logged, not propagated.
    pub async fn cleanup(&self) {
        let handle = {
            let mut inner = self.inner.write().await;
            inner.state = AdapterState::CleanedUp;
            inner.handle.take()
        };

        if let Some(handle) = handle {
            if let Err(e) = self.provider.kill_sandbox(&handle.id).await {
                warn!("Failed to kill sandbox {}: {}", handle.id, e);
            }
        }
    }

    async fn require_ready(&self) -> Result<String> {
        let inner = self.inner.read().await;
        if inner.state != AdapterState::Ready {
            return Err(SandboxError::NotInitialized);
        }
        inner
            .handle
            .as_ref()
            .map(|h| h.id.clone())
            .ok_or(SandboxError::NotInitialized)
    }

    #[cfg(test)]
    async fn backdate_for_test(&self, last_activity_secs: i64, created_secs: i64) {
        let mut inner = self.inner.write().await;
        inner.last_activity = Some(Utc::now() - chrono::Duration::seconds(last_activity_secs));
        inner.created_at = Some(Utc::now() - chrono::Duration::seconds(created_secs));
    }
}

fn elapsed_since(instant: DateTime<Utc>) -> Duration {
    Utc::now()
        .signed_duration_since(instant)
        .to_std()
        .unwrap_or_default()
}

fn parent_dir(path: &str) -> Option<String> {
    let trimmed = path.trim_end_matches('/');
    trimmed
        .rfind('/')
        .filter(|idx| *idx > 0)
        .map(|idx| trimmed[..idx].to_string())
}

fn is_binary_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_lowercase();
            BINARY_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

fn build_invocation(code: &str, language: Language) -> Invocation {
    let shell = |script: String| {
        vec!["bash".to_string(), "-lc".to_string(), script]
    };

    match language {
        Language::Python => Invocation {
            source: None,
            command: vec!["python3".to_string(), "-c".to_string(), code.to_string()],
        },
        Language::Bash => Invocation {
            source: None,
            command: vec!["bash".to_string(), "-lc".to_string(), code.to_string()],
        },
        Language::Javascript => Invocation {
            source: None,
            command: vec!["node".to_string(), "-e".to_string(), code.to_string()],
        },
        Language::Ruby => Invocation {
            source: None,
            command: vec!["ruby".to_string(), "-e".to_string(), code.to_string()],
        },
        Language::Typescript => Invocation {
            source: Some((format!("{EXEC_SCRATCH_DIR}/main.ts"), code.to_string())),
            command: vec![
                "npx".to_string(),
                "tsx".to_string(),
                format!("{EXEC_SCRATCH_DIR}/main.ts"),
            ],
        },
        Language::C => Invocation {
            source: Some((format!("{EXEC_SCRATCH_DIR}/main.c"), code.to_string())),
            command: shell(format!(
                "mkdir -p {d} && cc {d}/main.c -o {d}/main && {d}/main",
                d = EXEC_SCRATCH_DIR
            )),
        },
        Language::Cpp => Invocation {
            source: Some((format!("{EXEC_SCRATCH_DIR}/main.cpp"), code.to_string())),
            command: shell(format!(
                "mkdir -p {d} && c++ {d}/main.cpp -o {d}/main && {d}/main",
                d = EXEC_SCRATCH_DIR
            )),
        },
        Language::Go => Invocation {
            source: Some((format!("{EXEC_SCRATCH_DIR}/main.go"), code.to_string())),
            command: shell(format!("cd {d} && go run main.go", d = EXEC_SCRATCH_DIR)),
        },
        Language::Rust => Invocation {
            source: Some((format!("{EXEC_SCRATCH_DIR}/main.rs"), code.to_string())),
            command: shell(format!(
                "cd {d} && rustc main.rs -o main && ./main",
                d = EXEC_SCRATCH_DIR
            )),
        },
        Language::Java => Invocation {
            source: Some((format!("{EXEC_SCRATCH_DIR}/Main.java"), code.to_string())),
            command: shell(format!(
                "cd {d} && javac Main.java && java Main",
                d = EXEC_SCRATCH_DIR
            )),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::RunOutput;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    enum RecordedCall {
        Create,
        Run(Vec<String>),
        Write(String, bool),
        Kill,
    }

    /// In-memory provider double recording calls.
    struct FakeProvider {
        calls: Mutex<Vec<RecordedCall>>,
        create_failures: AtomicU32,
        run_exit_code: i64,
        run_stderr: String,
        expires: Mutex<Option<DateTime<Utc>>>,
        hang_runs: std::sync::atomic::AtomicBool,
        stat_size_unknown: std::sync::atomic::AtomicBool,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                create_failures: AtomicU32::new(0),
                run_exit_code: 0,
                run_stderr: String::new(),
                expires: Mutex::new(None),
                hang_runs: std::sync::atomic::AtomicBool::new(false),
                stat_size_unknown: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn run_commands(&self) -> Vec<Vec<String>> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    RecordedCall::Run(cmd) => Some(cmd.clone()),
                    _ => None,
                })
                .collect()
        }

        fn create_count(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|c| matches!(c, RecordedCall::Create))
                .count()
        }
    }

    #[async_trait]
    impl SandboxProvider for FakeProvider {
        async fn create_sandbox(&self) -> Result<SandboxHandle> {
            self.calls.lock().unwrap().push(RecordedCall::Create);
            if self.create_failures.load(Ordering::SeqCst) > 0 {
                self.create_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(SandboxError::Connection("connection reset".to_string()));
            }
            Ok(SandboxHandle {
                id: "sbx-test".to_string(),
                created_at: Utc::now(),
            })
        }

        async fn run_command(
            &self,
            _sandbox_id: &str,
            command: Vec<String>,
            _env: HashMap<String, String>,
            _timeout_ms: u64,
        ) -> Result<RunOutput> {
            self.calls
                .lock()
                .unwrap()
                .push(RecordedCall::Run(command));
            if self.hang_runs.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(RunOutput {
                exit_code: self.run_exit_code,
                stdout: "out".to_string(),
                stderr: self.run_stderr.clone(),
            })
        }

        async fn write_file(
            &self,
            _sandbox_id: &str,
            path: &str,
            payload: FilePayload,
        ) -> Result<()> {
            let binary = matches!(payload, FilePayload::Binary(_));
            self.calls
                .lock()
                .unwrap()
                .push(RecordedCall::Write(path.to_string(), binary));
            Ok(())
        }

        async fn read_file(&self, _sandbox_id: &str, _path: &str) -> Result<Vec<u8>> {
            Ok(b"payload".to_vec())
        }

        async fn list_files(&self, _sandbox_id: &str, _dir: &str) -> Result<Vec<String>> {
            Ok(vec!["a.txt".to_string()])
        }

        async fn stat_file(&self, _sandbox_id: &str, _path: &str) -> Result<FileStat> {
            let size = if self.stat_size_unknown.load(Ordering::SeqCst) {
                None
            } else {
                Some(7)
            };
            Ok(FileStat {
                exists: true,
                is_file: true,
                is_directory: false,
                size,
            })
        }

        async fn kill_sandbox(&self, _sandbox_id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(RecordedCall::Kill);
            Ok(())
        }

        async fn expires_at(&self, _sandbox_id: &str) -> Result<Option<DateTime<Utc>>> {
            Ok(*self.expires.lock().unwrap())
        }
    }

    fn adapter_with(provider: FakeProvider) -> (Arc<FakeProvider>, SandboxAdapter) {
        let provider = Arc::new(provider);
        let adapter = SandboxAdapter::new(provider.clone(), SandboxConfig::default());
        (provider, adapter)
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (provider, adapter) = adapter_with(FakeProvider::new());

        adapter.initialize().await.unwrap();
        adapter.initialize().await.unwrap();

        assert_eq!(provider.create_count(), 1);
        assert_eq!(adapter.state().await, AdapterState::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_retries_transient_failures() {
        let fake = FakeProvider::new();
        fake.create_failures.store(2, Ordering::SeqCst);
        let (provider, adapter) = adapter_with(fake);

        adapter.initialize().await.unwrap();
        assert_eq!(provider.create_count(), 3);
    }

    #[tokio::test]
    async fn initialize_bootstraps_work_output_and_scratch_dirs() {
        let (provider, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();

        let runs = provider.run_commands();
        assert_eq!(runs.len(), 3);
        for run in &runs {
            assert_eq!(run[0], "mkdir");
            assert_eq!(run[1], "-p");
        }
        let dirs: Vec<&str> = runs.iter().map(|r| r[2].as_str()).collect();
        assert!(dirs.contains(&EXEC_SCRATCH_DIR));
    }

    #[tokio::test]
    async fn execute_python_uses_interpreter_invocation() {
        let (provider, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();

        let result = adapter.execute_code("print(1)", Language::Python, 30_000).await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);

        let runs = provider.run_commands();
        let exec = runs.last().unwrap();
        assert_eq!(exec[0], "python3");
        assert_eq!(exec[1], "-c");
        assert_eq!(exec[2], "print(1)");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_retried() {
        let mut fake = FakeProvider::new();
        fake.run_exit_code = 1;
        fake.run_stderr = "SyntaxError: invalid syntax".to_string();
        let (provider, adapter) = adapter_with(fake);
        adapter.initialize().await.unwrap();
        let before = provider.run_commands().len();

        let result = adapter.execute_code("prnt(1)", Language::Python, 30_000).await;
        assert!(!result.success);
        assert!(!result.timed_out);
        assert!(result.stderr.contains("SyntaxError"));
        // One execution call, no retry for a completed command.
        assert_eq!(provider.run_commands().len(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn local_timeout_returns_timed_out_result() {
        let (provider, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();
        provider.hang_runs.store(true, Ordering::SeqCst);

        let result = adapter.execute_code("while True: pass", Language::Python, 500).await;
        assert!(result.timed_out);
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
    }

    #[tokio::test]
    async fn compiled_language_writes_source_first() {
        let (provider, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();

        let result = adapter
            .execute_code("int main(){return 0;}", Language::C, 30_000)
            .await;
        assert!(result.success);

        let wrote_source = provider.calls.lock().unwrap().iter().any(|c| {
            matches!(c, RecordedCall::Write(path, false) if path.ends_with("main.c"))
        });
        assert!(wrote_source);
    }

    #[tokio::test]
    async fn sensitive_env_vars_never_reach_the_sandbox() {
        let (_, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();

        let mut vars = HashMap::new();
        vars.insert("DATA_DIR".to_string(), "/data".to_string());
        vars.insert("AWS_SECRET_ACCESS_KEY".to_string(), "hunter2".to_string());
        vars.insert("api_token".to_string(), "t".to_string());
        adapter.set_env_vars(vars).await;

        let env = adapter.env_vars().await;
        assert_eq!(env.len(), 1);
        assert!(env.contains_key("DATA_DIR"));
    }

    #[tokio::test]
    async fn upload_rejects_oversized_files() {
        let provider = Arc::new(FakeProvider::new());
        let config = SandboxConfig {
            max_transfer_bytes: 4,
            ..SandboxConfig::default()
        };
        let adapter = SandboxAdapter::new(provider, config);
        adapter.initialize().await.unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("big.txt");
        std::fs::write(&file, "more than four bytes").unwrap();

        let err = adapter.upload_file(&file, "/home/user/big.txt").await.unwrap_err();
        assert!(matches!(err, SandboxError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn download_enforces_ceiling_when_stat_size_is_unknown() {
        let provider = Arc::new(FakeProvider::new());
        provider
            .stat_size_unknown
            .store(true, Ordering::SeqCst);
        let config = SandboxConfig {
            max_transfer_bytes: 4,
            ..SandboxConfig::default()
        };
        let adapter = SandboxAdapter::new(provider, config);
        adapter.initialize().await.unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("out.txt");

        let err = adapter
            .download_file("/home/user/output/out.txt", &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::FileTooLarge { size: 7, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn upload_picks_binary_payload_by_extension() {
        let (provider, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let png = dir.path().join("img.png");
        std::fs::write(&png, [0u8, 1, 2]).unwrap();
        let csv = dir.path().join("data.csv");
        std::fs::write(&csv, "a,b\n").unwrap();

        adapter.upload_file(&png, "/home/user/img.png").await.unwrap();
        adapter.upload_file(&csv, "/home/user/data.csv").await.unwrap();

        let calls = provider.calls.lock().unwrap();
        let writes: Vec<_> = calls
            .iter()
            .filter_map(|c| match c {
                RecordedCall::Write(path, binary) => Some((path.clone(), *binary)),
                _ => None,
            })
            .collect();
        assert!(writes.contains(&("/home/user/img.png".to_string(), true)));
        assert!(writes.contains(&("/home/user/data.csv".to_string(), false)));
    }

    #[tokio::test]
    async fn idle_and_max_duration_follow_the_clock() {
        let (_, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();

        assert!(!adapter.is_idle_timed_out().await);
        assert!(!adapter.is_max_duration_exceeded().await);

        adapter
            .backdate_for_test(
                DEFAULT_IDLE_TIMEOUT_SECS as i64 + 1,
                DEFAULT_MAX_DURATION_SECS as i64 + 1,
            )
            .await;
        assert!(adapter.is_idle_timed_out().await);
        assert!(adapter.is_max_duration_exceeded().await);

        adapter.update_activity().await;
        assert!(!adapter.is_idle_timed_out().await);
    }

    #[tokio::test]
    async fn expired_sandbox_is_not_alive() {
        let (provider, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();
        assert!(adapter.is_alive().await);

        *provider.expires.lock().unwrap() = Some(Utc::now() - chrono::Duration::seconds(60));
        assert!(!adapter.is_alive().await);
    }

    #[tokio::test]
    async fn cleanup_kills_sandbox_and_is_terminal() {
        let (provider, adapter) = adapter_with(FakeProvider::new());
        adapter.initialize().await.unwrap();

        adapter.cleanup().await;
        assert_eq!(adapter.state().await, AdapterState::CleanedUp);
        assert!(provider
            .calls
            .lock()
            .unwrap()
            .iter()
            .any(|c| matches!(c, RecordedCall::Kill)));

        assert!(adapter.initialize().await.is_err());
    }
}

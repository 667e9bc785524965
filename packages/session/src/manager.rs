// ABOUTME: Session lifecycle: reuse-or-recreate decision, idle sweep, ordered teardown
// ABOUTME: Creation order is sandbox then tool server then tunnel; teardown is the reverse

use crate::Result;
use chrono::{DateTime, Utc};
use relay_config::IDLE_SWEEP_INTERVAL_SECS;
use relay_sandbox::{SandboxAdapter, SandboxConfig, SandboxProvider};
use relay_server::{start_server, ToolServerHandle};
use relay_tunnel::TunnelManager;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One live session. Exclusively owned by the manager; a stale session
/// is torn down and replaced, never patched.
pub struct Session {
    pub id: String,
    pub adapter: Arc<SandboxAdapter>,
    pub server: ToolServerHandle,
    pub tunnel_url: String,
    pub local_url: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

/// What a caller needs to hand the remote engine.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub tunnel_url: String,
    pub local_url: String,
    pub created_at: DateTime<Utc>,
    pub reused: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub sandbox_id: Option<String>,
    pub tunnel_url: String,
    pub local_url: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub age_secs: i64,
    pub idle_secs: i64,
    pub tunnel_healthy: bool,
}

#[derive(Debug, Clone)]
pub struct SessionManagerConfig {
    /// Port for the tool server; 0 binds an ephemeral port.
    pub port: u16,
    pub sandbox: SandboxConfig,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            port: relay_config::DEFAULT_PORT,
            sandbox: SandboxConfig::default(),
        }
    }
}

pub struct SessionManager {
    provider: Arc<dyn SandboxProvider>,
    tunnel: Arc<TunnelManager>,
    config: SessionManagerConfig,
    session: Arc<RwLock<Option<Session>>>,
    sweep_running: Arc<RwLock<bool>>,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn SandboxProvider>,
        tunnel: Arc<TunnelManager>,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            provider,
            tunnel,
            config,
            session: Arc::new(RwLock::new(None)),
            sweep_running: Arc::new(RwLock::new(false)),
        }
    }

    /// Reuse the current session when it is still serviceable,
    /// otherwise tear it down and build a fresh one.
    pub async fn get_or_create(&self) -> Result<SessionInfo> {
        let mut guard = self.session.write().await;

        if let Some(mut session) = guard.take() {
            if self.is_reusable(&mut session).await {
                session.last_used_at = Utc::now();
                session.adapter.update_activity().await;
                debug!("Reusing session {}", session.id);
                let info = SessionInfo {
                    session_id: session.id.clone(),
                    tunnel_url: session.tunnel_url.clone(),
                    local_url: session.local_url.clone(),
                    created_at: session.created_at,
                    reused: true,
                };
                *guard = Some(session);
                return Ok(info);
            }
            info!("Session {} no longer serviceable, recreating", session.id);
            teardown(&self.tunnel, session).await;
        }

        let session = self.create_session().await?;
        let info = SessionInfo {
            session_id: session.id.clone(),
            tunnel_url: session.tunnel_url.clone(),
            local_url: session.local_url.clone(),
            created_at: session.created_at,
            reused: false,
        };
        *guard = Some(session);
        Ok(info)
    }

    /// Unconditional teardown and recreate.
    pub async fn reset(&self) -> Result<SessionInfo> {
        {
            let mut guard = self.session.write().await;
            if let Some(stale) = guard.take() {
                info!("Resetting session {}", stale.id);
                teardown(&self.tunnel, stale).await;
            }
        }
        self.get_or_create().await
    }

    pub async fn status(&self) -> Option<SessionStatus> {
        let guard = self.session.read().await;
        let session = guard.as_ref()?;
        let now = Utc::now();
        Some(SessionStatus {
            session_id: session.id.clone(),
            sandbox_id: session.adapter.sandbox_id().await,
            tunnel_url: session.tunnel_url.clone(),
            local_url: session.local_url.clone(),
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            age_secs: now.signed_duration_since(session.created_at).num_seconds(),
            idle_secs: now.signed_duration_since(session.last_used_at).num_seconds(),
            tunnel_healthy: self.tunnel.health().await.is_healthy,
        })
    }

    /// Tear down idle or over-age sessions on a timer, independent of
    /// traffic. The task holds only weak-ish clones of shared state and
    /// never keeps the process alive past `cleanup()`.
    pub async fn start_idle_sweep(&self) {
        {
            let mut running = self.sweep_running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        let session = self.session.clone();
        let running = self.sweep_running.clone();
        let tunnel = self.tunnel.clone();
        let idle_timeout = self.config.sandbox.idle_timeout;
        let max_duration = self.config.sandbox.max_duration;

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(IDLE_SWEEP_INTERVAL_SECS));
            interval.tick().await;

            loop {
                interval.tick().await;
                if !*running.read().await {
                    debug!("Idle sweep stopped");
                    break;
                }

                let expired = {
                    let guard = session.read().await;
                    match guard.as_ref() {
                        Some(s) => {
                            let now = Utc::now();
                            let idle = elapsed(now, s.last_used_at) > idle_timeout;
                            let over_age = elapsed(now, s.created_at) > max_duration;
                            idle || over_age
                        }
                        None => false,
                    }
                };

                if expired {
                    if let Some(stale) = session.write().await.take() {
                        info!("Idle sweep tearing down session {}", stale.id);
                        teardown(&tunnel, stale).await;
                    }
                }
            }
        });
    }

    /// Stop the sweep and tear everything down in tunnel, server,
    /// sandbox order. Teardown errors are logged, never raised.
    pub async fn cleanup(&self) {
        *self.sweep_running.write().await = false;
        let stale = self.session.write().await.take();
        if let Some(stale) = stale {
            info!("Cleaning up session {}", stale.id);
            teardown(&self.tunnel, stale).await;
        }
    }

    async fn is_reusable(&self, session: &mut Session) -> bool {
        let now = Utc::now();
        if elapsed(now, session.last_used_at) > self.config.sandbox.idle_timeout {
            debug!("Session {} idle-timed-out", session.id);
            return false;
        }
        if elapsed(now, session.created_at) > self.config.sandbox.max_duration {
            debug!("Session {} exceeded max duration", session.id);
            return false;
        }
        if !session.adapter.is_alive().await {
            debug!("Session {} sandbox no longer alive", session.id);
            return false;
        }

        if self.tunnel.health().await.needs_reconnection() {
            match self.tunnel.reconnect_if_needed(session.server.port).await {
                Ok(url) => session.tunnel_url = url,
                Err(e) => {
                    warn!("Tunnel reconnection failed for session {}: {}", session.id, e);
                    return false;
                }
            }
            if self.tunnel.health().await.needs_reconnection() {
                return false;
            }
        }
        true
    }

    async fn create_session(&self) -> Result<Session> {
        let adapter = Arc::new(SandboxAdapter::new(
            self.provider.clone(),
            self.config.sandbox.clone(),
        ));
        adapter.initialize().await?;

        let server = start_server(adapter.clone(), self.config.port).await?;
        let tunnel_url = self.tunnel.setup(&server.local_url, server.port).await?;
        self.tunnel.start_health_monitor().await;

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            adapter,
            local_url: server.local_url.clone(),
            server,
            tunnel_url,
            created_at: now,
            last_used_at: now,
        };
        info!(
            "Session {} ready: local {} public {}",
            session.id, session.local_url, session.tunnel_url
        );
        Ok(session)
    }
}

fn elapsed(now: DateTime<Utc>, since: DateTime<Utc>) -> Duration {
    now.signed_duration_since(since).to_std().unwrap_or_default()
}

async fn teardown(tunnel: &TunnelManager, session: Session) {
    tunnel.stop().await;
    session.server.stop().await;
    session.adapter.cleanup().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use relay_sandbox::provider::{FilePayload, FileStat, RunOutput, SandboxHandle};
    use relay_tunnel::TunnelConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FakeProvider {
        created: AtomicU32,
        killed: AtomicU32,
        expired: AtomicBool,
    }

    impl FakeProvider {
        fn new() -> Self {
            Self {
                created: AtomicU32::new(0),
                killed: AtomicU32::new(0),
                expired: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl SandboxProvider for FakeProvider {
        async fn create_sandbox(&self) -> relay_sandbox::Result<SandboxHandle> {
            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(SandboxHandle {
                id: format!("sbx-{n}"),
                created_at: Utc::now(),
            })
        }

        async fn run_command(
            &self,
            _sandbox_id: &str,
            _command: Vec<String>,
            _env: HashMap<String, String>,
            _timeout_ms: u64,
        ) -> relay_sandbox::Result<RunOutput> {
            Ok(RunOutput {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }

        async fn write_file(
            &self,
            _sandbox_id: &str,
            _path: &str,
            _payload: FilePayload,
        ) -> relay_sandbox::Result<()> {
            Ok(())
        }

        async fn read_file(&self, _sandbox_id: &str, _path: &str) -> relay_sandbox::Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn list_files(
            &self,
            _sandbox_id: &str,
            _dir: &str,
        ) -> relay_sandbox::Result<Vec<String>> {
            Ok(Vec::new())
        }

        async fn stat_file(
            &self,
            _sandbox_id: &str,
            _path: &str,
        ) -> relay_sandbox::Result<FileStat> {
            Ok(FileStat::default())
        }

        async fn kill_sandbox(&self, _sandbox_id: &str) -> relay_sandbox::Result<()> {
            self.killed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn expires_at(
            &self,
            _sandbox_id: &str,
        ) -> relay_sandbox::Result<Option<DateTime<Utc>>> {
            if self.expired.load(Ordering::SeqCst) {
                Ok(Some(Utc::now() - chrono::Duration::seconds(60)))
            } else {
                Ok(None)
            }
        }
    }

    struct NoopTunnelProvider;

    #[async_trait]
    impl relay_tunnel::TunnelProvider for NoopTunnelProvider {
        async fn open(
            &self,
            _local_port: u16,
        ) -> relay_tunnel::Result<relay_tunnel::TunnelHandle> {
            Ok(relay_tunnel::TunnelHandle::external(
                "https://unused.invalid",
            ))
        }

        async fn close(
            &self,
            _handle: &mut relay_tunnel::TunnelHandle,
        ) -> relay_tunnel::Result<()> {
            Ok(())
        }
    }

    fn manager_with(provider: Arc<FakeProvider>) -> SessionManager {
        let tunnel = Arc::new(TunnelManager::new(
            TunnelConfig {
                enabled: false,
                ..TunnelConfig::default()
            },
            Arc::new(NoopTunnelProvider),
        ));
        SessionManager::new(
            provider,
            tunnel,
            SessionManagerConfig {
                port: 0,
                sandbox: SandboxConfig::default(),
            },
        )
    }

    #[tokio::test]
    async fn healthy_session_is_reused() {
        let provider = Arc::new(FakeProvider::new());
        let manager = manager_with(provider.clone());

        let first = manager.get_or_create().await.unwrap();
        assert!(!first.reused);

        let second = manager.get_or_create().await.unwrap();
        assert!(second.reused);
        assert_eq!(first.session_id, second.session_id);
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn dead_sandbox_forces_recreate() {
        let provider = Arc::new(FakeProvider::new());
        let manager = manager_with(provider.clone());

        let first = manager.get_or_create().await.unwrap();
        provider.expired.store(true, Ordering::SeqCst);

        let second = manager.get_or_create().await.unwrap();
        assert!(!second.reused);
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(provider.created.load(Ordering::SeqCst), 2);
        assert_eq!(provider.killed.load(Ordering::SeqCst), 1);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn reset_always_recreates() {
        let provider = Arc::new(FakeProvider::new());
        let manager = manager_with(provider.clone());

        let first = manager.get_or_create().await.unwrap();
        let second = manager.reset().await.unwrap();
        assert_ne!(first.session_id, second.session_id);
        assert_eq!(provider.created.load(Ordering::SeqCst), 2);

        manager.cleanup().await;
    }

    #[tokio::test]
    async fn cleanup_kills_sandbox_and_clears_status() {
        let provider = Arc::new(FakeProvider::new());
        let manager = manager_with(provider.clone());

        manager.get_or_create().await.unwrap();
        assert!(manager.status().await.is_some());

        manager.cleanup().await;
        assert!(manager.status().await.is_none());
        assert_eq!(provider.killed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn status_reports_urls_and_ages() {
        let provider = Arc::new(FakeProvider::new());
        let manager = manager_with(provider.clone());

        let info = manager.get_or_create().await.unwrap();
        let status = manager.status().await.unwrap();
        assert_eq!(status.session_id, info.session_id);
        assert_eq!(status.local_url, info.local_url);
        assert_eq!(status.tunnel_url, info.tunnel_url);
        assert!(status.age_secs >= 0);
        assert!(status.tunnel_healthy);

        manager.cleanup().await;
    }
}

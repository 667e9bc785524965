// ABOUTME: Tunnel manager owning setup precedence, the health monitor, and reconnection
// ABOUTME: Health state is injectable, shared behind the manager's own lock

use crate::health::TunnelHealth;
use crate::provider::{TunnelHandle, TunnelProvider};
use crate::{Result, TunnelError};
use relay_config::{DEFAULT_TUNNEL_COMMAND, TUNNEL_PROBE_INTERVAL_SECS};
use relay_retry::{with_retry, RetryOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Tunnel behavior knobs, read from the environment by the CLI.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Pre-existing public URL. When set it wins unconditionally and no
    /// process is spawned.
    pub external_url: Option<String>,
    pub enabled: bool,
    pub auto_start: bool,
    pub command: String,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            external_url: None,
            enabled: true,
            auto_start: true,
            command: DEFAULT_TUNNEL_COMMAND.to_string(),
        }
    }
}

pub struct TunnelManager {
    config: TunnelConfig,
    provider: Arc<dyn TunnelProvider>,
    handle: Arc<RwLock<Option<TunnelHandle>>>,
    health: Arc<RwLock<TunnelHealth>>,
    running: Arc<RwLock<bool>>,
    http: reqwest::Client,
}

impl TunnelManager {
    pub fn new(config: TunnelConfig, provider: Arc<dyn TunnelProvider>) -> Self {
        Self {
            config,
            provider,
            handle: Arc::new(RwLock::new(None)),
            health: Arc::new(RwLock::new(TunnelHealth::default())),
            running: Arc::new(RwLock::new(false)),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Resolve the URL the remote side should call.
    ///
    /// Precedence: an external URL wins unconditionally; a disabled
    /// tunnel falls back to the local URL; otherwise auto-start opens
    /// the configured tunnel under the connect retry policy.
    pub async fn setup(&self, local_url: &str, local_port: u16) -> Result<String> {
        if let Some(external) = &self.config.external_url {
            info!("Using external tunnel URL: {}", external);
            *self.handle.write().await = Some(TunnelHandle::external(external.clone()));
            return Ok(external.clone());
        }

        if !self.config.enabled {
            warn!(
                "Tunnel disabled; the tool server is only reachable locally at {}",
                local_url
            );
            *self.handle.write().await = Some(TunnelHandle::external(local_url));
            return Ok(local_url.to_string());
        }

        if !self.config.auto_start {
            return Err(TunnelError::NotConfigured(format!(
                "{} tunnel --url {}",
                self.config.command, local_url
            )));
        }

        let handle = self.open_with_retry(local_port).await?;
        let public_url = handle.public_url.clone();
        *self.handle.write().await = Some(handle);
        Ok(public_url)
    }

    pub async fn public_url(&self) -> Option<String> {
        self.handle.read().await.as_ref().map(|h| h.public_url.clone())
    }

    pub async fn health(&self) -> TunnelHealth {
        self.health.read().await.clone()
    }

    /// Probe the public URL on a fixed interval until `stop()`. The
    /// task only records health; callers decide when to reconnect.
    pub async fn start_health_monitor(&self) {
        {
            let mut running = self.running.write().await;
            if *running {
                return;
            }
            *running = true;
        }

        let handle = self.handle.clone();
        let health = self.health.clone();
        let running = self.running.clone();
        let http = self.http.clone();

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(TUNNEL_PROBE_INTERVAL_SECS));
            interval.tick().await;

            loop {
                interval.tick().await;
                if !*running.read().await {
                    debug!("Tunnel health monitor stopped");
                    break;
                }

                let url = match handle.read().await.as_ref() {
                    Some(h) => h.public_url.clone(),
                    None => continue,
                };

                match http.get(format!("{url}/health")).send().await {
                    Ok(resp) if resp.status().is_success() => {
                        health.write().await.record_success();
                    }
                    Ok(resp) => {
                        let mut health = health.write().await;
                        health.record_failure(format!("probe returned {}", resp.status()));
                        if health.needs_reconnection() {
                            warn!(
                                "Tunnel unhealthy after {} failed probes",
                                health.consecutive_failures
                            );
                        }
                    }
                    Err(e) => {
                        let mut health = health.write().await;
                        health.record_failure(e.to_string());
                        if health.needs_reconnection() {
                            warn!(
                                "Tunnel unhealthy after {} failed probes: {}",
                                health.consecutive_failures, e
                            );
                        }
                    }
                }
            }
        });
    }

    /// Reopen the tunnel when health says so. On failure the stale
    /// handle stays in place and the caller re-reads health.
    pub async fn reconnect_if_needed(&self, local_port: u16) -> Result<String> {
        if !self.health.read().await.needs_reconnection() {
            return self
                .public_url()
                .await
                .ok_or_else(|| TunnelError::NotConfigured(self.config.command.clone()));
        }

        if self.config.external_url.is_some() || !self.config.enabled {
            return self
                .public_url()
                .await
                .ok_or_else(|| TunnelError::NotConfigured(self.config.command.clone()));
        }

        info!("Reconnecting tunnel");
        let stale_url = {
            let mut guard = self.handle.write().await;
            match guard.take() {
                Some(mut stale) => {
                    let _ = self.provider.close(&mut stale).await;
                    Some(stale.public_url)
                }
                None => None,
            }
        };

        match self.open_with_retry(local_port).await {
            Ok(handle) => {
                let public_url = handle.public_url.clone();
                *self.handle.write().await = Some(handle);
                self.health.write().await.record_success();
                info!("Tunnel reconnected: {}", public_url);
                Ok(public_url)
            }
            Err(e) => {
                warn!("Tunnel reconnection failed: {}", e);
                // Keep the stale URL published; health stays unhealthy
                // so the next caller tries again.
                match stale_url {
                    Some(url) => {
                        *self.handle.write().await = Some(TunnelHandle::external(url.clone()));
                        Ok(url)
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Stop the monitor, close the tunnel, and reset health.
    pub async fn stop(&self) {
        *self.running.write().await = false;
        if let Some(mut handle) = self.handle.write().await.take() {
            if let Err(e) = self.provider.close(&mut handle).await {
                warn!("Error closing tunnel: {}", e);
            }
        }
        *self.health.write().await = TunnelHealth::default();
    }

    async fn open_with_retry(&self, local_port: u16) -> Result<TunnelHandle> {
        let options = RetryOptions::tunnel_connect();
        let provider = self.provider.clone();
        with_retry(&options, || {
            let provider = provider.clone();
            async move { provider.open(local_port).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use relay_config::TUNNEL_FAILURE_THRESHOLD;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FakeTunnelProvider {
        opens: AtomicU32,
        closes: AtomicU32,
        fail_opens: AtomicBool,
    }

    impl FakeTunnelProvider {
        fn new() -> Self {
            Self {
                opens: AtomicU32::new(0),
                closes: AtomicU32::new(0),
                fail_opens: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl TunnelProvider for FakeTunnelProvider {
        async fn open(&self, local_port: u16) -> Result<TunnelHandle> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_opens.load(Ordering::SeqCst) {
                return Err(TunnelError::Spawn("no such file".to_string()));
            }
            Ok(TunnelHandle::external(format!(
                "https://fake-{n}-{local_port}.trycloudflare.com"
            )))
        }

        async fn close(&self, _handle: &mut TunnelHandle) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn manager_with(config: TunnelConfig) -> (Arc<FakeTunnelProvider>, TunnelManager) {
        let provider = Arc::new(FakeTunnelProvider::new());
        let manager = TunnelManager::new(config, provider.clone());
        (provider, manager)
    }

    #[tokio::test]
    async fn external_url_wins_over_auto_start() {
        let (provider, manager) = manager_with(TunnelConfig {
            external_url: Some("https://bridge.example.com".to_string()),
            ..TunnelConfig::default()
        });

        let url = manager.setup("http://localhost:4090", 4090).await.unwrap();
        assert_eq!(url, "https://bridge.example.com");
        assert_eq!(provider.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disabled_tunnel_falls_back_to_local_url() {
        let (provider, manager) = manager_with(TunnelConfig {
            enabled: false,
            ..TunnelConfig::default()
        });

        let url = manager.setup("http://localhost:4090", 4090).await.unwrap();
        assert_eq!(url, "http://localhost:4090");
        assert_eq!(provider.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn auto_start_opens_through_the_provider() {
        let (provider, manager) = manager_with(TunnelConfig::default());

        let url = manager.setup("http://localhost:4090", 4090).await.unwrap();
        assert!(url.ends_with(".trycloudflare.com"));
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
        assert_eq!(manager.public_url().await, Some(url));
    }

    #[tokio::test]
    async fn manual_mode_errors_with_the_command_to_run() {
        let (_, manager) = manager_with(TunnelConfig {
            auto_start: false,
            ..TunnelConfig::default()
        });

        let err = manager.setup("http://localhost:4090", 4090).await.unwrap_err();
        assert!(err.to_string().contains("cloudflared tunnel --url"));
    }

    #[tokio::test]
    async fn reconnect_is_a_noop_while_healthy() {
        let (provider, manager) = manager_with(TunnelConfig::default());
        let url = manager.setup("http://localhost:4090", 4090).await.unwrap();

        let same = manager.reconnect_if_needed(4090).await.unwrap();
        assert_eq!(same, url);
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unhealthy_tunnel_reconnects_and_resets_health() {
        let (provider, manager) = manager_with(TunnelConfig::default());
        let first = manager.setup("http://localhost:4090", 4090).await.unwrap();

        for _ in 0..TUNNEL_FAILURE_THRESHOLD {
            manager.health.write().await.record_failure("probe timeout");
        }
        assert!(manager.health().await.needs_reconnection());

        let second = manager.reconnect_if_needed(4090).await.unwrap();
        assert_ne!(first, second);
        assert_eq!(provider.closes.load(Ordering::SeqCst), 1);
        assert!(manager.health().await.is_healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reconnect_keeps_stale_url_and_unhealthy_state() {
        let (provider, manager) = manager_with(TunnelConfig::default());
        let first = manager.setup("http://localhost:4090", 4090).await.unwrap();

        for _ in 0..TUNNEL_FAILURE_THRESHOLD {
            manager.health.write().await.record_failure("probe timeout");
        }
        provider.fail_opens.store(true, Ordering::SeqCst);

        // "no such file" is classified non-retryable, so one attempt.
        let opens_before = provider.opens.load(Ordering::SeqCst);
        let stale = manager.reconnect_if_needed(4090).await.unwrap();
        assert_eq!(stale, first);
        assert_eq!(provider.opens.load(Ordering::SeqCst), opens_before + 1);
        assert!(manager.health().await.needs_reconnection());
    }

    #[tokio::test]
    async fn stop_closes_and_resets_to_baseline() {
        let (provider, manager) = manager_with(TunnelConfig::default());
        manager.setup("http://localhost:4090", 4090).await.unwrap();
        manager.health.write().await.record_failure("x");

        manager.stop().await;
        assert_eq!(provider.closes.load(Ordering::SeqCst), 1);
        assert!(manager.public_url().await.is_none());
        let health = manager.health().await;
        assert!(health.is_healthy);
        assert_eq!(health.consecutive_failures, 0);
    }
}

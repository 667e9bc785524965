// ABOUTME: Tunnel provider trait and the default process-backed implementation
// ABOUTME: Spawns cloudflared and scrapes the public URL from its stderr

use crate::{Result, TunnelError};
use async_trait::async_trait;
use regex::Regex;
use relay_config::TUNNEL_OPEN_DEADLINE_SECS;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

fn public_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"https://[a-zA-Z0-9][a-zA-Z0-9.-]*\.trycloudflare\.com").expect("static regex")
    })
}

/// An open tunnel. External URLs carry no process.
pub struct TunnelHandle {
    pub public_url: String,
    child: Option<Child>,
}

impl TunnelHandle {
    pub fn external(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
            child: None,
        }
    }

    pub fn is_process_backed(&self) -> bool {
        self.child.is_some()
    }
}

#[async_trait]
pub trait TunnelProvider: Send + Sync {
    /// Open a tunnel to the given local port and return its public URL.
    async fn open(&self, local_port: u16) -> Result<TunnelHandle>;

    /// Tear the tunnel down. Must tolerate already-dead tunnels.
    async fn close(&self, handle: &mut TunnelHandle) -> Result<()>;
}

/// Default provider: runs the configured tunnel binary as a child
/// process and watches its stderr for the assigned public hostname.
pub struct ProcessTunnelProvider {
    command: String,
}

impl ProcessTunnelProvider {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl TunnelProvider for ProcessTunnelProvider {
    async fn open(&self, local_port: u16) -> Result<TunnelHandle> {
        let local_url = format!("http://localhost:{local_port}");
        info!("Starting tunnel: {} tunnel --url {}", self.command, local_url);

        let mut child = Command::new(&self.command)
            .arg("tunnel")
            .arg("--url")
            .arg(&local_url)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TunnelError::Spawn(format!("{}: {e}", self.command)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TunnelError::Spawn("tunnel stderr not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let scrape = async {
            while let Some(line) = lines.next_line().await? {
                debug!("tunnel: {}", line);
                if let Some(found) = public_url_regex().find(&line) {
                    return Ok(found.as_str().to_string());
                }
            }
            Err(TunnelError::NoPublicUrl)
        };

        let public_url = match tokio::time::timeout(
            Duration::from_secs(TUNNEL_OPEN_DEADLINE_SECS),
            scrape,
        )
        .await
        {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => {
                let _ = child.start_kill();
                return Err(e);
            }
            Err(_) => {
                let _ = child.start_kill();
                return Err(TunnelError::OpenTimeout(TUNNEL_OPEN_DEADLINE_SECS));
            }
        };

        // Keep draining stderr so the child never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("tunnel: {}", line);
            }
        });

        info!("Tunnel established: {}", public_url);
        Ok(TunnelHandle {
            public_url,
            child: Some(child),
        })
    }

    async fn close(&self, handle: &mut TunnelHandle) -> Result<()> {
        if let Some(mut child) = handle.child.take() {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill tunnel process: {}", e);
            }
            let _ = child.wait().await;
            info!("Tunnel process stopped");
        }
        Ok(())
    }
}

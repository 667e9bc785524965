// ABOUTME: Tunnel health accounting driven by periodic probes
// ABOUTME: Consecutive failures past a threshold mark the tunnel for reconnection

use chrono::{DateTime, Utc};
use relay_config::TUNNEL_FAILURE_THRESHOLD;

/// Probe-driven health state. Owned by the manager behind a lock; a
/// fresh value is the healthy baseline.
#[derive(Debug, Clone)]
pub struct TunnelHealth {
    pub is_healthy: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl Default for TunnelHealth {
    fn default() -> Self {
        Self {
            is_healthy: true,
            last_checked_at: None,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}

impl TunnelHealth {
    pub fn record_success(&mut self) {
        self.is_healthy = true;
        self.consecutive_failures = 0;
        self.last_error = None;
        self.last_checked_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_error = Some(error.into());
        self.last_checked_at = Some(Utc::now());
        if self.consecutive_failures >= TUNNEL_FAILURE_THRESHOLD {
            self.is_healthy = false;
        }
    }

    pub fn needs_reconnection(&self) -> bool {
        !self.is_healthy
    }
}

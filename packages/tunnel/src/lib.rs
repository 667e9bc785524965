// ABOUTME: Tunnel management for publishing the local tool server
// ABOUTME: Provider trait, process-backed tunnel, health tracking, and manager

pub mod health;
pub mod manager;
pub mod provider;

pub use health::TunnelHealth;
pub use manager::{TunnelConfig, TunnelManager};
pub use provider::{ProcessTunnelProvider, TunnelHandle, TunnelProvider};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Tunnel not configured; start one manually with: {0}")]
    NotConfigured(String),

    #[error("Failed to spawn tunnel process: {0}")]
    Spawn(String),

    #[error("Tunnel did not report a public URL within {0}s")]
    OpenTimeout(u64),

    #[error("Tunnel process exited before reporting a public URL")]
    NoPublicUrl,

    #[error("Tunnel IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TunnelError>;

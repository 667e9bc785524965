// ABOUTME: Session manager composing sandbox adapter, tool server, and tunnel
// ABOUTME: One session at a time, reused while healthy, replaced never mutated in place

pub mod manager;

pub use manager::{Session, SessionInfo, SessionManager, SessionManagerConfig, SessionStatus};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Sandbox error: {0}")]
    Sandbox(#[from] relay_sandbox::SandboxError),

    #[error("Tool server error: {0}")]
    Server(#[from] relay_server::ServerError),

    #[error("Tunnel error: {0}")]
    Tunnel(#[from] relay_tunnel::TunnelError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

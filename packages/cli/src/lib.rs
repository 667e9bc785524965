// ABOUTME: Library surface of the relay binary
// ABOUTME: Env configuration and the tool declarations shared with the engine

pub mod config;
pub mod tools;

pub use config::{Config, ConfigError};

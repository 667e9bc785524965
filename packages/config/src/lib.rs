// ABOUTME: Shared constants and defaults consumed across Relay packages
// ABOUTME: Centralizes env var names, path policy lists, ceilings, and timer intervals

pub mod constants;

pub use constants::*;

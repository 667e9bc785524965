// ABOUTME: Environment-driven configuration for the relay binary
// ABOUTME: Every knob has a default; only malformed values are errors

use relay_config::{
    DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_DURATION_SECS, DEFAULT_PORT, DEFAULT_SANDBOX_URL,
    DEFAULT_TUNNEL_COMMAND, RELAY_IDLE_TIMEOUT_SECS, RELAY_MAX_DURATION_SECS, RELAY_PORT,
    RELAY_SANDBOX_API_KEY, RELAY_SANDBOX_URL, RELAY_TUNNEL_AUTOSTART, RELAY_TUNNEL_COMMAND,
    RELAY_TUNNEL_ENABLED, RELAY_TUNNEL_URL,
};
use std::env;
use std::num::ParseIntError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidNumber(&'static str, ParseIntError),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub sandbox_url: String,
    pub sandbox_api_key: Option<String>,
    pub tunnel_url: Option<String>,
    pub tunnel_enabled: bool,
    pub tunnel_autostart: bool,
    pub tunnel_command: String,
    pub idle_timeout_secs: u64,
    pub max_duration_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_var(RELAY_PORT, DEFAULT_PORT)?;
        let sandbox_url =
            env::var(RELAY_SANDBOX_URL).unwrap_or_else(|_| DEFAULT_SANDBOX_URL.to_string());
        let sandbox_api_key = env::var(RELAY_SANDBOX_API_KEY).ok().filter(|s| !s.is_empty());
        let tunnel_url = env::var(RELAY_TUNNEL_URL).ok().filter(|s| !s.is_empty());

        let tunnel_enabled = parse_flag(RELAY_TUNNEL_ENABLED, true);
        let tunnel_autostart = parse_flag(RELAY_TUNNEL_AUTOSTART, true);
        let tunnel_command =
            env::var(RELAY_TUNNEL_COMMAND).unwrap_or_else(|_| DEFAULT_TUNNEL_COMMAND.to_string());

        let idle_timeout_secs = parse_var(RELAY_IDLE_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS)?;
        let max_duration_secs = parse_var(RELAY_MAX_DURATION_SECS, DEFAULT_MAX_DURATION_SECS)?;

        Ok(Config {
            port,
            sandbox_url,
            sandbox_api_key,
            tunnel_url,
            tunnel_enabled,
            tunnel_autostart,
            tunnel_command,
            idle_timeout_secs,
            max_duration_secs,
        })
    }
}

fn parse_var<T: std::str::FromStr<Err = ParseIntError>>(
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidNumber(name, e)),
        Err(_) => Ok(default),
    }
}

fn parse_flag(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Env-var tests share process state, so each uses its own variable
    // or restores what it touched.

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let config = Config::from_env().unwrap();
        assert_eq!(config.sandbox_url, DEFAULT_SANDBOX_URL);
        assert_eq!(config.tunnel_command, DEFAULT_TUNNEL_COMMAND);
        assert!(config.tunnel_enabled);
        assert!(config.tunnel_autostart);
    }

    #[test]
    fn flag_parsing_accepts_common_truthy_forms() {
        for truthy in ["1", "true", "TRUE", "yes", "on"] {
            env::set_var("RELAY_TEST_FLAG", truthy);
            assert!(parse_flag("RELAY_TEST_FLAG", false), "{truthy}");
        }
        for falsy in ["0", "false", "no", "off", "banana"] {
            env::set_var("RELAY_TEST_FLAG", falsy);
            assert!(!parse_flag("RELAY_TEST_FLAG", true), "{falsy}");
        }
        env::remove_var("RELAY_TEST_FLAG");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        env::set_var("RELAY_TEST_NUM", "not-a-number");
        let result: Result<u64, _> = parse_var_named();
        assert!(result.is_err());
        env::remove_var("RELAY_TEST_NUM");
    }

    fn parse_var_named() -> Result<u64, ConfigError> {
        parse_var("RELAY_TEST_NUM", 7)
    }
}

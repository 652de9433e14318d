//! Configuration loading.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Startup-immutable bot settings, read once from a JSON file.
///
/// Missing required fields are fatal at load time; unknown fields are
/// ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server address as `host:port`.
    pub network: String,
    /// Nick to register with.
    pub nick: String,
    /// Username for the USER command.
    pub username: String,
    /// NickServ IDENTIFY password.
    pub password: String,
    /// Channel joined after the welcome numeric.
    pub channel: String,
    /// Operator identity; only this nick+host pair may drive the
    /// scripting controller.
    pub owner_nick: String,
    pub owner_host: String,
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r##"{
        "network": "irc.example.net:6667",
        "nick": "slircb",
        "username": "slircb",
        "password": "hunter2",
        "channel": "#straylight",
        "owner_nick": "case",
        "owner_host": "sprawl.example.net"
    }"##;

    #[test]
    fn parses_a_full_config() {
        let config: Config = serde_json::from_str(FULL).unwrap();
        assert_eq!(config.network, "irc.example.net:6667");
        assert_eq!(config.channel, "#straylight");
        assert_eq!(config.owner_nick, "case");
    }

    #[test]
    fn missing_required_field_is_an_error() {
        let raw = r#"{"network": "irc.example.net:6667"}"#;
        assert!(serde_json::from_str::<Config>(raw).is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let raw = FULL.trim_end().trim_end_matches('}');
        let raw = format!("{raw}, \"color\": \"magenta\"}}");
        assert!(serde_json::from_str::<Config>(&raw).is_ok());
    }
}

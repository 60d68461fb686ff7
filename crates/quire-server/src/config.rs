use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;

use quire_core::protocol::PROTOCOL_VERSION;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A `username:token` pair registered at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredential {
    pub username: String,
    pub token: String,
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientCredential")
            .field("username", &self.username)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub min_protocol_version: u32,
    pub clients: Vec<ClientCredential>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "QUIRE_BIND_ADDR", "127.0.0.1:8080");
        let database_path =
            PathBuf::from(value_or_default(&lookup, "QUIRE_DATABASE_PATH", "quire-server.db"));

        let min_protocol_version = value_or_default(
            &lookup,
            "QUIRE_MIN_PROTOCOL_VERSION",
            &PROTOCOL_VERSION.to_string(),
        )
        .parse::<u32>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "QUIRE_MIN_PROTOCOL_VERSION must be an integer in [1, {PROTOCOL_VERSION}]"
            ))
        })?;
        if !(1..=PROTOCOL_VERSION).contains(&min_protocol_version) {
            return Err(ConfigError::Invalid(format!(
                "QUIRE_MIN_PROTOCOL_VERSION must be in [1, {PROTOCOL_VERSION}]"
            )));
        }

        let clients = optional_trimmed(&lookup, "QUIRE_CLIENTS")
            .map(|value| parse_clients(&value))
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            database_path,
            min_protocol_version,
            clients,
        })
    }
}

fn parse_clients(value: &str) -> Result<Vec<ClientCredential>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (username, token) = entry
                .split_once(':')
                .map(|(username, token)| (username.trim(), token.trim()))
                .filter(|(username, token)| !username.is_empty() && !token.is_empty())
                .ok_or_else(|| {
                    ConfigError::Invalid(
                        "QUIRE_CLIENTS entries must look like `username:token`".to_string(),
                    )
                })?;
            Ok(ClientCredential {
                username: username.to_string(),
                token: token.to_string(),
            })
        })
        .collect()
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(map: &HashMap<&str, &str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&HashMap::new()).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, PathBuf::from("quire-server.db"));
        assert_eq!(config.min_protocol_version, PROTOCOL_VERSION);
        assert!(config.clients.is_empty());
    }

    #[test]
    fn clients_are_parsed_and_redacted() {
        let mut map = HashMap::new();
        map.insert("QUIRE_CLIENTS", " alice:sensitive-a , bob:sensitive-b,");
        let config = config_from(&map).unwrap();

        assert_eq!(config.clients.len(), 2);
        assert_eq!(config.clients[0].username, "alice");
        assert_eq!(config.clients[1].token, "sensitive-b");

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-a"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut map = HashMap::new();
        map.insert("QUIRE_CLIENTS", "alice");
        assert!(config_from(&map)
            .unwrap_err()
            .to_string()
            .contains("QUIRE_CLIENTS"));

        let mut map = HashMap::new();
        map.insert("QUIRE_MIN_PROTOCOL_VERSION", "0");
        assert!(config_from(&map).is_err());

        map.insert("QUIRE_MIN_PROTOCOL_VERSION", "latest");
        assert!(config_from(&map).is_err());
    }
}

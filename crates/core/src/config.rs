// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-driven configuration
//!
//! Credentials and connection settings come from the environment only;
//! nothing secret is ever read from a file in the repository.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Deployment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Development,
    Production,
}

/// Log verbosity for the daemon's tracing filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

/// Connection settings for an external queue backend deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub auth: Option<String>,
    pub db: u8,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            auth: None,
            db: 0,
        }
    }
}

impl RedisConfig {
    /// The effective connection string, however it was specified
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        match &self.auth {
            Some(auth) => format!("redis://:{}@{}:{}/{}", auth, self.host, self.port, self.db),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub redis: RedisConfig,
    pub port: u16,
    pub admin_key: Option<String>,
    pub concurrency_default: usize,
    pub log_level: LogLevel,
    pub mode: RunMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: RedisConfig::default(),
            port: 3000,
            admin_key: None,
            concurrency_default: 3,
            log_level: LogLevel::Info,
            mode: RunMode::Development,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; tests pass a map
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        config.redis.url = lookup("REDIS_URL").filter(|s| !s.is_empty());
        if let Some(host) = lookup("REDIS_HOST").filter(|s| !s.is_empty()) {
            config.redis.host = host;
        }
        if let Some(port) = lookup("REDIS_PORT") {
            config.redis.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "REDIS_PORT",
                value: port,
            })?;
        }
        config.redis.auth = lookup("REDIS_AUTH").filter(|s| !s.is_empty());
        if let Some(db) = lookup("REDIS_DB") {
            config.redis.db = db.parse().map_err(|_| ConfigError::Invalid {
                key: "REDIS_DB",
                value: db,
            })?;
        }

        if let Some(port) = lookup("PORT") {
            config.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                value: port,
            })?;
        }

        config.admin_key = lookup("ADMIN_KEY").filter(|s| !s.is_empty());

        if let Some(concurrency) = lookup("CONCURRENCY_DEFAULT") {
            let parsed: usize = concurrency.parse().map_err(|_| ConfigError::Invalid {
                key: "CONCURRENCY_DEFAULT",
                value: concurrency.clone(),
            })?;
            if parsed == 0 {
                return Err(ConfigError::Invalid {
                    key: "CONCURRENCY_DEFAULT",
                    value: concurrency,
                });
            }
            config.concurrency_default = parsed;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = match level.as_str() {
                "error" => LogLevel::Error,
                "warn" => LogLevel::Warn,
                "info" => LogLevel::Info,
                "debug" => LogLevel::Debug,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "LOG_LEVEL",
                        value: level,
                    })
                }
            };
        }

        if let Some(mode) = lookup("NODE_ENV") {
            config.mode = match mode.as_str() {
                "production" => RunMode::Production,
                _ => RunMode::Development,
            };
        }

        Ok(config)
    }

    /// The queue-admin surface requires the key in production when one is set
    pub fn admin_key_required(&self) -> bool {
        self.mode == RunMode::Production && self.admin_key.is_some()
    }

    /// Check a presented admin key against policy
    pub fn admin_allowed(&self, presented: Option<&str>) -> bool {
        if !self.admin_key_required() {
            return true;
        }
        match (&self.admin_key, presented) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.concurrency_default, 3);
        assert_eq!(config.log_level, LogLevel::Info);
        assert_eq!(config.mode, RunMode::Development);
        assert_eq!(config.redis.connection_string(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn redis_url_wins_over_parts() {
        let config = Config::from_lookup(lookup(&[
            ("REDIS_URL", "redis://queue.internal:6390/2"),
            ("REDIS_HOST", "ignored"),
        ]))
        .unwrap();
        assert_eq!(
            config.redis.connection_string(),
            "redis://queue.internal:6390/2"
        );
    }

    #[test]
    fn redis_parts_compose_a_url() {
        let config = Config::from_lookup(lookup(&[
            ("REDIS_HOST", "10.0.0.5"),
            ("REDIS_PORT", "6380"),
            ("REDIS_AUTH", "hunter2"),
            ("REDIS_DB", "3"),
        ]))
        .unwrap();
        assert_eq!(
            config.redis.connection_string(),
            "redis://:hunter2@10.0.0.5:6380/3"
        );
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        assert!(Config::from_lookup(lookup(&[("PORT", "not-a-port")])).is_err());
        assert!(Config::from_lookup(lookup(&[("REDIS_PORT", "70000")])).is_err());
        assert!(Config::from_lookup(lookup(&[("CONCURRENCY_DEFAULT", "0")])).is_err());
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(Config::from_lookup(lookup(&[("LOG_LEVEL", "verbose")])).is_err());
        let config = Config::from_lookup(lookup(&[("LOG_LEVEL", "debug")])).unwrap();
        assert_eq!(config.log_level.as_filter(), "debug");
    }

    #[test]
    fn admin_gate_only_binds_in_production() {
        let dev = Config::from_lookup(lookup(&[("ADMIN_KEY", "k1")])).unwrap();
        assert!(!dev.admin_key_required());
        assert!(dev.admin_allowed(None));

        let prod = Config::from_lookup(lookup(&[
            ("ADMIN_KEY", "k1"),
            ("NODE_ENV", "production"),
        ]))
        .unwrap();
        assert!(prod.admin_key_required());
        assert!(!prod.admin_allowed(None));
        assert!(!prod.admin_allowed(Some("wrong")));
        assert!(prod.admin_allowed(Some("k1")));
    }

    #[test]
    fn production_without_key_is_open() {
        let config = Config::from_lookup(lookup(&[("NODE_ENV", "production")])).unwrap();
        assert!(!config.admin_key_required());
        assert!(config.admin_allowed(None));
    }
}

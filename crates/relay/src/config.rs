// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use crate::constants::DEFAULT_CONVERSATION_TTL_SECONDS;

/// Deployment environment. `demo_mode` with `Production` is a hard
/// startup error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

/// Send-path payload handling. Fixed at startup, never switched at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum EncryptionMode {
    Client,
    Server,
}

/// Configuration for the relay runtime.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "relayd", about = "Secure ephemeral messaging relay")]
pub struct RelayConfig {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "RELAY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080, env = "RELAY_PORT")]
    pub port: u16,

    /// Redis connection URL for the durable Membership Store. If unset,
    /// an in-process store is used (dev/test only).
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Conversation inactivity TTL, in seconds.
    #[arg(long, default_value_t = DEFAULT_CONVERSATION_TTL_SECONDS, env = "CONVERSATION_TTL_SECONDS")]
    pub conversation_ttl_seconds: i64,

    /// Comma-separated Controller API keys.
    #[arg(long, env = "CONTROLLER_API_KEYS", value_delimiter = ',')]
    pub controller_api_keys: Vec<String>,

    /// Send-path payload handling.
    #[arg(long, value_enum, default_value_t = EncryptionMode::Client, env = "ENCRYPTION_MODE")]
    pub encryption_mode: EncryptionMode,

    /// Symmetric key seed for `server-mode` payload encryption.
    #[arg(long, env = "ENCRYPTION_KEY_SEED")]
    pub encryption_key_seed: Option<String>,

    /// Enables HTTP-only demo conveniences (activity-window identity
    /// relaxation, auto-create-on-join). MUST be false in production.
    #[arg(long, default_value_t = false, env = "DEMO_MODE")]
    pub demo_mode: bool,

    /// Allowed CORS origin for the Controller/Device web frontends.
    #[arg(long, env = "FRONTEND_ORIGIN")]
    pub frontend_origin: Option<String>,

    /// Deployment environment.
    #[arg(long, value_enum, default_value_t = Environment::Development, env = "ENVIRONMENT")]
    pub environment: Environment,
}

/// Startup-only validation error. The binary logs this and exits rather
/// than serving with an unsafe configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DEMO_MODE must be disabled when ENVIRONMENT=production")]
    DemoModeInProduction,
    #[error("ENCRYPTION_KEY_SEED is required when ENCRYPTION_MODE=server")]
    MissingEncryptionSeed,
}

impl RelayConfig {
    pub fn conversation_ttl(&self) -> Duration {
        Duration::from_secs(self.conversation_ttl_seconds.max(0) as u64)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.demo_mode && self.environment == Environment::Production {
            return Err(ConfigError::DemoModeInProduction);
        }
        if self.encryption_mode == EncryptionMode::Server && self.encryption_key_seed.is_none() {
            return Err(ConfigError::MissingEncryptionSeed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> RelayConfig {
        RelayConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            redis_url: None,
            conversation_ttl_seconds: DEFAULT_CONVERSATION_TTL_SECONDS,
            controller_api_keys: vec![],
            encryption_mode: EncryptionMode::Client,
            encryption_key_seed: None,
            demo_mode: false,
            frontend_origin: None,
            environment: Environment::Development,
        }
    }

    #[test]
    fn demo_mode_in_production_is_rejected() {
        let mut config = base();
        config.demo_mode = true;
        config.environment = Environment::Production;
        assert!(matches!(config.validate(), Err(ConfigError::DemoModeInProduction)));
    }

    #[test]
    fn server_mode_requires_seed() {
        let mut config = base();
        config.encryption_mode = EncryptionMode::Server;
        assert!(matches!(config.validate(), Err(ConfigError::MissingEncryptionSeed)));
    }

    #[test]
    fn demo_mode_in_development_is_fine() {
        let mut config = base();
        config.demo_mode = true;
        assert!(config.validate().is_ok());
    }
}

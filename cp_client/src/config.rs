//! Client configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use chain_poker::{ParticipantId, SyncConfig, remote::Address};
use std::time::Duration;

/// Complete client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Websocket endpoint of the ledger RPC node
    pub rpc_ws_url: String,
    /// Base URL of the lobby/signing gateway
    pub api_url: String,
    /// Address of the game program whose logs carry table events
    pub program: Address,
    /// The local participant
    pub participant: ParticipantId,
    /// Engine tuning
    pub sync: SyncConfig,
}

/// Values given on the command line take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub rpc_ws_url: Option<String>,
    pub api_url: Option<String>,
    pub participant: Option<String>,
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok(), overrides)
    }

    /// Same as [`ClientConfig::from_env`] with an explicit variable source.
    pub fn from_vars<F>(vars: F, overrides: ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rpc_ws_url = overrides
            .rpc_ws_url
            .or_else(|| vars("RPC_WS_URL"))
            .unwrap_or_else(|| "ws://127.0.0.1:8900".to_string());

        let api_url = overrides
            .api_url
            .or_else(|| vars("API_URL"))
            .unwrap_or_else(|| "http://127.0.0.1:8080".to_string());

        let program = vars("PROGRAM_ADDRESS")
            .map(Address)
            .ok_or_else(|| ConfigError::MissingRequired {
                var: "PROGRAM_ADDRESS".to_string(),
                hint: "Address of the deployed poker program".to_string(),
            })?;

        let participant = overrides
            .participant
            .or_else(|| vars("PARTICIPANT_ID"))
            .ok_or_else(|| ConfigError::MissingRequired {
                var: "PARTICIPANT_ID".to_string(),
                hint: "64 hex characters of your wallet public key".to_string(),
            })?;
        let participant = participant
            .parse::<ParticipantId>()
            .map_err(|e| ConfigError::Invalid {
                var: "PARTICIPANT_ID".to_string(),
                reason: e.to_string(),
            })?;

        let defaults = SyncConfig::default();
        let sync = SyncConfig {
            action_timeout: Duration::from_secs(parse_env_or(
                &vars,
                "ACTION_TIMEOUT_SECS",
                defaults.action_timeout.as_secs(),
            )),
            feed_capacity: parse_env_or(&vars, "FEED_CAPACITY", defaults.feed_capacity),
            ..defaults
        };

        Ok(ClientConfig {
            rpc_ws_url,
            api_url,
            program,
            participant,
            sync,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rpc_ws_url.starts_with("ws://") && !self.rpc_ws_url.starts_with("wss://") {
            return Err(ConfigError::Invalid {
                var: "RPC_WS_URL".to_string(),
                reason: "Must be a ws:// or wss:// URL".to_string(),
            });
        }

        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "API_URL".to_string(),
                reason: "Must be an http:// or https:// URL".to_string(),
            });
        }

        if self.program.0.trim().is_empty() {
            return Err(ConfigError::Invalid {
                var: "PROGRAM_ADDRESS".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        self.sync.validate().map_err(|reason| ConfigError::Invalid {
            var: "ACTION_TIMEOUT_SECS/FEED_CAPACITY".to_string(),
            reason,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<F, T>(vars: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    vars(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

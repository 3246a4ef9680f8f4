use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WatchError;

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Connection settings for the Nomad HTTP API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NomadConfig {
    /// Base URL of the agent, e.g. `http://127.0.0.1:4646`.
    pub address: String,
    /// ACL token sent as `X-Nomad-Token`.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub region: Option<String>,
    pub namespace: Option<String>,
}

impl Default for NomadConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:4646".to_string(),
            token: None,
            region: None,
            namespace: None,
        }
    }
}

impl NomadConfig {
    /// Read the standard `NOMAD_ADDR`, `NOMAD_TOKEN`, `NOMAD_REGION` and
    /// `NOMAD_NAMESPACE` variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            address: env_opt("NOMAD_ADDR").unwrap_or(defaults.address),
            token: env_opt("NOMAD_TOKEN"),
            region: env_opt("NOMAD_REGION"),
            namespace: env_opt("NOMAD_NAMESPACE"),
        }
    }

    pub fn validate(&self) -> Result<(), WatchError> {
        if !(self.address.starts_with("http://") || self.address.starts_with("https://")) {
            return Err(WatchError::Config(format!(
                "NOMAD_ADDR must be an http(s) URL, got {:?}",
                self.address
            )));
        }
        Ok(())
    }

    /// HTTP timeout for one blocking query waiting up to `wait`.
    pub fn request_timeout(wait: Duration) -> Duration {
        // Nomad adds up to wait/16 of jitter to blocking queries.
        wait + wait / 16 + Duration::from_secs(10)
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            "  nomad:    address={}, region={}, namespace={}, token={}",
            self.address,
            self.region.as_deref().unwrap_or("(default)"),
            self.namespace.as_deref().unwrap_or("(default)"),
            if self.token.is_some() { "set" } else { "(none)" }
        );
    }
}

//! Configuration for the signing agent client
//!
//! Settings come from an optional JSON file and are then overridden by
//! environment variables. The API key is never part of the file format; it
//! is read from `APIKEY` when the agent identity is built.

pub mod endpoints;

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use endpoints::AgentEndpoints;

/// Environment variable names
pub mod env_vars {
    pub const AGENT_HOST: &str = "AGENT_HOST";
    pub const AGENT_PORT: &str = "AGENT_PORT";
    pub const AGENT_NAME: &str = "AGENT_NAME";
    pub const AGENT_PRIVATE_KEY: &str = "AGENT_PRIVATE_KEY";
    pub const PARTNER_API_URL: &str = "PARTNER_API_URL";

    // Secrets and tenant, named as the custody service documents them
    pub const API_KEY: &str = "APIKEY";
    pub const COMPANY_ID: &str = "CUSTOMERID";
}

/// Default partner service used for transaction detail lookups
pub const DEFAULT_PARTNER_URL: &str = "https://play-api.qredo.network";

/// Connection to the primary (custody/signing) service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Agent name sent on registration
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Path to the RSA private key (PEM, PKCS#1 or PKCS#8)
    pub private_key_path: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: "test-agent".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8007,
            private_key_path: "private.pem".to_string(),
        }
    }
}

/// Partner (detail lookup) service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PartnerSettings {
    pub base_url: String,
    /// Company the agent acts for. Without it no details are fetched.
    pub company_id: Option<String>,
}

impl Default for PartnerSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PARTNER_URL.to_string(),
            company_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Fixed delay before a reconnect attempt
    pub reconnect_delay_secs: u64,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 5,
        }
    }
}

impl FeedSettings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Upper bound on a single policy evaluation; expiry means reject
    pub policy_timeout_secs: u64,
    /// Upper bound on the partner detail fetch; expiry means no details
    pub detail_timeout_secs: u64,
    /// How many decided message ids are remembered for duplicate detection
    pub dedup_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            policy_timeout_secs: 30,
            detail_timeout_secs: 10,
            dedup_capacity: 1024,
        }
    }
}

impl PipelineSettings {
    pub fn policy_timeout(&self) -> Duration {
        Duration::from_secs(self.policy_timeout_secs)
    }

    pub fn detail_timeout(&self) -> Duration {
        Duration::from_secs(self.detail_timeout_secs)
    }
}

/// Settings for the bundled net-amount policy used by the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Approve only transactions whose net amount is strictly below this
    pub max_net_amount: f64,
    /// Approve when no transaction details are available (unsafe)
    pub approve_without_details: bool,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            max_net_amount: 100_000.0,
            approve_without_details: false,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentSettings,
    pub partner: PartnerSettings,
    pub feed: FeedSettings,
    pub pipeline: PipelineSettings,
    pub policy: PolicySettings,
}

impl Config {
    /// Load from a JSON file, then apply environment overrides
    pub fn load(path: Option<&std::path::Path>) -> crate::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    crate::Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&content)
                    .map_err(|e| crate::Error::Config(format!("Invalid config file: {}", e)))?
            }
            None => Config::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// Override settings from the process environment
    pub fn apply_env(&mut self) -> crate::Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override settings from any variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> crate::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(env_vars::AGENT_HOST) {
            tracing::debug!("Using AGENT_HOST for the agent service");
            self.agent.host = host;
        }
        if let Some(port) = lookup(env_vars::AGENT_PORT) {
            self.agent.port = port
                .parse()
                .map_err(|_| crate::Error::Config(format!("Invalid AGENT_PORT: {}", port)))?;
        }
        if let Some(name) = lookup(env_vars::AGENT_NAME) {
            self.agent.name = name;
        }
        if let Some(path) = lookup(env_vars::AGENT_PRIVATE_KEY) {
            self.agent.private_key_path = path;
        }
        if let Some(url) = lookup(env_vars::PARTNER_API_URL) {
            tracing::debug!("Using PARTNER_API_URL for detail lookups");
            self.partner.base_url = url;
        }
        if let Some(company) = lookup(env_vars::COMPANY_ID) {
            // An empty CUSTOMERID means "not configured"
            self.partner.company_id = Some(company).filter(|c| !c.is_empty());
        }
        Ok(())
    }

    pub fn endpoints(&self) -> crate::Result<AgentEndpoints> {
        AgentEndpoints::new(&self.agent.host, self.agent.port)
    }
}

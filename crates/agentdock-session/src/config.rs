//! Configuration management for the session core.
//!
//! Loads configuration from ${AGENTDOCK_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use agentdock_types::{ChainFamily, ChainId, ChainSelection};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub mod paths {
    //! Path resolution for agentdock configuration.
    //!
    //! AGENTDOCK_HOME resolution order:
    //! 1. AGENTDOCK_HOME environment variable (if set)
    //! 2. ~/.config/agentdock (default)

    use std::path::PathBuf;

    /// Returns the agentdock home directory.
    pub fn agentdock_home() -> PathBuf {
        if let Ok(home) = std::env::var("AGENTDOCK_HOME") {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".agentdock"),
            |h| h.join(".config").join("agentdock"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        agentdock_home().join("config.toml")
    }

    /// Returns the path to the file-backed key-value store.
    pub fn storage_path() -> PathBuf {
        agentdock_home().join("storage.json")
    }
}

fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

/// A chain the session may be pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedChain {
    pub id: ChainId,
    pub net: String,
    pub family: ChainFamily,
}

impl SupportedChain {
    pub fn selection(&self) -> ChainSelection {
        ChainSelection {
            id: self.id.clone(),
            net: self.net.clone(),
        }
    }
}

/// Teardown pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeardownConfig {
    /// Delay after provider logout, before the wallet layer is touched.
    pub provider_settle_ms: u64,
    /// Delay after wallet teardown, before completion callbacks run.
    pub final_settle_ms: u64,
    /// Bounded passes over each family's wallet list.
    pub wallet_disconnect_attempts: u32,
}

impl Default for TeardownConfig {
    fn default() -> Self {
        Self {
            provider_settle_ms: 300,
            final_settle_ms: 100,
            wallet_disconnect_attempts: 3,
        }
    }
}

impl TeardownConfig {
    pub fn provider_settle(&self) -> Duration {
        Duration::from_millis(self.provider_settle_ms)
    }

    pub fn final_settle(&self) -> Duration {
        Duration::from_millis(self.final_settle_ms)
    }
}

/// Namespaces of persisted keys owned by the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub connectivity_prefix: String,
    pub identity_prefix: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_prefixes: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connectivity_prefix: "wallet:".to_string(),
            identity_prefix: "identity:".to_string(),
            extra_prefixes: Vec::new(),
        }
    }
}

impl StorageConfig {
    /// All prefixes purged on logout.
    pub fn prefixes(&self) -> Vec<&str> {
        let mut prefixes = vec![
            self.connectivity_prefix.as_str(),
            self.identity_prefix.as_str(),
        ];
        prefixes.extend(self.extra_prefixes.iter().map(String::as_str));
        prefixes.retain(|p| !p.is_empty());
        prefixes
    }

    /// Key holding the persisted provider session.
    pub fn session_key(&self) -> String {
        format!("{}session", self.identity_prefix)
    }
}

/// Optional sign-in signature step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigningConfig {
    pub enabled: bool,
    /// Message template; `{nonce}` is replaced with a fresh random nonce.
    pub message: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            message: "Sign in to agentdock\n\nNonce: {nonce}".to_string(),
        }
    }
}

impl SigningConfig {
    pub fn render(&self, nonce: &str) -> String {
        self.message.replace("{nonce}", nonce)
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Chain forced when the wallet reports an unsupported one.
    pub default_chain: ChainId,

    /// Families offered by the hosted login flow.
    pub login_families: Vec<ChainFamily>,

    /// Route prefixes that require an authenticated session.
    pub protected_routes: Vec<String>,

    /// How long a login waits for the wallet layer to report a pending
    /// embedded wallet or a reconnect before it is failed.
    pub wallet_convergence_timeout_ms: u64,

    pub supported_chains: Vec<SupportedChain>,

    pub teardown: TeardownConfig,

    pub storage: StorageConfig,

    pub signing: SigningConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_chain: ChainId::new(Self::DEFAULT_CHAIN),
            login_families: vec![ChainFamily::Evm],
            protected_routes: ["/agents", "/chat", "/skills", "/settings"]
                .into_iter()
                .map(String::from)
                .collect(),
            wallet_convergence_timeout_ms: 60_000,
            supported_chains: vec![
                SupportedChain {
                    id: ChainId::new("eip155:8453"),
                    net: "mainnet".to_string(),
                    family: ChainFamily::Evm,
                },
                SupportedChain {
                    id: ChainId::new("eip155:84532"),
                    net: "testnet".to_string(),
                    family: ChainFamily::Evm,
                },
                SupportedChain {
                    id: ChainId::new("solana:mainnet"),
                    net: "mainnet".to_string(),
                    family: ChainFamily::Solana,
                },
            ],
            teardown: TeardownConfig::default(),
            storage: StorageConfig::default(),
            signing: SigningConfig::default(),
        }
    }
}

impl SessionConfig {
    const DEFAULT_CHAIN: &str = "eip155:8453";

    /// Loads configuration from the default config path.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let config: SessionConfig = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))?
        } else {
            SessionConfig::default()
        };
        config
            .validate()
            .with_context(|| format!("Invalid config at {}", path.display()))?;
        Ok(config)
    }

    /// Writes the commented default template to `path`.
    ///
    /// Refuses to overwrite an existing file.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        fs::write(path, default_config_template())
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Serializes the effective configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config to TOML")
    }

    fn validate(&self) -> Result<()> {
        if self.supported_chains.is_empty() {
            anyhow::bail!("supported_chains must not be empty");
        }
        if self.supported(&self.default_chain).is_none() {
            anyhow::bail!(
                "default_chain {} is not listed in supported_chains",
                self.default_chain
            );
        }
        if self.login_families.is_empty() {
            anyhow::bail!("login_families must not be empty");
        }
        if self.wallet_convergence_timeout_ms == 0 {
            anyhow::bail!("wallet_convergence_timeout_ms must be greater than zero");
        }
        Ok(())
    }

    pub fn wallet_convergence_timeout(&self) -> Duration {
        Duration::from_millis(self.wallet_convergence_timeout_ms)
    }

    pub fn supported(&self, id: &ChainId) -> Option<&SupportedChain> {
        self.supported_chains.iter().find(|c| &c.id == id)
    }

    /// Selection for the configured default chain.
    pub fn default_selection(&self) -> ChainSelection {
        self.supported(&self.default_chain).map_or_else(
            || ChainSelection {
                id: self.default_chain.clone(),
                net: "mainnet".to_string(),
            },
            SupportedChain::selection,
        )
    }

    /// Distinct chain families across supported chains, in teardown order.
    pub fn families(&self) -> Vec<ChainFamily> {
        ChainFamily::ALL
            .into_iter()
            .filter(|f| self.supported_chains.iter().any(|c| c.family == *f))
            .collect()
    }
}

//! Chain families, chain identifiers and the connectivity snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::Wallet;

/// A category of networks sharing wallet and address semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// EVM-style networks (`eip155:*`).
    Evm,
    /// Solana networks (`solana:*`).
    Solana,
}

impl ChainFamily {
    /// All families, in teardown order.
    pub const ALL: [ChainFamily; 2] = [ChainFamily::Evm, ChainFamily::Solana];

    /// Short lowercase name used in logs and config.
    pub fn as_str(self) -> &'static str {
        match self {
            ChainFamily::Evm => "evm",
            ChainFamily::Solana => "solana",
        }
    }
}

impl fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network identifier in `namespace:reference` form (e.g. `eip155:8453`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub String);

impl ChainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChainId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// The network a session is pinned to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSelection {
    pub id: ChainId,
    /// Network tier, e.g. `mainnet` or `testnet`.
    pub net: String,
}

/// Connection lifecycle as reported by the connectivity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Reactive state published by the wallet connectivity layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityState {
    pub connected: bool,
    /// Address of the active account, if any.
    pub address: Option<String>,
    pub chain_id: Option<ChainId>,
    pub status: ConnectionStatus,
    /// Every wallet the layer currently knows about, across families.
    pub wallets: Vec<Wallet>,
}

impl ConnectivityState {
    pub fn has_wallets(&self) -> bool {
        !self.wallets.is_empty()
    }
}

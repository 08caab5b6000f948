//! Identity-provider vocabulary.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::ChainFamily;

/// How a wallet came to be linked to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletKind {
    /// Provisioned by the identity provider on the user's behalf.
    Embedded,
    /// Brought by the user (browser extension, mobile wallet, ...).
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub address: String,
    pub family: ChainFamily,
    pub kind: WalletKind,
}

impl Wallet {
    pub fn embedded(address: impl Into<String>, family: ChainFamily) -> Self {
        Self {
            address: address.into(),
            family,
            kind: WalletKind::Embedded,
        }
    }

    pub fn external(address: impl Into<String>, family: ChainFamily) -> Self {
        Self {
            address: address.into(),
            family,
            kind: WalletKind::External,
        }
    }
}

/// A user as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Wallets linked to this identity, embedded or external.
    #[serde(default)]
    pub wallets: Vec<Wallet>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            wallets: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_wallet(mut self, wallet: Wallet) -> Self {
        self.wallets.push(wallet);
        self
    }

    /// Returns true if at least one wallet of any kind is linked.
    pub fn has_wallet(&self) -> bool {
        !self.wallets.is_empty()
    }

    pub fn primary_address(&self) -> Option<&str> {
        self.wallets.first().map(|w| w.address.as_str())
    }
}

/// Login method reported alongside a completed provider login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Email,
    Wallet,
    Google,
    Twitter,
    Other(String),
}

/// Error codes delivered by the provider's login error callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderErrorCode {
    /// The user closed the hosted login flow.
    UserExitedAuthFlow,
    ClientRequestTimeout,
    Network,
    Other(String),
}

impl ProviderErrorCode {
    pub fn is_user_cancelled(&self) -> bool {
        matches!(self, ProviderErrorCode::UserExitedAuthFlow)
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderErrorCode::UserExitedAuthFlow => f.write_str("user exited auth flow"),
            ProviderErrorCode::ClientRequestTimeout => f.write_str("client request timeout"),
            ProviderErrorCode::Network => f.write_str("network error"),
            ProviderErrorCode::Other(code) => f.write_str(code),
        }
    }
}

/// Options passed to the provider's login entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginOptions {
    /// Chain families the hosted flow may offer wallets for.
    pub families: Vec<ChainFamily>,
}

/// Reactive provider state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderState {
    pub ready: bool,
    pub authenticated: bool,
    pub user: Option<Identity>,
}

/// Everything the identity provider pushes to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// The reactive `ready/authenticated/user` triple changed.
    StateChanged(ProviderState),
    /// The hosted login flow completed.
    LoginCompleted {
        user: Identity,
        method: Option<LoginMethod>,
    },
    /// The hosted login flow failed or was closed.
    LoginFailed(ProviderErrorCode),
}

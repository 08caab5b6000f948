//! Capability contracts consumed by the session orchestrator.
//!
//! Implementations wrap the hosted identity provider, the multi-chain wallet
//! layer, platform persistence and the UI shell. The orchestrator only ever
//! talks to these traits, so every collaborator can be swapped for an
//! in-process fake in tests.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::chain::{ChainFamily, ChainId, ConnectivityState};
use crate::error::AdapterResult;
use crate::identity::{LoginOptions, ProviderEvent, ProviderState, Wallet};

pub type ProviderStream = BoxStream<'static, ProviderEvent>;
pub type ConnectivityStream = BoxStream<'static, ConnectivityState>;

/// Hosted login flow.
///
/// `login` only opens the flow; its outcome arrives later on the
/// [`ProviderStream`] as `LoginCompleted` or `LoginFailed`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current reactive state.
    fn state(&self) -> ProviderState;

    /// Subscribes to state changes and login callbacks.
    fn subscribe(&self) -> ProviderStream;

    async fn login(&self, options: LoginOptions) -> AdapterResult<()>;

    async fn logout(&self) -> AdapterResult<()>;

    async fn session_token(&self) -> AdapterResult<Option<String>>;

    async fn create_embedded_wallet(&self) -> AdapterResult<Wallet>;
}

/// Multi-chain wallet connectivity layer.
#[async_trait]
pub trait WalletConnectivity: Send + Sync {
    fn state(&self) -> ConnectivityState;

    fn subscribe(&self) -> ConnectivityStream;

    /// Reconnects wallets without running the provider login.
    async fn connect_without_login(&self, redirect: Option<&str>) -> AdapterResult<()>;

    async fn disconnect(&self) -> AdapterResult<()>;

    async fn switch_chain(&self, chain: &ChainId) -> AdapterResult<()>;

    /// Wallets currently connected for one chain family.
    async fn wallets(&self, family: ChainFamily) -> AdapterResult<Vec<Wallet>>;

    /// Disconnects a single wallet using its family's idiom.
    async fn disconnect_wallet(&self, family: ChainFamily, wallet: &Wallet) -> AdapterResult<()>;

    async fn set_active_wallet(&self, wallet: &Wallet) -> AdapterResult<()>;

    /// Signs `message` with the active account and returns the signature.
    async fn sign_message(&self, message: &str) -> AdapterResult<String>;
}

/// Persisted-session lookup.
#[async_trait]
pub trait SessionLookup: Send + Sync {
    async fn has_valid_token(&self) -> AdapterResult<bool>;
}

/// Backend check of a wallet signature.
#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    async fn verify(&self, address: &str, message: &str, signature: &str) -> AdapterResult<bool>;
}

/// Platform key-value persistence (local storage and friends).
pub trait KeyValueStore: Send + Sync {
    fn keys(&self) -> AdapterResult<Vec<String>>;
    fn get(&self, key: &str) -> AdapterResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AdapterResult<()>;
    fn remove(&self, key: &str) -> AdapterResult<()>;
}

/// Router of the host UI.
#[async_trait]
pub trait Navigator: Send + Sync {
    async fn navigate(&self, route: &str) -> AdapterResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Transient notifications (toasts). Never blocks the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, level: NoticeLevel, message: &str);
}

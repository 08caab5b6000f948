//! Shared types for the agentdock session core.
//!
//! This crate holds the domain vocabulary (identities, wallets, chains) and
//! the capability contracts the session orchestrator consumes from its
//! collaborators. It carries no orchestration logic of its own.

pub mod chain;
pub mod error;
pub mod identity;
pub mod ports;

pub use chain::{ChainFamily, ChainId, ChainSelection, ConnectionStatus, ConnectivityState};
pub use error::{AdapterError, AdapterResult};
pub use identity::{
    Identity, LoginMethod, LoginOptions, ProviderErrorCode, ProviderEvent, ProviderState, Wallet,
    WalletKind,
};
pub use ports::{
    ConnectivityStream, IdentityProvider, KeyValueStore, Navigator, NoticeLevel, Notifier,
    ProviderStream, SessionLookup, SignatureVerifier, WalletConnectivity,
};

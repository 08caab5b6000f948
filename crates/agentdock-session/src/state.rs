//! Session state.
//!
//! Owned by the runtime and mutated only by the reducer in `update`.

use std::fmt;
use std::sync::Arc;

use agentdock_types::{ChainSelection, ConnectivityState, Identity, ProviderState};

use crate::config::SessionConfig;
use crate::guard::RouteGuard;
use crate::latest::LatestSnapshot;
use crate::status::{AuthStatus, AuthStatusMachine};
use crate::task::Tasks;

/// Why a teardown was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    UserRequested,
    LoginError,
    EmbeddedWalletFailed,
    SignatureFailed,
    /// Raised by the session-loss bus (HTTP 401 and friends).
    SessionExpired,
    /// Silent cleanup ahead of a fresh login.
    PreLogin,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DisconnectReason::UserRequested => "user requested",
            DisconnectReason::LoginError => "login error",
            DisconnectReason::EmbeddedWalletFailed => "embedded wallet failed",
            DisconnectReason::SignatureFailed => "signature failed",
            DisconnectReason::SessionExpired => "session expired",
            DisconnectReason::PreLogin => "pre-login cleanup",
        };
        f.write_str(name)
    }
}

/// Callback run once a teardown has fully settled.
pub struct DisconnectCallback(Box<dyn FnOnce() + Send>);

impl DisconnectCallback {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Box::new(f))
    }

    pub fn call(self) {
        (self.0)();
    }
}

impl fmt::Debug for DisconnectCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DisconnectCallback")
    }
}

/// Arguments of `start_login`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginRequest {
    /// Route to navigate to once the session is established.
    pub redirect: Option<String>,
    /// Skip the silent pre-login teardown.
    pub skip_disconnect: bool,
}

impl LoginRequest {
    #[must_use]
    pub fn redirect_to(mut self, route: impl Into<String>) -> Self {
        self.redirect = Some(route.into());
        self
    }

    #[must_use]
    pub fn skip_disconnect(mut self) -> Self {
        self.skip_disconnect = true;
        self
    }
}

/// Latches of the login in flight.
#[derive(Debug, Clone, Default)]
pub struct LoginLatch {
    /// Set by `start_login`; cleared by cancel, failure, teardown or finalize.
    pub requested: bool,
    /// Deferred post-login navigation target.
    pub redirect: Option<String>,
    /// Waiting for the wallet layer to reconnect without a provider login.
    pub awaiting_reconnect: bool,
    /// Login requested while a teardown was running.
    pub queued: Option<LoginRequest>,
}

impl LoginLatch {
    pub fn reset(&mut self) {
        self.requested = false;
        self.redirect = None;
        self.awaiting_reconnect = false;
    }
}

/// An embedded wallet was created and the wallet layer has not caught up yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEmbeddedWalletSign {
    pub wallet_address: String,
    pub provider_token: Option<String>,
    pub(crate) activation_requested: bool,
}

impl PendingEmbeddedWalletSign {
    pub fn new(wallet_address: impl Into<String>, provider_token: Option<String>) -> Self {
        Self {
            wallet_address: wallet_address.into(),
            provider_token,
            activation_requested: false,
        }
    }
}

/// A teardown in flight.
#[derive(Debug)]
pub struct TeardownState {
    pub reason: DisconnectReason,
    pub silent: bool,
    pub callbacks: Vec<DisconnectCallback>,
}

/// What the app itself knows about the session.
#[derive(Debug, Clone, Default)]
pub struct AppSession {
    /// Set by finalize and by a valid token lookup; cleared by teardown.
    pub app_authenticated: bool,
    pub user: Option<Identity>,
}

/// Read-only projection published to UI collaborators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub is_authenticated: bool,
    pub auth_status: AuthStatus,
    pub is_page_visible: bool,
    pub address: Option<String>,
    pub chain: Option<ChainSelection>,
    pub pending_embedded_wallet: bool,
    pub logging_out: bool,
}

#[derive(Debug)]
pub struct SessionState {
    pub config: Arc<SessionConfig>,
    pub status: AuthStatusMachine,
    pub session: AppSession,
    pub provider: ProviderState,
    pub connectivity: ConnectivityState,
    /// Locally resolved address shown in the shell.
    pub display_address: Option<String>,
    pub chain: Option<ChainSelection>,
    pub login: LoginLatch,
    pub pending_wallet: Option<PendingEmbeddedWalletSign>,
    pub teardown: Option<TeardownState>,
    pub page_visible: bool,
    pub tasks: Tasks,
    pub guard: RouteGuard,
    pub(crate) was_authenticated: bool,
}

impl SessionState {
    pub fn new(
        config: Arc<SessionConfig>,
        provider: ProviderState,
        connectivity: ConnectivityState,
    ) -> Self {
        let guard = RouteGuard::new(config.protected_routes.iter().cloned());
        Self {
            config,
            status: AuthStatusMachine::default(),
            session: AppSession::default(),
            provider,
            connectivity,
            display_address: None,
            chain: None,
            login: LoginLatch::default(),
            pending_wallet: None,
            teardown: None,
            page_visible: true,
            tasks: Tasks::default(),
            guard,
            was_authenticated: false,
        }
    }

    /// Derived session flag.
    ///
    /// A provider session plus an already resolved address counts as
    /// authenticated even before the app flag is set.
    pub fn is_authenticated(&self) -> bool {
        let has_address = self.display_address.is_some();
        self.provider.authenticated
            && (self.connectivity.connected || has_address)
            && (self.session.app_authenticated || has_address)
    }

    /// True when nothing is left to tear down.
    pub fn is_logged_out(&self) -> bool {
        !self.provider.authenticated
            && !self.session.app_authenticated
            && !self.connectivity.connected
            && self.display_address.is_none()
            && self.chain.is_none()
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.status.get()
    }

    pub fn latest_snapshot(&self) -> LatestSnapshot {
        LatestSnapshot {
            authenticated: self.is_authenticated(),
            provider_authenticated: self.provider.authenticated,
            app_authenticated: self.session.app_authenticated,
            connected: self.connectivity.connected,
            display_address: self.display_address.clone(),
            page_visible: self.page_visible,
            user: self.session.user.clone().or_else(|| self.provider.user.clone()),
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            is_authenticated: self.is_authenticated(),
            auth_status: self.status.get(),
            is_page_visible: self.page_visible,
            address: self.display_address.clone(),
            chain: self.chain.clone(),
            pending_embedded_wallet: self.pending_wallet.is_some(),
            logging_out: self.teardown.as_ref().is_some_and(|t| !t.silent),
        }
    }
}

#[cfg(test)]
mod tests {
    use agentdock_types::Identity;

    use super::*;

    fn state() -> SessionState {
        SessionState::new(
            Arc::new(SessionConfig::default()),
            ProviderState::default(),
            ConnectivityState::default(),
        )
    }

    #[test]
    fn test_provider_alone_is_not_authenticated() {
        let mut state = state();
        state.provider.authenticated = true;
        state.connectivity.connected = true;
        assert!(!state.is_authenticated());

        state.session.app_authenticated = true;
        assert!(state.is_authenticated());
    }

    #[test]
    fn test_resolved_address_counts_without_app_flag() {
        let mut state = state();
        state.provider.authenticated = true;
        state.display_address = Some("0xabc".into());
        assert!(state.is_authenticated());

        state.provider.authenticated = false;
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_snapshot_prefers_app_user() {
        let mut state = state();
        state.provider.user = Some(Identity::new("provider"));
        assert_eq!(state.latest_snapshot().user.unwrap().id, "provider");

        state.session.user = Some(Identity::new("app"));
        assert_eq!(state.latest_snapshot().user.unwrap().id, "app");
    }

    #[test]
    fn test_fresh_state_is_logged_out_and_visible() {
        let state = state();
        assert!(state.is_logged_out());
        assert!(state.view().is_page_visible);
        assert_eq!(state.view().auth_status, AuthStatus::Void);
    }
}

//! Auth status state machine.
//!
//! One explicit status drives every loading indicator in the shell. The
//! transition table is closed: anything not listed is rejected, and
//! `force_idle` is the single escape hatch back to `Void`.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

/// What the session core is currently busy with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuthStatus {
    /// Idle. Either authenticated or logged out.
    #[default]
    Void,
    Connecting,
    Authenticating,
    Signing,
    SwitchingChain,
    Logging,
    LoggingOut,
}

impl AuthStatus {
    /// Label shown by the shell's loading indicator.
    pub fn label(self) -> &'static str {
        match self {
            AuthStatus::Void => "",
            AuthStatus::Connecting => "Connecting",
            AuthStatus::Authenticating => "Authenticating",
            AuthStatus::Signing => "Signing",
            AuthStatus::SwitchingChain => "Switching chain",
            AuthStatus::Logging => "Logging in",
            AuthStatus::LoggingOut => "Logging out",
        }
    }

    pub fn is_idle(self) -> bool {
        self == AuthStatus::Void
    }

    fn is_login_phase(self) -> bool {
        matches!(
            self,
            AuthStatus::Logging
                | AuthStatus::Authenticating
                | AuthStatus::Connecting
                | AuthStatus::Signing
        )
    }

    /// Returns true if `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: AuthStatus) -> bool {
        if self == to || to == AuthStatus::Void {
            return true;
        }
        match self {
            AuthStatus::Void => matches!(
                to,
                AuthStatus::Logging | AuthStatus::LoggingOut | AuthStatus::SwitchingChain
            ),
            AuthStatus::Logging
            | AuthStatus::Authenticating
            | AuthStatus::Connecting
            | AuthStatus::Signing => to.is_login_phase() || to == AuthStatus::LoggingOut,
            AuthStatus::SwitchingChain => {
                matches!(to, AuthStatus::Logging | AuthStatus::LoggingOut)
            }
            // Teardown only ever ends in Void.
            AuthStatus::LoggingOut => false,
        }
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthStatus::Void => "VOID",
            AuthStatus::Connecting => "CONNECTING",
            AuthStatus::Authenticating => "AUTHENTICATING",
            AuthStatus::Signing => "SIGNING",
            AuthStatus::SwitchingChain => "SWITCHING_CHAIN",
            AuthStatus::Logging => "LOGGING",
            AuthStatus::LoggingOut => "LOGGING_OUT",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal auth status transition {from} -> {to}")]
pub struct TransitionError {
    pub from: AuthStatus,
    pub to: AuthStatus,
}

/// Holder of the current [`AuthStatus`].
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthStatusMachine {
    current: AuthStatus,
}

impl AuthStatusMachine {
    pub fn get(&self) -> AuthStatus {
        self.current
    }

    pub fn set(&mut self, to: AuthStatus) -> Result<(), TransitionError> {
        let from = self.current;
        if !from.can_transition_to(to) {
            return Err(TransitionError { from, to });
        }
        if from != to {
            debug!(%from, %to, "auth status");
        }
        self.current = to;
        Ok(())
    }

    /// Like [`set`](Self::set), but logs and ignores rejected transitions.
    pub fn advance(&mut self, to: AuthStatus) {
        if let Err(err) = self.set(to) {
            warn!("{err}");
        }
    }

    /// Unconditionally returns to `Void`.
    pub fn force_idle(&mut self) {
        if self.current != AuthStatus::Void {
            debug!(from = %self.current, "auth status forced idle");
        }
        self.current = AuthStatus::Void;
    }

    /// Called on the rising edge of `is_authenticated`.
    ///
    /// Returns to `Void` unless a teardown or a post-login chain switch owns
    /// the status.
    pub fn on_authenticated(&mut self) {
        match self.current {
            AuthStatus::LoggingOut | AuthStatus::SwitchingChain => {}
            _ => self.current = AuthStatus::Void,
        }
    }
}

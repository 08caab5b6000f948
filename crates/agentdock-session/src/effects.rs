//! Session effects.
//!
//! Side effects returned by the reducer for the runtime to execute.

use std::time::Duration;

use agentdock_types::{ChainSelection, NoticeLevel, Wallet};

use crate::state::{DisconnectCallback, DisconnectReason};
use crate::task::TaskId;

#[derive(Debug)]
pub enum SessionEffect {
    /// Decide the login plan from the registry and open the flow.
    BeginLogin {
        task: TaskId,
        redirect: Option<String>,
    },
    CreateEmbeddedWallet {
        task: TaskId,
    },
    ActivateWallet {
        task: TaskId,
        wallet: Wallet,
    },
    /// Sign the configured message and have the verifier check it.
    SignIn {
        task: TaskId,
        address: String,
    },
    SwitchChain {
        task: TaskId,
        target: ChainSelection,
    },
    ValidateSession {
        task: TaskId,
    },
    /// Report `ConvergenceTimedOut` once `after` has elapsed.
    ConvergenceDeadline {
        task: TaskId,
        after: Duration,
    },
    Teardown {
        task: TaskId,
        reason: DisconnectReason,
    },
    Navigate {
        route: String,
    },
    Notify {
        level: NoticeLevel,
        message: String,
    },
    /// Run disconnect callbacks.
    Complete {
        callbacks: Vec<DisconnectCallback>,
    },
}

impl SessionEffect {
    pub fn error(message: impl Into<String>) -> Self {
        SessionEffect::Notify {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

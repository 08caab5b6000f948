//! Session events.
//!
//! Everything that can change session state arrives here: UI commands,
//! collaborator pushes and results of spawned handlers.

use agentdock_types::{AdapterResult, ChainSelection, ConnectivityState, ProviderEvent, Wallet};

use crate::login::LoginPlan;
use crate::state::{DisconnectCallback, DisconnectReason, LoginRequest};
use crate::task::TaskId;

#[derive(Debug)]
pub enum SessionEvent {
    /// First event after the runtime starts.
    Started,

    // UI commands
    StartLogin(LoginRequest),
    ResumeRedirectLogin,
    Disconnect {
        reason: DisconnectReason,
        silent: bool,
        on_complete: Option<DisconnectCallback>,
    },
    /// Raised by the session-loss bus.
    ForceDisconnect,
    Navigate {
        route: String,
    },
    VisibilityChanged(bool),

    // Collaborator pushes
    Provider(ProviderEvent),
    Connectivity(ConnectivityState),

    // Handler results
    LoginBegun {
        task: TaskId,
        plan: LoginPlan,
        result: AdapterResult<()>,
    },
    EmbeddedWalletCreated {
        task: TaskId,
        result: AdapterResult<(Wallet, Option<String>)>,
    },
    WalletActivated {
        task: TaskId,
        result: AdapterResult<()>,
    },
    SignatureChecked {
        task: TaskId,
        result: AdapterResult<bool>,
    },
    ChainSwitched {
        task: TaskId,
        target: ChainSelection,
        result: AdapterResult<()>,
    },
    /// `None` when the lookup itself failed.
    SessionValidated {
        task: TaskId,
        valid: Option<bool>,
    },
    ConvergenceTimedOut {
        task: TaskId,
    },
    Teardown(TeardownProgress),
    Navigated {
        route: String,
        result: AdapterResult<()>,
    },
}

/// Milestones reported by the teardown handler, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownProgress {
    ProviderLoggedOut { task: TaskId },
    LatchesCleared { task: TaskId },
    ConnectivityCleared { task: TaskId },
    Finished { task: TaskId },
}

impl TeardownProgress {
    pub fn task(self) -> TaskId {
        match self {
            TeardownProgress::ProviderLoggedOut { task }
            | TeardownProgress::LatchesCleared { task }
            | TeardownProgress::ConnectivityCleared { task }
            | TeardownProgress::Finished { task } => task,
        }
    }
}

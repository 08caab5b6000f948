//! Disconnect orchestration (reducer side).
//!
//! At most one teardown runs at a time. Later requests attach their callback
//! to it. The async sequence itself lives in [`crate::teardown`]; this module
//! applies its milestones to the session.

use tracing::{debug, info};

use crate::effects::SessionEffect;
use crate::events::TeardownProgress;
use crate::login;
use crate::state::{DisconnectCallback, DisconnectReason, SessionState, TeardownState};
use crate::status::AuthStatus;
use crate::task::{TaskId, TaskKind};

pub fn request_disconnect(
    state: &mut SessionState,
    reason: DisconnectReason,
    silent: bool,
    on_complete: Option<DisconnectCallback>,
) -> Vec<SessionEffect> {
    if let Some(teardown) = state.teardown.as_mut() {
        teardown.callbacks.extend(on_complete);
        if teardown.silent && !silent {
            // A visible request takes over a silent cleanup.
            teardown.silent = false;
            teardown.reason = reason;
            state.status.advance(AuthStatus::LoggingOut);
        }
        debug!(%reason, "teardown already in flight, request attached");
        return vec![];
    }

    if !silent {
        state.status.advance(AuthStatus::LoggingOut);
    }
    info!(%reason, silent, "teardown started");
    let task = state.tasks.start(TaskKind::Teardown);
    state.teardown = Some(TeardownState {
        reason,
        silent,
        callbacks: on_complete.into_iter().collect(),
    });
    vec![SessionEffect::Teardown { task, reason }]
}

/// Session-loss signal from the HTTP layer.
pub fn force_disconnect(state: &mut SessionState) -> Vec<SessionEffect> {
    if state.teardown.is_none() && state.is_logged_out() {
        debug!("session loss while logged out, ignored");
        return vec![];
    }
    request_disconnect(state, DisconnectReason::SessionExpired, false, None)
}

pub fn on_teardown_progress(
    state: &mut SessionState,
    progress: TeardownProgress,
) -> Vec<SessionEffect> {
    if !state.tasks.teardown.is_active(progress.task()) {
        debug!(?progress, "stale teardown progress discarded");
        return vec![];
    }
    let Some(reason) = state.teardown.as_ref().map(|t| t.reason) else {
        return vec![];
    };

    match progress {
        TeardownProgress::ProviderLoggedOut { .. } => {
            state.provider.authenticated = false;
            state.provider.user = None;
            vec![]
        }
        TeardownProgress::LatchesCleared { .. } => {
            state.pending_wallet = None;
            for kind in [
                TaskKind::EmbeddedWallet,
                TaskKind::WalletActivation,
                TaskKind::Signing,
                TaskKind::ChainSwitch,
                TaskKind::Convergence,
            ] {
                state.tasks.state_mut(kind).clear();
            }
            // A pre-login cleanup keeps the latch of the login it precedes.
            if reason != DisconnectReason::PreLogin {
                state.login.reset();
                state.tasks.login.clear();
            }
            vec![]
        }
        TeardownProgress::ConnectivityCleared { .. } => {
            state.chain = None;
            state.display_address = None;
            state.session.app_authenticated = false;
            state.session.user = None;
            vec![]
        }
        TeardownProgress::Finished { task } => finish(state, task),
    }
}

fn finish(state: &mut SessionState, task: TaskId) -> Vec<SessionEffect> {
    state.tasks.teardown.finish_if_active(task);
    let Some(teardown) = state.teardown.take() else {
        return vec![];
    };
    info!(reason = %teardown.reason, "teardown finished");

    let mut effects = Vec::new();
    if !teardown.callbacks.is_empty() {
        effects.push(SessionEffect::Complete {
            callbacks: teardown.callbacks,
        });
    }
    if !teardown.silent {
        state.status.force_idle();
    }

    if teardown.reason == DisconnectReason::PreLogin {
        if state.login.requested {
            effects.extend(login::begin_login(state));
            return effects;
        }
        state.status.force_idle();
    } else {
        state.login.reset();
    }

    if let Some(request) = state.login.queued.take() {
        debug!("starting queued login");
        effects.extend(login::start_login(state, request));
    }
    effects
}

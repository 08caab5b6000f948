//! Visibility reconciliation.
//!
//! Re-derives the app session flag from a fresh persisted-session lookup
//! whenever the page comes back to the foreground, and whenever the
//! provider's authenticated flag flips while the page is visible. Nothing
//! runs while the page is hidden.

use agentdock_types::ProviderState;
use tracing::{debug, info};

use crate::effects::SessionEffect;
use crate::state::SessionState;
use crate::task::{TaskId, TaskKind};

pub fn on_started(state: &mut SessionState) -> Vec<SessionEffect> {
    if !state.page_visible {
        return vec![];
    }
    start_validation(state)
}

pub fn on_visibility_changed(state: &mut SessionState, visible: bool) -> Vec<SessionEffect> {
    let was_visible = state.page_visible;
    state.page_visible = visible;
    if visible && !was_visible {
        debug!("page visible, revalidating session");
        start_validation(state)
    } else {
        vec![]
    }
}

pub fn on_provider_state(state: &mut SessionState, provider: ProviderState) -> Vec<SessionEffect> {
    let flipped = state.provider.authenticated != provider.authenticated;
    state.provider = provider;
    if flipped && state.page_visible {
        debug!(
            authenticated = state.provider.authenticated,
            "provider flag flipped, revalidating session"
        );
        start_validation(state)
    } else {
        vec![]
    }
}

fn start_validation(state: &mut SessionState) -> Vec<SessionEffect> {
    let task = state.tasks.start(TaskKind::Validation);
    vec![SessionEffect::ValidateSession { task }]
}

pub fn on_session_validated(
    state: &mut SessionState,
    task: TaskId,
    valid: Option<bool>,
) -> Vec<SessionEffect> {
    if !state.tasks.finish_if_active(TaskKind::Validation, task) {
        debug!("stale validation discarded");
        return vec![];
    }
    if !state.page_visible {
        debug!("page hidden, validation discarded");
        return vec![];
    }
    if state.login.requested || state.teardown.is_some() || state.pending_wallet.is_some() {
        debug!("login or teardown in flight, validation discarded");
        return vec![];
    }

    match valid {
        None => debug!("session lookup failed, session left as is"),
        Some(true) => {
            let address = state.display_address.clone().or_else(|| {
                state
                    .connectivity
                    .address
                    .clone()
                    .filter(|_| state.connectivity.connected)
            });
            if state.provider.authenticated && address.is_some() {
                if !state.session.app_authenticated {
                    info!("persisted session valid, session restored");
                }
                state.session.app_authenticated = true;
                state.display_address = address;
                if state.session.user.is_none() {
                    state.session.user = state.provider.user.clone();
                }
                if state.chain.is_none()
                    && let Some(chain) = state
                        .connectivity
                        .chain_id
                        .as_ref()
                        .and_then(|id| state.config.supported(id))
                {
                    state.chain = Some(chain.selection());
                }
            }
        }
        Some(false) => {
            if state.session.app_authenticated || state.display_address.is_some() {
                info!("persisted session invalid, session cleared");
            }
            state.session.app_authenticated = false;
            state.display_address = None;
        }
    }
    vec![]
}

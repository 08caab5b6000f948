//! Login orchestration (reducer side).
//!
//! Drives the forward path: provider login, embedded wallet provisioning,
//! wallet convergence, optional signing, finalize and chain resolution.
//! Every handler result is checked against its task id and the login latch
//! before it is allowed to touch the session. Nothing from the login path is
//! applied while a teardown is in flight: during a pre-login cleanup any
//! completion predates the fresh provider flow, and during a visible one the
//! session is on its way out.

use agentdock_types::{
    AdapterError, AdapterResult, ChainSelection, ConnectivityState, Identity, ProviderErrorCode,
    Wallet,
};
use tracing::{debug, info, warn};

use crate::config::SupportedChain;
use crate::disconnect;
use crate::effects::SessionEffect;
use crate::latest::LatestSnapshot;
use crate::state::{DisconnectReason, LoginRequest, PendingEmbeddedWalletSign, SessionState};
use crate::status::AuthStatus;
use crate::task::{TaskId, TaskKind};

pub const LOGIN_FAILED: &str = "Login failed";
pub const EMBEDDED_WALLET_FAILED: &str = "Create embedded wallet failed";
pub const SIGNATURE_FAILED: &str = "Signature verification failed";

/// How a login proceeds, decided from the registry once any pre-login
/// teardown has settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPlan {
    /// Open the hosted login flow.
    ProviderLogin,
    /// Provider session is live but no wallet is connected: reconnect
    /// wallets without a fresh provider login.
    Reconnect,
    /// Provider session and identity are live: go straight to post-login
    /// reconciliation.
    Reconcile(Identity),
}

impl LoginPlan {
    pub fn from_snapshot(snapshot: &LatestSnapshot) -> Self {
        if !snapshot.provider_authenticated || snapshot.app_authenticated {
            return LoginPlan::ProviderLogin;
        }
        match &snapshot.user {
            Some(user) if !snapshot.connected && user.has_wallet() => LoginPlan::Reconnect,
            Some(user) => LoginPlan::Reconcile(user.clone()),
            None => LoginPlan::ProviderLogin,
        }
    }
}

pub fn start_login(state: &mut SessionState, request: LoginRequest) -> Vec<SessionEffect> {
    if state.is_authenticated() {
        debug!("already authenticated, start_login ignored");
        return vec![];
    }

    let in_flight = state.login.requested
        || state.pending_wallet.is_some()
        || state.tasks.is_running(TaskKind::EmbeddedWallet);
    if in_flight {
        if let Some(redirect) = request.redirect {
            state.login.redirect = Some(redirect);
        }
        debug!("login already in flight, redirect re-armed");
        return vec![];
    }

    if state.teardown.is_some() {
        debug!("teardown in flight, login queued");
        state.login.queued = Some(request);
        return vec![];
    }

    state.login.requested = true;
    state.login.redirect = request.redirect;
    state.login.awaiting_reconnect = false;
    state.status.advance(AuthStatus::Logging);
    info!(skip_disconnect = request.skip_disconnect, "login started");

    if request.skip_disconnect {
        begin_login(state)
    } else {
        disconnect::request_disconnect(state, DisconnectReason::PreLogin, true, None)
    }
}

/// A provider flow resumed after an external redirect.
pub fn resume_redirect_login(state: &mut SessionState) -> Vec<SessionEffect> {
    if state.is_authenticated() {
        debug!("already authenticated, redirect resume ignored");
        return vec![];
    }
    state.login.requested = true;
    state.status.advance(AuthStatus::Logging);
    info!("redirect login resumed");
    vec![]
}

pub(crate) fn begin_login(state: &mut SessionState) -> Vec<SessionEffect> {
    let task = state.tasks.start(TaskKind::Login);
    vec![SessionEffect::BeginLogin {
        task,
        redirect: state.login.redirect.clone(),
    }]
}

pub fn on_login_begun(
    state: &mut SessionState,
    task: TaskId,
    plan: LoginPlan,
    result: AdapterResult<()>,
) -> Vec<SessionEffect> {
    if !state.tasks.finish_if_active(TaskKind::Login, task) {
        debug!("stale login start discarded");
        return vec![];
    }
    if !state.login.requested {
        debug!("login latch cleared, login start discarded");
        return vec![];
    }
    if tearing_down(state, "login start") {
        return vec![];
    }

    match result {
        Err(AdapterError::UserCancelled) => cancel_login(state),
        Err(err) => {
            warn!("login could not start: {err}");
            fail_login(state, LOGIN_FAILED, DisconnectReason::LoginError)
        }
        Ok(()) => match plan {
            LoginPlan::ProviderLogin => vec![],
            LoginPlan::Reconnect => {
                state.login.awaiting_reconnect = true;
                state.status.advance(AuthStatus::Connecting);
                let mut effects = arm_convergence(state);
                effects.extend(resume_after_reconnect(state));
                effects
            }
            LoginPlan::Reconcile(user) => on_login_completed(state, user),
        },
    }
}

/// Provider completion callback.
pub fn on_login_completed(state: &mut SessionState, user: Identity) -> Vec<SessionEffect> {
    if state.is_authenticated() {
        debug!("already authenticated, duplicate completion ignored");
        return vec![];
    }
    if !state.login.requested {
        debug!("login latch not set, stale completion discarded");
        return vec![];
    }
    if tearing_down(state, "provider completion") {
        return vec![];
    }
    if !state.page_visible {
        debug!("page hidden, login attempt abandoned");
        state.login.reset();
        state.tasks.login.clear();
        state.tasks.convergence.clear();
        state.status.force_idle();
        return vec![];
    }

    if state.pending_wallet.is_some() || state.tasks.is_running(TaskKind::EmbeddedWallet) {
        debug!("embedded wallet already pending, completion suppressed");
        return vec![];
    }

    state.tasks.login.clear();
    state.provider.authenticated = true;
    state.provider.user = Some(user.clone());
    state.status.advance(AuthStatus::Authenticating);

    if !user.has_wallet() {
        state.session.user = Some(user);
        info!("identity has no wallet, provisioning embedded wallet");
        let task = state.tasks.start(TaskKind::EmbeddedWallet);
        return vec![SessionEffect::CreateEmbeddedWallet { task }];
    }

    state.session.user = Some(user);
    complete_login(state)
}

pub fn on_login_failed(state: &mut SessionState, code: &ProviderErrorCode) -> Vec<SessionEffect> {
    if !state.login.requested {
        debug!(%code, "login latch not set, stale error discarded");
        return vec![];
    }
    if tearing_down(state, "provider error") {
        return vec![];
    }
    state.tasks.login.clear();

    if code.is_user_cancelled() {
        info!("login cancelled by user");
        cancel_login(state)
    } else {
        warn!(%code, "provider login failed");
        fail_login(state, LOGIN_FAILED, DisconnectReason::LoginError)
    }
}

pub fn on_embedded_wallet_created(
    state: &mut SessionState,
    task: TaskId,
    result: AdapterResult<(Wallet, Option<String>)>,
) -> Vec<SessionEffect> {
    if !state
        .tasks
        .finish_if_active(TaskKind::EmbeddedWallet, task)
    {
        debug!("stale embedded wallet result discarded");
        return vec![];
    }
    if tearing_down(state, "embedded wallet result") {
        return vec![];
    }

    match result {
        Err(err) => {
            warn!("embedded wallet creation failed: {err}");
            fail_login(
                state,
                EMBEDDED_WALLET_FAILED,
                DisconnectReason::EmbeddedWalletFailed,
            )
        }
        Ok((wallet, token)) => {
            if !state.login.requested {
                debug!(address = %wallet.address, "login abandoned, embedded wallet left unused");
                return vec![];
            }
            info!(address = %wallet.address, "embedded wallet created");
            if let Some(user) = state.session.user.as_mut()
                && !user.wallets.contains(&wallet)
            {
                user.wallets.push(wallet.clone());
            }
            state.pending_wallet = Some(PendingEmbeddedWalletSign::new(wallet.address, token));
            let mut effects = arm_convergence(state);
            effects.extend(advance_pending_wallet(state));
            effects
        }
    }
}

pub fn on_wallet_activated(
    state: &mut SessionState,
    task: TaskId,
    result: AdapterResult<()>,
) -> Vec<SessionEffect> {
    if !state
        .tasks
        .finish_if_active(TaskKind::WalletActivation, task)
    {
        debug!("stale wallet activation discarded");
        return vec![];
    }
    if tearing_down(state, "wallet activation") {
        return vec![];
    }
    match result {
        // The next connectivity update finishes the login.
        Ok(()) => vec![],
        Err(err) => {
            warn!("wallet activation failed: {err}");
            fail_login(state, LOGIN_FAILED, DisconnectReason::LoginError)
        }
    }
}

pub fn on_signature_checked(
    state: &mut SessionState,
    task: TaskId,
    result: AdapterResult<bool>,
) -> Vec<SessionEffect> {
    if !state.tasks.finish_if_active(TaskKind::Signing, task) {
        debug!("stale signature result discarded");
        return vec![];
    }
    if !state.login.requested {
        debug!("login latch cleared, signature result discarded");
        return vec![];
    }
    if tearing_down(state, "signature result") {
        return vec![];
    }
    match result {
        Ok(true) => finalize(state),
        Ok(false) => {
            warn!("signature rejected by verifier");
            fail_login(state, SIGNATURE_FAILED, DisconnectReason::SignatureFailed)
        }
        Err(err) => {
            warn!("signing failed: {err}");
            fail_login(state, SIGNATURE_FAILED, DisconnectReason::SignatureFailed)
        }
    }
}

pub fn on_chain_switched(
    state: &mut SessionState,
    task: TaskId,
    target: ChainSelection,
    result: AdapterResult<()>,
) -> Vec<SessionEffect> {
    if !state.tasks.finish_if_active(TaskKind::ChainSwitch, task) {
        debug!("stale chain switch discarded");
        return vec![];
    }
    if tearing_down(state, "chain switch") {
        return vec![];
    }
    match result {
        Ok(()) => {
            info!(chain = %target.id, "chain switched");
            state.chain = Some(target);
        }
        Err(err) => warn!(chain = %target.id, "chain switch failed: {err}"),
    }
    if state.status.get() == AuthStatus::SwitchingChain {
        state.status.advance(AuthStatus::Void);
    }
    navigate_redirect(state)
}

/// Wallet layer pushed a new snapshot.
pub fn on_connectivity_changed(
    state: &mut SessionState,
    connectivity: ConnectivityState,
) -> Vec<SessionEffect> {
    state.connectivity = connectivity;

    if state.session.app_authenticated && state.teardown.is_none() {
        if state.connectivity.connected
            && let Some(address) = &state.connectivity.address
            && state.display_address.as_ref() != Some(address)
        {
            debug!(%address, "active account changed");
            state.display_address = Some(address.clone());
        }
        if !state.tasks.is_running(TaskKind::ChainSwitch)
            && let Some(chain) = state
                .connectivity
                .chain_id
                .as_ref()
                .and_then(|id| state.config.supported(id))
        {
            state.chain = Some(chain.selection());
        }
    }

    if state.teardown.is_some() {
        return vec![];
    }
    let mut effects = resume_after_reconnect(state);
    effects.extend(advance_pending_wallet(state));
    effects
}

/// Wallet layer has not converged within the configured deadline.
pub fn on_convergence_timed_out(state: &mut SessionState, task: TaskId) -> Vec<SessionEffect> {
    if !state.tasks.finish_if_active(TaskKind::Convergence, task) {
        debug!("stale convergence deadline discarded");
        return vec![];
    }
    if !state.login.requested || state.teardown.is_some() || state.is_authenticated() {
        return vec![];
    }
    warn!(
        pending_wallet = state.pending_wallet.is_some(),
        awaiting_reconnect = state.login.awaiting_reconnect,
        "wallet did not converge in time"
    );
    let reason = if state.pending_wallet.is_some() {
        DisconnectReason::EmbeddedWalletFailed
    } else {
        DisconnectReason::LoginError
    };
    fail_login(state, LOGIN_FAILED, reason)
}

fn tearing_down(state: &SessionState, what: &str) -> bool {
    let Some(teardown) = state.teardown.as_ref() else {
        return false;
    };
    debug!(reason = %teardown.reason, "teardown in flight, {what} discarded");
    true
}

/// Starts the wallet-convergence deadline unless one is already running.
fn arm_convergence(state: &mut SessionState) -> Vec<SessionEffect> {
    if state.tasks.is_running(TaskKind::Convergence) {
        return vec![];
    }
    let task = state.tasks.start(TaskKind::Convergence);
    vec![SessionEffect::ConvergenceDeadline {
        task,
        after: state.config.wallet_convergence_timeout(),
    }]
}

fn resume_after_reconnect(state: &mut SessionState) -> Vec<SessionEffect> {
    if !state.login.awaiting_reconnect || !state.connectivity.connected {
        return vec![];
    }
    state.login.awaiting_reconnect = false;
    debug!("wallet reconnected");
    complete_login(state)
}

/// Moves a pending embedded wallet towards finalize once the wallet layer
/// knows about it.
fn advance_pending_wallet(state: &mut SessionState) -> Vec<SessionEffect> {
    if state.pending_wallet.is_none()
        || state.tasks.is_running(TaskKind::Signing)
        || !state.connectivity.has_wallets()
    {
        return vec![];
    }
    if state.connectivity.connected {
        return complete_login(state);
    }

    let Some(pending) = state.pending_wallet.as_mut() else {
        return vec![];
    };
    if pending.activation_requested {
        return vec![];
    }
    pending.activation_requested = true;
    let wallet = state
        .connectivity
        .wallets
        .iter()
        .find(|w| w.address == pending.wallet_address)
        .or_else(|| state.connectivity.wallets.first())
        .cloned();
    let Some(wallet) = wallet else {
        return vec![];
    };

    debug!(address = %wallet.address, "activating wallet");
    state.status.advance(AuthStatus::Connecting);
    let task = state.tasks.start(TaskKind::WalletActivation);
    vec![SessionEffect::ActivateWallet { task, wallet }]
}

fn resolve_address(state: &SessionState) -> Option<String> {
    state
        .connectivity
        .address
        .clone()
        .filter(|_| state.connectivity.connected)
        .or_else(|| state.pending_wallet.as_ref().map(|p| p.wallet_address.clone()))
        .or_else(|| {
            state
                .session
                .user
                .as_ref()
                .and_then(Identity::primary_address)
                .map(str::to_string)
        })
}

/// Runs the signing step when enabled, otherwise finalizes.
fn complete_login(state: &mut SessionState) -> Vec<SessionEffect> {
    state.tasks.convergence.clear();
    if state.config.signing.enabled {
        if state.tasks.is_running(TaskKind::Signing) {
            return vec![];
        }
        if let Some(address) = resolve_address(state) {
            state.status.advance(AuthStatus::Signing);
            let task = state.tasks.start(TaskKind::Signing);
            return vec![SessionEffect::SignIn { task, address }];
        }
        warn!("no address to sign with, skipping signature");
    }
    finalize(state)
}

fn finalize(state: &mut SessionState) -> Vec<SessionEffect> {
    let address = resolve_address(state);
    state.session.app_authenticated = true;
    if state.session.user.is_none() {
        state.session.user = state.provider.user.clone();
    }
    state.display_address = address;
    state.pending_wallet = None;
    state.tasks.wallet_activation.clear();
    state.login.requested = false;
    state.login.awaiting_reconnect = false;
    state.status.on_authenticated();
    info!(address = ?state.display_address, "session established");

    let current = state
        .connectivity
        .chain_id
        .as_ref()
        .and_then(|id| state.config.supported(id))
        .map(SupportedChain::selection);
    match current {
        Some(selection) => {
            state.chain = Some(selection);
            navigate_redirect(state)
        }
        None => {
            let target = state.config.default_selection();
            info!(chain = %target.id, "unsupported chain, switching to default");
            state.status.advance(AuthStatus::SwitchingChain);
            let task = state.tasks.start(TaskKind::ChainSwitch);
            vec![SessionEffect::SwitchChain { task, target }]
        }
    }
}

fn navigate_redirect(state: &mut SessionState) -> Vec<SessionEffect> {
    state
        .login
        .redirect
        .take()
        .map(|route| SessionEffect::Navigate { route })
        .into_iter()
        .collect()
}

fn cancel_login(state: &mut SessionState) -> Vec<SessionEffect> {
    state.login.reset();
    state.tasks.convergence.clear();
    state.status.force_idle();
    vec![]
}

fn fail_login(
    state: &mut SessionState,
    message: &str,
    reason: DisconnectReason,
) -> Vec<SessionEffect> {
    state.login.reset();
    state.tasks.convergence.clear();
    let mut effects = vec![SessionEffect::error(message)];
    effects.extend(disconnect::request_disconnect(state, reason, false, None));
    effects
}

//! Session reducer (update function).
//!
//! All state mutations happen here. The runtime calls `update(state, event)`
//! and executes the returned effects.

use agentdock_types::ProviderEvent;
use tracing::{debug, warn};

use crate::effects::SessionEffect;
use crate::events::SessionEvent;
use crate::state::SessionState;
use crate::{disconnect, guard, login, reconcile};

/// The main reducer function.
///
/// Takes the current state and an event, mutates state, and returns effects
/// for the runtime to execute.
pub fn update(state: &mut SessionState, event: SessionEvent) -> Vec<SessionEffect> {
    let effects = match event {
        SessionEvent::Started => reconcile::on_started(state),

        SessionEvent::StartLogin(request) => login::start_login(state, request),
        SessionEvent::ResumeRedirectLogin => login::resume_redirect_login(state),
        SessionEvent::Disconnect {
            reason,
            silent,
            on_complete,
        } => disconnect::request_disconnect(state, reason, silent, on_complete),
        SessionEvent::ForceDisconnect => disconnect::force_disconnect(state),
        SessionEvent::Navigate { route } => guard::on_navigate(state, route),
        SessionEvent::VisibilityChanged(visible) => {
            reconcile::on_visibility_changed(state, visible)
        }

        SessionEvent::Provider(event) => handle_provider_event(state, event),
        SessionEvent::Connectivity(connectivity) => {
            login::on_connectivity_changed(state, connectivity)
        }

        SessionEvent::LoginBegun { task, plan, result } => {
            login::on_login_begun(state, task, plan, result)
        }
        SessionEvent::EmbeddedWalletCreated { task, result } => {
            login::on_embedded_wallet_created(state, task, result)
        }
        SessionEvent::WalletActivated { task, result } => {
            login::on_wallet_activated(state, task, result)
        }
        SessionEvent::SignatureChecked { task, result } => {
            login::on_signature_checked(state, task, result)
        }
        SessionEvent::ChainSwitched {
            task,
            target,
            result,
        } => login::on_chain_switched(state, task, target, result),
        SessionEvent::SessionValidated { task, valid } => {
            reconcile::on_session_validated(state, task, valid)
        }
        SessionEvent::ConvergenceTimedOut { task } => login::on_convergence_timed_out(state, task),
        SessionEvent::Teardown(progress) => disconnect::on_teardown_progress(state, progress),
        SessionEvent::Navigated { route, result } => {
            match result {
                Ok(()) => debug!(%route, "navigated"),
                Err(err) => warn!(%route, "navigation failed: {err}"),
            }
            vec![]
        }
    };

    settle_authenticated(state);
    effects
}

fn handle_provider_event(state: &mut SessionState, event: ProviderEvent) -> Vec<SessionEffect> {
    match event {
        ProviderEvent::StateChanged(provider) => reconcile::on_provider_state(state, provider),
        ProviderEvent::LoginCompleted { user, method } => {
            debug!(user = %user.id, ?method, "provider login completed");
            login::on_login_completed(state, user)
        }
        ProviderEvent::LoginFailed(code) => login::on_login_failed(state, &code),
    }
}

/// Returns the status to `Void` on the rising edge of `is_authenticated`.
fn settle_authenticated(state: &mut SessionState) {
    let authenticated = state.is_authenticated();
    if authenticated && !state.was_authenticated {
        state.status.on_authenticated();
    }
    state.was_authenticated = authenticated;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use agentdock_types::{
        AdapterError, ChainFamily, ChainId, ConnectionStatus, ConnectivityState, Identity,
        ProviderErrorCode, ProviderState, Wallet,
    };

    use super::*;
    use crate::config::SessionConfig;
    use crate::events::TeardownProgress;
    use crate::state::{DisconnectCallback, DisconnectReason, LoginRequest};
    use crate::status::AuthStatus;
    use crate::task::{TaskId, TaskKind};

    fn state() -> SessionState {
        SessionState::new(
            Arc::new(SessionConfig::default()),
            ProviderState::default(),
            ConnectivityState::default(),
        )
    }

    fn user_with_wallet() -> Identity {
        Identity::new("u1").with_wallet(Wallet::external("0xabc", ChainFamily::Evm))
    }

    fn connected(address: &str, chain: &str) -> ConnectivityState {
        ConnectivityState {
            connected: true,
            address: Some(address.to_string()),
            chain_id: Some(ChainId::new(chain)),
            status: ConnectionStatus::Connected,
            wallets: vec![Wallet::external(address, ChainFamily::Evm)],
        }
    }

    fn teardown_task(effects: &[SessionEffect]) -> TaskId {
        effects
            .iter()
            .find_map(|e| match e {
                SessionEffect::Teardown { task, .. } => Some(*task),
                _ => None,
            })
            .expect("teardown effect")
    }

    fn login_task(effects: &[SessionEffect]) -> TaskId {
        effects
            .iter()
            .find_map(|e| match e {
                SessionEffect::BeginLogin { task, .. } => Some(*task),
                _ => None,
            })
            .expect("begin login effect")
    }

    /// Drives a teardown through every milestone.
    fn finish_teardown(state: &mut SessionState, task: TaskId) -> Vec<SessionEffect> {
        for progress in [
            TeardownProgress::ProviderLoggedOut { task },
            TeardownProgress::LatchesCleared { task },
            TeardownProgress::ConnectivityCleared { task },
        ] {
            assert!(update(state, SessionEvent::Teardown(progress)).is_empty());
        }
        update(state, SessionEvent::Teardown(TeardownProgress::Finished { task }))
    }

    /// Starts a login with a pre-login teardown and returns the login task.
    fn begin(state: &mut SessionState, request: LoginRequest) -> TaskId {
        let effects = update(state, SessionEvent::StartLogin(request));
        let teardown = teardown_task(&effects);
        let effects = finish_teardown(state, teardown);
        login_task(&effects)
    }

    fn authenticate(state: &mut SessionState) {
        state.provider.authenticated = true;
        state.session.app_authenticated = true;
        state.display_address = Some("0xabc".into());
        state.connectivity = connected("0xabc", "eip155:8453");
        settle_authenticated(state);
    }

    #[test]
    fn test_start_login_while_authenticated_is_noop() {
        let mut state = state();
        authenticate(&mut state);

        let effects = update(&mut state, SessionEvent::StartLogin(LoginRequest::default()));
        assert!(effects.is_empty());
        assert_eq!(state.auth_status(), AuthStatus::Void);
        assert!(!state.login.requested);
    }

    #[test]
    fn test_start_login_enters_logging_and_tears_down_silently() {
        let mut state = state();
        let effects = update(&mut state, SessionEvent::StartLogin(LoginRequest::default()));

        assert_eq!(state.auth_status(), AuthStatus::Logging);
        assert!(state.login.requested);
        assert!(state.teardown.as_ref().is_some_and(|t| t.silent));
        teardown_task(&effects);
    }

    #[test]
    fn test_silent_teardown_keeps_latch_and_status() {
        let mut state = state();
        let task = begin(&mut state, LoginRequest::default().redirect_to("/agents"));

        assert_eq!(state.auth_status(), AuthStatus::Logging);
        assert!(state.login.requested);
        assert_eq!(state.login.redirect.as_deref(), Some("/agents"));
        assert!(state.tasks.login.is_active(task));
    }

    #[test]
    fn test_second_start_login_rearms_redirect_only() {
        let mut state = state();
        let first = update(&mut state, SessionEvent::StartLogin(LoginRequest::default()));
        assert_eq!(first.len(), 1);

        let second = update(
            &mut state,
            SessionEvent::StartLogin(LoginRequest::default().redirect_to("/chat")),
        );
        assert!(second.is_empty());
        assert_eq!(state.login.redirect.as_deref(), Some("/chat"));
    }

    #[test]
    fn test_redirect_resume_accepts_provider_completion() {
        let mut state = state();
        assert!(update(&mut state, SessionEvent::ResumeRedirectLogin).is_empty());
        assert_eq!(state.auth_status(), AuthStatus::Logging);
        assert!(state.teardown.is_none());

        state.connectivity = connected("0xabc", "eip155:8453");
        update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginCompleted {
                user: user_with_wallet(),
                method: None,
            }),
        );
        assert!(state.is_authenticated());
        assert_eq!(state.auth_status(), AuthStatus::Void);
    }

    #[test]
    fn test_happy_path_finalizes_on_supported_chain() {
        let mut state = state();
        let task = begin(&mut state, LoginRequest::default().redirect_to("/agents"));
        update(
            &mut state,
            SessionEvent::LoginBegun {
                task,
                plan: login::LoginPlan::ProviderLogin,
                result: Ok(()),
            },
        );
        update(
            &mut state,
            SessionEvent::Connectivity(connected("0xabc", "eip155:8453")),
        );
        let effects = update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginCompleted {
                user: user_with_wallet(),
                method: None,
            }),
        );

        assert!(state.is_authenticated());
        assert_eq!(state.auth_status(), AuthStatus::Void);
        assert_eq!(state.display_address.as_deref(), Some("0xabc"));
        assert_eq!(state.chain.as_ref().map(|c| c.id.as_str()), Some("eip155:8453"));
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::Navigate { route }] if route == "/agents"
        ));
    }

    #[test]
    fn test_unsupported_chain_defers_navigation_until_switched() {
        let mut state = state();
        begin(&mut state, LoginRequest::default().redirect_to("/agents"));
        update(
            &mut state,
            SessionEvent::Connectivity(connected("0xabc", "eip155:1")),
        );
        let effects = update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginCompleted {
                user: user_with_wallet(),
                method: None,
            }),
        );

        assert!(state.is_authenticated());
        assert_eq!(state.auth_status(), AuthStatus::SwitchingChain);
        let (task, target) = match effects.as_slice() {
            [SessionEffect::SwitchChain { task, target }] => (*task, target.clone()),
            other => panic!("unexpected effects: {other:?}"),
        };
        assert_eq!(target.id.as_str(), "eip155:8453");

        let effects = update(
            &mut state,
            SessionEvent::ChainSwitched {
                task,
                target,
                result: Ok(()),
            },
        );
        assert_eq!(state.auth_status(), AuthStatus::Void);
        assert!(matches!(effects.as_slice(), [SessionEffect::Navigate { .. }]));
    }

    #[test]
    fn test_failed_chain_switch_is_not_fatal() {
        let mut state = state();
        begin(&mut state, LoginRequest::default());
        update(
            &mut state,
            SessionEvent::Connectivity(connected("0xabc", "eip155:1")),
        );
        let effects = update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginCompleted {
                user: user_with_wallet(),
                method: None,
            }),
        );
        let [SessionEffect::SwitchChain { task, target }] = effects.as_slice() else {
            panic!("expected chain switch");
        };
        update(
            &mut state,
            SessionEvent::ChainSwitched {
                task: *task,
                target: target.clone(),
                result: Err(AdapterError::Connectivity("rejected".into())),
            },
        );
        assert!(state.is_authenticated());
        assert_eq!(state.auth_status(), AuthStatus::Void);
        assert!(state.teardown.is_none());
    }

    #[test]
    fn test_completion_without_latch_is_discarded() {
        let mut state = state();
        let effects = update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginCompleted {
                user: user_with_wallet(),
                method: None,
            }),
        );
        assert!(effects.is_empty());
        assert!(!state.is_authenticated());
        assert!(state.session.user.is_none());
    }

    #[test]
    fn test_completion_while_hidden_abandons_attempt() {
        let mut state = state();
        begin(&mut state, LoginRequest::default());
        update(&mut state, SessionEvent::VisibilityChanged(false));

        let effects = update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginCompleted {
                user: user_with_wallet(),
                method: None,
            }),
        );
        assert!(effects.is_empty());
        assert!(!state.is_authenticated());
        assert!(state.session.user.is_none());
        assert!(!state.login.requested);
        assert_eq!(state.auth_status(), AuthStatus::Void);
    }

    #[test]
    fn test_user_cancel_resets_without_teardown() {
        let mut state = state();
        begin(&mut state, LoginRequest::default());

        let effects = update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginFailed(
                ProviderErrorCode::UserExitedAuthFlow,
            )),
        );
        assert!(effects.is_empty());
        assert!(state.teardown.is_none());
        assert!(!state.login.requested);
        assert_eq!(state.auth_status(), AuthStatus::Void);
    }

    #[test]
    fn test_provider_error_notifies_and_tears_down() {
        let mut state = state();
        begin(&mut state, LoginRequest::default());

        let effects = update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginFailed(ProviderErrorCode::Network)),
        );
        assert!(matches!(
            &effects[0],
            SessionEffect::Notify { message, .. } if message == login::LOGIN_FAILED
        ));
        let task = teardown_task(&effects);
        assert_eq!(state.auth_status(), AuthStatus::LoggingOut);

        finish_teardown(&mut state, task);
        assert_eq!(state.auth_status(), AuthStatus::Void);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_walletless_identity_creates_one_embedded_wallet() {
        let mut state = state();
        begin(&mut state, LoginRequest::default());
        let completed = || {
            SessionEvent::Provider(ProviderEvent::LoginCompleted {
                user: Identity::new("u2"),
                method: None,
            })
        };

        let effects = update(&mut state, completed());
        let task = match effects.as_slice() {
            [SessionEffect::CreateEmbeddedWallet { task }] => *task,
            other => panic!("unexpected effects: {other:?}"),
        };
        assert!(update(&mut state, completed()).is_empty());

        update(
            &mut state,
            SessionEvent::EmbeddedWalletCreated {
                task,
                result: Ok((Wallet::embedded("0xemb", ChainFamily::Evm), Some("tok".into()))),
            },
        );
        assert!(state.pending_wallet.is_some());
        assert!(update(&mut state, completed()).is_empty());
        assert!(!state.is_authenticated());

        // Wallet layer learns about the wallet but is not connected yet.
        let mut registered = ConnectivityState::default();
        registered.wallets.push(Wallet::embedded("0xemb", ChainFamily::Evm));
        let effects = update(&mut state, SessionEvent::Connectivity(registered));
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::ActivateWallet { wallet, .. }] if wallet.address == "0xemb"
        ));
        assert_eq!(state.auth_status(), AuthStatus::Connecting);
        assert!(!state.is_authenticated());

        update(
            &mut state,
            SessionEvent::Connectivity(connected("0xemb", "eip155:8453")),
        );
        assert!(state.is_authenticated());
        assert!(state.pending_wallet.is_none());
        assert_eq!(state.display_address.as_deref(), Some("0xemb"));
        assert_eq!(state.auth_status(), AuthStatus::Void);
    }

    #[test]
    fn test_embedded_wallet_failure_notifies_and_tears_down() {
        let mut state = state();
        begin(&mut state, LoginRequest::default());
        let effects = update(
            &mut state,
            SessionEvent::Provider(ProviderEvent::LoginCompleted {
                user: Identity::new("u2"),
                method: None,
            }),
        );
        let [SessionEffect::CreateEmbeddedWallet { task }] = effects.as_slice() else {
            panic!("expected wallet creation");
        };

        let effects = update(
            &mut state,
            SessionEvent::EmbeddedWalletCreated {
                task: *task,
                result: Err(AdapterError::Provider("boom".into())),
            },
        );
        assert!(matches!(
            &effects[0],
            SessionEffect::Notify { message, .. } if message == login::EMBEDDED_WALLET_FAILED
        ));
        teardown_task(&effects);
        assert_eq!(state.auth_status(), AuthStatus::LoggingOut);
    }

    fn completed(user: Identity) -> SessionEvent {
        SessionEvent::Provider(ProviderEvent::LoginCompleted { user, method: None })
    }

    fn progress(state: &mut SessionState, progress: TeardownProgress) -> Vec<SessionEffect> {
        update(state, SessionEvent::Teardown(progress))
    }

    fn visible_disconnect() -> SessionEvent {
        SessionEvent::Disconnect {
            reason: DisconnectReason::UserRequested,
            silent: false,
            on_complete: None,
        }
    }

    /// Provider session is live but the app session is not.
    fn provider_live(state: &mut SessionState) {
        state.provider.authenticated = true;
        state.provider.user = Some(user_with_wallet());
    }

    #[test]
    fn test_completion_during_pre_login_cleanup_is_discarded() {
        let mut state = state();
        state.connectivity = connected("0xabc", "eip155:8453");
        let effects = update(
            &mut state,
            SessionEvent::StartLogin(LoginRequest::default().redirect_to("/agents")),
        );
        let task = teardown_task(&effects);
        progress(&mut state, TeardownProgress::ProviderLoggedOut { task });

        // Completion left over from before the cleanup started.
        let effects = update(&mut state, completed(user_with_wallet()));
        assert!(effects.is_empty());
        assert!(!state.is_authenticated());
        assert!(!state.session.app_authenticated);
        assert!(state.login.requested);
        assert_eq!(state.login.redirect.as_deref(), Some("/agents"));

        progress(&mut state, TeardownProgress::LatchesCleared { task });
        progress(&mut state, TeardownProgress::ConnectivityCleared { task });
        let effects = progress(&mut state, TeardownProgress::Finished { task });
        login_task(&effects);
        assert_eq!(state.auth_status(), AuthStatus::Logging);
        assert!(state.login.requested);
    }

    #[test]
    fn test_completion_during_visible_teardown_keeps_logging_out() {
        let mut state = state();
        let login = login_task(&update(
            &mut state,
            SessionEvent::StartLogin(
                LoginRequest::default()
                    .skip_disconnect()
                    .redirect_to("/agents"),
            ),
        ));
        update(
            &mut state,
            SessionEvent::LoginBegun {
                task: login,
                plan: login::LoginPlan::ProviderLogin,
                result: Ok(()),
            },
        );
        state.connectivity = connected("0xabc", "eip155:8453");

        let task = teardown_task(&update(&mut state, visible_disconnect()));
        assert_eq!(state.auth_status(), AuthStatus::LoggingOut);
        progress(&mut state, TeardownProgress::ProviderLoggedOut { task });

        let effects = update(&mut state, completed(user_with_wallet()));
        assert!(effects.is_empty());
        assert!(!state.is_authenticated());
        assert_eq!(state.auth_status(), AuthStatus::LoggingOut);

        progress(&mut state, TeardownProgress::LatchesCleared { task });
        assert_eq!(state.auth_status(), AuthStatus::LoggingOut);
        progress(&mut state, TeardownProgress::ConnectivityCleared { task });
        let effects = progress(&mut state, TeardownProgress::Finished { task });
        assert!(effects.is_empty());
        assert_eq!(state.auth_status(), AuthStatus::Void);
        assert!(!state.login.requested);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_handler_results_during_teardown_are_discarded() {
        let mut config = SessionConfig::default();
        config.signing.enabled = true;
        let mut state = SessionState::new(
            Arc::new(config),
            ProviderState::default(),
            ConnectivityState::default(),
        );
        begin(&mut state, LoginRequest::default());
        state.connectivity = connected("0xabc", "eip155:8453");
        let effects = update(&mut state, completed(user_with_wallet()));
        let [SessionEffect::SignIn { task: signing, .. }] = effects.as_slice() else {
            panic!("expected signing step");
        };
        let signing = *signing;

        teardown_task(&update(&mut state, SessionEvent::ForceDisconnect));
        let effects = update(
            &mut state,
            SessionEvent::SignatureChecked {
                task: signing,
                result: Ok(true),
            },
        );
        assert!(effects.is_empty());
        assert!(!state.session.app_authenticated);
        assert_eq!(state.auth_status(), AuthStatus::LoggingOut);
    }

    #[test]
    fn test_embedded_wallet_result_during_teardown_is_discarded() {
        let mut state = state();
        begin(&mut state, LoginRequest::default());
        let effects = update(&mut state, completed(Identity::new("u2")));
        let [SessionEffect::CreateEmbeddedWallet { task: wallet }] = effects.as_slice() else {
            panic!("expected wallet creation");
        };
        let wallet = *wallet;

        teardown_task(&update(&mut state, visible_disconnect()));
        let effects = update(
            &mut state,
            SessionEvent::EmbeddedWalletCreated {
                task: wallet,
                result: Ok((Wallet::embedded("0xemb", ChainFamily::Evm), None)),
            },
        );
        assert!(effects.is_empty());
        assert!(state.pending_wallet.is_none());
        assert_eq!(state.auth_status(), AuthStatus::LoggingOut);
    }

    #[test]
    fn test_reconnect_plan_finishes_login_once_wallet_connects() {
        let mut state = state();
        provider_live(&mut state);
        let task = login_task(&update(
            &mut state,
            SessionEvent::StartLogin(
                LoginRequest::default()
                    .skip_disconnect()
                    .redirect_to("/agents"),
            ),
        ));

        let effects = update(
            &mut state,
            SessionEvent::LoginBegun {
                task,
                plan: login::LoginPlan::Reconnect,
                result: Ok(()),
            },
        );
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::ConvergenceDeadline { .. }]
        ));
        assert!(state.login.awaiting_reconnect);
        assert_eq!(state.auth_status(), AuthStatus::Connecting);
        assert!(!state.is_authenticated());

        let effects = update(
            &mut state,
            SessionEvent::Connectivity(connected("0xabc", "eip155:8453")),
        );
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::Navigate { route }] if route == "/agents"
        ));
        assert!(state.is_authenticated());
        assert!(!state.login.awaiting_reconnect);
        assert!(!state.tasks.is_running(TaskKind::Convergence));
        assert_eq!(state.auth_status(), AuthStatus::Void);
    }

    #[test]
    fn test_reconcile_plan_skips_provider_flow() {
        let mut state = state();
        provider_live(&mut state);
        state.connectivity = connected("0xabc", "eip155:8453");
        let task = login_task(&update(
            &mut state,
            SessionEvent::StartLogin(
                LoginRequest::default()
                    .skip_disconnect()
                    .redirect_to("/chat"),
            ),
        ));

        let effects = update(
            &mut state,
            SessionEvent::LoginBegun {
                task,
                plan: login::LoginPlan::Reconcile(user_with_wallet()),
                result: Ok(()),
            },
        );
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::Navigate { route }] if route == "/chat"
        ));
        assert!(state.is_authenticated());
        assert_eq!(state.display_address.as_deref(), Some("0xabc"));
        assert_eq!(state.auth_status(), AuthStatus::Void);
    }

    #[test]
    fn test_reconnect_that_never_converges_fails_login() {
        let mut state = state();
        provider_live(&mut state);
        let task = login_task(&update(
            &mut state,
            SessionEvent::StartLogin(LoginRequest::default().skip_disconnect()),
        ));
        let effects = update(
            &mut state,
            SessionEvent::LoginBegun {
                task,
                plan: login::LoginPlan::Reconnect,
                result: Ok(()),
            },
        );
        let [SessionEffect::ConvergenceDeadline { task: deadline, after }] = effects.as_slice()
        else {
            panic!("expected convergence deadline");
        };
        assert_eq!(*after, state.config.wallet_convergence_timeout());

        let effects = update(&mut state, SessionEvent::ConvergenceTimedOut { task: *deadline });
        assert!(matches!(
            &effects[0],
            SessionEffect::Notify { message, .. } if message == login::LOGIN_FAILED
        ));
        teardown_task(&effects);
        assert!(!state.login.requested);
        assert_eq!(state.auth_status(), AuthStatus::LoggingOut);
    }

    #[test]
    fn test_deadline_after_convergence_is_stale() {
        let mut state = state();
        provider_live(&mut state);
        let task = login_task(&update(
            &mut state,
            SessionEvent::StartLogin(LoginRequest::default().skip_disconnect()),
        ));
        let effects = update(
            &mut state,
            SessionEvent::LoginBegun {
                task,
                plan: login::LoginPlan::Reconnect,
                result: Ok(()),
            },
        );
        let [SessionEffect::ConvergenceDeadline { task: deadline, .. }] = effects.as_slice() else {
            panic!("expected convergence deadline");
        };
        let deadline = *deadline;
        update(
            &mut state,
            SessionEvent::Connectivity(connected("0xabc", "eip155:8453")),
        );
        assert!(state.is_authenticated());

        let effects = update(&mut state, SessionEvent::ConvergenceTimedOut { task: deadline });
        assert!(effects.is_empty());
        assert!(state.is_authenticated());
        assert!(state.teardown.is_none());
    }

    #[test]
    fn test_disconnect_during_teardown_attaches_callback() {
        let mut state = state();
        authenticate(&mut state);
        let first = update(
            &mut state,
            SessionEvent::Disconnect {
                reason: DisconnectReason::UserRequested,
                silent: false,
                on_complete: None,
            },
        );
        let task = teardown_task(&first);

        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let second = update(
            &mut state,
            SessionEvent::Disconnect {
                reason: DisconnectReason::UserRequested,
                silent: false,
                on_complete: Some(DisconnectCallback::new(move || {
                    flag.store(true, Ordering::SeqCst);
                })),
            },
        );
        assert!(second.is_empty());

        let effects = finish_teardown(&mut state, task);
        let Some(SessionEffect::Complete { callbacks }) = effects.into_iter().next() else {
            panic!("expected completion callbacks");
        };
        for callback in callbacks {
            callback.call();
        }
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(state.auth_status(), AuthStatus::Void);
        assert!(!state.is_authenticated());
    }

    #[test]
    fn test_force_disconnect_storm_runs_one_teardown() {
        let mut state = state();
        authenticate(&mut state);

        let first = update(&mut state, SessionEvent::ForceDisconnect);
        let task = teardown_task(&first);
        assert!(update(&mut state, SessionEvent::ForceDisconnect).is_empty());

        finish_teardown(&mut state, task);
        state.connectivity = ConnectivityState::default();
        assert!(update(&mut state, SessionEvent::ForceDisconnect).is_empty());
        assert_eq!(state.auth_status(), AuthStatus::Void);
    }

    #[test]
    fn test_stale_teardown_progress_is_ignored() {
        let mut state = state();
        authenticate(&mut state);
        update(&mut state, SessionEvent::ForceDisconnect);

        let bogus = TaskId(9_999);
        update(
            &mut state,
            SessionEvent::Teardown(TeardownProgress::ConnectivityCleared { task: bogus }),
        );
        assert!(state.session.app_authenticated);
    }

    #[test]
    fn test_login_during_teardown_is_queued() {
        let mut state = state();
        authenticate(&mut state);
        let effects = update(
            &mut state,
            SessionEvent::Disconnect {
                reason: DisconnectReason::UserRequested,
                silent: false,
                on_complete: None,
            },
        );
        let task = teardown_task(&effects);
        // Still authenticated until the teardown clears the session.
        state.display_address = None;
        state.session.app_authenticated = false;

        assert!(update(&mut state, SessionEvent::StartLogin(LoginRequest::default())).is_empty());
        assert!(state.login.queued.is_some());

        let effects = finish_teardown(&mut state, task);
        assert!(state.login.requested);
        assert_eq!(state.auth_status(), AuthStatus::Logging);
        teardown_task(&effects);
    }

    #[test]
    fn test_protected_navigation_starts_login_with_redirect() {
        let mut state = state();
        let effects = update(
            &mut state,
            SessionEvent::Navigate {
                route: "/agents/7".into(),
            },
        );
        teardown_task(&effects);
        assert_eq!(state.login.redirect.as_deref(), Some("/agents/7"));
        assert_eq!(state.auth_status(), AuthStatus::Logging);

        let effects = update(
            &mut state,
            SessionEvent::Navigate {
                route: "/about".into(),
            },
        );
        assert!(matches!(effects.as_slice(), [SessionEffect::Navigate { .. }]));
    }

    #[test]
    fn test_visibility_regain_revalidates() {
        let mut state = state();
        assert!(update(&mut state, SessionEvent::VisibilityChanged(false)).is_empty());
        let effects = update(&mut state, SessionEvent::VisibilityChanged(true));
        assert!(matches!(
            effects.as_slice(),
            [SessionEffect::ValidateSession { .. }]
        ));
    }

    #[test]
    fn test_validation_result_while_hidden_is_discarded() {
        let mut state = state();
        authenticate(&mut state);
        let effects = update(&mut state, SessionEvent::Started);
        let [SessionEffect::ValidateSession { task }] = effects.as_slice() else {
            panic!("expected validation");
        };
        let task = *task;
        update(&mut state, SessionEvent::VisibilityChanged(false));

        update(
            &mut state,
            SessionEvent::SessionValidated {
                task,
                valid: Some(false),
            },
        );
        assert!(state.is_authenticated());
    }

    #[test]
    fn test_invalid_token_clears_session() {
        let mut state = state();
        authenticate(&mut state);
        let effects = update(&mut state, SessionEvent::Started);
        let [SessionEffect::ValidateSession { task }] = effects.as_slice() else {
            panic!("expected validation");
        };
        update(
            &mut state,
            SessionEvent::SessionValidated {
                task: *task,
                valid: Some(false),
            },
        );
        assert!(!state.is_authenticated());
        assert!(state.display_address.is_none());
    }

    #[test]
    fn test_valid_token_restores_session() {
        let mut state = state();
        state.provider.authenticated = true;
        state.provider.user = Some(user_with_wallet());
        state.connectivity = connected("0xabc", "eip155:84532");

        let effects = update(&mut state, SessionEvent::Started);
        let [SessionEffect::ValidateSession { task }] = effects.as_slice() else {
            panic!("expected validation");
        };
        update(
            &mut state,
            SessionEvent::SessionValidated {
                task: *task,
                valid: Some(true),
            },
        );
        assert!(state.is_authenticated());
        assert_eq!(state.chain.as_ref().map(|c| c.net.as_str()), Some("testnet"));
    }
}

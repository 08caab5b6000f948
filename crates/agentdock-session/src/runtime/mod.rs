//! Session runtime: owns the state, runs the event loop, executes effects.
//!
//! All side effects happen here. The reducer stays pure and produces
//! effects; this module executes them.
//!
//! ## Inbox Pattern
//!
//! - Handlers and collaborator forwarders send `SessionEvent`s to `inbox_tx`
//! - The loop receives from `inbox_rx`, runs the reducer, publishes the
//!   latest-value registry and the view, then executes the effects
//!
//! Structure:
//! - `mod.rs`: Core runtime (SessionRuntime, event loop, effect dispatch)
//! - `handlers.rs`: Effect handler implementations (adapter calls)
//! - `handle.rs`: Cloneable handle given to UI collaborators

mod handle;
mod handlers;

use std::future::Future;
use std::sync::Arc;

use agentdock_types::{
    ConnectivityStream, IdentityProvider, KeyValueStore, Navigator, Notifier, ProviderStream,
    SessionLookup, SignatureVerifier, WalletConnectivity,
};
use futures_util::StreamExt;
pub use handle::SessionHandle;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{SessionLoss, SessionLossBus};
use crate::config::SessionConfig;
use crate::effects::SessionEffect;
use crate::events::SessionEvent;
use crate::latest::LatestValues;
use crate::state::{SessionState, SessionView};
use crate::{teardown, update};

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;
pub type SessionEventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn IdentityProvider>,
    pub connectivity: Arc<dyn WalletConnectivity>,
    pub lookup: Arc<dyn SessionLookup>,
    /// Required only when the signing step is enabled.
    pub verifier: Option<Arc<dyn SignatureVerifier>>,
    pub store: Arc<dyn KeyValueStore>,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
}

/// Shared inputs of every effect handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub collaborators: Collaborators,
    pub config: Arc<SessionConfig>,
    pub latest: LatestValues,
}

pub struct SessionRuntime {
    state: SessionState,
    ctx: HandlerContext,
    view_tx: watch::Sender<SessionView>,
    inbox_tx: SessionEventSender,
    inbox_rx: SessionEventReceiver,
    shutdown: CancellationToken,
    provider_events: Option<ProviderStream>,
    connectivity_events: Option<ConnectivityStream>,
    session_loss: Option<broadcast::Receiver<SessionLoss>>,
}

impl SessionRuntime {
    /// Seeds state from the collaborators and subscribes to their pushes.
    ///
    /// Nothing runs until [`run`](Self::run) is awaited.
    pub fn new(config: SessionConfig, collaborators: Collaborators, bus: &SessionLossBus) -> Self {
        let config = Arc::new(config);
        let state = SessionState::new(
            Arc::clone(&config),
            collaborators.provider.state(),
            collaborators.connectivity.state(),
        );
        let latest = LatestValues::default();
        latest.publish(&state.latest_snapshot());
        let (view_tx, _view_rx) = watch::channel(state.view());
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();

        let provider_events = Some(collaborators.provider.subscribe());
        let connectivity_events = Some(collaborators.connectivity.subscribe());
        let session_loss = Some(bus.subscribe());

        Self {
            state,
            ctx: HandlerContext {
                collaborators,
                config,
                latest,
            },
            view_tx,
            inbox_tx,
            inbox_rx,
            shutdown: CancellationToken::new(),
            provider_events,
            connectivity_events,
            session_loss,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle::new(
            self.inbox_tx.clone(),
            self.ctx.latest.clone(),
            self.view_tx.subscribe(),
            self.shutdown.clone(),
        )
    }

    pub fn latest(&self) -> &LatestValues {
        &self.ctx.latest
    }

    /// Runs the event loop until [`SessionHandle::shutdown`] is called.
    pub async fn run(mut self) {
        let forwarders = self.spawn_forwarders();
        self.dispatch_event(SessionEvent::Started);

        let shutdown = self.shutdown.clone();
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = self.inbox_rx.recv() => match event {
                    Some(event) => self.dispatch_event(event),
                    None => break,
                },
            }
        }

        for forwarder in forwarders {
            forwarder.abort();
        }
        debug!("session runtime stopped");
    }

    fn spawn_forwarders(&mut self) -> Vec<JoinHandle<()>> {
        let mut forwarders = Vec::new();

        if let Some(mut events) = self.provider_events.take() {
            let tx = self.inbox_tx.clone();
            forwarders.push(tokio::spawn(async move {
                while let Some(event) = events.next().await {
                    if tx.send(SessionEvent::Provider(event)).is_err() {
                        break;
                    }
                }
            }));
        }

        if let Some(mut states) = self.connectivity_events.take() {
            let tx = self.inbox_tx.clone();
            forwarders.push(tokio::spawn(async move {
                while let Some(state) = states.next().await {
                    if tx.send(SessionEvent::Connectivity(state)).is_err() {
                        break;
                    }
                }
            }));
        }

        if let Some(mut losses) = self.session_loss.take() {
            let tx = self.inbox_tx.clone();
            forwarders.push(tokio::spawn(async move {
                loop {
                    match losses.recv().await {
                        Ok(loss) => debug!(reason = %loss.reason, "session loss signalled"),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "session-loss bus lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                    if tx.send(SessionEvent::ForceDisconnect).is_err() {
                        break;
                    }
                }
            }));
        }

        forwarders
    }

    fn dispatch_event(&mut self, event: SessionEvent) {
        let effects = update::update(&mut self.state, event);
        self.publish();
        for effect in effects {
            self.execute_effect(effect);
        }
    }

    /// Mirrors state into the registry and the view before any handler runs.
    fn publish(&self) {
        self.ctx.latest.publish(&self.state.latest_snapshot());
        let view = self.state.view();
        self.view_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    /// Spawns an async handler and sends its result event to the inbox.
    fn spawn_effect<F, Fut>(&self, f: F)
    where
        F: FnOnce(HandlerContext) -> Fut + Send + 'static,
        Fut: Future<Output = SessionEvent> + Send + 'static,
    {
        let tx = self.inbox_tx.clone();
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let _ = tx.send(f(ctx).await);
        });
    }

    fn execute_effect(&mut self, effect: SessionEffect) {
        match effect {
            // Inline effects
            SessionEffect::Notify { level, message } => {
                self.ctx.collaborators.notifier.notify(level, &message);
            }
            SessionEffect::Complete { callbacks } => {
                for callback in callbacks {
                    callback.call();
                }
            }

            // Async handlers
            SessionEffect::BeginLogin { task, redirect } => {
                self.spawn_effect(move |ctx| handlers::begin_login(ctx, task, redirect));
            }
            SessionEffect::CreateEmbeddedWallet { task } => {
                self.spawn_effect(move |ctx| handlers::create_embedded_wallet(ctx, task));
            }
            SessionEffect::ActivateWallet { task, wallet } => {
                self.spawn_effect(move |ctx| handlers::activate_wallet(ctx, task, wallet));
            }
            SessionEffect::SignIn { task, address } => {
                self.spawn_effect(move |ctx| handlers::sign_in(ctx, task, address));
            }
            SessionEffect::SwitchChain { task, target } => {
                self.spawn_effect(move |ctx| handlers::switch_chain(ctx, task, target));
            }
            SessionEffect::ValidateSession { task } => {
                self.spawn_effect(move |ctx| handlers::validate_session(ctx, task));
            }
            SessionEffect::ConvergenceDeadline { task, after } => {
                self.spawn_effect(move |_ctx| handlers::convergence_deadline(task, after));
            }
            SessionEffect::Navigate { route } => {
                self.spawn_effect(move |ctx| handlers::navigate(ctx, route));
            }
            SessionEffect::Teardown { task, reason } => {
                let tx = self.inbox_tx.clone();
                self.spawn_effect(move |ctx| teardown::run(ctx, task, reason, tx));
            }
        }
    }
}

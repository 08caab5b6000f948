//! Scripted in-process collaborators.
//!
//! Used by `agentdock simulate` and by the integration tests. Every adapter
//! records its calls in a shared [`CallLog`] so ordering can be asserted.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agentdock_types::{
    AdapterError, AdapterResult, ChainFamily, ChainId, ConnectionStatus, ConnectivityState,
    ConnectivityStream, Identity, IdentityProvider, KeyValueStore, LoginMethod, LoginOptions,
    Navigator, NoticeLevel, Notifier, ProviderErrorCode, ProviderEvent, ProviderState,
    ProviderStream, SignatureVerifier, Wallet, WalletConnectivity,
};
use async_trait::async_trait;
use chrono::Duration;
use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::warn;

use crate::bus::SessionLossBus;
use crate::config::SessionConfig;
use crate::runtime::{Collaborators, SessionRuntime};
use crate::store::{MemoryStore, PersistedSession, StoredSessionLookup};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A recorded adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ProviderLogin,
    ProviderLogout,
    CreateEmbeddedWallet,
    SessionToken,
    ConnectWithoutLogin,
    ConnectivityDisconnect,
    SwitchChain(ChainId),
    DisconnectWallet(String),
    SetActiveWallet(String),
    SignMessage,
}

#[derive(Debug, Clone, Default)]
pub struct CallLog {
    entries: Arc<Mutex<Vec<(Instant, Call)>>>,
}

impl CallLog {
    pub fn record(&self, call: Call) {
        lock(&self.entries).push((Instant::now(), call));
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.entries).iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn entries(&self) -> Vec<(Instant, Call)> {
        lock(&self.entries).clone()
    }

    pub fn count(&self, call: &Call) -> usize {
        lock(&self.entries).iter().filter(|(_, c)| c == call).count()
    }

    /// Index of the first matching call.
    pub fn position(&self, call: &Call) -> Option<usize> {
        lock(&self.entries).iter().position(|(_, c)| c == call)
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }
}

/// Fan-out of pushed values to every live subscription.
struct Subscribers<T> {
    senders: Mutex<Vec<mpsc::UnboundedSender<T>>>,
}

impl<T: Clone + Send + 'static> Subscribers<T> {
    fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    fn subscribe(&self) -> BoxStream<'static, T> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.senders).push(tx);
        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|v| (v, rx)) }).boxed()
    }

    fn emit(&self, value: &T) {
        lock(&self.senders).retain(|tx| tx.send(value.clone()).is_ok());
    }
}

/// What the hosted login flow does when opened.
#[derive(Debug, Clone)]
pub enum LoginScript {
    /// Completes with this identity.
    Complete(Identity),
    /// Reports this error code.
    Fail(ProviderErrorCode),
    /// Does nothing; the test drives callbacks via [`SimIdentityProvider::complete`].
    Manual,
}

struct ProviderInner {
    state: ProviderState,
    script: LoginScript,
    wallet_seq: u32,
}

pub struct SimIdentityProvider {
    inner: Mutex<ProviderInner>,
    events: Subscribers<ProviderEvent>,
    log: CallLog,
    fail_logout: AtomicBool,
    fail_wallet_creation: AtomicBool,
    store: Arc<dyn KeyValueStore>,
    session_key: String,
    wallets: Option<Arc<SimWalletLayer>>,
}

impl SimIdentityProvider {
    pub fn new(
        log: CallLog,
        store: Arc<dyn KeyValueStore>,
        session_key: impl Into<String>,
        wallets: Option<Arc<SimWalletLayer>>,
    ) -> Self {
        Self {
            inner: Mutex::new(ProviderInner {
                state: ProviderState {
                    ready: true,
                    ..ProviderState::default()
                },
                script: LoginScript::Manual,
                wallet_seq: 0,
            }),
            events: Subscribers::new(),
            log,
            fail_logout: AtomicBool::new(false),
            fail_wallet_creation: AtomicBool::new(false),
            store,
            session_key: session_key.into(),
            wallets,
        }
    }

    pub fn set_script(&self, script: LoginScript) {
        lock(&self.inner).script = script;
    }

    pub fn fail_logout(&self, fail: bool) {
        self.fail_logout.store(fail, Ordering::SeqCst);
    }

    pub fn fail_wallet_creation(&self, fail: bool) {
        self.fail_wallet_creation.store(fail, Ordering::SeqCst);
    }

    /// Completes the hosted flow with `user`, as the provider callback would.
    pub fn complete(&self, user: Identity) {
        let state = {
            let mut inner = lock(&self.inner);
            inner.state.authenticated = true;
            inner.state.user = Some(user.clone());
            inner.state.clone()
        };
        let token = format!("sim-token-{}", user.id);
        let session = PersistedSession::new(token, Duration::hours(1));
        if let Err(err) = session.save(self.store.as_ref(), &self.session_key) {
            warn!("sim provider failed to persist session: {err}");
        }
        if let (Some(wallets), Some(wallet)) = (&self.wallets, user.wallets.first()) {
            wallets.connect(wallet.clone(), None);
        }
        self.events.emit(&ProviderEvent::StateChanged(state));
        self.events.emit(&ProviderEvent::LoginCompleted {
            user,
            method: Some(LoginMethod::Email),
        });
    }

    /// Provider session survives from an earlier visit: `user` is live but
    /// no completion callback fires and no wallet is connected.
    pub fn restore_session(&self, user: Identity) {
        let state = {
            let mut inner = lock(&self.inner);
            inner.state.authenticated = true;
            inner.state.user = Some(user);
            inner.state.clone()
        };
        self.events.emit(&ProviderEvent::StateChanged(state));
    }

    /// Reports a login error, as the provider callback would.
    pub fn fail(&self, code: ProviderErrorCode) {
        self.events.emit(&ProviderEvent::LoginFailed(code));
    }

    /// Replays a completion without changing provider state (duplicate callback).
    pub fn replay_completion(&self, user: Identity) {
        self.events.emit(&ProviderEvent::LoginCompleted { user, method: None });
    }
}

#[async_trait]
impl IdentityProvider for SimIdentityProvider {
    fn state(&self) -> ProviderState {
        lock(&self.inner).state.clone()
    }

    fn subscribe(&self) -> ProviderStream {
        self.events.subscribe()
    }

    async fn login(&self, _options: LoginOptions) -> AdapterResult<()> {
        self.log.record(Call::ProviderLogin);
        let script = lock(&self.inner).script.clone();
        match script {
            LoginScript::Complete(user) => self.complete(user),
            LoginScript::Fail(code) => self.fail(code),
            LoginScript::Manual => {}
        }
        Ok(())
    }

    async fn logout(&self) -> AdapterResult<()> {
        self.log.record(Call::ProviderLogout);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(AdapterError::Provider("logout rejected".into()));
        }
        let state = {
            let mut inner = lock(&self.inner);
            inner.state.authenticated = false;
            inner.state.user = None;
            inner.state.clone()
        };
        self.events.emit(&ProviderEvent::StateChanged(state));
        Ok(())
    }

    async fn session_token(&self) -> AdapterResult<Option<String>> {
        self.log.record(Call::SessionToken);
        let inner = lock(&self.inner);
        Ok(inner
            .state
            .user
            .as_ref()
            .filter(|_| inner.state.authenticated)
            .map(|u| format!("sim-token-{}", u.id)))
    }

    async fn create_embedded_wallet(&self) -> AdapterResult<Wallet> {
        self.log.record(Call::CreateEmbeddedWallet);
        if self.fail_wallet_creation.load(Ordering::SeqCst) {
            return Err(AdapterError::Provider("wallet creation failed".into()));
        }
        let (wallet, state) = {
            let mut inner = lock(&self.inner);
            inner.wallet_seq += 1;
            let wallet = Wallet::embedded(
                format!("0xembedded{:02}", inner.wallet_seq),
                ChainFamily::Evm,
            );
            if let Some(user) = inner.state.user.as_mut() {
                user.wallets.push(wallet.clone());
            }
            (wallet, inner.state.clone())
        };
        self.events.emit(&ProviderEvent::StateChanged(state));
        Ok(wallet)
    }
}

struct WalletInner {
    state: ConnectivityState,
    /// Disconnect calls that report success but leave the wallet in place.
    sticky_disconnects: usize,
}

pub struct SimWalletLayer {
    inner: Mutex<WalletInner>,
    events: Subscribers<ConnectivityState>,
    log: CallLog,
    fail_switch: AtomicBool,
    default_chain: ChainId,
}

impl SimWalletLayer {
    pub fn new(log: CallLog, default_chain: ChainId) -> Self {
        Self {
            inner: Mutex::new(WalletInner {
                state: ConnectivityState::default(),
                sticky_disconnects: 0,
            }),
            events: Subscribers::new(),
            log,
            fail_switch: AtomicBool::new(false),
            default_chain,
        }
    }

    pub fn fail_switch(&self, fail: bool) {
        self.fail_switch.store(fail, Ordering::SeqCst);
    }

    pub fn set_sticky_disconnects(&self, count: usize) {
        lock(&self.inner).sticky_disconnects = count;
    }

    fn mutate(&self, f: impl FnOnce(&mut ConnectivityState)) {
        let state = {
            let mut inner = lock(&self.inner);
            f(&mut inner.state);
            inner.state.clone()
        };
        self.events.emit(&state);
    }

    /// The wallet layer learns about `wallet` without connecting it.
    pub fn register_wallet(&self, wallet: Wallet) {
        self.mutate(|state| {
            if !state.wallets.contains(&wallet) {
                state.wallets.push(wallet);
            }
        });
    }

    /// Connects `wallet` as the active account.
    pub fn connect(&self, wallet: Wallet, chain: Option<ChainId>) {
        let chain = chain.unwrap_or_else(|| self.default_chain.clone());
        self.mutate(|state| {
            state.connected = true;
            state.address = Some(wallet.address.clone());
            state.chain_id = Some(chain);
            state.status = ConnectionStatus::Connected;
            if !state.wallets.contains(&wallet) {
                state.wallets.push(wallet);
            }
        });
    }
}

#[async_trait]
impl WalletConnectivity for SimWalletLayer {
    fn state(&self) -> ConnectivityState {
        lock(&self.inner).state.clone()
    }

    fn subscribe(&self) -> ConnectivityStream {
        self.events.subscribe()
    }

    async fn connect_without_login(&self, _redirect: Option<&str>) -> AdapterResult<()> {
        self.log.record(Call::ConnectWithoutLogin);
        let chain = self.default_chain.clone();
        self.mutate(|state| {
            if let Some(first) = state.wallets.first() {
                state.connected = true;
                state.address = Some(first.address.clone());
                state.chain_id = Some(chain);
                state.status = ConnectionStatus::Connected;
            }
        });
        Ok(())
    }

    async fn disconnect(&self) -> AdapterResult<()> {
        self.log.record(Call::ConnectivityDisconnect);
        self.mutate(|state| {
            state.connected = false;
            state.address = None;
            state.chain_id = None;
            state.status = ConnectionStatus::Disconnected;
        });
        Ok(())
    }

    async fn switch_chain(&self, chain: &ChainId) -> AdapterResult<()> {
        self.log.record(Call::SwitchChain(chain.clone()));
        if self.fail_switch.load(Ordering::SeqCst) {
            return Err(AdapterError::Connectivity("chain switch rejected".into()));
        }
        let chain = chain.clone();
        self.mutate(|state| state.chain_id = Some(chain));
        Ok(())
    }

    async fn wallets(&self, family: ChainFamily) -> AdapterResult<Vec<Wallet>> {
        Ok(lock(&self.inner)
            .state
            .wallets
            .iter()
            .filter(|w| w.family == family)
            .cloned()
            .collect())
    }

    async fn disconnect_wallet(&self, _family: ChainFamily, wallet: &Wallet) -> AdapterResult<()> {
        self.log.record(Call::DisconnectWallet(wallet.address.clone()));
        {
            let mut inner = lock(&self.inner);
            if inner.sticky_disconnects > 0 {
                inner.sticky_disconnects -= 1;
                return Ok(());
            }
        }
        self.mutate(|state| state.wallets.retain(|w| w != wallet));
        Ok(())
    }

    async fn set_active_wallet(&self, wallet: &Wallet) -> AdapterResult<()> {
        self.log.record(Call::SetActiveWallet(wallet.address.clone()));
        self.connect(wallet.clone(), None);
        Ok(())
    }

    async fn sign_message(&self, message: &str) -> AdapterResult<String> {
        self.log.record(Call::SignMessage);
        let address = lock(&self.inner)
            .state
            .address
            .clone()
            .ok_or_else(|| AdapterError::Connectivity("no active account".into()))?;
        Ok(format!("sig:{address}:{}", message.len()))
    }
}

/// Accepts signatures produced by [`SimWalletLayer`] unless told otherwise.
#[derive(Debug)]
pub struct SimVerifier {
    accept: AtomicBool,
}

impl Default for SimVerifier {
    fn default() -> Self {
        Self {
            accept: AtomicBool::new(true),
        }
    }
}

impl SimVerifier {
    pub fn set_accept(&self, accept: bool) {
        self.accept.store(accept, Ordering::SeqCst);
    }
}

#[async_trait]
impl SignatureVerifier for SimVerifier {
    async fn verify(&self, address: &str, _message: &str, signature: &str) -> AdapterResult<bool> {
        Ok(self.accept.load(Ordering::SeqCst) && signature.starts_with(&format!("sig:{address}:")))
    }
}

#[derive(Debug, Default)]
pub struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn routes(&self) -> Vec<String> {
        lock(&self.routes).clone()
    }
}

#[async_trait]
impl Navigator for RecordingNavigator {
    async fn navigate(&self, route: &str) -> AdapterResult<()> {
        lock(&self.routes).push(route.to_string());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
    count: AtomicUsize,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<(NoticeLevel, String)> {
        lock(&self.notices).clone()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.notices).iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.count.fetch_add(1, Ordering::SeqCst);
        lock(&self.notices).push((level, message.to_string()));
    }
}

/// A complete set of simulated collaborators sharing one call log.
pub struct SimWorld {
    pub config: SessionConfig,
    pub log: CallLog,
    pub store: Arc<dyn KeyValueStore>,
    pub provider: Arc<SimIdentityProvider>,
    pub wallets: Arc<SimWalletLayer>,
    pub verifier: Arc<SimVerifier>,
    pub navigator: Arc<RecordingNavigator>,
    pub notifier: Arc<RecordingNotifier>,
    pub bus: SessionLossBus,
}

impl SimWorld {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: SessionConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let log = CallLog::default();
        let wallets = Arc::new(SimWalletLayer::new(
            log.clone(),
            config.default_chain.clone(),
        ));
        let provider = Arc::new(SimIdentityProvider::new(
            log.clone(),
            Arc::clone(&store),
            config.storage.session_key(),
            Some(Arc::clone(&wallets)),
        ));
        Self {
            config,
            log,
            store,
            provider,
            wallets,
            verifier: Arc::new(SimVerifier::default()),
            navigator: Arc::new(RecordingNavigator::default()),
            notifier: Arc::new(RecordingNotifier::default()),
            bus: SessionLossBus::new(),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        let store = Arc::clone(&self.store);
        Collaborators {
            provider: Arc::clone(&self.provider) as Arc<dyn IdentityProvider>,
            connectivity: Arc::clone(&self.wallets) as Arc<dyn WalletConnectivity>,
            lookup: Arc::new(StoredSessionLookup::new(
                Arc::clone(&store),
                self.config.storage.session_key(),
            )),
            verifier: Some(Arc::clone(&self.verifier) as Arc<dyn SignatureVerifier>),
            store,
            navigator: Arc::clone(&self.navigator) as Arc<dyn Navigator>,
            notifier: Arc::clone(&self.notifier) as Arc<dyn Notifier>,
        }
    }

    pub fn runtime(&self) -> SessionRuntime {
        SessionRuntime::new(self.config.clone(), self.collaborators(), &self.bus)
    }
}

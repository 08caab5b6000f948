//! Handle given to UI collaborators.
//!
//! Reads come from the latest-value registry and the published view;
//! commands are sent to the runtime inbox.

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;

use super::SessionEventSender;
use crate::error::{SessionError, SessionResult};
use crate::events::SessionEvent;
use crate::latest::LatestValues;
use crate::state::{DisconnectCallback, DisconnectReason, LoginRequest, SessionView};
use crate::status::AuthStatus;

#[derive(Debug, Clone)]
pub struct SessionHandle {
    inbox_tx: SessionEventSender,
    latest: LatestValues,
    view: watch::Receiver<SessionView>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub(super) fn new(
        inbox_tx: SessionEventSender,
        latest: LatestValues,
        view: watch::Receiver<SessionView>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inbox_tx,
            latest,
            view,
            shutdown,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.latest.authenticated.get()
    }

    pub fn auth_status(&self) -> AuthStatus {
        self.view.borrow().auth_status
    }

    pub fn is_page_visible(&self) -> bool {
        self.latest.page_visible.get()
    }

    pub fn latest(&self) -> &LatestValues {
        &self.latest
    }

    /// Current view.
    pub fn snapshot(&self) -> SessionView {
        self.view.borrow().clone()
    }

    /// Subscribes to view changes.
    pub fn view(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Waits until the view satisfies `pred`.
    pub async fn wait_until(
        &self,
        mut pred: impl FnMut(&SessionView) -> bool,
    ) -> SessionResult<SessionView> {
        let mut view = self.view.clone();
        view.wait_for(|v| pred(v))
            .await
            .map(|v| v.clone())
            .map_err(|_closed| SessionError::RuntimeStopped)
    }

    pub fn start_login(&self, request: LoginRequest) -> SessionResult<()> {
        self.send(SessionEvent::StartLogin(request))
    }

    pub fn resume_redirect_login(&self) -> SessionResult<()> {
        self.send(SessionEvent::ResumeRedirectLogin)
    }

    /// Requests a visible teardown; `on_complete` runs once it has settled.
    pub fn handle_disconnect(
        &self,
        reason: DisconnectReason,
        on_complete: Option<DisconnectCallback>,
    ) -> SessionResult<()> {
        self.send(SessionEvent::Disconnect {
            reason,
            silent: false,
            on_complete,
        })
    }

    /// Tears the session down and waits for the teardown to settle.
    pub async fn disconnect(&self, reason: DisconnectReason) -> SessionResult<()> {
        let (tx, rx) = oneshot::channel();
        let callback = DisconnectCallback::new(move || {
            let _ = tx.send(());
        });
        self.handle_disconnect(reason, Some(callback))?;
        rx.await.map_err(|_dropped| SessionError::RuntimeStopped)
    }

    pub fn set_page_visible(&self, visible: bool) -> SessionResult<()> {
        self.send(SessionEvent::VisibilityChanged(visible))
    }

    /// Routes a navigation through the guard.
    pub fn navigate(&self, route: impl Into<String>) -> SessionResult<()> {
        self.send(SessionEvent::Navigate {
            route: route.into(),
        })
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn send(&self, event: SessionEvent) -> SessionResult<()> {
        if self.shutdown.is_cancelled() {
            return Err(SessionError::RuntimeStopped);
        }
        self.inbox_tx
            .send(event)
            .map_err(|_closed| SessionError::RuntimeStopped)
    }
}

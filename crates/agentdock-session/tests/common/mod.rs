#![allow(dead_code)]

use std::time::Duration;

use agentdock_session::sim::{Call, CallLog, LoginScript, SimWorld};
use agentdock_session::{AuthStatus, LoginRequest, SessionConfig, SessionHandle, SessionView};
use agentdock_types::{ChainFamily, Identity, Wallet};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

const WAIT: Duration = Duration::from_secs(30);

pub struct Harness {
    pub world: SimWorld,
    pub handle: SessionHandle,
    runtime: JoinHandle<()>,
}

impl Harness {
    pub fn start(world: SimWorld) -> Self {
        let runtime = world.runtime();
        let handle = runtime.handle();
        let runtime = tokio::spawn(runtime.run());
        Self {
            world,
            handle,
            runtime,
        }
    }

    pub fn with_defaults() -> Self {
        Self::start(SimWorld::new(SessionConfig::default()))
    }

    pub async fn wait_until(&self, pred: impl FnMut(&SessionView) -> bool) -> SessionView {
        timeout(WAIT, self.handle.wait_until(pred))
            .await
            .expect("timed out waiting for session view")
            .expect("runtime stopped")
    }

    /// Logs `user` in without the pre-login cleanup and waits for a settled
    /// authenticated session.
    pub async fn login(&self, user: Identity) -> SessionView {
        self.world.provider.set_script(LoginScript::Complete(user));
        self.handle
            .start_login(LoginRequest::default().skip_disconnect())
            .expect("start login");
        let view = self
            .wait_until(|v| {
                v.is_authenticated && v.auth_status == AuthStatus::Void && v.chain.is_some()
            })
            .await;
        settle().await;
        view
    }

    pub async fn stop(self) {
        self.handle.shutdown();
        timeout(WAIT, self.runtime)
            .await
            .expect("runtime did not stop")
            .expect("runtime panicked");
    }
}

pub fn user_with_wallet(id: &str, address: &str) -> Identity {
    Identity::new(id).with_wallet(Wallet::external(address, ChainFamily::Evm))
}

/// Lets in-flight handlers and their follow-up events drain.
pub async fn settle() {
    sleep(Duration::from_secs(2)).await;
}

pub async fn wait_for_call(log: &CallLog, call: &Call, count: usize) {
    timeout(WAIT, async {
        while log.count(call) < count {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {call:?} x{count}"));
}

pub async fn wait_for<F: FnMut() -> bool>(mut check: F) {
    timeout(WAIT, async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for condition");
}

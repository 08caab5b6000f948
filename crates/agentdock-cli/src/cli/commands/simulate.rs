//! `agentdock simulate`: drives the session core against scripted
//! collaborators and prints every status transition.

use std::sync::Arc;
use std::time::Duration;

use agentdock_session::config::paths;
use agentdock_session::sim::{Call, LoginScript, SimWorld};
use agentdock_session::store::FileStore;
use agentdock_session::{
    AuthStatus, DisconnectReason, LoginRequest, SessionConfig, SessionHandle, SessionView,
};
use agentdock_types::{ChainFamily, Identity, ProviderErrorCode, Wallet};
use anyhow::{Context, Result, bail};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

const STEP_TIMEOUT: Duration = Duration::from_secs(10);
const USER_ADDRESS: &str = "0x5a1e000000000000000000000000000000000001";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// Identity with a linked wallet logs in, then logs out
    Happy,
    /// Walletless identity gets an embedded wallet provisioned
    Embedded,
    /// User closes the hosted login flow
    Cancelled,
    /// Burst of session-loss signals on a live session
    Storm,
}

pub async fn run(config: SessionConfig, scenario: Scenario, file_store: bool) -> Result<()> {
    let world = if file_store {
        SimWorld::with_store(config, Arc::new(FileStore::new(paths::storage_path())))
    } else {
        SimWorld::new(config)
    };
    let runtime = world.runtime();
    let handle = runtime.handle();
    let runtime_task = tokio::spawn(runtime.run());
    let printer = tokio::spawn(print_transitions(handle.view()));

    let result = drive(&world, &handle, scenario).await;
    // Give the printer a chance to flush the last transition.
    sleep(Duration::from_millis(50)).await;
    printer.abort();
    handle.shutdown();
    runtime_task.await.context("session runtime panicked")?;
    result?;

    println!("final: {}", describe(&handle.snapshot()));
    println!("calls:");
    for call in world.log.calls() {
        println!("  {call:?}");
    }
    Ok(())
}

async fn drive(world: &SimWorld, handle: &SessionHandle, scenario: Scenario) -> Result<()> {
    match scenario {
        Scenario::Happy => {
            login(world, handle, linked_user()).await?;
            logout(handle).await
        }
        Scenario::Embedded => {
            world
                .provider
                .set_script(LoginScript::Complete(Identity::new("sim-user")));
            handle.start_login(LoginRequest::default().redirect_to("/agents"))?;
            wait(handle, "embedded wallet", |v| v.pending_embedded_wallet).await?;
            world
                .wallets
                .register_wallet(Wallet::embedded("0xembedded01", ChainFamily::Evm));
            wait(handle, "authenticated session", settled_login).await?;
            Ok(())
        }
        Scenario::Cancelled => {
            world
                .provider
                .set_script(LoginScript::Fail(ProviderErrorCode::UserExitedAuthFlow));
            handle.start_login(LoginRequest::default())?;
            wait_for_call(world, &Call::ProviderLogin).await?;
            wait(handle, "idle status", |v| v.auth_status.is_idle()).await?;
            Ok(())
        }
        Scenario::Storm => {
            login(world, handle, linked_user()).await?;
            for attempt in 1..=5 {
                world.bus.emit(format!("401 on request {attempt}"));
            }
            wait_for_call(world, &Call::ConnectivityDisconnect).await?;
            wait(handle, "teardown", |v| !v.logging_out && v.auth_status.is_idle()).await?;
            Ok(())
        }
    }
}

fn linked_user() -> Identity {
    Identity::new("sim-user").with_wallet(Wallet::external(USER_ADDRESS, ChainFamily::Evm))
}

fn settled_login(view: &SessionView) -> bool {
    view.is_authenticated && view.auth_status == AuthStatus::Void && view.chain.is_some()
}

async fn login(world: &SimWorld, handle: &SessionHandle, user: Identity) -> Result<()> {
    world.provider.set_script(LoginScript::Complete(user));
    handle.start_login(LoginRequest::default().redirect_to("/agents"))?;
    wait(handle, "authenticated session", settled_login).await?;
    Ok(())
}

async fn logout(handle: &SessionHandle) -> Result<()> {
    timeout(STEP_TIMEOUT, handle.disconnect(DisconnectReason::UserRequested))
        .await
        .context("timed out waiting for logout")??;
    Ok(())
}

async fn wait(
    handle: &SessionHandle,
    what: &str,
    pred: impl FnMut(&SessionView) -> bool,
) -> Result<SessionView> {
    let view = timeout(STEP_TIMEOUT, handle.wait_until(pred))
        .await
        .with_context(|| format!("timed out waiting for {what}"))??;
    Ok(view)
}

async fn wait_for_call(world: &SimWorld, call: &Call) -> Result<()> {
    let polled = timeout(STEP_TIMEOUT, async {
        while world.log.count(call) == 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if polled.is_err() {
        bail!("timed out waiting for {call:?}");
    }
    Ok(())
}

async fn print_transitions(mut view: watch::Receiver<SessionView>) {
    let mut last = None;
    loop {
        let current = view.borrow_and_update().clone();
        let key = (current.auth_status, current.is_authenticated);
        if last != Some(key) {
            println!("{}", describe(&current));
            last = Some(key);
        }
        if view.changed().await.is_err() {
            break;
        }
    }
}

fn describe(view: &SessionView) -> String {
    format!(
        "{:<16} authenticated={} address={} chain={}",
        view.auth_status.to_string(),
        view.is_authenticated,
        view.address.as_deref().unwrap_or("-"),
        view.chain.as_ref().map_or("-", |c| c.id.as_str()),
    )
}

//! Effect handlers.
//!
//! Pure async functions: the runtime spawns them and sends the returned
//! event to the inbox. Handlers never trust values captured before an
//! `.await`; they re-read the latest-value registry instead.

use std::time::Duration;

use agentdock_types::{AdapterResult, ChainSelection, LoginOptions, Wallet};
use tokio::time::sleep;
use tracing::{debug, warn};

use super::HandlerContext;
use crate::events::SessionEvent;
use crate::login::LoginPlan;
use crate::task::TaskId;

pub async fn begin_login(
    ctx: HandlerContext,
    task: TaskId,
    redirect: Option<String>,
) -> SessionEvent {
    let plan = LoginPlan::from_snapshot(&ctx.latest.snapshot());
    debug!(?plan, "login plan");
    let result = match &plan {
        LoginPlan::ProviderLogin => {
            let options = LoginOptions {
                families: ctx.config.login_families.clone(),
            };
            ctx.collaborators.provider.login(options).await
        }
        LoginPlan::Reconnect => {
            ctx.collaborators
                .connectivity
                .connect_without_login(redirect.as_deref())
                .await
        }
        LoginPlan::Reconcile(_) => Ok(()),
    };
    SessionEvent::LoginBegun { task, plan, result }
}

pub async fn create_embedded_wallet(ctx: HandlerContext, task: TaskId) -> SessionEvent {
    let result = provision_wallet(&ctx).await;
    SessionEvent::EmbeddedWalletCreated { task, result }
}

async fn provision_wallet(ctx: &HandlerContext) -> AdapterResult<(Wallet, Option<String>)> {
    let provider = &ctx.collaborators.provider;
    let wallet = provider.create_embedded_wallet().await?;
    let token = provider.session_token().await?;
    Ok((wallet, token))
}

pub async fn activate_wallet(ctx: HandlerContext, task: TaskId, wallet: Wallet) -> SessionEvent {
    let result = ctx
        .collaborators
        .connectivity
        .set_active_wallet(&wallet)
        .await;
    SessionEvent::WalletActivated { task, result }
}

pub async fn sign_in(ctx: HandlerContext, task: TaskId, address: String) -> SessionEvent {
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let message = ctx.config.signing.render(&nonce);
    let result = check_signature(&ctx, &address, &message).await;
    SessionEvent::SignatureChecked { task, result }
}

async fn check_signature(
    ctx: &HandlerContext,
    address: &str,
    message: &str,
) -> AdapterResult<bool> {
    let signature = ctx
        .collaborators
        .connectivity
        .sign_message(message)
        .await?;
    match &ctx.collaborators.verifier {
        Some(verifier) => verifier.verify(address, message, &signature).await,
        None => {
            warn!("signing enabled without a verifier, accepting signature");
            Ok(true)
        }
    }
}

pub async fn switch_chain(
    ctx: HandlerContext,
    task: TaskId,
    target: ChainSelection,
) -> SessionEvent {
    let result = ctx.collaborators.connectivity.switch_chain(&target.id).await;
    SessionEvent::ChainSwitched {
        task,
        target,
        result,
    }
}

pub async fn validate_session(ctx: HandlerContext, task: TaskId) -> SessionEvent {
    let valid = match ctx.collaborators.lookup.has_valid_token().await {
        Ok(valid) => Some(valid),
        Err(err) => {
            warn!("session lookup failed: {err}");
            None
        }
    };
    SessionEvent::SessionValidated { task, valid }
}

pub async fn convergence_deadline(task: TaskId, after: Duration) -> SessionEvent {
    sleep(after).await;
    SessionEvent::ConvergenceTimedOut { task }
}

pub async fn navigate(ctx: HandlerContext, route: String) -> SessionEvent {
    let result = ctx.collaborators.navigator.navigate(&route).await;
    SessionEvent::Navigated { route, result }
}

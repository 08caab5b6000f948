//! Teardown sequence.
//!
//! Strictly sequential: provider logout completes (or definitively fails)
//! before the wallet layer is touched. Every sub-step is best-effort; the
//! sequence always reaches `Finished`.

use agentdock_types::{ChainFamily, WalletConnectivity};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::events::{SessionEvent, TeardownProgress};
use crate::runtime::{HandlerContext, SessionEventSender};
use crate::state::DisconnectReason;
use crate::store;
use crate::task::TaskId;

pub async fn run(
    ctx: HandlerContext,
    task: TaskId,
    reason: DisconnectReason,
    tx: SessionEventSender,
) -> SessionEvent {
    let progress = |p: TeardownProgress| {
        let _ = tx.send(SessionEvent::Teardown(p));
    };

    if ctx.latest.provider_authenticated.get() {
        debug!("logging out of identity provider");
        if let Err(err) = ctx.collaborators.provider.logout().await {
            warn!(%reason, "provider logout failed, continuing teardown: {err}");
        }
    }
    progress(TeardownProgress::ProviderLoggedOut { task });

    sleep(ctx.config.teardown.provider_settle()).await;
    progress(TeardownProgress::LatchesCleared { task });

    let connectivity = ctx.collaborators.connectivity.as_ref();
    if let Err(err) = connectivity.disconnect().await {
        warn!("wallet layer disconnect failed: {err}");
    }
    for family in ctx.config.families() {
        drain_family(
            connectivity,
            family,
            ctx.config.teardown.wallet_disconnect_attempts,
        )
        .await;
    }

    let prefixes = ctx.config.storage.prefixes();
    match store::purge_prefixed(ctx.collaborators.store.as_ref(), &prefixes) {
        Ok(removed) => debug!(removed, "persisted session keys purged"),
        Err(err) => warn!("failed to purge persisted keys: {err}"),
    }
    progress(TeardownProgress::ConnectivityCleared { task });

    sleep(ctx.config.teardown.final_settle()).await;
    info!(%reason, "teardown complete");
    SessionEvent::Teardown(TeardownProgress::Finished { task })
}

/// Disconnects every wallet of `family`, re-listing after each pass.
///
/// Returns the number of wallets still connected when the attempts ran out.
pub async fn drain_family(
    connectivity: &dyn WalletConnectivity,
    family: ChainFamily,
    attempts: u32,
) -> usize {
    for attempt in 1..=attempts.max(1) {
        let wallets = match connectivity.wallets(family).await {
            Ok(wallets) => wallets,
            Err(err) => {
                warn!(%family, "failed to list wallets: {err}");
                return 0;
            }
        };
        if wallets.is_empty() {
            return 0;
        }
        debug!(%family, attempt, remaining = wallets.len(), "disconnecting wallets");
        for wallet in &wallets {
            if let Err(err) = connectivity.disconnect_wallet(family, wallet).await {
                warn!(%family, address = %wallet.address, "wallet disconnect failed: {err}");
            }
        }
    }

    let remaining = connectivity
        .wallets(family)
        .await
        .map_or(0, |wallets| wallets.len());
    if remaining > 0 {
        warn!(%family, remaining, "wallets still connected after bounded disconnect");
    }
    remaining
}

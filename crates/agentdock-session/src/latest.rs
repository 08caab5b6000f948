//! Latest-value registry.
//!
//! One live cell per volatile signal. Async handlers re-read these cells
//! after every `.await` instead of trusting values they captured before
//! suspending. The runtime is the only writer.

use std::sync::Arc;

use agentdock_types::Identity;
use tokio::sync::watch;

/// A single live value.
#[derive(Debug)]
pub struct Latest<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for Latest<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Clone + PartialEq> Latest<T> {
    pub fn new(value: T) -> Self {
        let (tx, _rx) = watch::channel(value);
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Stores `value`, waking subscribers only if it changed.
    pub fn set(&self, value: T) {
        self.tx.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }

    /// Waits until the value satisfies `pred`.
    pub async fn wait_for(&self, mut pred: impl FnMut(&T) -> bool) -> T {
        let mut rx = self.subscribe();
        match rx.wait_for(|v| pred(v)).await {
            Ok(v) => v.clone(),
            // The sender lives in `self`, so the channel cannot close here.
            Err(_) => self.get(),
        }
    }
}

/// Point-in-time copy of every registry cell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatestSnapshot {
    pub authenticated: bool,
    pub provider_authenticated: bool,
    pub app_authenticated: bool,
    pub connected: bool,
    pub display_address: Option<String>,
    pub page_visible: bool,
    pub user: Option<Identity>,
}

/// The registry itself. Cheap to clone; clones share cells.
#[derive(Debug, Clone)]
pub struct LatestValues {
    pub authenticated: Latest<bool>,
    pub provider_authenticated: Latest<bool>,
    pub app_authenticated: Latest<bool>,
    pub connected: Latest<bool>,
    pub display_address: Latest<Option<String>>,
    pub page_visible: Latest<bool>,
    pub user: Latest<Option<Identity>>,
}

impl Default for LatestValues {
    fn default() -> Self {
        Self {
            authenticated: Latest::new(false),
            provider_authenticated: Latest::new(false),
            app_authenticated: Latest::new(false),
            connected: Latest::new(false),
            display_address: Latest::new(None),
            page_visible: Latest::new(true),
            user: Latest::new(None),
        }
    }
}

impl LatestValues {
    pub fn snapshot(&self) -> LatestSnapshot {
        LatestSnapshot {
            authenticated: self.authenticated.get(),
            provider_authenticated: self.provider_authenticated.get(),
            app_authenticated: self.app_authenticated.get(),
            connected: self.connected.get(),
            display_address: self.display_address.get(),
            page_visible: self.page_visible.get(),
            user: self.user.get(),
        }
    }

    pub fn publish(&self, snapshot: &LatestSnapshot) {
        self.authenticated.set(snapshot.authenticated);
        self.provider_authenticated
            .set(snapshot.provider_authenticated);
        self.app_authenticated.set(snapshot.app_authenticated);
        self.connected.set(snapshot.connected);
        self.display_address.set(snapshot.display_address.clone());
        self.page_visible.set(snapshot.page_visible);
        self.user.set(snapshot.user.clone());
    }
}

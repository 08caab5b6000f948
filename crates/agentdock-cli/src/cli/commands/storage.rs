//! Storage command handlers.

use agentdock_session::SessionConfig;
use agentdock_session::config::paths;
use agentdock_session::store::{self, FileStore};
use agentdock_types::KeyValueStore;
use anyhow::{Context, Result};

fn open() -> FileStore {
    FileStore::new(paths::storage_path())
}

pub fn list() -> Result<()> {
    let store = open();
    let keys = store
        .keys()
        .with_context(|| format!("read {}", store.path().display()))?;
    if keys.is_empty() {
        println!("No persisted keys.");
        return Ok(());
    }
    for key in keys {
        println!("{key}");
    }
    Ok(())
}

pub fn purge(config: &SessionConfig) -> Result<()> {
    let store = open();
    let removed = store::purge_prefixed(&store, &config.storage.prefixes())
        .with_context(|| format!("purge {}", store.path().display()))?;
    println!("Removed {removed} key(s).");
    Ok(())
}

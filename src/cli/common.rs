//! Common utilities shared across CLI commands.

use anyhow::{Context, Result};

use crate::config::Config;
use crate::store::SharedStore;

/// Open the shared state file configured in `[store]`.
pub fn open_store(config: &Config) -> Result<SharedStore> {
    let path = &config.store.path;
    SharedStore::open(path).with_context(|| format!("failed to open state file {}", path.display()))
}

/// Single-threaded runtime for the async commands.
pub fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("tabsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")
}

//! `tabsync push`: tell the server a rebuild happened.

use anyhow::{Context, Result};

use crate::cli::common;
use crate::config::Config;
use crate::log;
use crate::push::notify_rebuild;

pub fn push_rebuild(config: &Config, built_at: Option<u64>) -> Result<()> {
    let url = config.push_url();
    let client = common::http_client()?;
    let recorded = common::runtime()?
        .block_on(notify_rebuild(&client, &url, built_at))
        .with_context(|| format!("failed to notify {url}"))?;

    log!("push"; "build {} recorded by {}", recorded, url);
    Ok(())
}

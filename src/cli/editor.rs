//! `tabsync editor`: the editor surface's side of the bridge.
//!
//! Each stdin line is one JSON envelope, e.g.
//! `{"type":"started","host":"tab-1","lastModified":1700000000000}`.

use std::io::{self, BufRead};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cli::common;
use crate::config::Config;
use crate::editor::{BridgeOutcome, EditorBridge};
use crate::freshness::now_ms;
use crate::mode::ModeArbiter;
use crate::runtime::{LogNotifier, TabContext};
use crate::{debug, log};

pub fn run_editor(config: &Config, origin: Option<&str>) -> Result<()> {
    let store = common::open_store(config)?;
    let origin = origin.map_or_else(|| config.origin(), str::to_string);
    let ctx = TabContext::new(origin).with_editor_surface(true);
    let bridge = EditorBridge::attach(&ctx, ModeArbiter::new(store.clone()), Arc::new(LogNotifier))?;

    log!("editor"; "bridging messages for {} (one JSON object per line)", ctx.origin);

    for line in io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        // Another process may have started or stopped a session since
        if let Err(e) = store.refresh() {
            debug!("editor"; "store refresh failed: {}", e);
        }

        match bridge.handle_line(&line, now_ms()) {
            Ok(BridgeOutcome::Announced(started)) => debug!("editor"; "early start: {:?}", started),
            Ok(BridgeOutcome::Started(started)) => {
                log!("editor"; "editor dev mode started ({:?})", started);
            }
            Ok(BridgeOutcome::Rejected(rejection)) => debug!("editor"; "rejected: {}", rejection),
            Ok(BridgeOutcome::Stopped(cleared)) => {
                log!("editor"; "editor dev mode stopped (record cleared: {})", cleared);
            }
            Ok(BridgeOutcome::Published { last_modified }) => {
                log!("editor"; "payload published ({})", last_modified);
            }
            Ok(BridgeOutcome::NoFiles) => {}
            Ok(BridgeOutcome::Dropped(reason)) => debug!("editor"; "dropped: {:?}", reason),
            Err(e) => log!("editor"; "{:#}", anyhow::Error::from(e)),
        }
    }
    Ok(())
}

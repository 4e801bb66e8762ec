//! `tabsync status` and `tabsync stop`.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde_json::Value;

use crate::cli::common;
use crate::config::Config;
use crate::{log, logger};
use crate::mode::ModeArbiter;
use crate::record::{BUNDLE_UPDATED_KEY, BundleUpdate, ModeKind};

/// Print both dev mode records and the last bundle broadcast.
pub fn show_status(config: &Config) -> Result<()> {
    let store = common::open_store(config)?;
    let arbiter = ModeArbiter::new(store.clone());

    println!("{} {}", "state:".dimmed(), config.store.path.display());
    match arbiter.active_mode() {
        Some(kind) => println!("{} {}", "active:".dimmed(), kind.green().bold()),
        None => println!("{} {}", "active:".dimmed(), "none".yellow()),
    }

    for kind in ModeKind::ALL {
        let Some(record) = arbiter.record(kind) else {
            println!("  {:<7} -", kind.label());
            continue;
        };
        let payload = if record.has_content() {
            format!(
                "{} file(s), {} bytes, {}",
                record.files.len(),
                record.compiled_content.len(),
                record.fingerprint()
            )
        } else if record.early {
            "announced, waiting for files".to_string()
        } else {
            "starting, no payload yet".to_string()
        };
        println!(
            "  {:<7} host {} at {}: {}",
            kind.label(),
            record.host_id,
            record.last_modified,
            payload
        );
    }

    if let Some(update) = store.get_as::<BundleUpdate>(BUNDLE_UPDATED_KEY) {
        println!(
            "{} {} ({})",
            "bundle updated:".dimmed(),
            update.updated_at,
            update.hash
        );
    }

    if logger::is_verbose() {
        for key in [ModeKind::Local.key(), ModeKind::Editor.key(), BUNDLE_UPDATED_KEY] {
            println!("{} {}", format!("{key}:").dimmed(), store.get_or(key, Value::Null));
        }
    }
    Ok(())
}

/// Clear a dev mode record regardless of its host.
pub fn force_stop(config: &Config, kind: ModeKind) -> Result<()> {
    let store = common::open_store(config)?;
    let cleared = ModeArbiter::new(store)
        .force_stop(kind)
        .with_context(|| format!("failed to clear {kind} dev mode"))?;

    if cleared {
        log!("stop"; "{} dev mode cleared", kind);
    } else {
        log!("stop"; "{} dev mode was not active", kind);
    }
    Ok(())
}

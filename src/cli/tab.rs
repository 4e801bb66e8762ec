//! `tabsync tab`: a headless tab driven from stdin.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::bundle::{BundleCache, HttpBundleSource};
use crate::cli::common;
use crate::compiler;
use crate::config::Config;
use crate::push::PushTransport;
use crate::runtime::{
    self, DriveOptions, LogNotifier, LogRunner, Tab, TabCommand, TabContext, TabOptions,
    WatchSettings,
};
use crate::{debug, log};

pub fn run_tab(config: &Config, hidden: bool, editor_surface: bool) -> Result<()> {
    let runtime = common::runtime()?;
    let result = runtime.block_on(drive_tab(config, hidden, editor_surface));
    // The stdin reader may still be blocked in a read
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn drive_tab(config: &Config, hidden: bool, editor_surface: bool) -> Result<()> {
    let store = common::open_store(config)?;
    let client = common::http_client()?;

    let ctx = TabContext::new(config.origin())
        .with_editor_surface(editor_surface)
        .with_visible(!hidden);
    let mut options = TabOptions::new(config.bundle_url());
    options.notify_delay = config.reload.notify_delay();
    options.push_debounce = config.push.debounce();

    let tab = Tab::open(store, ctx, options, Arc::new(LogNotifier), Arc::new(LogRunner));
    let ctx = tab.context();
    log!("tab"; "{} on {} (show, hide, reload, watch [dir], quit)", ctx.id, ctx.origin);

    let mut cache = BundleCache::new(HttpBundleSource::new(client.clone()));
    match tab.boot(&mut cache).await {
        Ok(path) => debug!("tab"; "started via {}", path.label()),
        Err(e) => log!("tab"; "initial load failed: {:#}", anyhow::Error::from(e)),
    }

    let push = tab.push_enabled().then(|| {
        let (tx, rx) = mpsc::channel(16);
        let transport = PushTransport::new(client, config.push_url())
            .with_reconnect(config.push.reconnect())
            .with_poll_interval(config.push.poll_interval());
        tokio::spawn(transport.run(tx));
        rx
    });
    if push.is_none() {
        debug!("tab"; "push disabled: bundle is not served from {}", ctx.origin);
    }

    let (command_tx, commands) = mpsc::channel(16);
    tokio::spawn(read_commands(command_tx));
    crate::core::stop_gracefully();

    let watch = WatchSettings {
        root: config.watch.dir.clone(),
        extensions: config.watch.extensions.clone(),
        compiler: Arc::from(compiler::from_command(config.watch.compiler.as_deref())),
        interval: config.watch.interval(),
    };
    let options = DriveOptions {
        refresh: config.store.refresh(),
    };
    runtime::drive(tab, cache, push, commands, watch, options).await;
    Ok(())
}

/// Forward stdin commands. At end of input the tab keeps running until Ctrl+C.
async fn read_commands(tx: mpsc::Sender<TabCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match line.parse::<TabCommand>() {
                Ok(command) => {
                    if tx.send(command).await.is_err() {
                        return;
                    }
                }
                Err(e) => log!("tab"; "{}", e),
            },
            Ok(None) => break,
            Err(e) => {
                debug!("tab"; "stdin closed: {}", e);
                break;
            }
        }
    }
    tx.closed().await;
}

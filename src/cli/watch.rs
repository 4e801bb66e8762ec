//! `tabsync watch`: host a local dev session from the command line.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};

use crate::cli::common;
use crate::compiler::{self, Compiler};
use crate::config::Config;
use crate::freshness::now_ms;
use crate::mode::{ModeArbiter, Started};
use crate::record::{ModeKind, TabId};
use crate::watch::{LocalWatcher, PollOutcome};
use crate::{debug, log, logger};

/// Poll the watch directory until Ctrl+C or until another host takes over.
pub fn run_watch(config: &Config) -> Result<()> {
    let store = common::open_store(config)?;
    let arbiter = ModeArbiter::new(store.clone());
    let compiler: Arc<dyn Compiler> =
        Arc::from(compiler::from_command(config.watch.compiler.as_deref()));
    let dir = &config.watch.dir;

    let (mut watcher, started) = LocalWatcher::start(
        dir,
        config.watch.extensions.clone(),
        TabId::generate(),
        arbiter.clone(),
        compiler,
        now_ms(),
    )
    .with_context(|| format!("failed to start watching {}", dir.display()))?;

    match started {
        Started::Replaced { previous } => {
            log!("watch"; "took over local dev mode from {}", previous);
        }
        Started::Fresh | Started::Resumed => {}
    }
    log!("watch"; "{} as {} (Ctrl+C to stop)", dir.display(), watcher.host());

    crate::core::stop_gracefully();
    let interval = config.watch.interval();

    while !crate::core::is_shutdown() {
        if let Err(e) = store.refresh() {
            debug!("watch"; "store refresh failed: {}", e);
        }
        let outcome = if arbiter.is_host(ModeKind::Local, watcher.host()) {
            watcher.poll(now_ms())
        } else {
            Ok(PollOutcome::Superseded)
        };
        match outcome {
            Ok(PollOutcome::Superseded) => {
                logger::status_warning("local dev mode was taken over or stopped elsewhere");
                return Ok(());
            }
            Ok(PollOutcome::Published { last_modified, changed }) => {
                debug!("watch"; "published {} change(s) at {}", changed, last_modified);
            }
            Ok(PollOutcome::CompileFailed(e)) => debug!("watch"; "keeping last payload: {}", e),
            Ok(PollOutcome::Unchanged) => {}
            Err(e) => log!("watch"; "{:#}", anyhow::Error::from(e)),
        }
        thread::sleep(interval);
    }

    if watcher.stop().context("failed to clear local dev mode")? {
        log!("watch"; "local dev mode stopped");
    }
    Ok(())
}

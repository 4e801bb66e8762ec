//! Tab runtime: execution path selection and the per-tab event loop.
//!
//! ```text
//! store change ──► listener ──► ReloadScheduler ──► reload_due
//! push event   ──► DevPushClient (debounce) ──► apply_push ──► broadcast
//! commands     ──► visibility / watch toggle / reload / quit
//!                          │
//!                     drive() select loop
//! ```

mod bootstrap;
mod context;
mod tab;

pub use context::{LogNotifier, LogRunner, Notifier, TabContext};
pub use tab::{Tab, TabOptions};

#[cfg(test)]
use bootstrap::ExecutionPath;
#[cfg(test)]
use context::ScriptSource;
#[cfg(test)]
pub(crate) use context::testing;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::bundle::{BundleCache, BundleSource};
use crate::compiler::Compiler;
use crate::push::PushEvent;
use crate::watch::PollOutcome;
use crate::{debug, log};

/// Interactive input for a running tab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabCommand {
    Show,
    Hide,
    Reload,
    /// Toggle the local watch, optionally on another directory.
    Watch(Option<PathBuf>),
    Quit,
}

impl FromStr for TabCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match word {
            "show" | "visible" => Ok(Self::Show),
            "hide" | "hidden" => Ok(Self::Hide),
            "reload" => Ok(Self::Reload),
            "watch" => Ok(Self::Watch((!rest.is_empty()).then(|| PathBuf::from(rest)))),
            "quit" | "exit" | "close" => Ok(Self::Quit),
            other => Err(format!(
                "unknown command `{other}` (show, hide, reload, watch [dir], quit)"
            )),
        }
    }
}

/// Local watch parameters used by [`TabCommand::Watch`].
pub struct WatchSettings {
    pub root: PathBuf,
    pub extensions: Vec<String>,
    pub compiler: Arc<dyn Compiler>,
    pub interval: Duration,
}

/// Timers for [`drive`].
#[derive(Debug, Clone, Copy)]
pub struct DriveOptions {
    /// How often the store file is re-read for other processes' writes.
    pub refresh: Duration,
}

async fn sleep_until(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}

async fn recv<T>(rx: &mut Option<mpsc::Receiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Run `tab` until it is told to quit or the process shuts down.
pub async fn drive<S: BundleSource>(
    mut tab: Tab,
    mut cache: BundleCache<S>,
    mut push: Option<mpsc::Receiver<PushEvent>>,
    mut commands: mpsc::Receiver<TabCommand>,
    watch: WatchSettings,
    options: DriveOptions,
) {
    let mut refresh = tokio::time::interval(options.refresh);
    let mut watch_tick = tokio::time::interval(watch.interval);

    loop {
        let reload_due = tab.reload_due();
        let push_due = tab.push_deadline();

        tokio::select! {
            _ = refresh.tick() => {
                if crate::core::is_shutdown() {
                    break;
                }
                if let Err(e) = tab.store().refresh() {
                    debug!("tab"; "store refresh failed: {}", e);
                }
            }
            _ = watch_tick.tick(), if tab.is_watching() => {
                match tab.poll_local_watch() {
                    Some(Ok(PollOutcome::Published { last_modified, changed })) => {
                        debug!("tab"; "published {} change(s) at {}", changed, last_modified);
                    }
                    Some(Err(e)) => log!("tab"; "local watch: {:#}", anyhow::Error::from(e)),
                    _ => {}
                }
            }
            event = recv(&mut push) => match event {
                Some(event) => {
                    tab.on_push_event(event, Instant::now());
                }
                None => {
                    debug!("tab"; "push transport ended");
                    push = None;
                }
            },
            _ = sleep_until(push_due) => {
                if let Some(apply) = tab.take_ready_push(Instant::now())
                    && let Err(e) = tab.apply_push(&apply, &mut cache)
                {
                    log!("tab"; "failed to broadcast bundle update: {}", e);
                }
            }
            _ = sleep_until(reload_due) => {
                if tab.take_due_reload(Instant::now()).is_some() {
                    reload(&tab, &mut cache).await;
                }
            }
            command = commands.recv() => match command {
                None | Some(TabCommand::Quit) => break,
                Some(TabCommand::Show) => {
                    tab.set_visible(true);
                }
                Some(TabCommand::Hide) => {
                    tab.set_visible(false);
                }
                Some(TabCommand::Reload) => reload(&tab, &mut cache).await,
                Some(TabCommand::Watch(root)) => {
                    let root = root.unwrap_or_else(|| watch.root.clone());
                    if let Err(e) = tab.toggle_local_watch(
                        &root,
                        watch.extensions.clone(),
                        Arc::clone(&watch.compiler),
                    ) {
                        log!("tab"; "local watch: {:#}", anyhow::Error::from(e));
                    }
                }
            },
        }
    }

    tab.close();
}

async fn reload<S: BundleSource>(tab: &Tab, cache: &mut BundleCache<S>) {
    match tab.reload(cache).await {
        Ok(path) => debug!("tab"; "reloaded via {}", path.label()),
        Err(e) => log!("tab"; "reload failed: {:#}", anyhow::Error::from(e)),
    }
}

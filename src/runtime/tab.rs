//! One tab: store subscriptions, reload scheduling, push handling and the
//! optional local watch session it hosts.
//!
//! Store listeners run synchronously on whichever thread wrote the value,
//! including this tab's own writes. No method holds the state lock while
//! writing to the store.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::bootstrap::ExecutionPath;
use super::context::{Notifier, ScriptRunner, ScriptSource, TabContext};
use crate::bundle::{BundleCache, BundleError, BundleSource};
use crate::compiler::Compiler;
use crate::freshness::{Fingerprint, now_ms};
use crate::mode::ModeArbiter;
use crate::push::{DEBOUNCE, DevPushClient, PushApply, PushDecision, PushEvent};
use crate::record::{BUNDLE_UPDATED_KEY, BundleUpdate, DevModeRecord, ModeKind};
use crate::reload::{NOTIFY_DELAY, ReloadDecision, ReloadScheduler, UpdateSource};
use crate::store::{SharedStore, StoreError, Subscription};
use crate::watch::{LocalWatcher, PollOutcome, WatchError};
use crate::{debug, log};

/// Tunables for one tab.
#[derive(Debug, Clone)]
pub struct TabOptions {
    pub bundle_url: String,
    pub notify_delay: Duration,
    pub push_debounce: Duration,
}

impl TabOptions {
    pub fn new(bundle_url: impl Into<String>) -> Self {
        Self {
            bundle_url: bundle_url.into(),
            notify_delay: NOTIFY_DELAY,
            push_debounce: DEBOUNCE,
        }
    }
}

/// State shared with the store listeners.
struct TabState {
    ctx: TabContext,
    scheduler: ReloadScheduler,
    push: DevPushClient,
    reload_due: Option<Instant>,
}

impl TabState {
    fn act(&mut self, decision: ReloadDecision, what: &str, notifier: &dyn Notifier) {
        match decision {
            ReloadDecision::ReloadAfter(delay) => {
                notifier.notify(&format!(
                    "{what} updated, reloading in {}ms",
                    delay.as_millis()
                ));
                self.reload_due = Some(Instant::now() + delay);
            }
            ReloadDecision::Deferred => debug!("tab"; "{} updated while hidden, deferred", what),
            ReloadDecision::Coalesced => debug!("tab"; "{} update coalesced", what),
            ReloadDecision::Ignored(reason) => {
                debug!("tab"; "{} change ignored: {:?}", what, reason);
                if self.scheduler.scheduled().is_none() {
                    self.reload_due = None;
                }
            }
        }
    }
}

pub struct Tab {
    store: SharedStore,
    arbiter: ModeArbiter,
    state: Arc<Mutex<TabState>>,
    subscriptions: Vec<Subscription>,
    notifier: Arc<dyn Notifier>,
    runner: Arc<dyn ScriptRunner>,
    watcher: Option<LocalWatcher>,
    bundle_url: String,
}

fn decode<T: DeserializeOwned>(value: Option<&Value>) -> Option<T> {
    value.and_then(|v| serde_json::from_value(v.clone()).ok())
}

impl Tab {
    /// Seed from the values present at load, then subscribe to changes.
    pub fn open(
        store: SharedStore,
        ctx: TabContext,
        options: TabOptions,
        notifier: Arc<dyn Notifier>,
        runner: Arc<dyn ScriptRunner>,
    ) -> Self {
        let mut scheduler = ReloadScheduler::new(options.notify_delay);
        scheduler.seed(&store);
        let push = DevPushClient::new(&ctx.origin, &options.bundle_url, options.push_debounce);

        let state = Arc::new(Mutex::new(TabState {
            ctx,
            scheduler,
            push,
            reload_due: None,
        }));

        let mut subscriptions = Vec::with_capacity(3);
        for kind in ModeKind::ALL {
            let state = Arc::clone(&state);
            let notifier = Arc::clone(&notifier);
            subscriptions.push(store.subscribe(kind.key(), move |_, old, new| {
                let old: Option<DevModeRecord> = decode(old);
                let new: Option<DevModeRecord> = decode(new);
                let mut guard = state.lock();
                let st = &mut *guard;
                let decision = st
                    .scheduler
                    .on_record(&st.ctx, kind, old.as_ref(), new.as_ref());
                st.act(decision, &format!("{kind} dev mode"), notifier.as_ref());
            }));
        }
        {
            let state = Arc::clone(&state);
            let notifier = Arc::clone(&notifier);
            subscriptions.push(store.subscribe(BUNDLE_UPDATED_KEY, move |_, _, new| {
                let Some(update) = decode::<BundleUpdate>(new) else {
                    return;
                };
                let mut guard = state.lock();
                let st = &mut *guard;
                let decision = st.scheduler.on_bundle_update(&st.ctx, &update);
                st.act(decision, "bundle", notifier.as_ref());
            }));
        }

        Self {
            arbiter: ModeArbiter::new(store.clone()),
            store,
            state,
            subscriptions,
            notifier,
            runner,
            watcher: None,
            bundle_url: options.bundle_url,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Snapshot of the tab context.
    pub fn context(&self) -> TabContext {
        self.state.lock().ctx.clone()
    }

    pub fn push_enabled(&self) -> bool {
        self.state.lock().push.is_enabled()
    }

    /// Choose the execution path and run its payload if it is a dev path.
    ///
    /// Network paths are returned untouched; see [`load_network`](Self::load_network).
    pub fn start_page(&self) -> ExecutionPath {
        let ctx = self.context();
        let path = ExecutionPath::choose(&self.arbiter, &ctx);
        match &path {
            ExecutionPath::AwaitingDev(kind) => {
                self.notifier
                    .notify(&format!("{} dev mode is starting, waiting for files", kind.label()));
            }
            _ => {
                if let Some((source, record)) = path.dev_payload() {
                    self.execute(source, &record.compiled_content);
                }
            }
        }
        path
    }

    /// Fetch the bundle through `cache` and run it unless this tab already
    /// runs the same bytes. Returns whether the script ran.
    pub async fn load_network<S: BundleSource>(
        &self,
        cache: &mut BundleCache<S>,
    ) -> Result<bool, BundleError> {
        if cache.is_invalidated() {
            debug!("tab"; "bundle changed upstream, skipping revalidation");
        }
        let fetched = cache.fetch(&self.bundle_url, now_ms()).await?;
        if self.context().is_running(Fingerprint::of(&fetched.content)) {
            debug!("tab"; "bundle {} already running", fetched.hash);
            return Ok(false);
        }
        self.execute(ScriptSource::Network, &fetched.content);
        Ok(true)
    }

    /// Full page load: pick a path and run exactly one payload.
    pub async fn boot<S: BundleSource>(
        &self,
        cache: &mut BundleCache<S>,
    ) -> Result<ExecutionPath, BundleError> {
        let path = self.start_page();
        if path == ExecutionPath::Network {
            self.load_network(cache).await?;
        }
        Ok(path)
    }

    /// Reload the page: outstanding reloads are settled, then boot again.
    pub async fn reload<S: BundleSource>(
        &self,
        cache: &mut BundleCache<S>,
    ) -> Result<ExecutionPath, BundleError> {
        {
            let mut st = self.state.lock();
            st.scheduler.reloaded();
            st.reload_due = None;
        }
        self.boot(cache).await
    }

    fn execute(&self, source: ScriptSource, content: &str) {
        self.state.lock().ctx.executed = Some(Fingerprint::of(content));
        self.runner.run(source, content);
    }

    pub fn set_visible(&self, visible: bool) -> Option<ReloadDecision> {
        let mut guard = self.state.lock();
        let st = &mut *guard;
        st.ctx.visible = visible;
        if !visible {
            return None;
        }
        let arbiter = &self.arbiter;
        let decision = st.scheduler.on_visible(&st.ctx, |kind| arbiter.record(kind));
        st.act(decision, "pending", self.notifier.as_ref());
        Some(decision)
    }

    /// When the announced reload should happen.
    pub fn reload_due(&self) -> Option<Instant> {
        self.state.lock().reload_due
    }

    /// Release the announced reload once `now` has reached it.
    ///
    /// `None` when nothing is due or the update was withdrawn meanwhile.
    pub fn take_due_reload(&self, now: Instant) -> Option<UpdateSource> {
        let mut st = self.state.lock();
        if !st.reload_due.is_some_and(|at| at <= now) {
            return None;
        }
        st.reload_due = None;
        let arbiter = &self.arbiter;
        let source = st.scheduler.take_scheduled(|kind| arbiter.record(kind));
        if source.is_none() {
            debug!("tab"; "scheduled reload withdrawn");
        }
        source
    }

    pub fn on_push_event(&self, event: PushEvent, now: Instant) -> Option<PushDecision> {
        let mut st = self.state.lock();
        match event {
            PushEvent::Baseline(raw) => {
                st.push.baseline(&raw);
                None
            }
            PushEvent::Payload(raw) => Some(st.push.offer(&raw, now)),
        }
    }

    pub fn push_deadline(&self) -> Option<Instant> {
        self.state.lock().push.deadline()
    }

    pub fn take_ready_push(&self, now: Instant) -> Option<PushApply> {
        self.state.lock().push.take_ready(now)
    }

    /// Apply a debounced notification: invalidate the bundle, tell the other
    /// tabs, and schedule this tab's own reload.
    pub fn apply_push<S: BundleSource>(
        &self,
        apply: &PushApply,
        cache: &mut BundleCache<S>,
    ) -> Result<ReloadDecision, StoreError> {
        cache.invalidate();
        let update = BundleUpdate::now(apply.hash.clone());
        let decision = {
            let mut guard = self.state.lock();
            let st = &mut *guard;
            let decision = st.scheduler.on_push(&st.ctx, &update.hash, update.updated_at);
            st.act(decision, "bundle", self.notifier.as_ref());
            decision
        };
        // Our own listener sees this as an echo
        self.store.set_json(BUNDLE_UPDATED_KEY, &update)?;
        Ok(decision)
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(LocalWatcher::is_active)
    }

    /// Start hosting a local watch on `root`, or stop the running one.
    ///
    /// Returns whether a watch is active afterwards.
    pub fn toggle_local_watch(
        &mut self,
        root: &Path,
        extensions: Vec<String>,
        compiler: Arc<dyn Compiler>,
    ) -> Result<bool, WatchError> {
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop()?;
            self.notifier.notify("local watch stopped");
            return Ok(false);
        }

        let host = self.context().id;
        let started = LocalWatcher::start(
            root,
            extensions,
            host,
            self.arbiter.clone(),
            compiler,
            now_ms(),
        );
        match started {
            Ok((watcher, started)) => {
                log!("tab"; "local watch on {} ({:?})", root.display(), started);
                self.watcher = Some(watcher);
                Ok(true)
            }
            Err(WatchError::Rejected(rejection)) => {
                self.notifier.notify(&rejection.to_string());
                Err(WatchError::Rejected(rejection))
            }
            Err(e) => Err(e),
        }
    }

    /// One poll of the hosted watch, if any.
    pub fn poll_local_watch(&mut self) -> Option<Result<PollOutcome, WatchError>> {
        let watcher = self.watcher.as_mut()?;
        // Takeovers are only noticed on publish otherwise
        let outcome = if self.arbiter.is_host(ModeKind::Local, watcher.host()) {
            watcher.poll(now_ms())
        } else {
            Ok(PollOutcome::Superseded)
        };
        if matches!(outcome, Ok(PollOutcome::Superseded)) {
            debug!("tab"; "no longer hosting local dev mode, watch stopped");
            self.watcher = None;
        }
        Some(outcome)
    }

    /// Detach from the store and end any hosted session.
    pub fn close(mut self) {
        for subscription in self.subscriptions.drain(..) {
            self.store.unsubscribe(subscription);
        }
        if let Some(mut watcher) = self.watcher.take()
            && let Err(e) = watcher.stop()
        {
            debug!("tab"; "failed to stop local watch: {}", e);
        }
    }
}

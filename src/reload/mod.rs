//! Per-tab reload scheduling.
//!
//! ```text
//! idle ──update──► update-received ──visible──► reload-now (after notify delay) ──► idle
//!                        │
//!                        └──hidden──► wait-for-visible ──visible + still valid──► reload-now
//!                                        (updates coalesce)  └──invalid──► idle (discard)
//! ```
//!
//! The scheduler is a pure state machine: it never sleeps, reloads or
//! notifies. Callers act on the returned [`ReloadDecision`].

mod pending;

pub use pending::{PendingReload, UpdateSource};

use std::collections::BTreeMap;
use std::time::Duration;

use crate::debug;
use crate::record::{BundleUpdate, DevModeRecord, ModeKind};
use crate::runtime::TabContext;
use crate::store::SharedStore;

/// Default delay between the user notification and the reload.
pub const NOTIFY_DELAY: Duration = Duration::from_millis(1000);

/// Why an observed change does not lead to a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// First value after page load or a fresh session start.
    InitialValue,
    /// Record without compiled content.
    Placeholder,
    /// Not newer than the last record seen for the same mode.
    Stale,
    /// Same payload as what this tab runs, or an echo of its own broadcast.
    Duplicate,
    /// Editor records on the editor surface.
    PublisherOnly,
    /// Mode stopped, or no longer points at the same host.
    Cleared,
    NothingPending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadDecision {
    /// Notify now, reload after the delay.
    ReloadAfter(Duration),
    /// Hidden tab: wait for visibility.
    Deferred,
    /// Folded into an already pending or scheduled reload.
    Coalesced,
    Ignored(IgnoreReason),
}

#[cfg(test)]
impl ReloadDecision {
    pub fn is_reload(&self) -> bool {
        matches!(self, Self::ReloadAfter(_))
    }
}

#[derive(Debug)]
pub struct ReloadScheduler {
    notify_delay: Duration,
    /// Last processed lastModified per mode, whichever host wrote it.
    last_seen: BTreeMap<ModeKind, u64>,
    last_bundle: Option<String>,
    pending: Option<PendingReload>,
    /// Reload announced to a visible tab and not yet performed.
    scheduled: Option<UpdateSource>,
}

impl Default for ReloadScheduler {
    fn default() -> Self {
        Self::new(NOTIFY_DELAY)
    }
}

impl ReloadScheduler {
    pub fn new(notify_delay: Duration) -> Self {
        Self {
            notify_delay,
            last_seen: BTreeMap::new(),
            last_bundle: None,
            pending: None,
            scheduled: None,
        }
    }

    /// Record the values present at page load. They are never updates.
    pub fn seed(&mut self, store: &SharedStore) {
        for kind in ModeKind::ALL {
            if let Some(record) = store.get_as::<DevModeRecord>(kind.key()) {
                self.last_seen.insert(kind, record.last_modified);
            }
        }
        if let Some(update) = store.get_as::<BundleUpdate>(crate::record::BUNDLE_UPDATED_KEY) {
            self.last_bundle = Some(update.hash);
        }
    }

    #[cfg(test)]
    pub fn pending(&self) -> Option<&PendingReload> {
        self.pending.as_ref()
    }

    pub fn scheduled(&self) -> Option<&UpdateSource> {
        self.scheduled.as_ref()
    }

    /// React to a change of the `kind` record.
    pub fn on_record(
        &mut self,
        ctx: &TabContext,
        kind: ModeKind,
        old: Option<&DevModeRecord>,
        new: Option<&DevModeRecord>,
    ) -> ReloadDecision {
        let Some(new) = new else {
            self.discard_mode(kind);
            return ReloadDecision::Ignored(IgnoreReason::Cleared);
        };

        if ctx.editor_surface && kind == ModeKind::Editor {
            return ReloadDecision::Ignored(IgnoreReason::PublisherOnly);
        }

        if let Some(&seen) = self.last_seen.get(&kind)
            && new.last_modified <= seen
        {
            debug!("reload"; "stale {} record from {}: {} <= {}", kind, new.host_id, new.last_modified, seen);
            return ReloadDecision::Ignored(IgnoreReason::Stale);
        }
        self.last_seen.insert(kind, new.last_modified);

        if old.is_none() {
            return ReloadDecision::Ignored(IgnoreReason::InitialValue);
        }
        if !new.has_content() {
            return ReloadDecision::Ignored(IgnoreReason::Placeholder);
        }
        if ctx.is_running(new.fingerprint()) {
            return ReloadDecision::Ignored(IgnoreReason::Duplicate);
        }

        let source = UpdateSource::Mode {
            kind,
            host: new.host_id.clone(),
        };
        self.schedule(ctx, source, new.last_modified)
    }

    /// React to a bundle-update broadcast from another tab.
    pub fn on_bundle_update(&mut self, ctx: &TabContext, update: &BundleUpdate) -> ReloadDecision {
        if self.last_bundle.as_deref() == Some(update.hash.as_str()) {
            return ReloadDecision::Ignored(IgnoreReason::Duplicate);
        }
        self.last_bundle = Some(update.hash.clone());
        self.schedule(ctx, UpdateSource::Bundle, update.updated_at)
    }

    /// Remember a bundle hash this tab is about to broadcast itself, so the
    /// echo through the store is recognised.
    pub fn note_bundle(&mut self, hash: &str) {
        self.last_bundle = Some(hash.to_string());
    }

    /// Schedule a reload for a push this tab received directly.
    pub fn on_push(&mut self, ctx: &TabContext, hash: &str, at: u64) -> ReloadDecision {
        self.note_bundle(hash);
        self.schedule(ctx, UpdateSource::Bundle, at)
    }

    /// The tab became visible. Re-validate and release the pending reload.
    ///
    /// `lookup` returns the current record for a mode.
    pub fn on_visible<F>(&mut self, ctx: &TabContext, lookup: F) -> ReloadDecision
    where
        F: Fn(ModeKind) -> Option<DevModeRecord>,
    {
        let Some(pending) = self.pending.take() else {
            return ReloadDecision::Ignored(IgnoreReason::NothingPending);
        };
        if !is_still_valid(&pending.source, lookup) {
            debug!("reload"; "discarding pending reload: {} is gone", pending.source);
            return ReloadDecision::Ignored(IgnoreReason::Cleared);
        }
        self.schedule(ctx, pending.source, pending.last_modified)
    }

    /// Take the scheduled reload when its timer fires.
    ///
    /// Re-validates like [`on_visible`](Self::on_visible); `None` means the
    /// reload was cancelled in the meantime.
    pub fn take_scheduled<F>(&mut self, lookup: F) -> Option<UpdateSource>
    where
        F: Fn(ModeKind) -> Option<DevModeRecord>,
    {
        let source = self.scheduled.take()?;
        is_still_valid(&source, lookup).then_some(source)
    }

    /// The tab reloaded; nothing is outstanding any more.
    pub fn reloaded(&mut self) {
        self.pending = None;
        self.scheduled = None;
    }

    fn schedule(&mut self, ctx: &TabContext, source: UpdateSource, at: u64) -> ReloadDecision {
        if ctx.visible {
            if self.scheduled.is_some() {
                self.scheduled = Some(source);
                return ReloadDecision::Coalesced;
            }
            self.scheduled = Some(source);
            return ReloadDecision::ReloadAfter(self.notify_delay);
        }

        match &mut self.pending {
            Some(pending) => {
                pending.coalesce(source, at);
                ReloadDecision::Coalesced
            }
            None => {
                self.pending = Some(PendingReload::new(source, at));
                ReloadDecision::Deferred
            }
        }
    }

    fn discard_mode(&mut self, kind: ModeKind) {
        if self.pending.as_ref().and_then(|p| p.source.kind()) == Some(kind) {
            debug!("reload"; "{} stopped, dropping pending reload", kind);
            self.pending = None;
        }
        if self.scheduled.as_ref().and_then(UpdateSource::kind) == Some(kind) {
            self.scheduled = None;
        }
    }
}

fn is_still_valid<F>(source: &UpdateSource, lookup: F) -> bool
where
    F: Fn(ModeKind) -> Option<DevModeRecord>,
{
    match source {
        UpdateSource::Mode { kind, host } => lookup(*kind).is_some_and(|r| &r.host_id == host),
        UpdateSource::Bundle => true,
    }
}

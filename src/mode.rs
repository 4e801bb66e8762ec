//! Mode arbitration between the two dev workflows.
//!
//! At most one of `dev_mode.local` / `dev_mode.editor` is non-null at a time.
//! Starting is a read-then-write over the shared store with no atomic guard,
//! so two tabs starting the same mode in the same turn both "win": the later
//! write becomes authoritative and the earlier host notices on its next
//! [`ModeArbiter::publish`] (`HostMismatch`) and stops silently.

use serde_json::Value;
use thiserror::Error;

use crate::record::{DevModeRecord, ModeKind, TabId};
use crate::store::{SharedStore, StoreError};

/// Why a start request was refused.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("cannot start {requested} dev mode: {active} dev mode is active (host {host})")]
    Conflict {
        requested: ModeKind,
        active: ModeKind,
        host: TabId,
    },

    #[error("{kind} dev mode did not start")]
    Store {
        kind: ModeKind,
        #[source]
        source: StoreError,
    },
}

/// How a successful start related to the previous record of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Started {
    /// No session of this kind existed.
    Fresh,
    /// A session owned by another (presumably stale) host was replaced.
    Replaced { previous: TabId },
    /// This host already owned the session.
    Resumed,
}

/// Result of a host writing a new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publish {
    Written,
    /// The record now belongs to someone else (or was cleared). The caller
    /// is no longer host and must stop.
    HostMismatch { current: Option<TabId> },
}

/// Cooperative mutual exclusion over the shared store.
#[derive(Debug, Clone)]
pub struct ModeArbiter {
    store: SharedStore,
}

impl ModeArbiter {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Current record for `kind`, if a session is active.
    pub fn record(&self, kind: ModeKind) -> Option<DevModeRecord> {
        self.store.get_as(kind.key())
    }

    /// The active mode. Local wins if both keys are set after a race.
    pub fn active_mode(&self) -> Option<ModeKind> {
        ModeKind::ALL
            .into_iter()
            .find(|kind| self.record(*kind).is_some())
    }

    /// Check if `host` currently owns the `kind` session.
    pub fn is_host(&self, kind: ModeKind, host: &TabId) -> bool {
        self.record(kind).is_some_and(|r| &r.host_id == host)
    }

    /// Request exclusivity for `kind` and write a placeholder record.
    pub fn try_start(
        &self,
        kind: ModeKind,
        host: &TabId,
        now: u64,
    ) -> Result<Started, Rejection> {
        self.start(kind, host, now, false)
    }

    /// Like [`try_start`](Self::try_start) but marks the placeholder as an
    /// early announcement (editor about to start, files not ready yet).
    pub fn announce_early(
        &self,
        kind: ModeKind,
        host: &TabId,
        now: u64,
    ) -> Result<Started, Rejection> {
        self.start(kind, host, now, true)
    }

    fn start(
        &self,
        kind: ModeKind,
        host: &TabId,
        now: u64,
        early: bool,
    ) -> Result<Started, Rejection> {
        let other = kind.other();
        if let Some(active) = self.record(other) {
            return Err(Rejection::Conflict {
                requested: kind,
                active: other,
                host: active.host_id,
            });
        }

        let (started, last_modified) = match self.record(kind) {
            None => (Started::Fresh, now),
            Some(prev) if &prev.host_id == host => {
                (Started::Resumed, now.max(prev.last_modified))
            }
            Some(prev) => (
                Started::Replaced {
                    previous: prev.host_id,
                },
                now,
            ),
        };

        let record = DevModeRecord::placeholder(kind, host.clone(), last_modified).with_early(early);
        self.store
            .set_json(kind.key(), &record)
            .map_err(|source| Rejection::Store { kind, source })?;

        match &started {
            Started::Replaced { previous } => {
                crate::debug!("mode"; "{} session taken over from {}", kind, previous);
            }
            _ => crate::debug!("mode"; "{} session started by {}", kind, host),
        }
        Ok(started)
    }

    /// Write a new record for the session `record.host_id` owns.
    ///
    /// Refuses (without writing) when the stored record names another host
    /// or has been cleared.
    pub fn publish(&self, record: &DevModeRecord) -> Result<Publish, StoreError> {
        let current = self.record(record.kind).map(|r| r.host_id);
        if current.as_ref() != Some(&record.host_id) {
            return Ok(Publish::HostMismatch { current });
        }
        self.store.set_json(record.kind.key(), record)?;
        Ok(Publish::Written)
    }

    /// Clear the `kind` record, but only if `host` still owns it.
    pub fn stop(&self, kind: ModeKind, host: &TabId) -> Result<bool, StoreError> {
        if !self.is_host(kind, host) {
            return Ok(false);
        }
        self.store.set(kind.key(), Value::Null)?;
        crate::debug!("mode"; "{} session stopped by {}", kind, host);
        Ok(true)
    }

    /// Clear the `kind` record regardless of host.
    pub fn force_stop(&self, kind: ModeKind) -> Result<bool, StoreError> {
        if self.store.get(kind.key()).is_none() {
            return Ok(false);
        }
        self.store.delete(kind.key())?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FileMap;

    fn arbiter() -> ModeArbiter {
        ModeArbiter::new(SharedStore::in_memory())
    }

    #[test]
    fn test_mutual_exclusion() {
        let arbiter = arbiter();
        let (h1, h2) = (TabId::new("h1"), TabId::new("h2"));

        assert_eq!(arbiter.try_start(ModeKind::Local, &h2, 1).unwrap(), Started::Fresh);
        assert_eq!(arbiter.active_mode(), Some(ModeKind::Local));

        let err = arbiter.try_start(ModeKind::Editor, &h1, 2).unwrap_err();
        assert!(matches!(
            err,
            Rejection::Conflict { requested: ModeKind::Editor, active: ModeKind::Local, ref host } if host == &h2
        ));
        // Rejection leaves no trace
        assert!(arbiter.record(ModeKind::Editor).is_none());

        assert!(arbiter.stop(ModeKind::Local, &h2).unwrap());
        assert_eq!(arbiter.active_mode(), None);
        assert_eq!(arbiter.try_start(ModeKind::Editor, &h1, 3).unwrap(), Started::Fresh);
    }

    #[test]
    fn test_start_writes_placeholder() {
        let arbiter = arbiter();
        let host = TabId::new("h");
        arbiter.try_start(ModeKind::Local, &host, 10).unwrap();

        let record = arbiter.record(ModeKind::Local).unwrap();
        assert_eq!(record.host_id, host);
        assert_eq!(record.last_modified, 10);
        assert!(!record.has_content());
        assert!(!record.early);
    }

    #[test]
    fn test_same_kind_replaces_other_host() {
        let arbiter = arbiter();
        let (old, new) = (TabId::new("old"), TabId::new("new"));
        arbiter.try_start(ModeKind::Local, &old, 1).unwrap();

        let started = arbiter.try_start(ModeKind::Local, &new, 2).unwrap();
        assert_eq!(started, Started::Replaced { previous: old.clone() });
        assert!(arbiter.is_host(ModeKind::Local, &new));
        assert!(!arbiter.is_host(ModeKind::Local, &old));
    }

    #[test]
    fn test_resume_keeps_timestamp_monotonic() {
        let arbiter = arbiter();
        let host = TabId::new("h");
        arbiter.announce_early(ModeKind::Editor, &host, 50).unwrap();
        assert!(arbiter.record(ModeKind::Editor).unwrap().early);

        assert_eq!(
            arbiter.try_start(ModeKind::Editor, &host, 40).unwrap(),
            Started::Resumed
        );
        let record = arbiter.record(ModeKind::Editor).unwrap();
        assert_eq!(record.last_modified, 50);
        assert!(!record.early);
    }

    #[test]
    fn test_stale_host_cannot_stop_or_publish() {
        let arbiter = arbiter();
        let (stale, current) = (TabId::new("stale"), TabId::new("current"));
        arbiter.try_start(ModeKind::Local, &stale, 1).unwrap();
        arbiter.try_start(ModeKind::Local, &current, 2).unwrap();

        assert!(!arbiter.stop(ModeKind::Local, &stale).unwrap());
        assert!(arbiter.is_host(ModeKind::Local, &current));

        let late = DevModeRecord::compiled(ModeKind::Local, stale, 3, FileMap::new(), "C".into());
        assert_eq!(
            arbiter.publish(&late).unwrap(),
            Publish::HostMismatch {
                current: Some(current.clone())
            }
        );
        assert!(!arbiter.record(ModeKind::Local).unwrap().has_content());
    }

    #[test]
    fn test_publish_after_stop_is_mismatch() {
        let arbiter = arbiter();
        let host = TabId::new("h");
        arbiter.try_start(ModeKind::Local, &host, 1).unwrap();
        arbiter.force_stop(ModeKind::Local).unwrap();

        let record = DevModeRecord::compiled(ModeKind::Local, host, 2, FileMap::new(), "C".into());
        assert_eq!(
            arbiter.publish(&record).unwrap(),
            Publish::HostMismatch { current: None }
        );
        assert_eq!(arbiter.active_mode(), None);
    }

    #[test]
    fn test_force_stop_reports_presence() {
        let arbiter = arbiter();
        assert!(!arbiter.force_stop(ModeKind::Editor).unwrap());
        arbiter.try_start(ModeKind::Editor, &TabId::new("h"), 1).unwrap();
        assert!(arbiter.force_stop(ModeKind::Editor).unwrap());
    }

    #[test]
    fn test_failed_write_means_not_started() {
        let dir = tempfile::tempdir().unwrap();
        let store = SharedStore::open(dir.path().join("blocked/state.json")).unwrap();
        // A file where the store directory should go makes every write fail
        std::fs::write(dir.path().join("blocked"), "").unwrap();

        let arbiter = ModeArbiter::new(store);
        let err = arbiter
            .try_start(ModeKind::Local, &TabId::new("h"), 1)
            .unwrap_err();
        assert!(matches!(err, Rejection::Store { kind: ModeKind::Local, .. }));
        assert_eq!(arbiter.active_mode(), None);
    }
}

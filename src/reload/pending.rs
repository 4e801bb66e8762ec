use std::fmt;

use crate::record::{ModeKind, TabId};

/// What an update came from, kept so it can be re-validated later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateSource {
    Mode { kind: ModeKind, host: TabId },
    Bundle,
}

impl UpdateSource {
    pub fn kind(&self) -> Option<ModeKind> {
        match self {
            Self::Mode { kind, .. } => Some(*kind),
            Self::Bundle => None,
        }
    }
}

impl fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mode { kind, host } => write!(f, "{kind} dev mode ({host})"),
            Self::Bundle => f.write_str("bundle rebuild"),
        }
    }
}

/// A reload held back while the tab is hidden.
///
/// Several updates coalesce into one, carrying only the newest timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReload {
    pub source: UpdateSource,
    pub last_modified: u64,
    pub visible_only: bool,
}

impl PendingReload {
    pub fn new(source: UpdateSource, last_modified: u64) -> Self {
        Self {
            source,
            last_modified,
            visible_only: true,
        }
    }

    /// Fold a later update into this one. The latest arrival decides what
    /// gets re-validated.
    pub fn coalesce(&mut self, source: UpdateSource, last_modified: u64) {
        self.source = source;
        self.last_modified = self.last_modified.max(last_modified);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(host: &str) -> UpdateSource {
        UpdateSource::Mode {
            kind: ModeKind::Local,
            host: TabId::new(host),
        }
    }

    #[test]
    fn test_coalesce_keeps_newest() {
        let mut pending = PendingReload::new(local("h"), 10);
        pending.coalesce(local("h"), 30);
        pending.coalesce(local("h"), 20);
        assert_eq!(pending.last_modified, 30);
        assert!(pending.visible_only);
    }

    #[test]
    fn test_coalesce_switches_source() {
        let mut pending = PendingReload::new(local("h"), 10);
        pending.coalesce(UpdateSource::Bundle, 5);
        assert_eq!(pending.source, UpdateSource::Bundle);
        assert_eq!(pending.last_modified, 10);
    }
}

//! Shared records exchanged through the store.
//!
//! ```text
//! dev_mode.local     -> DevModeRecord { kind: local,  hostId, lastModified, files, compiledContent }
//! dev_mode.editor    -> DevModeRecord { kind: editor, ... , early? }
//! bundle.updated_at  -> BundleUpdate  { updatedAt, hash }
//! ```
//!
//! Only one of the two dev-mode keys may be non-null at a time. That is kept
//! cooperatively by `ModeArbiter`, never atomically.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::freshness::{Fingerprint, now_ms};

/// Source files of a dev session, keyed by path relative to the session root.
pub type FileMap = BTreeMap<String, String>;

/// Store key for bundle-update broadcasts.
pub const BUNDLE_UPDATED_KEY: &str = "bundle.updated_at";

// =============================================================================
// ModeKind
// =============================================================================

/// The two mutually exclusive development workflows.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ModeKind {
    /// Watching a local directory of source files.
    Local,
    /// Live output pushed from the in-page editor.
    Editor,
}

impl ModeKind {
    /// Both kinds, in execution-priority order.
    pub const ALL: [Self; 2] = [Self::Local, Self::Editor];

    /// Store key holding this mode's record.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Local => "dev_mode.local",
            Self::Editor => "dev_mode.editor",
        }
    }

    /// The conflicting kind.
    pub const fn other(self) -> Self {
        match self {
            Self::Local => Self::Editor,
            Self::Editor => Self::Local,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Editor => "editor",
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// TabId
// =============================================================================

/// Per-tab identity, generated once and stable for the tab's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

static TAB_COUNTER: AtomicU64 = AtomicU64::new(0);

impl TabId {
    /// Generate a fresh identity for this process.
    ///
    /// Mixes pid, wall-clock nanos and a process-local counter so two tabs in
    /// the same process (or two processes started together) never collide.
    pub fn generate() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let seq = TAB_COUNTER.fetch_add(1, Ordering::Relaxed);
        let seed = format!("{}:{nanos}:{seq}", std::process::id());
        let fp = Fingerprint::of(&seed);
        Self(format!("tab-{}-{seq}", fp))
    }

    #[cfg(test)]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[cfg(test)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// DevModeRecord
// =============================================================================

/// The single piece of shared state per development mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevModeRecord {
    pub kind: ModeKind,
    pub host_id: TabId,
    /// Monotonically non-decreasing for a given host.
    pub last_modified: u64,
    #[serde(default)]
    pub files: FileMap,
    #[serde(default)]
    pub compiled_content: String,
    /// Written by `early-init` before the editor has files ready.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub early: bool,
}

impl DevModeRecord {
    /// Session-start record: no files, no compiled content.
    pub fn placeholder(kind: ModeKind, host_id: TabId, last_modified: u64) -> Self {
        Self {
            kind,
            host_id,
            last_modified,
            files: FileMap::new(),
            compiled_content: String::new(),
            early: false,
        }
    }

    /// Record carrying a compiled payload.
    pub fn compiled(
        kind: ModeKind,
        host_id: TabId,
        last_modified: u64,
        files: FileMap,
        compiled_content: String,
    ) -> Self {
        Self {
            kind,
            host_id,
            last_modified,
            files,
            compiled_content,
            early: false,
        }
    }

    pub fn with_early(mut self, early: bool) -> Self {
        self.early = early;
        self
    }

    /// Check if the record carries a runnable payload.
    pub fn has_content(&self) -> bool {
        !self.compiled_content.is_empty()
    }

    /// Fingerprint of the compiled payload.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.compiled_content)
    }
}

// =============================================================================
// BundleUpdate
// =============================================================================

/// Broadcast after a push notification so tabs on other origins react too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleUpdate {
    pub updated_at: u64,
    /// Fingerprint hex of the push payload that caused the update.
    pub hash: String,
}

impl BundleUpdate {
    pub fn new(updated_at: u64, hash: impl Into<String>) -> Self {
        Self {
            updated_at,
            hash: hash.into(),
        }
    }

    pub fn now(hash: impl Into<String>) -> Self {
        Self::new(now_ms(), hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_kind_keys() {
        assert_eq!(ModeKind::Local.key(), "dev_mode.local");
        assert_eq!(ModeKind::Editor.other(), ModeKind::Local);
        assert_ne!(ModeKind::Editor.key(), BUNDLE_UPDATED_KEY);
    }

    #[test]
    fn test_tab_ids_are_unique() {
        let a = TabId::generate();
        let b = TabId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("tab-"));
    }

    #[test]
    fn test_record_wire_format() {
        let mut files = FileMap::new();
        files.insert("a.ts".into(), "1".into());
        let record = DevModeRecord::compiled(
            ModeKind::Local,
            TabId::new("h1"),
            10,
            files,
            "C1".into(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "local");
        assert_eq!(json["hostId"], "h1");
        assert_eq!(json["lastModified"], 10);
        assert_eq!(json["compiledContent"], "C1");
        assert!(json.get("early").is_none());

        let back: DevModeRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_placeholder_has_no_content() {
        let record = DevModeRecord::placeholder(ModeKind::Editor, TabId::new("h"), 1)
            .with_early(true);
        assert!(!record.has_content());
        assert!(record.files.is_empty());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["early"], true);
    }
}

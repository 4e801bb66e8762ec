//! Editor live-reload bridge.
//!
//! Runs only on the editor surface. Republishes the editor's messages
//! through the shared store so every tab can react; the editor's own tab
//! never executes the payload.
//!
//! | Message         | Effect                                                   |
//! |-----------------|----------------------------------------------------------|
//! | `early-init`    | placeholder record with `early: true`                    |
//! | `started`       | exclusivity request; conflict is reported, not written   |
//! | `stopped`       | clear, only if the sender is the recorded host           |
//! | `files-updated` | host + monotonic + fingerprint checks, then publish      |
//! | `no-files`      | user notification only                                   |

mod message;

pub use message::{EditorMessage, Envelope};

use std::sync::Arc;

use thiserror::Error;

use crate::freshness::Fingerprint;
use crate::mode::{ModeArbiter, Publish, Rejection, Started};
use crate::record::{DevModeRecord, FileMap, ModeKind, TabId};
use crate::runtime::{Notifier, TabContext};
use crate::store::StoreError;
use crate::debug;

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("editor bridge is only available on the editor surface")]
    NotEditorSurface,

    #[error("invalid editor message")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a message had no effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropped {
    CrossOrigin,
    /// Sender is not the recorded host (or no session exists).
    NotHost,
    /// `lastModified` not newer than the stored record.
    Stale,
    /// Same payload as the stored record.
    Duplicate,
    EmptyPayload,
}

#[derive(Debug)]
pub enum BridgeOutcome {
    Announced(Started),
    Started(Started),
    Rejected(Rejection),
    Stopped(bool),
    Published { last_modified: u64 },
    NoFiles,
    Dropped(Dropped),
}

pub struct EditorBridge {
    arbiter: ModeArbiter,
    origin: String,
    notifier: Arc<dyn Notifier>,
}

impl EditorBridge {
    /// Attach to the editor surface described by `ctx`.
    pub fn attach(
        ctx: &TabContext,
        arbiter: ModeArbiter,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, EditorError> {
        if !ctx.editor_surface {
            return Err(EditorError::NotEditorSurface);
        }
        Ok(Self {
            arbiter,
            origin: ctx.origin.clone(),
            notifier,
        })
    }

    /// Decode and handle one JSON line (an [`Envelope`]).
    pub fn handle_line(&self, line: &str, now: u64) -> Result<BridgeOutcome, EditorError> {
        let envelope: Envelope = serde_json::from_str(line)?;
        let origin = envelope.origin.as_deref().unwrap_or(&self.origin);
        self.handle(origin, envelope.message, now)
    }

    /// Handle one message posted from `origin`.
    pub fn handle(
        &self,
        origin: &str,
        message: EditorMessage,
        now: u64,
    ) -> Result<BridgeOutcome, EditorError> {
        if origin != self.origin {
            debug!("editor"; "dropping {} from foreign origin {}", message.tag(), origin);
            return Ok(BridgeOutcome::Dropped(Dropped::CrossOrigin));
        }
        debug!("editor"; "{} from {}", message.tag(), message.host());

        match message {
            EditorMessage::EarlyInit {
                host,
                last_modified,
            } => Ok(self.on_early_init(&host, last_modified.unwrap_or(now))),
            EditorMessage::Started {
                host,
                last_modified,
            } => Ok(self.on_started(&host, last_modified.unwrap_or(now))),
            EditorMessage::Stopped { host } => self.on_stopped(&host),
            EditorMessage::FilesUpdated {
                host,
                last_modified,
                files,
                compiled_content,
            } => self.on_files_updated(host, last_modified, files, compiled_content),
            EditorMessage::NoFiles { host } => Ok(self.on_no_files(&host)),
        }
    }

    fn on_early_init(&self, host: &TabId, at: u64) -> BridgeOutcome {
        match self.arbiter.announce_early(ModeKind::Editor, host, at) {
            Ok(started) => BridgeOutcome::Announced(started),
            Err(rejection) => self.reject(rejection),
        }
    }

    fn on_started(&self, host: &TabId, at: u64) -> BridgeOutcome {
        match self.arbiter.try_start(ModeKind::Editor, host, at) {
            Ok(started) => {
                crate::log!("editor"; "live reload started ({})", host);
                BridgeOutcome::Started(started)
            }
            Err(rejection) => self.reject(rejection),
        }
    }

    fn reject(&self, rejection: Rejection) -> BridgeOutcome {
        self.notifier.notify(&rejection.to_string());
        BridgeOutcome::Rejected(rejection)
    }

    fn on_stopped(&self, host: &TabId) -> Result<BridgeOutcome, EditorError> {
        let cleared = self.arbiter.stop(ModeKind::Editor, host)?;
        if cleared {
            crate::log!("editor"; "live reload stopped ({})", host);
        } else {
            debug!("editor"; "ignoring stop from non-host {}", host);
        }
        Ok(BridgeOutcome::Stopped(cleared))
    }

    fn on_files_updated(
        &self,
        host: TabId,
        last_modified: u64,
        files: FileMap,
        compiled_content: String,
    ) -> Result<BridgeOutcome, EditorError> {
        let Some(current) = self.arbiter.record(ModeKind::Editor) else {
            return Ok(BridgeOutcome::Dropped(Dropped::NotHost));
        };
        if current.host_id != host {
            return Ok(BridgeOutcome::Dropped(Dropped::NotHost));
        }
        if compiled_content.is_empty() {
            return Ok(BridgeOutcome::Dropped(Dropped::EmptyPayload));
        }

        let last_modified = if current.has_content() {
            if last_modified <= current.last_modified {
                return Ok(BridgeOutcome::Dropped(Dropped::Stale));
            }
            if current.fingerprint() == Fingerprint::of(&compiled_content) {
                return Ok(BridgeOutcome::Dropped(Dropped::Duplicate));
            }
            last_modified
        } else {
            // First payload after the placeholder must still move forward
            last_modified.max(current.last_modified + 1)
        };

        let record = DevModeRecord::compiled(
            ModeKind::Editor,
            host,
            last_modified,
            files,
            compiled_content,
        );
        match self.arbiter.publish(&record)? {
            Publish::Written => Ok(BridgeOutcome::Published { last_modified }),
            Publish::HostMismatch { .. } => Ok(BridgeOutcome::Dropped(Dropped::NotHost)),
        }
    }

    fn on_no_files(&self, host: &TabId) -> BridgeOutcome {
        crate::log!("editor"; "{} has no files to run", host);
        self.notifier
            .notify("editor dev mode: no files to run yet");
        BridgeOutcome::NoFiles
    }
}

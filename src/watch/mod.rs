//! Local directory watch mode.
//!
//! # Poll step
//!
//! ```text
//! list(root) ──► diff(seen, listing) ──► empty? ──► Unchanged
//!                                          │
//!                                          ▼
//!                         read all files ──► compile ──► Err ──► CompileFailed (nothing published)
//!                                                          │
//!                                                          ▼
//!                                  publish { lastModified, files, compiledContent }
//!                                                          │
//!                                     host mismatch ◄──────┴──────► Published
//!                                     (Superseded, stop silently)
//! ```
//!
//! The timer that drives [`LocalWatcher::poll`] lives with the caller.

mod diff;
mod scan;

pub use diff::{Timestamps, diff};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::compiler::{CompileError, Compiler};
use crate::mode::{ModeArbiter, Publish, Rejection, Started};
use crate::record::{DevModeRecord, ModeKind, TabId};
use crate::store::StoreError;
use crate::{debug, logger};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("cannot watch `{0}`: {1}")]
    Unavailable(PathBuf, String),

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("failed to read `{0}`")]
    Read(String, #[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one poll step.
#[derive(Debug)]
pub enum PollOutcome {
    Unchanged,
    Published { last_modified: u64, changed: usize },
    /// Nothing was written. The previous good record stays active.
    CompileFailed(CompileError),
    /// Another tab took over the session, or it was stopped.
    Superseded,
}

/// A local watch session hosted by one tab.
pub struct LocalWatcher {
    root: PathBuf,
    extensions: Vec<String>,
    host: TabId,
    arbiter: ModeArbiter,
    compiler: Arc<dyn Compiler>,
    seen: Timestamps,
    last_published: u64,
    active: bool,
}

impl LocalWatcher {
    /// Claim local mode for `host` and prepare to poll `root`.
    ///
    /// An unusable directory is rejected before anything is written.
    pub fn start(
        root: &Path,
        extensions: Vec<String>,
        host: TabId,
        arbiter: ModeArbiter,
        compiler: Arc<dyn Compiler>,
        now: u64,
    ) -> Result<(Self, Started), WatchError> {
        if !root.is_dir() {
            return Err(WatchError::Unavailable(
                root.to_path_buf(),
                "not a readable directory".into(),
            ));
        }
        if extensions.is_empty() {
            return Err(WatchError::Unavailable(
                root.to_path_buf(),
                "no source extensions configured".into(),
            ));
        }

        let started = arbiter.try_start(ModeKind::Local, &host, now)?;
        // The placeholder's timestamp is the floor for every later publish
        let last_published = arbiter
            .record(ModeKind::Local)
            .map_or(now, |r| r.last_modified);

        debug!("watch"; "watching {} as {}", root.display(), host);
        let watcher = Self {
            root: root.to_path_buf(),
            extensions,
            host,
            arbiter,
            compiler,
            seen: Timestamps::new(),
            last_published,
            active: true,
        };
        Ok((watcher, started))
    }

    pub fn host(&self) -> &TabId {
        &self.host
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Run one poll step at wall-clock time `now`.
    pub fn poll(&mut self, now: u64) -> Result<PollOutcome, WatchError> {
        if !self.active {
            return Ok(PollOutcome::Superseded);
        }

        let listing = scan::list(&self.root, &self.extensions);
        let changes = diff(&self.seen, &listing);
        if changes.is_empty() {
            return Ok(PollOutcome::Unchanged);
        }
        debug!("watch"; "{} change(s): {:?} removed {:?}", changes.len(), changes.modified, changes.removed);

        // Files may vanish between listing and reading: retry next poll
        let files = scan::read_files(&self.root, listing.keys())
            .map_err(|(path, e)| WatchError::Read(path, e))?;

        let compiled = match self.compiler.compile(&files) {
            Ok(compiled) => compiled,
            Err(e) => {
                // Broken sources are not retried until they change again
                self.seen = listing;
                logger::status_error("compile failed, nothing published", &e.to_string());
                return Ok(PollOutcome::CompileFailed(e));
            }
        };

        let last_modified = changes
            .latest(&listing)
            .unwrap_or(now)
            .max(self.last_published + 1);
        let record = DevModeRecord::compiled(
            ModeKind::Local,
            self.host.clone(),
            last_modified,
            files,
            compiled,
        );

        match self.arbiter.publish(&record)? {
            Publish::Written => {
                self.seen = listing;
                self.last_published = last_modified;
                logger::status_success(&format!(
                    "published {} file(s), {} changed",
                    record.files.len(),
                    changes.len()
                ));
                Ok(PollOutcome::Published {
                    last_modified,
                    changed: changes.len(),
                })
            }
            Publish::HostMismatch { current } => {
                debug!("watch"; "no longer host (current: {:?}), stopping", current);
                self.active = false;
                Ok(PollOutcome::Superseded)
            }
        }
    }

    /// Stop watching. Clears the record only if this tab is still host.
    pub fn stop(&mut self) -> Result<bool, StoreError> {
        if !self.active {
            return Ok(false);
        }
        self.active = false;
        self.arbiter.stop(ModeKind::Local, &self.host)
    }
}

impl Drop for LocalWatcher {
    fn drop(&mut self) {
        if self.active
            && let Err(e) = self.stop()
        {
            debug!("watch"; "cleanup on drop failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests;

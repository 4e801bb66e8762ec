//! Execution path selection: exactly one payload source per page load.
//!
//! Priority: active local watch → active editor live reload → network bundle.

use crate::mode::ModeArbiter;
use crate::record::{DevModeRecord, ModeKind};

use super::context::{ScriptSource, TabContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPath {
    Local(DevModeRecord),
    Editor(DevModeRecord),
    /// A dev session exists but has not published a payload yet.
    AwaitingDev(ModeKind),
    Network,
}

impl ExecutionPath {
    /// Pick the path for this tab from the current shared state.
    pub fn choose(arbiter: &ModeArbiter, ctx: &TabContext) -> Self {
        let local = arbiter.record(ModeKind::Local);
        if let Some(record) = &local
            && record.has_content()
        {
            return Self::Local(record.clone());
        }

        // The editor surface publishes editor payloads but never runs them
        let editor = arbiter
            .record(ModeKind::Editor)
            .filter(|_| !ctx.editor_surface);
        if let Some(record) = &editor
            && record.has_content()
        {
            return Self::Editor(record.clone());
        }

        match (local, editor) {
            (Some(_), _) => Self::AwaitingDev(ModeKind::Local),
            (None, Some(_)) => Self::AwaitingDev(ModeKind::Editor),
            (None, None) => Self::Network,
        }
    }

    /// Payload to run for dev paths.
    pub fn dev_payload(&self) -> Option<(ScriptSource, &DevModeRecord)> {
        match self {
            Self::Local(record) => Some((ScriptSource::Local, record)),
            Self::Editor(record) => Some((ScriptSource::Editor, record)),
            Self::AwaitingDev(_) | Self::Network => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Editor(_) => "editor",
            Self::AwaitingDev(_) => "awaiting-dev",
            Self::Network => "network",
        }
    }
}

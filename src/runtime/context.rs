//! Per-tab runtime context and the side-effect seams a tab needs.

use std::fmt;

use crate::freshness::Fingerprint;
use crate::record::TabId;

/// Everything a tab knows about itself.
///
/// Owned by the tab and handed to every component that needs it; there is
/// no process-wide "already executed" or "reload pending" flag.
#[derive(Debug, Clone)]
pub struct TabContext {
    pub id: TabId,
    /// Origin of the page this tab is showing (`scheme://host:port`).
    pub origin: String,
    /// The page hosting the embedded editor. Publishes, never executes.
    pub editor_surface: bool,
    pub visible: bool,
    /// Fingerprint of the payload last executed in this tab lifetime.
    pub executed: Option<Fingerprint>,
}

impl TabContext {
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            id: TabId::generate(),
            origin: origin.into(),
            editor_surface: false,
            visible: true,
            executed: None,
        }
    }

    pub fn with_editor_surface(mut self, editor_surface: bool) -> Self {
        self.editor_surface = editor_surface;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Check if `fp` is what this tab is already running.
    pub fn is_running(&self, fp: Fingerprint) -> bool {
        self.executed == Some(fp)
    }
}

/// User-visible notifications ("reloading in 1s", "mode conflict", ...).
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that prints through the logger.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, message: &str) {
        crate::log!("tab"; "{}", message);
    }
}

/// Where an executed payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    Local,
    Editor,
    Network,
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local watch",
            Self::Editor => "editor",
            Self::Network => "network",
        })
    }
}

/// Executes a script payload in the page.
pub trait ScriptRunner: Send + Sync {
    fn run(&self, source: ScriptSource, content: &str);
}

/// Runner for headless tabs: reports what would run.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRunner;

impl ScriptRunner for LogRunner {
    fn run(&self, source: ScriptSource, content: &str) {
        crate::log!(
            "tab";
            "running script from {} ({}, {} bytes)",
            source,
            Fingerprint::of(content),
            content.len()
        );
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_defaults() {
        let ctx = TabContext::new("http://localhost:5277");
        assert!(ctx.visible);
        assert!(!ctx.editor_surface);
        assert!(ctx.executed.is_none());
    }

    #[test]
    fn test_is_running() {
        let mut ctx = TabContext::new("http://a");
        let fp = Fingerprint::of("C1");
        assert!(!ctx.is_running(fp));
        ctx.executed = Some(fp);
        assert!(ctx.is_running(fp));
        assert!(!ctx.is_running(Fingerprint::of("C2")));
    }
}

//! `[tab]` and `[reload]` section configuration.
//!
//! ```toml
//! [tab]
//! bundle_url = "http://127.0.0.1:5277/bundle.js"   # Default: derived from [serve]
//! origin = "http://127.0.0.1:5277"                 # Page origin; default: bundle origin
//!
//! [reload]
//! notify_delay_ms = 1000   # Notification shown this long before reloading
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TabConfig {
    pub bundle_url: Option<String>,
    pub origin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub notify_delay_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            notify_delay_ms: 1000,
        }
    }
}

impl ReloadConfig {
    pub fn notify_delay(&self) -> Duration {
        Duration::from_millis(self.notify_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_tab_and_reload_sections() {
        let config = test_parse_config(
            "[tab]\norigin = \"http://localhost:3000\"\n[reload]\nnotify_delay_ms = 50",
        );
        assert_eq!(config.tab.origin.as_deref(), Some("http://localhost:3000"));
        assert!(config.tab.bundle_url.is_none());
        assert_eq!(config.reload.notify_delay().as_millis(), 50);
    }
}

//! `[store]` section configuration.
//!
//! ```toml
//! [store]
//! path = ".tabsync/state.json"   # Shared state file (relative to the project root)
//! refresh_ms = 250               # How often tabs re-read it
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub refresh_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".tabsync/state.json"),
            refresh_ms: 250,
        }
    }
}

impl StoreConfig {
    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_store_config() {
        let config = test_parse_config("[store]\npath = \"/tmp/shared.json\"\nrefresh_ms = 100");
        assert_eq!(config.store.path.to_str(), Some("/tmp/shared.json"));
        assert_eq!(config.store.refresh().as_millis(), 100);
    }

    #[test]
    fn test_zero_refresh_is_clamped() {
        let config = test_parse_config("[store]\nrefresh_ms = 0");
        assert_eq!(config.store.refresh().as_millis(), 1);
    }
}

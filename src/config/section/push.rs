//! `[push]` section configuration (client side of the push channel).
//!
//! ```toml
//! [push]
//! url = "http://127.0.0.1:5277/__push"   # Default: derived from [serve]
//! reconnect_ms = 3000                    # Fixed reconnect delay
//! poll_ms = 2000                         # Polling interval when streaming is unavailable
//! debounce_ms = 300                      # Client-side debounce window
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub url: Option<String>,
    pub reconnect_ms: u64,
    pub poll_ms: u64,
    pub debounce_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            url: None,
            reconnect_ms: 3000,
            poll_ms: 2000,
            debounce_ms: 300,
        }
    }
}

impl PushConfig {
    pub fn reconnect(&self) -> Duration {
        Duration::from_millis(self.reconnect_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_push_config() {
        let config = test_parse_config("[push]\nurl = \"http://h:1/p\"\nreconnect_ms = 10");
        assert_eq!(config.push.url.as_deref(), Some("http://h:1/p"));
        assert_eq!(config.push.reconnect().as_millis(), 10);
        assert_eq!(config.push.poll_ms, 2000);
    }
}

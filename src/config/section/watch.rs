//! `[watch]` section configuration.
//!
//! ```toml
//! [watch]
//! dir = "src"                       # Directory hosted by `tabsync watch`
//! extensions = ["ts", "js"]         # Source files to pick up
//! interval_ms = 1000                # Poll interval
//! compiler = ["esbuild", "--bundle"] # Optional external compiler; files arrive as JSON on stdin
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub dir: PathBuf,
    pub extensions: Vec<String>,
    pub interval_ms: u64,
    /// Command line of the external compiler. Unset means built-in concatenation.
    pub compiler: Option<Vec<String>>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("src"),
            extensions: vec!["ts".into(), "js".into()],
            interval_ms: 1000,
            compiler: None,
        }
    }
}

impl WatchConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

//! `[serve]` section configuration.
//!
//! Contains push/bundle server settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 5277                 # HTTP port number
//! bundle = "dist/bundle.js"   # Bundle file served at `bundle_path`
//! bundle_path = "/bundle.js"
//! push_path = "/__push"
//! watch = true                # Record a build whenever the bundle changes
//! debounce_ms = 300           # Broadcast debounce window
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Push/bundle server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// HTTP port number.
    pub port: u16,

    /// Bundle file on disk (relative to the project root).
    pub bundle: PathBuf,

    /// URL path the bundle is served under.
    pub bundle_path: String,

    /// URL path of the push endpoint (SSE, snapshot and POST).
    pub push_path: String,

    /// Poll the bundle file and record a build when it changes.
    pub watch: bool,

    pub debounce_ms: u64,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 5277,
            bundle: PathBuf::from("dist/bundle.js"),
            bundle_path: "/bundle.js".into(),
            push_path: "/__push".into(),
            watch: true,
            debounce_ms: 300,
        }
    }
}

impl ServeConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// `http://<interface>:<port>`, with IPv6 addresses bracketed.
    pub fn base_url(&self) -> String {
        match self.interface {
            IpAddr::V4(ip) => format!("http://{}:{}", ip, self.port),
            IpAddr::V6(ip) => format!("http://[{}]:{}", ip, self.port),
        }
    }
}

//! Server lifecycle: binding and the bundle watch thread.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use tiny_http::Server;

use super::hub::Hub;
use crate::freshness::{mtime_ms, now_ms};
use crate::watch::{Timestamps, diff};
use crate::{debug, log};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Bind to the specified interface and port, with automatic port retry.
pub fn bind_with_retry(
    interface: std::net::IpAddr,
    base_port: u16,
) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(anyhow::anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        MAX_PORT_RETRIES,
        base_port,
        base_port.saturating_add(MAX_PORT_RETRIES - 1),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// Single-entry listing of the bundle file, in the watcher's format.
pub fn bundle_listing(bundle: &Path) -> Timestamps {
    let mut listing = Timestamps::new();
    if let Some(mtime) = mtime_ms(bundle) {
        listing.insert(bundle.to_string_lossy().into_owned(), mtime);
    }
    listing
}

/// Poll the bundle file and record a build whenever it is (re)written.
///
/// The state at startup is the baseline, not a build.
pub fn spawn_bundle_watch(bundle: PathBuf, interval: Duration, hub: Arc<Hub>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut seen = bundle_listing(&bundle);
        debug!("serve"; "watching {}", bundle.display());

        while !crate::core::is_shutdown() {
            thread::sleep(interval);
            let current = bundle_listing(&bundle);
            let changes = diff(&seen, &current);
            seen = current;
            if changes.modified.is_empty() {
                if !changes.removed.is_empty() {
                    debug!("serve"; "{} removed", bundle.display());
                }
                continue;
            }
            hub.record(now_ms());
        }
    })
}

/// Wait for a helper thread to finish (max 2 seconds).
pub fn wait_for(handle: Option<JoinHandle<()>>) {
    let Some(handle) = handle else { return };

    for _ in 0..40 {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_bind_skips_busy_port() {
        let localhost = IpAddr::V4(Ipv4Addr::LOCALHOST);
        let (first, addr) = bind_with_retry(localhost, 0).unwrap();
        let busy = first.server_addr().to_ip().unwrap().port();
        assert_eq!(addr.port(), 0);

        let (_second, addr) = bind_with_retry(localhost, busy).unwrap();
        assert_ne!(addr.port(), busy);
    }

    #[test]
    fn test_bundle_listing() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = dir.path().join("bundle.js");
        assert!(bundle_listing(&bundle).is_empty());

        fs::write(&bundle, "x").unwrap();
        let listing = bundle_listing(&bundle);
        assert_eq!(listing.len(), 1);
        assert!(diff(&Timestamps::new(), &listing).modified.len() == 1);
    }
}

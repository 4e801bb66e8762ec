//! SSE client hub with a debounced broadcaster.
//!
//! ```text
//! POST / bundle watch ──record()──► channel ──► broadcaster thread
//!                                               (coalesce within window)
//!                                                       │
//!                                   clients ◄──broadcast(newest)──┘
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use super::route::{EVENT_STREAM, event, snapshot_event};
use crate::debug;

type Writer = Box<dyn Write + Send>;

pub struct Hub {
    clients: Mutex<Vec<Writer>>,
    last_built_at: Mutex<Option<u64>>,
    tx: Sender<u64>,
}

impl Hub {
    /// Create a hub and the receiving side of its build channel.
    pub fn new() -> (Arc<Self>, Receiver<u64>) {
        let (tx, rx) = channel::unbounded();
        let hub = Self {
            clients: Mutex::new(Vec::new()),
            last_built_at: Mutex::new(None),
            tx,
        };
        (Arc::new(hub), rx)
    }

    /// Take over a raw connection: write the response head and keep it.
    ///
    /// A stream starts with the newest build, so a client that reconnects
    /// learns about builds it missed while disconnected.
    pub fn attach(&self, mut writer: Writer) -> io::Result<()> {
        // Held across the read of `last_built_at`: any later build is
        // broadcast to this client
        let mut clients = self.clients.lock();
        write!(
            writer,
            "HTTP/1.1 200 OK\r\n\
             Content-Type: {EVENT_STREAM}\r\n\
             Cache-Control: no-cache\r\n\
             Connection: keep-alive\r\n\
             Access-Control-Allow-Origin: *\r\n\r\n\
             : connected\n\n"
        )?;
        if let Some(built_at) = self.last_built_at() {
            writer.write_all(snapshot_event(built_at).as_bytes())?;
        }
        writer.flush()?;

        clients.push(writer);
        debug!("push"; "stream client connected ({} total)", clients.len());
        Ok(())
    }

    /// Record a build. Broadcasting happens after the debounce window.
    pub fn record(&self, built_at: u64) {
        *self.last_built_at.lock() = Some(built_at);
        // The broadcaster holds the receiver until shutdown
        let _ = self.tx.send(built_at);
    }

    pub fn last_built_at(&self) -> Option<u64> {
        *self.last_built_at.lock()
    }

    #[cfg(test)]
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Send one event to every client, dropping those that fail.
    /// Returns the number of clients reached.
    pub fn broadcast(&self, built_at: u64) -> usize {
        let message = event(built_at);
        let mut clients = self.clients.lock();
        clients.retain_mut(|client| {
            client
                .write_all(message.as_bytes())
                .and_then(|()| client.flush())
                .is_ok()
        });
        clients.len()
    }

    /// Close every stream.
    pub fn close(&self) {
        self.clients.lock().clear();
    }
}

/// Wait out the debounce window, keeping only the newest build.
///
/// Every arrival restarts the window.
pub fn coalesce(rx: &Receiver<u64>, first: u64, window: Duration) -> u64 {
    let mut latest = first;
    while let Ok(next) = rx.recv_timeout(window) {
        latest = next;
    }
    latest
}

/// Run the broadcaster until `shutdown` fires or the hub is dropped.
pub fn spawn_broadcaster(
    hub: Arc<Hub>,
    rx: Receiver<u64>,
    window: Duration,
    shutdown: Receiver<()>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        loop {
            channel::select! {
                recv(rx) -> msg => {
                    let Ok(first) = msg else { return };
                    let built_at = coalesce(&rx, first, window);
                    let reached = hub.broadcast(built_at);
                    crate::logger::status_success(&format!(
                        "build {} announced to {} stream(s)",
                        built_at, reached
                    ));
                }
                recv(shutdown) -> _ => {
                    hub.close();
                    return;
                }
            }
        }
    })
}

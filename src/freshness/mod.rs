//! Freshness detection: content fingerprints for payloads, mtimes for sources.

mod fingerprint;
mod mtime;

pub use fingerprint::Fingerprint;
pub use mtime::{mtime_ms, now_ms};

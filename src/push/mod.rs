//! Dev push client: reacts to server-side "rebuild happened" notifications.
//!
//! ```text
//! transport (SSE | polling) ──raw payload──► DevPushClient::offer ──► debounce
//!                                                   │                     │
//!                                         duplicate hash? ignore     take_ready
//!                                                                         │
//!                                   PushApply { hash } ◄──────────────────┘
//!                                   (invalidate cache, broadcast, notify, reload)
//! ```
//!
//! Subscription is gated once at construction: pages whose origin differs
//! from the bundle origin never stream or poll.

mod debounce;
mod transport;

pub use debounce::Debounce;
pub use transport::{PushEvent, PushTransport, notify_rebuild};

use std::time::{Duration, Instant};

use thiserror::Error;
use url::Url;

use crate::debug;
use crate::freshness::Fingerprint;

/// Default client-side debounce window.
pub const DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Error)]
pub enum PushError {
    #[error("request to `{url}` failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("`{url}` answered {status}")]
    Status { url: String, status: u16 },

    #[error("invalid push payload")]
    Decode(#[from] serde_json::Error),
}

/// Check if `page_origin` and `target` share scheme, host and port.
///
/// Unparseable input is never same-origin.
pub fn same_origin(page_origin: &str, target: &str) -> bool {
    match (Url::parse(page_origin), Url::parse(target)) {
        (Ok(page), Ok(target)) => {
            let origin = page.origin();
            origin.is_tuple() && origin == target.origin()
        }
        _ => false,
    }
}

/// What to do with one raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushDecision {
    /// Held in the debounce window.
    Debounced,
    Duplicate,
    /// Cross-origin page; notifications are not for us.
    Disabled,
}

/// A debounced, deduplicated notification ready to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushApply {
    pub hash: String,
    pub payload: String,
}

#[derive(Debug)]
pub struct DevPushClient {
    enabled: bool,
    last_applied: Option<Fingerprint>,
    debounce: Debounce,
}

impl DevPushClient {
    /// Evaluate the same-origin gate once for this page.
    pub fn new(page_origin: &str, bundle_url: &str, debounce: Duration) -> Self {
        let enabled = same_origin(page_origin, bundle_url);
        if !enabled {
            debug!("push"; "{} is cross-origin to {}, push disabled", page_origin, bundle_url);
        }
        Self {
            enabled,
            last_applied: None,
            debounce: Debounce::new(debounce),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Record the current server state without applying it (first poll).
    pub fn baseline(&mut self, raw: &str) {
        self.last_applied = Some(Fingerprint::of(raw));
    }

    /// Offer a raw notification payload.
    pub fn offer(&mut self, raw: &str, now: Instant) -> PushDecision {
        if !self.enabled {
            return PushDecision::Disabled;
        }
        if self.last_applied == Some(Fingerprint::of(raw)) {
            debug!("push"; "duplicate notification ignored");
            return PushDecision::Duplicate;
        }
        self.debounce.offer(raw.to_string(), now);
        PushDecision::Debounced
    }

    /// When the debounced payload becomes ready.
    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// Release the debounced payload once its window has passed.
    pub fn take_ready(&mut self, now: Instant) -> Option<PushApply> {
        let payload = self.debounce.take_ready(now)?;
        let fp = Fingerprint::of(&payload);
        if self.last_applied == Some(fp) {
            return None;
        }
        self.last_applied = Some(fp);
        Some(PushApply {
            hash: fp.to_hex(),
            payload,
        })
    }
}

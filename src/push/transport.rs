//! Push transport: SSE stream with a polling fallback.
//!
//! Streaming is tried first. A transport error or a closed stream reconnects
//! after a fixed delay (no exponential backoff). When the endpoint does not
//! speak `text/event-stream` at all, the transport switches to polling the
//! `{lastBuiltAt}` snapshot for the rest of its life.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::PushError;
use crate::{debug, log};

/// Default fixed reconnect delay.
pub const RECONNECT: Duration = Duration::from_millis(3000);
/// Default polling interval when streaming is unavailable.
pub const POLL_INTERVAL: Duration = Duration::from_millis(2000);

const EVENT_STREAM: &str = "text/event-stream";
/// Event name of the build state a stream starts with.
const SNAPSHOT_EVENT: &str = "snapshot";

/// Sent to the tab loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushEvent {
    /// A rebuild notification payload.
    Payload(String),
    /// Server state at (re)connect time; not a rebuild.
    Baseline(String),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuiltAt {
    built_at: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    last_built_at: Option<u64>,
}

/// Canonical payload for a build timestamp, identical for both transports.
fn payload(built_at: u64) -> String {
    serde_json::json!({ "builtAt": built_at }).to_string()
}

enum StreamEnd {
    /// Server closed the stream or the tab went away.
    Closed,
    /// Endpoint does not stream; poll instead.
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct PushTransport {
    client: reqwest::Client,
    url: String,
    reconnect: Duration,
    poll_interval: Duration,
}

impl PushTransport {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            reconnect: RECONNECT,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_reconnect(mut self, reconnect: Duration) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Deliver events to `tx` until the receiver is dropped.
    pub async fn run(self, tx: mpsc::Sender<PushEvent>) {
        let mut connected_before = false;
        loop {
            match self.stream(&tx, &mut connected_before).await {
                Ok(StreamEnd::Closed) => debug!("push"; "stream closed"),
                Ok(StreamEnd::Unsupported) => {
                    debug!("push"; "streaming unavailable, polling {}", self.url);
                    self.poll(&tx).await;
                    return;
                }
                Err(e) => debug!("push"; "stream error: {}", e),
            }
            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(self.reconnect).await;
        }
    }

    fn http_err(&self, source: reqwest::Error) -> PushError {
        PushError::Http {
            url: self.url.clone(),
            source,
        }
    }

    async fn stream(
        &self,
        tx: &mpsc::Sender<PushEvent>,
        connected_before: &mut bool,
    ) -> Result<StreamEnd, PushError> {
        let mut response = self
            .client
            .get(&self.url)
            .header(ACCEPT, EVENT_STREAM)
            .send()
            .await
            .map_err(|e| self.http_err(e))?;

        let status = response.status();
        if matches!(
            status,
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_ACCEPTABLE
        ) {
            return Ok(StreamEnd::Unsupported);
        }
        if !status.is_success() {
            return Err(PushError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }
        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with(EVENT_STREAM));
        if !is_stream {
            return Ok(StreamEnd::Unsupported);
        }

        log!("push"; "listening on {}", self.url);
        let first_connect = !std::mem::replace(connected_before, true);
        let mut parser = SseParser::default();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.http_err(e))? {
            for event in parser.feed(&chunk) {
                if tx.send(event.into_push(first_connect)).await.is_err() {
                    return Ok(StreamEnd::Closed);
                }
            }
        }
        Ok(StreamEnd::Closed)
    }

    async fn poll(&self, tx: &mpsc::Sender<PushEvent>) {
        let mut baseline_sent = false;
        loop {
            let delay = match self.snapshot().await {
                Ok(Some(built_at)) => {
                    let event = if baseline_sent {
                        PushEvent::Payload(payload(built_at))
                    } else {
                        PushEvent::Baseline(payload(built_at))
                    };
                    baseline_sent = true;
                    if tx.send(event).await.is_err() {
                        return;
                    }
                    self.poll_interval
                }
                Ok(None) => {
                    baseline_sent = true;
                    self.poll_interval
                }
                Err(e) => {
                    debug!("push"; "poll failed: {}", e);
                    self.reconnect
                }
            };
            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(delay).await;
        }
    }

    async fn snapshot(&self) -> Result<Option<u64>, PushError> {
        let response = self
            .client
            .get(&self.url)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| self.http_err(e))?;
        if !response.status().is_success() {
            return Err(PushError::Status {
                url: self.url.clone(),
                status: response.status().as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(|e| self.http_err(e))?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        Ok(snapshot.last_built_at)
    }
}

/// POST a rebuild notification. Returns the recorded build time.
pub async fn notify_rebuild(
    client: &reqwest::Client,
    url: &str,
    built_at: Option<u64>,
) -> Result<u64, PushError> {
    let http_err = |source: reqwest::Error| PushError::Http {
        url: url.to_string(),
        source,
    };

    let mut request = client.post(url);
    if let Some(built_at) = built_at {
        request = request.json(&BuiltAt { built_at });
    }
    let response = request.send().await.map_err(http_err)?;
    if !response.status().is_success() {
        return Err(PushError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }
    let bytes = response.bytes().await.map_err(http_err)?;
    let recorded: BuiltAt = serde_json::from_slice(&bytes)?;
    Ok(recorded.built_at)
}

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SseEvent {
    event: Option<String>,
    data: String,
}

impl SseEvent {
    /// The snapshot opening the very first stream is the baseline. After a
    /// reconnect it is delivered, and duplicates are filtered by hash.
    fn into_push(self, first_connect: bool) -> PushEvent {
        let data = canonical(&self.data);
        match self.event.as_deref() {
            Some(SNAPSHOT_EVENT) if first_connect => PushEvent::Baseline(data),
            _ => PushEvent::Payload(data),
        }
    }
}

/// Re-encode `{"builtAt":X}` bodies so stream and poll payloads hash alike.
fn canonical(data: &str) -> String {
    match serde_json::from_str::<BuiltAt>(data) {
        Ok(built) => payload(built.built_at),
        Err(_) => data.to_string(),
    }
}

/// Incremental `text/event-stream` parser.
///
/// Only `event:` and `data:` fields matter; comments, `id:` and `retry:`
/// are skipped. Multi-line data is joined with `\n`.
#[derive(Debug, Default)]
struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    /// Feed raw bytes, returning every event completed by them.
    fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                let event = self.event.take();
                if !self.data.is_empty() {
                    events.push(SseEvent {
                        event,
                        data: self.data.join("\n"),
                    });
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }
            let (field, value) = line.split_once(':').unwrap_or((line, ""));
            let value = value.strip_prefix(' ').unwrap_or(value);
            match field {
                "data" => self.data.push(value.to_string()),
                "event" => self.event = Some(value.to_string()),
                _ => {}
            }
        }
        events
    }
}

//! Request routing and reply construction, free of sockets.

use serde::{Deserialize, Serialize};
use tiny_http::Method;

use crate::bundle::unquote_etag;
use crate::freshness::Fingerprint;

pub const JAVASCRIPT: &str = "text/javascript; charset=utf-8";
pub const JSON: &str = "application/json";
pub const PLAIN: &str = "text/plain; charset=utf-8";
pub const EVENT_STREAM: &str = "text/event-stream";
/// SSE event name for the build state a stream starts from.
pub const SNAPSHOT_EVENT: &str = "snapshot";

/// What a request asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// GET or HEAD; tiny_http drops the body of HEAD replies itself.
    Bundle,
    /// Long-lived SSE subscription.
    Stream,
    /// `{lastBuiltAt}` for polling clients.
    Snapshot,
    /// Record a build; `None` means "now".
    Record(Option<u64>),
    BadRequest(String),
    MethodNotAllowed,
    NotFound,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordBody {
    built_at: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot {
    last_built_at: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Recorded {
    built_at: u64,
}

/// URL paths served.
#[derive(Debug, Clone, Copy)]
pub struct Paths<'a> {
    pub bundle: &'a str,
    pub push: &'a str,
}

pub fn route(paths: Paths<'_>, method: &Method, url: &str, accept: Option<&str>, body: &[u8]) -> Route {
    let path = url.split(['?', '#']).next().unwrap_or(url);

    if path == paths.bundle {
        return match method {
            Method::Get | Method::Head => Route::Bundle,
            _ => Route::MethodNotAllowed,
        };
    }

    if path == paths.push {
        return match method {
            Method::Get if accepts_stream(accept) => Route::Stream,
            Method::Get | Method::Head => Route::Snapshot,
            Method::Post => parse_record(body),
            _ => Route::MethodNotAllowed,
        };
    }

    Route::NotFound
}

fn accepts_stream(accept: Option<&str>) -> bool {
    accept.is_some_and(|accept| {
        accept
            .split(',')
            .any(|part| part.trim().starts_with(EVENT_STREAM))
    })
}

fn parse_record(body: &[u8]) -> Route {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Route::Record(None);
    }
    match serde_json::from_slice::<RecordBody>(body) {
        Ok(record) => Route::Record(record.built_at),
        Err(e) => Route::BadRequest(format!("invalid build notification: {e}")),
    }
}

/// A response, ready to be written by the HTTP glue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Body {
        status: u16,
        content_type: &'static str,
        etag: Option<String>,
        body: Vec<u8>,
    },
    NotModified { etag: String },
}

impl Reply {
    pub fn text(status: u16, message: impl Into<String>) -> Self {
        Self::Body {
            status,
            content_type: PLAIN,
            etag: None,
            body: message.into().into_bytes(),
        }
    }

    fn json(status: u16, body: String) -> Self {
        Self::Body {
            status,
            content_type: JSON,
            etag: None,
            body: body.into_bytes(),
        }
    }

    pub fn status(&self) -> u16 {
        match self {
            Self::Body { status, .. } => *status,
            Self::NotModified { .. } => 304,
        }
    }
}

/// Serve the bundle, honouring `If-None-Match`.
pub fn bundle_reply(content: Option<Vec<u8>>, if_none_match: Option<&str>) -> Reply {
    let Some(body) = content else {
        return Reply::text(404, "bundle not built yet");
    };
    let etag = Fingerprint::of(&body).to_hex();
    if if_none_match.is_some_and(|value| etag_matches(value, &etag)) {
        return Reply::NotModified { etag };
    }
    Reply::Body {
        status: 200,
        content_type: JAVASCRIPT,
        etag: Some(etag),
        body,
    }
}

/// `If-None-Match` may list several tags or be `*`.
fn etag_matches(header: &str, etag: &str) -> bool {
    header
        .split(',')
        .map(str::trim)
        .any(|tag| tag == "*" || unquote_etag(tag) == etag)
}

pub fn snapshot_reply(last_built_at: Option<u64>) -> Reply {
    let body = serde_json::to_string(&Snapshot { last_built_at }).unwrap_or_default();
    Reply::json(200, body)
}

pub fn recorded_reply(built_at: u64) -> Reply {
    let body = serde_json::to_string(&Recorded { built_at }).unwrap_or_default();
    Reply::json(202, body)
}

/// One SSE event for a build.
pub fn event(built_at: u64) -> String {
    let data = serde_json::to_string(&Recorded { built_at }).unwrap_or_default();
    format!("data: {data}\n\n")
}

/// The newest build, sent once to every new stream.
pub fn snapshot_event(built_at: u64) -> String {
    format!("event: {SNAPSHOT_EVENT}\n{}", event(built_at))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATHS: Paths<'static> = Paths {
        bundle: "/bundle.js",
        push: "/__push",
    };

    fn get(url: &str, accept: Option<&str>) -> Route {
        route(PATHS, &Method::Get, url, accept, b"")
    }

    #[test]
    fn test_route_bundle() {
        assert_eq!(get("/bundle.js", None), Route::Bundle);
        assert_eq!(get("/bundle.js?v=3", None), Route::Bundle);
        assert_eq!(
            route(PATHS, &Method::Head, "/bundle.js", None, b""),
            Route::Bundle
        );
        assert_eq!(
            route(PATHS, &Method::Post, "/bundle.js", None, b""),
            Route::MethodNotAllowed
        );
        assert_eq!(get("/other.js", None), Route::NotFound);
    }

    #[test]
    fn test_route_push_by_accept() {
        assert_eq!(get("/__push", Some("text/event-stream")), Route::Stream);
        assert_eq!(
            get("/__push", Some("application/json, text/event-stream;q=0.5")),
            Route::Stream
        );
        assert_eq!(get("/__push", Some("application/json")), Route::Snapshot);
        assert_eq!(get("/__push", None), Route::Snapshot);
    }

    #[test]
    fn test_route_record() {
        let post = |body: &[u8]| route(PATHS, &Method::Post, "/__push", None, body);
        assert_eq!(post(b""), Route::Record(None));
        assert_eq!(post(b"{}"), Route::Record(None));
        assert_eq!(post(br#"{"builtAt":42}"#), Route::Record(Some(42)));
        assert!(matches!(post(b"nope"), Route::BadRequest(_)));
    }

    #[test]
    fn test_bundle_revalidation() {
        let Reply::Body { etag: Some(etag), status: 200, .. } =
            bundle_reply(Some(b"v1".to_vec()), None)
        else {
            panic!("expected a full reply");
        };
        assert_eq!(etag, Fingerprint::of("v1").to_hex());

        let quoted = format!("\"{etag}\"");
        assert_eq!(
            bundle_reply(Some(b"v1".to_vec()), Some(&quoted)),
            Reply::NotModified { etag: etag.clone() }
        );
        assert_eq!(
            bundle_reply(Some(b"v2".to_vec()), Some(&quoted)).status(),
            200
        );
        assert_eq!(bundle_reply(Some(b"v1".to_vec()), Some("*")).status(), 304);
        assert_eq!(bundle_reply(None, None).status(), 404);
    }

    #[test]
    fn test_json_bodies() {
        let Reply::Body { body, .. } = snapshot_reply(None) else {
            unreachable!()
        };
        assert_eq!(body, br#"{"lastBuiltAt":null}"#);

        let reply = recorded_reply(7);
        assert_eq!(reply.status(), 202);
        let Reply::Body { body, .. } = reply else {
            unreachable!()
        };
        assert_eq!(body, br#"{"builtAt":7}"#);
        assert_eq!(event(7), "data: {\"builtAt\":7}\n\n");
        assert_eq!(
            snapshot_event(7),
            "event: snapshot\ndata: {\"builtAt\":7}\n\n"
        );
    }
}

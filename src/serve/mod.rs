//! Bundle and push server.
//!
//! Serves the built bundle with ETag revalidation and hosts the push
//! endpoint: an SSE stream of builds, a JSON snapshot for polling tabs,
//! and a POST hook for build tools.

mod hub;
mod lifecycle;
mod route;

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use crossbeam::channel;
use tiny_http::{Header, Request, Response, Server};

use crate::config::Config;
use crate::freshness::now_ms;
use crate::{debug, log};
use hub::Hub;
use route::{Paths, Reply, Route};

/// Largest POST body accepted by the push endpoint.
const MAX_BODY: u64 = 64 * 1024;

/// What request handlers need.
struct Site {
    bundle: PathBuf,
    bundle_path: String,
    push_path: String,
    hub: Arc<Hub>,
}

impl Site {
    fn paths(&self) -> Paths<'_> {
        Paths {
            bundle: &self.bundle_path,
            push: &self.push_path,
        }
    }
}

/// Bind and serve until Ctrl+C.
pub fn run(config: &Config) -> Result<()> {
    let serve = &config.serve;
    let (server, addr) = lifecycle::bind_with_retry(serve.interface, serve.port)?;
    let server = Arc::new(server);

    let (shutdown_tx, shutdown_rx) = channel::unbounded::<()>();
    crate::core::register_server(Arc::clone(&server), shutdown_tx);

    let (hub, builds) = Hub::new();
    let broadcaster =
        hub::spawn_broadcaster(Arc::clone(&hub), builds, serve.debounce(), shutdown_rx);
    let watcher = serve.watch.then(|| {
        lifecycle::spawn_bundle_watch(
            serve.bundle.clone(),
            config.watch.interval(),
            Arc::clone(&hub),
        )
    });

    log!("serve"; "http://{}{}", addr, serve.bundle_path);
    log!("serve"; "push: http://{}{}", addr, serve.push_path);
    if !serve.bundle.is_file() {
        log!("serve"; "{} does not exist yet", serve.bundle.display());
    }

    let site = Arc::new(Site {
        bundle: serve.bundle.clone(),
        bundle_path: serve.bundle_path.clone(),
        push_path: serve.push_path.clone(),
        hub: Arc::clone(&hub),
    });
    run_request_loop(&server, &site)?;

    hub.close();
    lifecycle::wait_for(Some(broadcaster));
    lifecycle::wait_for(watcher);
    Ok(())
}

fn run_request_loop(server: &Server, site: &Arc<Site>) -> Result<()> {
    // SSE requests return as soon as the stream is attached,
    // so a small pool is enough.
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .context("failed to create thread pool")?;

    for request in server.incoming_requests() {
        let site = Arc::clone(site);
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &site) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
        .map(|h| h.value.to_string())
}

/// Handle a single HTTP request
fn handle_request(mut request: Request, site: &Site) -> Result<()> {
    if crate::core::is_shutdown() {
        return send(request, Reply::text(503, "503 Service Unavailable"));
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY)
        .read_to_end(&mut body)
        .context("failed to read request body")?;

    let accept = header(&request, "Accept");
    let route = route::route(
        site.paths(),
        request.method(),
        request.url(),
        accept.as_deref(),
        &body,
    );
    debug!("serve"; "{} {} -> {:?}", request.method(), request.url(), route);

    let reply = match route {
        Route::Stream => {
            site.hub.attach(request.into_writer())?;
            return Ok(());
        }
        Route::Bundle => {
            let content = read_bundle(site)?;
            let if_none_match = header(&request, "If-None-Match");
            route::bundle_reply(content, if_none_match.as_deref())
        }
        Route::Snapshot => route::snapshot_reply(site.hub.last_built_at()),
        Route::Record(built_at) => {
            let built_at = built_at.unwrap_or_else(now_ms);
            site.hub.record(built_at);
            route::recorded_reply(built_at)
        }
        Route::BadRequest(message) => Reply::text(400, message),
        Route::MethodNotAllowed => Reply::text(405, "405 Method Not Allowed"),
        Route::NotFound => Reply::text(404, "404 Not Found"),
    };
    send(request, reply)
}

/// `None` while the bundle has not been built.
fn read_bundle(site: &Site) -> Result<Option<Vec<u8>>> {
    match fs::read(&site.bundle) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", site.bundle.display())),
    }
}

fn send(request: Request, reply: Reply) -> Result<()> {
    let status = reply.status();
    let (content_type, etag, body) = match reply {
        Reply::Body {
            content_type,
            etag,
            body,
            ..
        } => (Some(content_type), etag, body),
        Reply::NotModified { etag } => (None, Some(etag), Vec::new()),
    };

    let mut response = Response::from_data(body)
        .with_status_code(status)
        .with_header(make_header("Access-Control-Allow-Origin", "*")?)
        .with_header(make_header("Access-Control-Expose-Headers", "ETag")?)
        .with_header(make_header("Cache-Control", "no-cache")?);
    if let Some(content_type) = content_type {
        response.add_header(make_header("Content-Type", content_type)?);
    }
    if let Some(etag) = etag {
        response.add_header(make_header("ETag", &format!("\"{etag}\""))?);
    }

    request.respond(response)?;
    Ok(())
}

fn make_header(key: &str, value: &str) -> Result<Header> {
    Header::from_bytes(key, value).map_err(|()| anyhow!("invalid header {key}: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(bundle: PathBuf) -> Site {
        Site {
            bundle,
            bundle_path: "/bundle.js".into(),
            push_path: "/__push".into(),
            hub: Hub::new().0,
        }
    }

    #[test]
    fn test_read_bundle_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let site = site(dir.path().join("bundle.js"));
        assert_eq!(read_bundle(&site).unwrap(), None);

        fs::write(&site.bundle, "x").unwrap();
        assert_eq!(read_bundle(&site).unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_make_header_rejects_garbage() {
        assert!(make_header("ETag", "\"abc\"").is_ok());
        assert!(make_header("ETag", "é").is_err());
    }
}

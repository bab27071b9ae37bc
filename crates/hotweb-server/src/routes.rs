//! HTTP and websocket handlers.

use crate::Hotweb;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use hotweb_core::config::HOTWEB_SEGMENT;
use hotweb_core::{render_client, Error};
use hotweb_util::path;
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tracing::{debug, warn};

const JAVASCRIPT: &str = "text/javascript; charset=utf-8";

pub(crate) fn router(hotweb: Arc<Hotweb>) -> Router {
    let websocket_path = hotweb.config().websocket_path();
    Router::new()
        .route(&websocket_path, get(websocket))
        .route(&format!("{websocket_path}/:name"), get(client_script))
        .fallback(serve)
        .with_state(hotweb)
}

async fn websocket(ws: WebSocketUpgrade, State(hotweb): State<Arc<Hotweb>>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, hotweb))
}

/// Forward change notifications to one browser until it goes away.
async fn client_session(socket: WebSocket, hotweb: Arc<Hotweb>) {
    let clients = hotweb.clients();
    let (id, mut updates) = clients.register();
    debug!(client = id, connected = clients.len(), "Client connected");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                let json = match serde_json::to_string(&update) {
                    Ok(json) => json,
                    Err(error) => {
                        warn!(client = id, %error, "Failed to encode change");
                        continue;
                    }
                };
                if let Err(error) = sink.send(Message::Text(json)).await {
                    if is_disconnect(&error) {
                        debug!(client = id, %error, "Client went away");
                    } else {
                        warn!(client = id, %error, "Failed to send change");
                    }
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    debug!(client = id, %error, "Websocket read failed");
                    break;
                }
            },
        }
    }

    clients.remove(id);
    debug!(client = id, connected = clients.len(), "Client disconnected");
}

fn is_disconnect(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            );
        }
        if err.to_string().to_ascii_lowercase().contains("closed") {
            return true;
        }
        source = err.source();
    }
    false
}

async fn client_script(State(hotweb): State<Arc<Hotweb>>, Path(name): Path<String>) -> Response {
    let config = hotweb.config();
    if name != config.client_module_name {
        return not_found();
    }
    let script = render_client(config.debug, &config.websocket_path());
    ([(header::CONTENT_TYPE, JAVASCRIPT)], script).into_response()
}

/// Everything outside `/.hotweb`: module proxies, then plain files.
async fn serve(State(hotweb): State<Arc<Hotweb>>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let request_path = uri.path().to_string();
    let Some(rel) = path::strip_mount(&request_path, &hotweb.config().mount_prefix) else {
        return not_found();
    };
    let rel = percent_decode_str(rel).decode_utf8_lossy().into_owned();
    if rel == HOTWEB_SEGMENT || rel.starts_with(&format!("{HOTWEB_SEGMENT}/")) {
        return not_found();
    }

    if uri.query().is_none() && hotweb.config().should_proxy(&rel) {
        let task_hotweb = Arc::clone(&hotweb);
        let task_path = request_path.clone();
        return match blocking(move || task_hotweb.proxy_source(&task_path, &rel)).await {
            Ok(source) => with_type(JAVASCRIPT, source.into_bytes()),
            Err(error) => error_response(&request_path, &error),
        };
    }

    let trailing_slash = request_path.ends_with('/');
    let task_hotweb = Arc::clone(&hotweb);
    match blocking(move || load_asset(&task_hotweb, &rel, trailing_slash)).await {
        Ok(Asset::File { path, bytes }) => with_type(content_type(&path), bytes),
        Ok(Asset::Directory) => {
            let mut target = format!("{request_path}/");
            if let Some(query) = uri.query() {
                target.push('?');
                target.push_str(query);
            }
            (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, target)]).into_response()
        }
        Err(error) => error_response(&request_path, &error),
    }
}

enum Asset {
    File { path: String, bytes: Vec<u8> },
    /// A directory requested without its trailing slash.
    Directory,
}

fn load_asset(hotweb: &Hotweb, rel: &str, trailing_slash: bool) -> hotweb_core::Result<Asset> {
    let fs = hotweb.fs();
    if !fs.metadata(rel)?.is_dir {
        return Ok(Asset::File {
            path: rel.to_string(),
            bytes: fs.read(rel)?,
        });
    }
    if !trailing_slash {
        return Ok(Asset::Directory);
    }
    let index = format!("{}/index.html", rel.trim_end_matches('/'));
    Ok(Asset::File {
        bytes: fs.read(&index)?,
        path: index,
    })
}

async fn blocking<T, F>(f: F) -> hotweb_core::Result<T>
where
    F: FnOnce() -> hotweb_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(Error::other(format!("request task failed: {e}"))))
}

fn with_type(content_type: &'static str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        bytes,
    )
        .into_response()
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}

fn error_response(request_path: &str, error: &Error) -> Response {
    if error.is_not_found() {
        debug!(path = request_path, "Not found");
        return not_found();
    }
    warn!(path = request_path, %error, "Request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{error}\n")).into_response()
}

fn content_type(path: &str) -> &'static str {
    match path::extension(path).to_ascii_lowercase().as_str() {
        ".html" | ".htm" => "text/html; charset=utf-8",
        ".css" => "text/css; charset=utf-8",
        ".js" | ".mjs" | ".jsx" => JAVASCRIPT,
        ".json" | ".map" => "application/json",
        ".svg" => "image/svg+xml",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        ".gif" => "image/gif",
        ".webp" => "image/webp",
        ".ico" => "image/x-icon",
        ".wasm" => "application/wasm",
        ".woff" => "font/woff",
        ".woff2" => "font/woff2",
        ".txt" | ".md" => "text/plain; charset=utf-8",
        ".xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

//! Browser bootstrap script.
//!
//! Served at `<prefix>/.hotweb/<client_module_name>` and imported by every
//! module proxy. It keeps one websocket open to the server and dispatches each
//! `{"path", "ts"}` notification to the callbacks registered with `accept`.

use crate::proxy::escape_js;

/// Bootstrap script template.
///
/// `__HOTWEB_DEBUG__` becomes `true` or `false`; `__HOTWEB_ENDPOINT__` becomes
/// the websocket path, resolved against the script's own URL.
pub const CLIENT_TEMPLATE: &str = r#"const debug = __HOTWEB_DEBUG__;
const endpoint = "__HOTWEB_ENDPOINT__";

const listeners = new Map();
const refreshers = [];

function log(...args) {
  if (debug) console.debug("[hotweb]", ...args);
}

// Change paths arrive decoded; URL pathnames are percent-encoded.
function decodePath(pathname) {
  try {
    return decodeURIComponent(pathname);
  } catch {
    return pathname;
  }
}

// Registers callback(ts, changedPath) for changes whose path starts with `path`.
export function accept(path, callback) {
  if (!listeners.has(path)) listeners.set(path, []);
  listeners.get(path).push(callback);
}

// Runs callback now and again after every batch of accept callbacks.
export function refresh(callback) {
  refreshers.push(callback);
  callback();
}

// Reloads the page when the page itself changes.
export function watchHTML() {
  const page = decodePath(location.pathname);
  const index = page.endsWith("/") ? page + "index.html" : page;
  accept(page, (ts, path) => {
    if (path === page || path === index) location.reload();
  });
}

// Swaps stylesheet links in place when a stylesheet changes.
export function watchCSS() {
  accept("", (ts, path) => {
    if (!path.endsWith(".css")) return;
    for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {
      if (decodePath(new URL(link.href, location.href).pathname) !== path) continue;
      const next = link.cloneNode();
      next.href = path + "?" + ts;
      next.addEventListener("load", () => link.remove());
      link.after(next);
    }
  });
}

async function dispatch(msg) {
  const ts = msg.ts || Date.now();
  const paths = Array.from(listeners.keys()).sort((a, b) => b.length - a.length);
  for (const path of paths) {
    if (!msg.path.startsWith(path)) continue;
    for (const callback of listeners.get(path)) {
      try {
        await callback(ts, msg.path);
      } catch (err) {
        console.error("[hotweb] update failed for", path, err);
      }
    }
  }
  setTimeout(() => refreshers.forEach((cb) => cb()), 20);
}

function connect() {
  const url = new URL(endpoint, import.meta.url);
  url.protocol = url.protocol === "https:" ? "wss:" : "ws:";
  const socket = new WebSocket(url);
  socket.addEventListener("open", () => log("connected", url.href));
  socket.addEventListener("message", (event) => {
    const msg = JSON.parse(event.data);
    log("changed", msg.path);
    dispatch(msg);
  });
  socket.addEventListener("close", () => {
    log("disconnected, retrying");
    setTimeout(connect, 1000);
  });
}

connect();
"#;

/// Render the bootstrap script.
#[must_use]
pub fn render_client(debug: bool, websocket_path: &str) -> String {
    CLIENT_TEMPLATE
        .replace("__HOTWEB_DEBUG__", if debug { "true" } else { "false" })
        .replace("__HOTWEB_ENDPOINT__", &escape_js(websocket_path))
}

//! `hotweb` serve implementation.
//!
//! Serves a directory over HTTP, answers module requests with hot-swapping
//! proxies, and pushes file changes to connected browsers.

use hotweb_core::HotwebConfig;
use hotweb_server::Hotweb;
use miette::{IntoDiagnostic, Result, WrapErr};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Serve action, assembled from CLI flags.
#[derive(Debug, Clone)]
pub struct ServeAction {
    pub dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub prefix: String,
    pub ignore: Vec<String>,
    pub cache_dir: Option<PathBuf>,
    pub jsx_factory: String,
    pub reload_export: String,
    pub debug: bool,
    pub poll: bool,
    pub watch_interval_ms: u64,
    pub open: bool,
    /// Logs are JSON; skip the human-readable banner.
    pub json: bool,
}

impl ServeAction {
    fn config(&self, root: PathBuf) -> HotwebConfig {
        HotwebConfig::new(root)
            .with_mount_prefix(&self.prefix)
            .with_ignore_prefixes(self.ignore.iter().map(|p| p.trim().to_string()))
            .with_cache_dir(self.cache_dir.clone())
            .with_jsx_factory(self.jsx_factory.clone())
            .with_reload_export(self.reload_export.clone())
            .with_debug(self.debug)
            .with_poll_watch(self.poll)
            .with_watch_interval_ms(self.watch_interval_ms)
    }
}

pub async fn run(action: ServeAction) -> Result<()> {
    let root = dunce::canonicalize(&action.dir)
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot serve {}", action.dir.display()))?;
    let config = action.config(root.clone());
    let prefix = config.mount_prefix.clone();

    let hotweb = Arc::new(Hotweb::new(config).into_diagnostic()?);
    let _watch = hotweb
        .watch()
        .into_diagnostic()
        .wrap_err("failed to start file watcher")?;

    let app = hotweb.router().layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind((action.host.as_str(), action.port))
        .await
        .into_diagnostic()
        .wrap_err_with(|| format!("cannot listen on {}:{}", action.host, action.port))?;
    let addr = listener.local_addr().into_diagnostic()?;
    let url = page_url(&action.host, addr.port(), &prefix);

    info!(%addr, root = %root.display(), prefix = %prefix, "Listening");
    if !action.json {
        println!();
        println!("  hotweb {}", env!("CARGO_PKG_VERSION"));
        println!("  Serving {} at {url}", root.display());
        println!("  Hot module replacement enabled");
        println!();
        println!("  Press Ctrl+C to stop");
        println!();
    }

    if action.open {
        if let Err(error) = open_browser(&url) {
            warn!(%error, url, "Failed to open browser");
        }
    }

    let shutdown_hotweb = Arc::clone(&hotweb);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Websocket sessions outlive their HTTP connection
            shutdown_hotweb.clients().disconnect_all();
        })
        .await
        .into_diagnostic()?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "Cannot listen for Ctrl+C; stop the process another way");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Browser URL for the served page.
fn page_url(host: &str, port: u16, prefix: &str) -> String {
    let host = match host {
        "0.0.0.0" | "::" | "[::]" | "" => "localhost",
        h if h.contains(':') => return format!("http://[{h}]:{port}{prefix}/"),
        h => h,
    };
    format!("http://{host}:{port}{prefix}/")
}

fn open_browser(url: &str) -> std::io::Result<()> {
    #[cfg(target_os = "macos")]
    {
        std::process::Command::new("open").arg(url).spawn()?;
    }
    #[cfg(target_os = "linux")]
    {
        std::process::Command::new("xdg-open").arg(url).spawn()?;
    }
    #[cfg(target_os = "windows")]
    {
        std::process::Command::new("cmd")
            .args(["/C", "start", url])
            .spawn()?;
    }
    Ok(())
}

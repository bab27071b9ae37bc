#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

mod commands;
mod logging;

use clap::builder::FalseyValueParser;
use clap::{ArgAction, Parser};
use hotweb_core::config::{DEFAULT_JSX_FACTORY, DEFAULT_RELOAD_EXPORT, DEFAULT_WATCH_INTERVAL_MS};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "hotweb")]
#[command(author, version, about = "Live-reloading dev server for native ES modules", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Emit JSON formatted logs
    #[arg(long)]
    json: bool,

    /// Port to listen on
    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Directory to serve
    #[arg(short, long, default_value = ".", value_name = "PATH")]
    dir: PathBuf,

    /// Path prefixes served without module proxies (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "PREFIX")]
    ignore: Vec<String>,

    /// URL prefix the server is mounted under
    #[arg(long, default_value = "", value_name = "PREFIX")]
    prefix: String,

    /// Keep compiled modules in this directory instead of in memory
    #[arg(long, value_name = "PATH")]
    cache_dir: Option<PathBuf>,

    /// Function JSX elements compile to
    #[arg(long, env = "JSX_FACTORY", default_value = DEFAULT_JSX_FACTORY)]
    jsx_factory: String,

    /// Export name that makes a module reload the page instead of hot swapping
    #[arg(long, default_value = DEFAULT_RELOAD_EXPORT, value_name = "NAME")]
    reload_export: String,

    /// Log websocket traffic in the browser console
    #[arg(long, env = "HOTWEB_DEBUG", action = ArgAction::SetTrue, value_parser = FalseyValueParser::new())]
    debug: bool,

    /// Poll for changes instead of using OS notifications
    #[arg(long)]
    poll: bool,

    /// Change coalescing window (and poll interval) in milliseconds
    #[arg(long, default_value_t = DEFAULT_WATCH_INTERVAL_MS, value_name = "MS")]
    watch_interval_ms: u64,

    /// Open the served page in a browser
    #[arg(long)]
    open: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.json);

    let action = commands::serve::ServeAction {
        dir: cli.dir,
        host: cli.host,
        port: cli.port,
        prefix: cli.prefix,
        ignore: cli.ignore,
        cache_dir: cli.cache_dir,
        jsx_factory: cli.jsx_factory,
        reload_export: cli.reload_export,
        debug: cli.debug,
        poll: cli.poll,
        watch_interval_ms: cli.watch_interval_ms,
        open: cli.open,
        json: cli.json,
    };

    let rt = tokio::runtime::Runtime::new().into_diagnostic()?;
    rt.block_on(commands::serve::run(action))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["hotweb"]).unwrap();
        assert_eq!(cli.port, 8080);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.dir, PathBuf::from("."));
        assert!(cli.ignore.is_empty());
        assert_eq!(cli.watch_interval_ms, 100);
        assert_eq!(cli.reload_export, "noHMR");
        assert!(!cli.poll);
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "hotweb",
            "-p",
            "3000",
            "--dir",
            "site",
            "--ignore",
            "/vendor,/node_modules",
            "--prefix",
            "/ui",
            "--jsx-factory",
            "h",
            "--debug",
            "--poll",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.port, 3000);
        assert_eq!(cli.dir, PathBuf::from("site"));
        assert_eq!(cli.ignore, vec!["/vendor", "/node_modules"]);
        assert_eq!(cli.prefix, "/ui");
        assert_eq!(cli.jsx_factory, "h");
        assert!(cli.debug);
        assert!(cli.poll);
        assert_eq!(cli.verbose, 2);
    }
}

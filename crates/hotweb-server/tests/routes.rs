//! HTTP behavior against a real listening server.

use hotweb_core::{HotwebConfig, MakeFs, MemStore, Store, TransformError};
use hotweb_server::Hotweb;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

fn fake_jsx(fs: &dyn Store, _dst: &str, src: &str) -> Result<Vec<u8>, TransformError> {
    let source = fs.read(src)?;
    if source.starts_with(b"throw") {
        return Err(TransformError::Parse("unexpected token".to_string()));
    }
    let mut out = b"/* compiled */\n".to_vec();
    out.extend_from_slice(&source);
    Ok(out)
}

fn site() -> MakeFs {
    let source = MemStore::new();
    let files: &[(&str, &str)] = &[
        ("/app.js", "export function render() {}\nexport let count = 0;\n"),
        ("/cold.js", "export const noHMR = true;\nexport function boot() {}\n"),
        ("/view.jsx", "export const View = () => <div/>;\n"),
        ("/broken.jsx", "throw <oops>\n"),
        ("/style.css", "body { margin: 0; }\n"),
        ("/index.html", "<!doctype html><title>home</title>\n"),
        ("/docs/index.html", "<h1>docs</h1>\n"),
        ("/vendor/lib.js", "export const vendored = 1;\n"),
        ("/lib/_internal.js", "export const internal = 1;\n"),
        ("/my page.js", "export const spaced = 1;\n"),
    ];
    for (path, contents) in files {
        source.write(path, contents.as_bytes()).unwrap();
    }

    let mut fs = MakeFs::new(source, MemStore::new());
    fs.register(".js", ".jsx", fake_jsx);
    fs
}

async fn spawn(config: HotwebConfig) -> SocketAddr {
    let hotweb = Arc::new(Hotweb::with_fs(config, site()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = hotweb.router();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn config() -> HotwebConfig {
    HotwebConfig::new(PathBuf::from("/srv")).with_ignore_prefixes(["/vendor"])
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

async fn get(addr: SocketAddr, path: &str) -> (StatusCode, String, String) {
    let resp = client()
        .get(format!("http://{addr}{path}"))
        .send()
        .await
        .unwrap();
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    (status, content_type, resp.text().await.unwrap())
}

#[tokio::test]
async fn test_module_request_gets_proxy() {
    let addr = spawn(config()).await;
    let (status, content_type, body) = get(addr, "/app.js").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/javascript"));
    assert!(body.starts_with("import * as hotweb from '/.hotweb/client.mjs';\n"));
    assert!(body.contains("import * as mod from '/app.js?0';"));
    assert!(body.contains("let renderProxy = mod.render;"));
    assert!(body.contains("let countProxy = mod.count;"));
    assert!(body.contains("\tlet newMod = await import(\"/app.js?\" + ts);"));
    assert!(body.contains("\tcountProxy as count,\n"));
}

#[tokio::test]
async fn test_query_serves_real_module() {
    let addr = spawn(config()).await;
    let (status, content_type, body) = get(addr, "/app.js?0").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/javascript"));
    assert_eq!(body, "export function render() {}\nexport let count = 0;\n");
}

#[tokio::test]
async fn test_reload_export_proxy() {
    let addr = spawn(config()).await;
    let (_, _, body) = get(addr, "/cold.js").await;

    assert!(body.contains("\tlocation.reload();\n"));
    assert!(!body.contains("newMod"));
    assert!(body.contains("\tbootProxy as boot,\n"));
}

#[tokio::test]
async fn test_derived_module() {
    let addr = spawn(config()).await;

    let (status, _, body) = get(addr, "/view.js?1700000000000").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("/* compiled */\n"));

    let (status, _, proxy) = get(addr, "/view.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(proxy.contains("let ViewProxy = mod.View;"));
}

#[tokio::test]
async fn test_build_failure_is_500() {
    let addr = spawn(config()).await;
    let (status, _, body) = get(addr, "/broken.js").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("/broken.js"));
    assert!(body.contains("unexpected token"));
}

#[tokio::test]
async fn test_missing_module_is_404() {
    let addr = spawn(config()).await;
    assert_eq!(get(addr, "/missing.js").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(addr, "/missing.js?3").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(addr, "/missing.css").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ignored_and_hidden_are_served_raw() {
    let addr = spawn(config()).await;

    let (status, _, body) = get(addr, "/vendor/lib.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "export const vendored = 1;\n");

    let (status, _, body) = get(addr, "/lib/_internal.js").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "export const internal = 1;\n");
}

#[tokio::test]
async fn test_static_files() {
    let addr = spawn(config()).await;

    let (status, content_type, body) = get(addr, "/style.css").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/css"));
    assert_eq!(body, "body { margin: 0; }\n");

    let (status, content_type, body) = get(addr, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/html"));
    assert!(body.contains("<title>home</title>"));
}

#[tokio::test]
async fn test_directory_redirect_and_index() {
    let addr = spawn(config()).await;

    let resp = client()
        .get(format!("http://{addr}/docs"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::MOVED_PERMANENTLY);
    assert_eq!(resp.headers().get(LOCATION).unwrap(), "/docs/");

    let (status, _, body) = get(addr, "/docs/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "<h1>docs</h1>\n");
}

#[tokio::test]
async fn test_percent_encoded_path() {
    let addr = spawn(config()).await;
    let (status, _, body) = get(addr, "/my%20page.js").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("let spacedProxy = mod.spaced;"));
    assert!(body.contains("import * as mod from '/my%20page.js?0';"));
    assert!(body.contains("hotweb.accept('/my page.js', "));
}

#[tokio::test]
async fn test_client_script() {
    let addr = spawn(config().with_debug(true)).await;
    let (status, content_type, body) = get(addr, "/.hotweb/client.mjs").await;

    assert_eq!(status, StatusCode::OK);
    assert!(content_type.starts_with("text/javascript"));
    assert!(body.starts_with("const debug = true;\n"));
    assert!(body.contains("const endpoint = \"/.hotweb\";"));
    assert!(body.contains("export function accept("));

    assert_eq!(get(addr, "/.hotweb/other.mjs").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_mount_prefix() {
    let addr = spawn(config().with_mount_prefix("/ui")).await;

    let (status, _, body) = get(addr, "/ui/app.js").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("import * as hotweb from '/ui/.hotweb/client.mjs';\n"));
    assert!(body.contains("import * as mod from '/ui/app.js?0';"));

    let (status, _, body) = get(addr, "/ui/.hotweb/client.mjs").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("const endpoint = \"/ui/.hotweb\";"));

    let (status, _, body) = get(addr, "/ui/style.css").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "body { margin: 0; }\n");

    assert_eq!(get(addr, "/app.js").await.0, StatusCode::NOT_FOUND);
    assert_eq!(get(addr, "/uix/app.js").await.0, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_get_is_rejected() {
    let addr = spawn(config()).await;
    let resp = client()
        .post(format!("http://{addr}/app.js"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

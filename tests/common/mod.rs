//! Shared utilities for integration testing.

#![allow(dead_code)]

use app_runtime::config::RuntimeConfig;
use app_runtime::deploy::HandlerCatalog;
use app_runtime::lifecycle::{build_runtime, Runtime};
use axum::Router;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const API_KEY: &str = "integration-test-key";

/// Manifest used by most tests: greeting, bean echo, access log filter, echo socket.
pub const SHOP_MANIFEST: &str = r#"
[[route]]
path = "/hello"
methods = ["GET"]
handler = "hello"

[[route]]
path = "/orders"
methods = ["POST"]
handler = "echo"
consumes = "Order"
produces = "Order"

[[filter]]
pattern = "/*"
handler = "access-log"

[[socket]]
path = "/ws"
handler = "ws-echo"
"#;

/// Runtime whose deploy directories live in a temporary directory.
pub struct TestRuntime {
    pub root: TempDir,
    pub runtime: Runtime,
}

impl TestRuntime {
    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.path().join(relative)
    }
}

pub fn test_config(root: &Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.deploy.directory = root.join("apps");
    config.deploy.work_directory = root.join("work");
    config.deploy.backup_directory = root.join("backups");
    config.admin.enabled = true;
    config.admin.api_key = API_KEY.to_string();
    config.admin.bind_address = "127.0.0.1:0".to_string();
    config
}

/// Build a runtime after `prepare` has laid out files under the root.
pub fn start_runtime_with(
    prepare: impl FnOnce(&Path),
    adjust: impl FnOnce(&mut RuntimeConfig),
) -> TestRuntime {
    let root = tempfile::tempdir().unwrap();
    prepare(root.path());
    let mut config = test_config(root.path());
    adjust(&mut config);
    let runtime = build_runtime(config, HandlerCatalog::with_builtins()).unwrap();
    TestRuntime { root, runtime }
}

pub fn start_runtime() -> TestRuntime {
    start_runtime_with(|_| {}, |_| {})
}

/// Write an exploded application directory.
pub fn write_app(dir: &Path, manifest: &str, files: &[(&str, &str)]) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("app.toml"), manifest).unwrap();
    for (name, content) in files {
        let path = dir.join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

/// Write a tar archive holding `app.toml` plus extra files.
pub fn build_archive(path: &Path, manifest: &str, files: &[(&str, &str)]) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut builder = tar::Builder::new(std::fs::File::create(path).unwrap());
    let entries = std::iter::once(("app.toml", manifest)).chain(files.iter().copied());
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, content.as_bytes()).unwrap();
    }
    builder.finish().unwrap();
}

/// Manifest binding `GET /v<marker>` to the greeting handler.
pub fn versioned_manifest(marker: u32) -> String {
    format!(
        "[[route]]\npath = \"/v{marker}\"\nmethods = [\"GET\"]\nhandler = \"hello\"\n"
    )
}

/// Serve a router on an ephemeral local port.
pub async fn spawn_router(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

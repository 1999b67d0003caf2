#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use plainwire::config::{ClientConfig, ServerConfig};
use plainwire::server::resolver::FsResolver;
use plainwire::server::{Server, ServerHandle};

static NEXT_DIR: AtomicUsize = AtomicUsize::new(0);

/// A scratch directory removed on drop.
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let n = NEXT_DIR.fetch_add(1, Ordering::Relaxed);
        let path = std::env::temp_dir().join(format!(
            "plainwire-{label}-{}-{nanos}-{n}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path).unwrap();
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

/// A running server with its own public and receive directories.
pub struct TestServer {
    pub handle: ServerHandle,
    pub public: TempDir,
    pub receive: TempDir,
}

impl TestServer {
    pub fn start(keep_alive_timeout_ms: u64) -> Self {
        let public = TempDir::new("public");
        let receive = TempDir::new("receive");
        std::fs::write(public.path().join("index.html"), "<h1>hello</h1>").unwrap();

        let config = ServerConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            public_dir: public.path().to_path_buf(),
            receive_dir: receive.path().to_path_buf(),
            keep_alive_timeout_ms,
            ..ServerConfig::default()
        };
        let resolver = Arc::new(FsResolver::from_config(&config));
        let handle = Server::bind(config, resolver).unwrap().start().unwrap();

        Self {
            handle,
            public,
            receive,
        }
    }

    pub fn port(&self) -> u16 {
        self.handle.local_addr().port()
    }

    pub fn client_config(&self, receive_dir: &Path) -> ClientConfig {
        ClientConfig {
            default_host: "127.0.0.1".to_string(),
            default_port: self.port(),
            receive_dir: receive_dir.to_path_buf(),
            io_timeout_ms: 3_000,
            settle_ms: 30,
            max_redirects: 5,
        }
    }
}

//! Shared utilities for integration tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use zdd_server::config::ServerConfig;
use zdd_server::lifecycle::{discover, startup, LifecycleSignal, MarkerInfo, StartupError};

/// A server running in the background of a test.
pub struct TestServer {
    pub dir: TempDir,
    pub pid_file: PathBuf,
    pub markers: MarkerInfo,
    pub signals: mpsc::UnboundedSender<LifecycleSignal>,
    pub handle: JoinHandle<Result<(), StartupError>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.markers.port)
    }

    pub fn port_file(&self) -> PathBuf {
        self.dir.path().join(format!("{}.port", self.markers.pid))
    }

    pub fn send(&self, signal: LifecycleSignal) {
        self.signals.send(signal).unwrap();
    }

    pub fn markers_present(&self) -> bool {
        self.pid_file.exists() || self.port_file().exists()
    }

    /// Wait for the server to exit, failing the test after `limit`.
    pub async fn exited_within(self, limit: Duration) -> (Result<(), StartupError>, TempDir) {
        let TestServer { dir, handle, .. } = self;
        let result = tokio::time::timeout(limit, handle)
            .await
            .expect("server did not exit in time")
            .expect("server task panicked");
        (result, dir)
    }
}

/// Config bound to loopback with markers in `dir`.
pub fn test_config(dir: &Path) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.markers.pid_file = dir.join("node.pid");
    config
}

/// Start a server and wait until its marker files are published.
pub async fn start_server(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    configure(&mut config);
    let pid_file = config.markers.pid_file.clone();

    let (signals, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(startup::run(config, rx));

    let markers = wait_for_markers(&pid_file).await;
    TestServer {
        dir,
        pid_file,
        markers,
        signals,
        handle,
    }
}

/// Poll for marker files the way deployment tooling does.
pub async fn wait_for_markers(pid_file: &Path) -> MarkerInfo {
    for _ in 0..100 {
        if let Some(info) = discover(pid_file) {
            return info;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("marker files never appeared at {}", pid_file.display());
}

/// Open a keep-alive connection and complete one request on it, so the
/// server has definitely accepted and tracked it.
pub async fn open_idle_connection(port: u16) -> TcpStream {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    while !String::from_utf8_lossy(&received).ends_with("Hello World\n") {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed before response completed");
        received.extend_from_slice(&buf[..n]);
    }
    stream
}

//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use web_deadend::config::DeadendConfig;
use web_deadend::http::{build_router, AppState, HttpServer};

/// Address the mock connection appears to come from.
pub const SCANNER_ADDR: &str = "203.0.113.7:40000";

/// Write a route table into `dir` and return its path.
pub fn write_routes(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("responses.yaml");
    std::fs::write(&path, yaml).unwrap();
    path
}

/// Test-mode config reading routes from `responses_file`.
pub fn test_config(responses_file: &Path) -> DeadendConfig {
    let mut config = DeadendConfig::default();
    config.testing = true;
    config.responses.file = responses_file.display().to_string();
    config
}

/// Router whose requests all arrive from `SCANNER_ADDR`.
pub fn app(state: AppState) -> Router {
    app_from(state, SCANNER_ADDR.parse().unwrap())
}

/// Router whose requests all arrive from `remote`.
pub fn app_from(state: AppState, remote: SocketAddr) -> Router {
    build_router(state).layer(MockConnectInfo(remote))
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// A real server on an ephemeral loopback port.
pub struct RunningServer {
    pub addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl RunningServer {
    pub async fn start(config: DeadendConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stopped) = oneshot::channel::<()>();
        let server = HttpServer::new(AppState::new(config, None));
        let handle = tokio::spawn(server.run(listener, wait(stopped)));
        Self { addr, stop, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap();
    }
}

fn wait(stopped: oneshot::Receiver<()>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = stopped.await;
    }
}

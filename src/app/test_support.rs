//! Loopback HTTP fixture for exercising real sockets in tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub delay: Duration,
}

impl Route {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::bytes(body.into().into_bytes(), "text/html; charset=utf-8")
    }

    /// Raw body with an explicit content type, for non-UTF-8 pages.
    pub fn bytes(body: impl Into<Vec<u8>>, content_type: &str) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_type: content_type.to_string(),
            headers: Vec::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok("")
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Self::status(status).header("location", location)
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub target: String,
    pub user_agent: Option<String>,
}

#[derive(Default)]
struct Shared {
    routes: Mutex<HashMap<String, Route>>,
    seen: Mutex<Vec<SeenRequest>>,
    hits: AtomicUsize,
}

/// Serves scripted routes keyed by request target (path plus query, or the
/// absolute URL when it is used as a forward proxy). Unknown targets answer 404.
pub struct FixtureServer {
    base: String,
    shared: Arc<Shared>,
}

impl FixtureServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fixture listener");
        let addr = listener.local_addr().expect("fixture addr");
        let shared = Arc::new(Shared::default());
        let accept_shared = shared.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = accept_shared.clone();
                tokio::spawn(async move {
                    let _ = serve_connection(stream, shared).await;
                });
            }
        });
        Self {
            base: format!("http://{addr}"),
            shared,
        }
    }

    pub fn route(&self, target: &str, route: Route) -> &Self {
        self.shared
            .routes
            .lock()
            .expect("routes lock")
            .insert(target.to_string(), route);
        self
    }

    pub fn url(&self, target: &str) -> String {
        format!("{}{}", self.base, target)
    }

    pub fn hits(&self) -> usize {
        self.shared.hits.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.shared.seen.lock().expect("seen lock").clone()
    }
}

async fn serve_connection(mut stream: TcpStream, shared: Arc<Shared>) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 2048];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default().to_string();
    let user_agent = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("user-agent"))
        .map(|(_, value)| value.trim().to_string());

    shared.hits.fetch_add(1, Ordering::SeqCst);
    shared.seen.lock().expect("seen lock").push(SeenRequest {
        method: method.clone(),
        target: target.clone(),
        user_agent,
    });

    let route = shared
        .routes
        .lock()
        .expect("routes lock")
        .get(&target)
        .cloned()
        .unwrap_or_else(|| Route::status(404));
    if !route.delay.is_zero() {
        tokio::time::sleep(route.delay).await;
    }

    let mut status_block = format!(
        "HTTP/1.1 {} Fixture\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n",
        route.status,
        route.content_type,
        route.body.len()
    );
    for (name, value) in &route.headers {
        status_block.push_str(&format!("{name}: {value}\r\n"));
    }
    status_block.push_str("\r\n");
    let mut response = status_block.into_bytes();
    if method != "HEAD" {
        response.extend_from_slice(&route.body);
    }
    stream.write_all(&response).await?;
    stream.shutdown().await
}

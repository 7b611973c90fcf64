//! A tiny HTTP/1.1 server for tests, serving canned responses per path.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct Route {
    status: u16,
    head_status: Option<u16>,
    body: Vec<u8>,
    headers: Vec<(String, String)>,
    delay: Duration,
    /// Bytes announced in Content-Length but never sent.
    missing_bytes: usize,
    /// Close the connection on GET without answering.
    drop_get: bool,
}

impl Route {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            head_status: None,
            body,
            headers: Vec::new(),
            delay: Duration::ZERO,
            missing_bytes: 0,
            drop_get: false,
        }
    }

    pub fn text(body: &str) -> Self {
        Self::ok(body.as_bytes().to_vec())
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            ..Self::text(body)
        }
    }

    pub fn redirect(location: &str) -> Self {
        Self::status(302, "").header("Location", location)
    }

    /// Answer HEAD requests with a different status than GET.
    pub fn head_status(mut self, status: u16) -> Self {
        self.head_status = Some(status);
        self
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Announce `missing` more body bytes than are sent, then close.
    pub fn truncated(mut self, missing: usize) -> Self {
        self.missing_bytes = missing;
        self
    }

    /// Answer HEAD normally but hang up on GET.
    pub fn drop_get(mut self) -> Self {
        self.drop_get = true;
        self
    }
}

pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let routes: Arc<HashMap<String, Route>> =
            Arc::new(routes.into_iter().map(|(p, r)| (p.to_string(), r)).collect());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let routes = routes.clone();
                let counter = counter.clone();
                tokio::spawn(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let _ = serve(stream, &routes).await;
                });
            }
        });

        Self { addr, hits, handle }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Number of requests received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, routes: &HashMap<String, Route>) -> std::io::Result<()> {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        request.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&request);
    let mut parts = head.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or("/");
    let path = target.split('?').next().unwrap_or("/");

    let not_found = Route::status(404, "not found");
    let route = routes.get(path).unwrap_or(&not_found);
    if !route.delay.is_zero() {
        tokio::time::sleep(route.delay).await;
    }

    let is_head = method == "HEAD";
    if !is_head && route.drop_get {
        return Ok(());
    }
    let status = if is_head {
        route.head_status.unwrap_or(route.status)
    } else {
        route.status
    };

    let mut response = format!(
        "HTTP/1.1 {status} Canned\r\nContent-Length: {}\r\nConnection: close\r\n",
        route.body.len() + route.missing_bytes
    );
    for (name, value) in &route.headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");

    stream.write_all(response.as_bytes()).await?;
    if !is_head {
        stream.write_all(&route.body).await?;
    }
    stream.shutdown().await
}

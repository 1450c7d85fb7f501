//! Loopback HTTP/1.1 responder for tests that go through reqwest.

use reqwest::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone)]
pub(crate) struct Route {
    path: String,
    status: u16,
    body: Vec<u8>,
    /// Advertise more bytes than are sent, then hang up.
    truncated: bool,
}

impl Route {
    pub(crate) fn ok(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.to_string(),
            status: 200,
            body: body.into(),
            truncated: false,
        }
    }

    pub(crate) fn status(path: &str, status: u16) -> Self {
        Self {
            path: path.to_string(),
            status,
            body: b"{}".to_vec(),
            truncated: false,
        }
    }

    pub(crate) fn truncated(path: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            truncated: true,
            ..Self::ok(path, body)
        }
    }
}

/// Client that never routes loopback traffic through an env proxy.
pub(crate) fn client() -> Client {
    Client::builder().no_proxy().build().unwrap()
}

/// Serves `routes` until the test runtime shuts down. Unknown paths get 404.
pub(crate) async fn serve(routes: Vec<Route>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(respond(socket, routes.clone()));
        }
    });
    format!("http://{addr}")
}

async fn respond(mut socket: TcpStream, routes: Vec<Route>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    // Drain the request body so closing the socket does not reset it.
    while buf.len() < head_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
    let route = routes
        .into_iter()
        .find(|r| r.path == path)
        .unwrap_or_else(|| Route::status(&path, 404));
    let advertised = if route.truncated {
        route.body.len() + 64
    } else {
        route.body.len()
    };

    let head = format!(
        "HTTP/1.1 {} Test\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        route.status, advertised
    );
    let _ = socket.write_all(head.as_bytes()).await;
    let _ = socket.write_all(&route.body).await;
    let _ = socket.shutdown().await;
}

//! HTTP plumbing shared by the remote sources.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::error::{SourceError, SourceResult};

/// Build a client with a per-request timeout.
pub(crate) fn client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Return the body of a successful response, mapping HTTP failures onto
/// the source error taxonomy.
pub(crate) async fn success_body(response: Response) -> SourceResult<Vec<u8>> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(format!(
            "{} returned 404",
            response.url()
        )));
    }

    if !status.is_success() {
        return Err(SourceError::Network(format!(
            "{} returned HTTP {}",
            response.url(),
            status
        )));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| SourceError::Network(format!("failed to read response: {e}")))?;
    Ok(body.to_vec())
}

/// Throwaway HTTP server answering every request with one canned response.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Serve `body` with `status` on an ephemeral port; returns the base URL.
    pub async fn serve(status: u16, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(respond(socket, status, body));
            }
        });

        format!("http://{addr}")
    }

    /// A URL nothing is listening on.
    pub async fn closed_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    async fn respond(mut socket: TcpStream, status: u16, body: &'static str) {
        read_request(&mut socket).await;

        let reason = match status {
            200 => "OK",
            404 => "Not Found",
            _ => "Error",
        };
        let response = format!(
            "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    }

    async fn read_request(socket: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        let header_end = loop {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
        let content_length = headers
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);

        while buf.len() < header_end + content_length {
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
    }
}

//! Minimal async HTTP/1.1 transport using Tokio.
//!
//! [`HttpClient`] opens one TCP connection per request, writes the request,
//! reads until the response is complete and maps non-2xx statuses to
//! [`TransportError::HttpStatus`]. It never retries; retry policy belongs to
//! whoever builds the executor.
//!
//! Any other transport works with the coordinator as long as its failures are
//! expressed as a [`TransportError`].

use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::http::{
    Request,
    response::{Response, ResponseError},
};

/// Failures raised by an executor. The cache passes them through untouched.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("malformed response: {0}")]
    Malformed(#[from] ResponseError),

    #[error("response exceeds maximum allowed size of {max_bytes} bytes")]
    ResponseTooLarge { max_bytes: usize },

    #[error("server responded with {status} {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Status code of an [`TransportError::HttpStatus`] failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Maximum size of a complete HTTP response we will buffer (8 MiB).
const MAX_RESPONSE_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per exchange.
const INITIAL_BUF_SIZE: usize = 4096;

/// A tiny HTTP/1.1 client bound to one upstream address.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tenant_cache::client::HttpClient;
/// use tenant_cache::http::{Method, Request};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = HttpClient::new("127.0.0.1:8080").with_timeout(Duration::from_secs(5));
///     let response = client.send(&Request::new(Method::Get, "/health")).await?;
///     println!("{}", response.status());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    addr: String,
    timeout: Option<Duration>,
}

impl HttpClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: None,
        }
    }

    /// Bounds the whole exchange (connect, write, read).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends `request` and returns the successful response.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Connect`] / [`TransportError::Network`] — socket failures.
    /// - [`TransportError::Malformed`] — the server sent something that is not HTTP/1.1.
    /// - [`TransportError::ResponseTooLarge`] — more than 8 MiB was buffered.
    /// - [`TransportError::HttpStatus`] — the server answered with a non-2xx status.
    /// - [`TransportError::Timeout`] — the configured timeout elapsed.
    pub async fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let exchange = self.exchange(request);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| TransportError::Timeout(limit))??,
            None => exchange.await?,
        };

        if !response.is_success() {
            warn!(
                addr = %self.addr,
                method = %request.method(),
                path = %request.path(),
                status = response.status(),
                "upstream returned an error status"
            );
            return Err(TransportError::HttpStatus {
                status: response.status(),
                reason: response.reason().to_owned(),
            });
        }

        Ok(response)
    }

    async fn exchange(&self, request: &Request) -> Result<Response, TransportError> {
        let mut stream =
            TcpStream::connect(&self.addr)
                .await
                .map_err(|e| TransportError::Connect {
                    addr: self.addr.clone(),
                    source: e,
                })?;

        debug!(
            addr = %self.addr,
            method = %request.method(),
            target = %request.target(),
            "sending request"
        );
        stream.write_all(&request.to_bytes(&self.addr)).await?;
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        loop {
            let bytes_read = stream.read_buf(&mut buf).await?;
            let at_eof = bytes_read == 0;

            if buf.len() > MAX_RESPONSE_SIZE {
                return Err(TransportError::ResponseTooLarge {
                    max_bytes: MAX_RESPONSE_SIZE,
                });
            }

            match Response::parse_for(request.method(), &buf, at_eof) {
                Ok(response) => return Ok(response),
                Err(ResponseError::Incomplete) if !at_eof => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Method;
    use crate::key::QueryParams;
    use tokio::net::TcpListener;

    /// Accepts one connection, captures the request head and answers with `reply`.
    async fn one_shot_server(reply: &'static [u8]) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = BytesMut::with_capacity(1024);
            while !buf.ends_with(b"\r\n\r\n") {
                if socket.read_buf(&mut buf).await.unwrap() == 0 {
                    break;
                }
            }
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8(buf.to_vec()).unwrap()
        });
        (addr, handle)
    }

    #[tokio::test]
    async fn send_returns_parsed_response() {
        let (addr, server) =
            one_shot_server(b"HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\n[42]").await;
        let client = HttpClient::new(addr);
        let request = Request::new(Method::Get, "/orders")
            .query(QueryParams::new().with("status", "pending"));

        let response = client.send(&request).await.unwrap();
        assert_eq!(response.text(), Some("[42]"));

        let seen = server.await.unwrap();
        assert!(seen.starts_with("GET /orders?status=pending HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn body_read_until_eof_without_length() {
        let (addr, _server) = one_shot_server(b"HTTP/1.1 200 OK\r\n\r\nstreamed body").await;
        let response = HttpClient::new(addr)
            .send(&Request::new(Method::Get, "/"))
            .await
            .unwrap();
        assert_eq!(response.text(), Some("streamed body"));
    }

    #[tokio::test]
    async fn head_reply_has_no_body_despite_content_length() {
        let (addr, server) =
            one_shot_server(b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n").await;
        let response = HttpClient::new(addr)
            .send(&Request::new(Method::Head, "/menu"))
            .await
            .unwrap();
        assert_eq!(response.headers().content_length(), Some(1234));
        assert!(response.body().is_empty());

        let seen = server.await.unwrap();
        assert!(seen.starts_with("HEAD /menu HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn error_status_is_a_transport_failure() {
        let (addr, _server) =
            one_shot_server(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n")
                .await;
        let err = HttpClient::new(addr)
            .send(&Request::new(Method::Get, "/menu"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert!(err.to_string().contains("Service Unavailable"));
    }

    #[tokio::test]
    async fn garbage_reply_is_malformed() {
        let (addr, _server) = one_shot_server(b"SSH-2.0-OpenSSH\r\n\r\n").await;
        let err = HttpClient::new(addr)
            .send(&Request::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Malformed(_)));
    }

    #[tokio::test]
    async fn connect_failure_names_the_address() {
        // bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = HttpClient::new(addr.clone())
            .send(&Request::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { addr: a, .. } if a == addr));
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        // accept and never answer
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });

        let err = HttpClient::new(addr)
            .with_timeout(Duration::from_millis(50))
            .send(&Request::new(Method::Get, "/"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
    }
}

//! Outgoing HTTP/1.1 request.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, Method};
use crate::key::QueryParams;

/// A request the transport can put on the wire.
///
/// Query parameters are kept structured as [`QueryParams`] so the request line
/// and the cache key are built from the same canonical form.
///
/// # Examples
///
/// ```
/// use tenant_cache::http::{Method, Request};
/// use tenant_cache::key::QueryParams;
///
/// let request = Request::new(Method::Get, "/orders")
///     .query(QueryParams::new().with("status", "pending"))
///     .header("Accept", "application/json");
///
/// assert_eq!(request.target(), "/orders?status=pending");
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    params: QueryParams,
    headers: Headers,
    body: Bytes,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: QueryParams::new(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn query(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    /// Appends a header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &QueryParams {
        &self.params
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Path plus canonical query string, as written in the request line.
    pub fn target(&self) -> String {
        let query = self.params.canonical();
        if query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{query}", self.path)
        }
    }

    /// Serializes the request using HTTP/1.1 wire format.
    ///
    /// Automatically adds `Host`, `Connection: close` and, when a body is
    /// present, `Content-Length`. The connection is closed after every
    /// exchange so the response can be read to EOF.
    pub fn to_bytes(&self, host: &str) -> BytesMut {
        let estimated_size = 128 + self.headers.len() * 64 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("{} {} HTTP/1.1\r\n", self.method, self.target()).as_bytes());
        if !self.headers.contains("host") {
            buf.put(format!("Host: {host}\r\n").as_bytes());
        }
        buf.put(self.headers.to_string().as_bytes());
        if !self.body.is_empty() {
            buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }
        buf.put(&b"Connection: close\r\n\r\n"[..]);
        buf.put(self.body.as_ref());

        buf
    }
}

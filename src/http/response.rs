//! HTTP/1.1 response parsing using the [`httparse`] crate.
//!
//! A parsed [`Response`] is cheap to clone (the body is a [`Bytes`] handle),
//! which makes it a natural value type for the response cache.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method, StatusCode};

/// Errors that can occur while parsing an HTTP/1.1 response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("unsupported transfer encoding: {0}")]
    UnsupportedEncoding(String),
}

/// A complete HTTP response as received from the server.
///
/// # Examples
///
/// ```
/// use tenant_cache::http::response::Response;
///
/// let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n[]";
/// let response = Response::parse(raw, false).unwrap();
///
/// assert_eq!(response.status(), 200);
/// assert_eq!(response.text(), Some("[]"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    reason: String,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Maximum number of headers we accept per response.
    const MAX_HEADERS: usize = 64;

    /// Builds a response in memory, e.g. from a custom executor or a test.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status: status.as_u16(),
            reason: status.canonical_reason().to_owned(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parses a buffered response to a `GET`-like request.
    ///
    /// With a `Content-Length` header the body is exactly that many bytes and
    /// [`ResponseError::Incomplete`] is returned until they have all arrived.
    /// Without one, the body runs to the end of the connection, so the buffer
    /// only counts as complete once `at_eof` is set.
    ///
    /// # Errors
    ///
    /// - [`ResponseError::Incomplete`] — more data is needed.
    /// - [`ResponseError::Parse`] — the status line or headers are malformed.
    /// - [`ResponseError::UnsupportedEncoding`] — chunked or other transfer codings.
    pub fn parse(buf: &[u8], at_eof: bool) -> Result<Self, ResponseError> {
        Self::parse_for(&Method::Get, buf, at_eof)
    }

    /// Parses a buffered response to a request sent with `method`.
    ///
    /// Responses to `HEAD`, and `1xx`/`204`/`304` responses, never carry a
    /// body whatever their `Content-Length` says.
    ///
    /// # Errors
    ///
    /// Same as [`Response::parse`].
    pub fn parse_for(method: &Method, buf: &[u8], at_eof: bool) -> Result<Self, ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let status = raw
            .code
            .ok_or(ResponseError::MissingField { field: "status" })?;
        let reason = raw.reason.unwrap_or_default().to_owned();
        let headers = Headers::from_raw(&*raw.headers);

        if let Some(encoding) = headers.get("transfer-encoding") {
            if !encoding.eq_ignore_ascii_case("identity") {
                return Err(ResponseError::UnsupportedEncoding(encoding.to_owned()));
            }
        }

        let bodiless =
            *method == Method::Head || (100..200).contains(&status) || status == 204 || status == 304;

        let rest = &buf[body_offset..];
        let body = match headers.content_length() {
            _ if bodiless => Bytes::new(),
            Some(len) if rest.len() >= len => Bytes::copy_from_slice(&rest[..len]),
            Some(_) => return Err(ResponseError::Incomplete),
            None if at_eof => Bytes::copy_from_slice(rest),
            None => return Err(ResponseError::Incomplete),
        };

        Ok(Self {
            status,
            reason,
            headers,
            body,
        })
    }

    /// Returns the numeric status code.
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Returns the named status code, if the numeric code has one.
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body as UTF-8 text, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_content_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 13\r\n\r\n{\"orders\":[]}";
        let res = Response::parse(raw, false).unwrap();
        assert_eq!(res.status_code(), Some(StatusCode::Ok));
        assert_eq!(res.reason(), "OK");
        assert_eq!(res.headers().get("content-type"), Some("application/json"));

        let value: serde_json::Value = res.json().unwrap();
        assert_eq!(value["orders"], serde_json::json!([]));
    }

    #[test]
    fn short_body_is_incomplete() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc";
        assert!(matches!(
            Response::parse(raw, false),
            Err(ResponseError::Incomplete)
        ));
    }

    #[test]
    fn body_without_length_needs_eof() {
        let raw = b"HTTP/1.1 200 OK\r\n\r\nstreamed";
        assert!(matches!(
            Response::parse(raw, false),
            Err(ResponseError::Incomplete)
        ));
        let res = Response::parse(raw, true).unwrap();
        assert_eq!(res.text(), Some("streamed"));
    }

    #[test]
    fn no_content_needs_no_body() {
        let raw = b"HTTP/1.1 204 No Content\r\n\r\n";
        let res = Response::parse(raw, false).unwrap();
        assert!(res.is_success());
        assert!(res.body().is_empty());
    }

    #[test]
    fn head_response_ignores_content_length() {
        let raw = b"HTTP/1.1 200 OK\r\nContent-Length: 1234\r\n\r\n";
        assert!(matches!(
            Response::parse(raw, false),
            Err(ResponseError::Incomplete)
        ));

        let res = Response::parse_for(&Method::Head, raw, false).unwrap();
        assert_eq!(res.headers().content_length(), Some(1234));
        assert!(res.body().is_empty());
    }

    #[test]
    fn not_modified_ignores_content_length() {
        let raw = b"HTTP/1.1 304 Not Modified\r\nContent-Length: 512\r\n\r\n";
        let res = Response::parse(raw, false).unwrap();
        assert_eq!(res.status(), 304);
        assert!(res.body().is_empty());
    }

    #[test]
    fn chunked_is_rejected() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n";
        assert!(matches!(
            Response::parse(raw, false),
            Err(ResponseError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            Response::parse(b"NOT HTTP\r\n\r\n", true),
            Err(ResponseError::Parse(_))
        ));
    }

    #[test]
    fn built_response_is_cloneable_cache_value() {
        let res = Response::new(StatusCode::Ok)
            .header("ETag", "\"1\"")
            .with_body("menu");
        let copy = res.clone();
        assert_eq!(copy, res);
        assert_eq!(copy.text(), Some("menu"));
    }
}

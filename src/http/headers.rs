//! Header list with case-insensitive name lookup.
//!
//! Used both for outgoing request headers and for the headers of a cached
//! response, so it is cheap to clone and keeps insertion order.

use std::fmt;

/// A case-insensitive, multi-value HTTP header list.
///
/// # Examples
///
/// ```
/// use tenant_cache::http::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Accept", "application/json");
/// headers.insert("X-Restaurant", "r-17");
///
/// assert_eq!(headers.get("accept"), Some("application/json"));
/// assert_eq!(headers.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    inner: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the headers of a parsed `httparse` message.
    ///
    /// Values that are not valid UTF-8 are dropped.
    pub fn from_raw(raw: &[httparse::Header<'_>]) -> Self {
        let inner = raw
            .iter()
            .filter_map(|h| {
                let value = std::str::from_utf8(h.value).ok()?;
                Some((h.name.to_owned(), value.trim().to_owned()))
            })
            .collect();
        Self { inner }
    }

    /// Appends a header entry. Multiple values for the same name are preserved.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Returns the first value for the given header name (case-insensitive), or `None`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns `true` if at least one entry has the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Parsed `Content-Length`, if present and numeric.
    pub fn content_length(&self) -> Option<usize> {
        self.get("content-length")?.parse().ok()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over all `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Writes the headers in HTTP/1.1 wire form, one `name: value\r\n` per entry.
impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.inner {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_ignores_case() {
        let mut h = Headers::new();
        h.insert("Content-Length", "12");
        assert_eq!(h.get("CONTENT-LENGTH"), Some("12"));
        assert_eq!(h.content_length(), Some(12));
        assert!(!h.contains("etag"));
    }

    #[test]
    fn from_raw_trims_values() {
        let raw = [httparse::Header {
            name: "ETag",
            value: b" \"v1\" ",
        }];
        let h = Headers::from_raw(&raw);
        assert_eq!(h.get("etag"), Some("\"v1\""));
    }

    #[test]
    fn display_is_wire_format() {
        let mut h = Headers::new();
        h.insert("Host", "api.local");
        h.insert("Accept", "*/*");
        assert_eq!(h.to_string(), "Host: api.local\r\nAccept: */*\r\n");
    }
}

//! Cache key derivation.
//!
//! A [`CacheKey`] is derived from the tenant id, the HTTP method, the path and
//! the query parameters:
//!
//! ```text
//! <tenant>:<METHOD> <path>?<canonical query>
//! ```
//!
//! | Input                        | Treatment                                        |
//! |------------------------------|--------------------------------------------------|
//! | tenant id                    | percent-encoded, never replaced by a default     |
//! | parameter names              | sorted byte-wise, stable for duplicate names     |
//! | [`ParamValue::Many`]         | one `name=value` pair per element, caller order  |
//! | [`ParamValue::Undefined`]    | omitted                                          |
//! | empty string                 | kept as `name=`                                  |
//!
//! Keys are computed fresh for every request and never stored outside the
//! cache itself.

use std::fmt;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::http::Method;

/// Everything except RFC 3986 unreserved characters gets escaped, which in
/// particular covers `:`, `&`, `=` and `%`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// The value of a single query parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// Present in the caller's parameter object but without a value; omitted from keys.
    Undefined,
    Single(String),
    /// An array / repeated parameter. Element order is significant.
    Many(Vec<String>),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_owned())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl<T: Into<String>> From<Option<T>> for ParamValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Single(v.into()),
            None => Self::Undefined,
        }
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

/// Query parameters of a request, in the order the caller supplied them.
///
/// # Examples
///
/// ```
/// use tenant_cache::key::QueryParams;
///
/// let a = QueryParams::new().with("status", "pending").with("page", "2");
/// let b = QueryParams::new().with("page", "2").with("status", "pending");
/// assert_eq!(a.canonical(), b.canonical());
/// assert_eq!(a.canonical(), "page=2&status=pending");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    entries: Vec<(String, ParamValue)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter and returns the list, for chained construction.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds a repeated parameter, e.g. `ids=1&ids=2`.
    #[must_use]
    pub fn with_many<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(Into::into).collect::<Vec<_>>();
        self.insert(name, ParamValue::Many(values));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes the parameters into their canonical, order-independent form.
    ///
    /// The same string is used for cache keys and for the request line sent by
    /// [`crate::client::HttpClient`].
    pub fn canonical(&self) -> String {
        let mut sorted: Vec<&(String, ParamValue)> = self.entries.iter().collect();
        // stable: duplicate names keep insertion order
        sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

        let mut pairs = Vec::with_capacity(sorted.len());
        for (name, value) in sorted {
            let name = utf8_percent_encode(name, COMPONENT);
            match value {
                ParamValue::Undefined => {}
                ParamValue::Single(v) => {
                    pairs.push(format!("{name}={}", utf8_percent_encode(v, COMPONENT)));
                }
                ParamValue::Many(values) => {
                    for v in values {
                        pairs.push(format!("{name}={}", utf8_percent_encode(v, COMPONENT)));
                    }
                }
            }
        }
        pairs.join("&")
    }
}

/// An opaque, tenant-scoped cache key.
///
/// The only constructor is [`CacheKey::derive`], which requires a tenant id,
/// so there is no way to build a key that is not scoped to some tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the key for one logical request.
    ///
    /// Pure and total. An empty `tenant_id` still produces a key (prefixed by a
    /// bare `:`), which can never equal a key derived for a real tenant;
    /// rejecting empty tenants is the coordinator's job.
    ///
    /// # Examples
    ///
    /// ```
    /// use tenant_cache::http::Method;
    /// use tenant_cache::key::{CacheKey, QueryParams};
    ///
    /// let params = QueryParams::new().with("status", "pending");
    /// let key = CacheKey::derive("r-1", &Method::Get, "/orders", &params);
    /// assert_eq!(key.as_str(), "r-1:GET /orders?status=pending");
    /// ```
    pub fn derive(tenant_id: &str, method: &Method, path: &str, params: &QueryParams) -> Self {
        let tenant = utf8_percent_encode(tenant_id, COMPONENT);
        Self(format!(
            "{tenant}:{} {path}?{}",
            method.as_str(),
            params.canonical()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders(tenant: &str, params: &QueryParams) -> CacheKey {
        CacheKey::derive(tenant, &Method::Get, "/orders", params)
    }

    #[test]
    fn tenants_never_collide() {
        let params = QueryParams::new().with("status", "pending");
        assert_ne!(orders("a", &params), orders("b", &params));
        assert_ne!(orders("", &params), orders("a", &params));
    }

    #[test]
    fn tenant_cannot_forge_another_prefix() {
        let params = QueryParams::new();
        let forged = CacheKey::derive("a:GET /x?", &Method::Get, "", &params);
        let real = CacheKey::derive("a", &Method::Get, "/x?:GET ", &params);
        assert_ne!(forged, real);
        assert!(forged.as_str().starts_with("a%3AGET%20%2Fx%3F:"));
    }

    #[test]
    fn parameter_order_does_not_matter() {
        let a = QueryParams::new()
            .with("status", "pending")
            .with("limit", "20")
            .with("cursor", "abc");
        let b = QueryParams::new()
            .with("cursor", "abc")
            .with("status", "pending")
            .with("limit", "20");
        assert_eq!(orders("r", &a), orders("r", &b));
    }

    #[test]
    fn undefined_omitted_but_empty_string_kept() {
        let with_undefined = QueryParams::new()
            .with("status", "open")
            .with("since", None::<String>);
        let plain = QueryParams::new().with("status", "open");
        assert_eq!(orders("r", &with_undefined), orders("r", &plain));

        let with_empty = QueryParams::new().with("status", "open").with("since", "");
        assert_ne!(orders("r", &with_empty), orders("r", &plain));
        assert_eq!(with_empty.canonical(), "since=&status=open");
    }

    #[test]
    fn repeated_values_keep_element_order() {
        let params = QueryParams::new().with_many("ids", ["3", "1"]).with("a", "x");
        assert_eq!(params.canonical(), "a=x&ids=3&ids=1");
    }

    #[test]
    fn values_are_escaped() {
        let params = QueryParams::new().with("q", "a&b=c d");
        assert_eq!(params.canonical(), "q=a%26b%3Dc%20d");
    }

    #[test]
    fn method_is_part_of_the_key() {
        let params = QueryParams::new();
        let get = CacheKey::derive("r", &Method::Get, "/menu", &params);
        let head = CacheKey::derive("r", &Method::Head, "/menu", &params);
        assert_ne!(get, head);
        assert_eq!(get.to_string(), "r:GET /menu?");
    }
}

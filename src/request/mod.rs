//! Wire-level request model, parameter encoding and request composition.
//!
//! A [`Request`] is built once per attempt by the [`RequestBuilder`] and is
//! immutable afterwards. Parameters are expressed as a closed tree of
//! [`ParamValue`]s and flattened by the [`params`] encoder.
//!
//! # Example
//!
//! ```
//! use fetcher_core::request::{params, ParamValue, Parameters};
//!
//! let mut parameters = Parameters::new();
//! parameters.insert("name".into(), ParamValue::from("a"));
//! parameters.insert("tags".into(), ParamValue::from(vec!["x", "y"]));
//!
//! assert_eq!(params::query_string(&parameters), "name=a&tags%5B%5D=x&tags%5B%5D=y");
//! ```

mod builder;
pub mod params;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use url::Url;

pub use builder::{RequestBuilder, compose_url};
pub use params::{FilePayload, FileSource, ParamValue, Parameters};

/// HTTP methods supported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
    /// `DELETE`
    Delete,
    /// `POST`
    Post,
    /// `PUT`
    Put,
}

impl Method {
    /// Canonical upper-case method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Delete => "DELETE",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }

    /// Whether parameters travel in the body rather than the query.
    #[must_use]
    pub fn encodes_parameters_in_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "DELETE" => Ok(Self::Delete),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            other => Err(format!("unsupported method: {other}")),
        }
    }
}

/// Cache behaviour requested for a request. No cache is implemented locally;
/// the policy is passed through to the server as headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Let the protocol (server headers) decide.
    #[default]
    UseProtocolPolicy,
    /// Ask intermediaries to revalidate (`Cache-Control: no-cache`).
    ReloadIgnoringCache,
}

/// Ordered header mapping with case-insensitive unique keys.
///
/// The casing of the most recently inserted name is preserved on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Creates an empty header mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a header. Replacement keeps the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            *entry = (name, value);
        } else {
            self.entries.push((name, value));
        }
    }

    /// Looks up a header value case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Removes a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(name))?;
        Some(self.entries.remove(index).1)
    }

    /// Applies every header of `other` over this mapping.
    pub fn extend(&mut self, other: &Headers) {
        for (name, value) in other.iter() {
            self.insert(name, value);
        }
    }

    /// Iterates headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no headers are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// A fully composed request for one network attempt.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Option<Bytes>,
    cache_policy: CachePolicy,
    timeout: Duration,
}

impl Request {
    pub(crate) fn new(
        method: Method,
        url: Url,
        headers: Headers,
        body: Option<Bytes>,
        cache_policy: CachePolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            method,
            url,
            headers,
            body,
            cache_policy,
            timeout,
        }
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// The absolute request URL, including any encoded query.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Encoded body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Cache policy passed through to the server.
    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// Total timeout for the attempt.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

//! Composition of wire-level requests from a base URL, path and parameters.

use std::time::Duration;

use bytes::Bytes;
use tracing::debug;
use url::Url;

use super::params::{self, Parameters};
use super::{CachePolicy, Headers, Method, Request};
use crate::error::ClientError;

const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_LENGTH: &str = "Content-Length";
const FORM_URL_ENCODED: &str = "application/x-www-form-urlencoded";

/// Resolves `path` against an optional base URL.
///
/// Absolute URLs (anything with a scheme) and a missing base use `path`
/// verbatim. Otherwise `path` is appended to the base as path components,
/// keeping any query carried by `path`.
///
/// # Errors
///
/// Returns [`ClientError::InvalidRequest`] if the result is not a valid URL.
pub fn compose_url(base_url: Option<&Url>, path: &str) -> Result<Url, ClientError> {
    let parse = |candidate: &str| {
        Url::parse(candidate).map_err(|e| ClientError::invalid_request(candidate, e.to_string()))
    };

    let Some(base) = base_url.filter(|_| !has_scheme(path)) else {
        return parse(path);
    };

    let (path_part, query_part) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };

    let mut joined = base.clone();
    joined.set_fragment(None);
    let base_path = base.path().trim_end_matches('/');
    let relative = path_part.trim_start_matches('/');
    let new_path = if relative.is_empty() {
        format!("{base_path}/")
    } else {
        format!("{base_path}/{relative}")
    };
    joined.set_path(&new_path);
    if let Some(query) = query_part {
        joined.set_query(Some(query));
    }
    Ok(joined)
}

fn has_scheme(path: &str) -> bool {
    let Some((scheme, rest)) = path.split_once("://") else {
        return false;
    };
    !rest.is_empty()
        && scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Appends an encoded query to `url`, using `&` when a query already exists.
fn append_query(url: &mut Url, encoded: &str) {
    if encoded.is_empty() {
        return;
    }
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded.to_string(),
    };
    url.set_query(Some(&query));
}

/// Builds [`Request`]s with the client-wide defaults applied.
///
/// Building is deterministic for identical inputs, except for the multipart
/// boundary which is freshly generated for every call.
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    base_url: Option<Url>,
    default_headers: Headers,
    cache_policy: CachePolicy,
    timeout: Duration,
}

impl RequestBuilder {
    /// Creates a builder with the given defaults.
    #[must_use]
    pub fn new(
        base_url: Option<Url>,
        default_headers: Headers,
        cache_policy: CachePolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url,
            default_headers,
            cache_policy,
            timeout,
        }
    }

    /// The configured base URL.
    #[must_use]
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Builds a request whose parameters go into the query (GET/HEAD/DELETE)
    /// or the body (POST/PUT, url-encoded or multipart).
    ///
    /// `headers` are applied last and override anything set here.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for unusable URLs and
    /// [`ClientError::Filesystem`] when a file parameter cannot be read.
    pub async fn build(
        &self,
        method: Method,
        path: &str,
        parameters: &Parameters,
        headers: &Headers,
    ) -> Result<Request, ClientError> {
        let mut url = compose_url(self.base_url.as_ref(), path)?;
        let mut request_headers = self.default_headers.clone();
        let mut body = None;

        if method.encodes_parameters_in_body() {
            let (content_type, encoded) = if params::is_multipart(parameters) {
                let boundary = params::generate_boundary();
                let encoded = params::build_multipart_body(parameters, &boundary).await?;
                (params::multipart_content_type(&boundary), encoded)
            } else {
                (
                    FORM_URL_ENCODED.to_string(),
                    params::build_url_encoded_body(parameters),
                )
            };
            request_headers.insert(CONTENT_TYPE, content_type);
            request_headers.insert(CONTENT_LENGTH, encoded.len().to_string());
            body = Some(encoded);
        } else {
            append_query(&mut url, &params::query_string(parameters));
        }

        Ok(self.finish(method, url, request_headers, body, headers))
    }

    /// Builds an upload request: parameters always travel in the query and
    /// the body is supplied separately by the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] for unusable URLs.
    pub fn build_upload(
        &self,
        method: Method,
        path: &str,
        parameters: &Parameters,
        headers: &Headers,
    ) -> Result<Request, ClientError> {
        let mut url = compose_url(self.base_url.as_ref(), path)?;
        append_query(&mut url, &params::query_string(parameters));
        let mut request_headers = self.default_headers.clone();
        request_headers.insert(CONTENT_TYPE, "application/octet-stream");
        Ok(self.finish(method, url, request_headers, None, headers))
    }

    fn finish(
        &self,
        method: Method,
        url: Url,
        mut request_headers: Headers,
        body: Option<Bytes>,
        overrides: &Headers,
    ) -> Request {
        if self.cache_policy == CachePolicy::ReloadIgnoringCache {
            request_headers.insert("Cache-Control", "no-cache");
        }
        request_headers.extend(overrides);
        debug!(
            method = %method,
            url = %url,
            header_count = request_headers.len(),
            body_len = body.as_ref().map_or(0, Bytes::len),
            "built request"
        );
        Request::new(
            method,
            url,
            request_headers,
            body,
            self.cache_policy,
            self.timeout,
        )
    }

    /// Returns a copy of this builder with a different cache policy and timeout.
    #[must_use]
    pub fn with_overrides(&self, cache_policy: Option<CachePolicy>, timeout: Option<Duration>) -> Self {
        Self {
            base_url: self.base_url.clone(),
            default_headers: self.default_headers.clone(),
            cache_policy: cache_policy.unwrap_or(self.cache_policy),
            timeout: timeout.unwrap_or(self.timeout),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::request::{FilePayload, ParamValue};

    fn builder(base: Option<&str>) -> RequestBuilder {
        RequestBuilder::new(
            base.map(|b| Url::parse(b).unwrap()),
            Headers::new(),
            CachePolicy::default(),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_compose_url_joins_path_components() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        assert_eq!(
            compose_url(Some(&base), "items").unwrap().as_str(),
            "https://api.example.com/v1/items"
        );
        assert_eq!(
            compose_url(Some(&base), "/items/3").unwrap().as_str(),
            "https://api.example.com/v1/items/3"
        );

        let trailing = Url::parse("https://api.example.com/v1/").unwrap();
        assert_eq!(
            compose_url(Some(&trailing), "items?page=2").unwrap().as_str(),
            "https://api.example.com/v1/items?page=2"
        );
    }

    #[test]
    fn test_compose_url_absolute_path_is_verbatim() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        assert_eq!(
            compose_url(Some(&base), "http://other.example.org/x").unwrap().as_str(),
            "http://other.example.org/x"
        );
        assert_eq!(
            compose_url(None, "https://example.com/a?b=1").unwrap().as_str(),
            "https://example.com/a?b=1"
        );
    }

    #[test]
    fn test_compose_url_without_base_requires_absolute() {
        let result = compose_url(None, "items");
        assert!(matches!(result, Err(ClientError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_get_appends_query_with_ampersand_when_present() {
        let mut parameters = Parameters::new();
        parameters.insert("b".into(), ParamValue::from("2"));
        let request = builder(None)
            .build(Method::Get, "https://example.com/s?a=1", &parameters, &Headers::new())
            .await
            .unwrap();
        assert_eq!(request.url().as_str(), "https://example.com/s?a=1&b=2");
        assert!(request.body().is_none());
    }

    #[tokio::test]
    async fn test_get_without_parameters_leaves_url_untouched() {
        let request = builder(Some("https://example.com"))
            .build(Method::Head, "ping", &Parameters::new(), &Headers::new())
            .await
            .unwrap();
        assert_eq!(request.url().as_str(), "https://example.com/ping");
    }

    #[tokio::test]
    async fn test_post_form_body_and_headers() {
        let mut parameters = Parameters::new();
        parameters.insert("name".into(), ParamValue::from("a"));
        parameters.insert("tags".into(), ParamValue::from(vec!["x", "y"]));
        let request = builder(Some("https://example.com"))
            .build(Method::Post, "/items", &parameters, &Headers::new())
            .await
            .unwrap();

        let body = request.body().unwrap();
        assert_eq!(&body[..], b"name=a&tags%5B%5D=x&tags%5B%5D=y");
        assert_eq!(
            request.headers().get("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(
            request.headers().get("Content-Length"),
            Some(body.len().to_string().as_str())
        );
        assert_eq!(request.url().as_str(), "https://example.com/items");
    }

    #[tokio::test]
    async fn test_put_with_file_switches_to_multipart_and_new_boundary() {
        let mut parameters = Parameters::new();
        parameters.insert(
            "f".into(),
            FilePayload::from_bytes(&b"X"[..], "a.txt", "text/plain").into(),
        );
        let b = builder(Some("https://example.com"));
        let first = b
            .build(Method::Put, "up", &parameters, &Headers::new())
            .await
            .unwrap();
        let second = b
            .build(Method::Put, "up", &parameters, &Headers::new())
            .await
            .unwrap();

        let ct_first = first.headers().get("Content-Type").unwrap();
        let ct_second = second.headers().get("Content-Type").unwrap();
        assert!(ct_first.starts_with("multipart/form-data; boundary="));
        assert_ne!(ct_first, ct_second, "boundary must differ per request");
    }

    #[tokio::test]
    async fn test_extra_headers_override_computed_headers() {
        let mut parameters = Parameters::new();
        parameters.insert("a".into(), ParamValue::from("1"));
        let overrides: Headers = [("content-type", "text/plain")].into_iter().collect();
        let request = builder(Some("https://example.com"))
            .build(Method::Post, "x", &parameters, &overrides)
            .await
            .unwrap();
        assert_eq!(request.headers().get("Content-Type"), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_reload_cache_policy_sets_no_cache() {
        let b = builder(Some("https://example.com"))
            .with_overrides(Some(CachePolicy::ReloadIgnoringCache), None);
        let request = b
            .build(Method::Get, "x", &Parameters::new(), &Headers::new())
            .await
            .unwrap();
        assert_eq!(request.headers().get("cache-control"), Some("no-cache"));
        assert_eq!(request.cache_policy(), CachePolicy::ReloadIgnoringCache);
    }

    #[test]
    fn test_upload_parameters_go_to_query() {
        let mut parameters = Parameters::new();
        parameters.insert("name".into(), ParamValue::from("file one"));
        let request = builder(Some("https://example.com"))
            .build_upload(Method::Post, "upload", &parameters, &Headers::new())
            .unwrap();
        assert_eq!(request.url().as_str(), "https://example.com/upload?name=file%20one");
        assert!(request.body().is_none());
        assert_eq!(
            request.headers().get("Content-Type"),
            Some("application/octet-stream")
        );
    }
}

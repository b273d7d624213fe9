//! Client configuration.
//!
//! Every field has a default, so a configuration can be deserialized from a
//! partial document (JSON, TOML, ...) or built in code with struct update
//! syntax:
//!
//! ```
//! use fetcher_core::config::ClientConfig;
//!
//! let config = ClientConfig {
//!     base_url: Some("https://api.example.com/v1".into()),
//!     ..ClientConfig::default()
//! };
//! assert_eq!(config.max_redirects, 10);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::ClientError;
use crate::request::CachePolicy;
use crate::response::ResponseFormat;
use crate::transport::constants::{CONNECT_TIMEOUT_SECS, MAX_REDIRECTS, REQUEST_TIMEOUT_SECS};
use crate::user_agent;

/// How server certificates are trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerTrustPolicy {
    /// Validate certificates normally.
    #[default]
    Verify,
    /// Accept any certificate. Only for test servers with self-signed certs.
    AcceptAny,
}

/// Settings applied to every request issued by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative paths are appended to.
    pub base_url: Option<String>,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Total per-attempt timeout in seconds.
    pub request_timeout_secs: u64,
    /// Cache policy passed through on every request.
    pub cache_policy: CachePolicy,
    /// Serializer used when a request does not choose one.
    pub response_format: ResponseFormat,
    /// Directory downloads are placed in when the caller gives none.
    pub download_dir: PathBuf,
    /// `User-Agent` header; defaults to the crate identifier.
    pub user_agent: Option<String>,
    /// Maximum redirects followed per task.
    pub max_redirects: usize,
    /// Certificate trust policy.
    pub server_trust: ServerTrustPolicy,
    /// Whether gzip responses are transparently decompressed.
    pub gzip: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            cache_policy: CachePolicy::default(),
            response_format: ResponseFormat::default(),
            download_dir: PathBuf::from("."),
            user_agent: None,
            max_redirects: MAX_REDIRECTS,
            server_trust: ServerTrustPolicy::default(),
            gzip: true,
        }
    }
}

impl ClientConfig {
    /// Parses and validates the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the base URL is not an
    /// absolute URL that can carry a path.
    pub fn parsed_base_url(&self) -> Result<Option<Url>, ClientError> {
        let Some(raw) = self.base_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw).map_err(|e| ClientError::Configuration {
            message: format!("base_url {raw}: {e}"),
        })?;
        if url.cannot_be_a_base() {
            return Err(ClientError::Configuration {
                message: format!("base_url {raw} cannot carry a path"),
            });
        }
        Ok(Some(url))
    }

    /// Validates value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ClientError> {
        for (name, value) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ] {
            if !(1..=3600).contains(&value) {
                return Err(ClientError::Configuration {
                    message: format!("{name} must be within 1..=3600, got {value}"),
                });
            }
        }
        self.parsed_base_url()?;
        Ok(())
    }

    /// Effective `User-Agent`.
    #[must_use]
    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(user_agent::default_user_agent)
    }

    /// Per-attempt timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

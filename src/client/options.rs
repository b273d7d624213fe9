//! Per-request options for verbs and file transfers.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::auth::Credential;
use crate::dispatch::{Progress, ProgressHook};
use crate::request::{CachePolicy, Headers, Method, Parameters};
use crate::response::ResponseFormat;
use crate::transport::BodyStream;
pub use crate::transport::StreamProvider;

/// Options shared by every request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra headers, applied last.
    pub headers: Headers,
    /// Response format; the client default when `None`.
    pub format: Option<ResponseFormat>,
    /// Cache policy; the client default when `None`.
    pub cache_policy: Option<CachePolicy>,
    /// Per-attempt timeout; the client default when `None`.
    pub timeout: Option<Duration>,
    /// Credential offered when the server challenges.
    pub credential: Option<Credential>,
}

impl RequestOptions {
    /// Adds an extra header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Selects the response format.
    #[must_use]
    pub fn format(mut self, format: ResponseFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Overrides the cache policy.
    #[must_use]
    pub fn cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = Some(cache_policy);
        self
    }

    /// Overrides the timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attaches a credential for challenges.
    #[must_use]
    pub fn credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Body of an upload.
#[derive(Clone)]
pub enum UploadPayload {
    /// In-memory bytes.
    Bytes(Bytes),
    /// A local file, streamed from disk.
    File(PathBuf),
    /// A caller-supplied stream. Called again for every send of the request.
    Stream(StreamProvider),
}

impl UploadPayload {
    /// Stream payload from a provider closure.
    pub fn stream(provider: impl Fn() -> BodyStream + Send + Sync + 'static) -> Self {
        Self::Stream(Arc::new(provider))
    }
}

impl fmt::Debug for UploadPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::File(path) => f.debug_tuple("File").field(path).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

fn hook(progress: impl Fn(Progress) + Send + Sync + 'static) -> ProgressHook {
    Arc::new(progress)
}

/// Options for [`Client::download`](super::Client::download).
#[derive(Clone)]
pub struct DownloadOptions {
    /// Destination directory; the configured download directory when `None`.
    pub destination_dir: Option<PathBuf>,
    /// Query parameters.
    pub parameters: Parameters,
    /// Request method, `GET` by default.
    pub method: Method,
    /// Called for every chunk written.
    pub progress: Option<ProgressHook>,
    /// Shared request options.
    pub request: RequestOptions,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            destination_dir: None,
            parameters: Parameters::new(),
            method: Method::Get,
            progress: None,
            request: RequestOptions::default(),
        }
    }
}

impl DownloadOptions {
    /// Saves into `dir`.
    #[must_use]
    pub fn destination(mut self, dir: impl Into<PathBuf>) -> Self {
        self.destination_dir = Some(dir.into());
        self
    }

    /// Reports progress to `progress`.
    #[must_use]
    pub fn progress(mut self, progress: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(hook(progress));
        self
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("destination_dir", &self.destination_dir)
            .field("parameters", &self.parameters.len())
            .field("method", &self.method)
            .field("progress", &self.progress.is_some())
            .field("request", &self.request)
            .finish()
    }
}

/// Options for [`Client::upload`](super::Client::upload).
#[derive(Clone)]
pub struct UploadOptions {
    /// Parameters, sent in the query.
    pub parameters: Parameters,
    /// Request method, `POST` by default.
    pub method: Method,
    /// Called for every chunk sent.
    pub progress: Option<ProgressHook>,
    /// Shared request options.
    pub request: RequestOptions,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            parameters: Parameters::new(),
            method: Method::Post,
            progress: None,
            request: RequestOptions::default(),
        }
    }
}

impl UploadOptions {
    /// Reports progress to `progress`.
    #[must_use]
    pub fn progress(mut self, progress: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(hook(progress));
        self
    }
}

impl fmt::Debug for UploadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadOptions")
            .field("parameters", &self.parameters.len())
            .field("method", &self.method)
            .field("progress", &self.progress.is_some())
            .field("request", &self.request)
            .finish()
    }
}

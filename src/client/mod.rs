//! Public client facade.
//!
//! Every verb returns a [`RequestHandle`] immediately; the request runs in
//! the background and the handle resolves to its single final result.
//!
//! ```no_run
//! use fetcher_core::client::Client;
//! use fetcher_core::config::ClientConfig;
//! use fetcher_core::request::Parameters;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(&ClientConfig {
//!     base_url: Some("https://api.example.com/v1".into()),
//!     ..ClientConfig::default()
//! })?;
//! let response = client.get("items", Parameters::new()).await?;
//! println!("{:?}", response.value);
//! client.close().await;
//! # Ok(())
//! # }
//! ```

mod handle;
mod options;
mod retry;

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::auth::Authorizer;
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::request::{Headers, Method, Parameters, RequestBuilder, compose_url};
use crate::transport::{ReqwestTransport, Transport};

pub use handle::RequestHandle;
pub use options::{DownloadOptions, RequestOptions, StreamProvider, UploadOptions, UploadPayload};

use retry::{Context, LogicalRequest, Transfer};

/// HTTP client owning one task registry for its lifetime.
///
/// Cloning is cheap and clones share the registry. Must be created and used
/// inside a tokio runtime.
#[derive(Clone)]
pub struct Client {
    context: Arc<Context>,
}

impl Client {
    /// Creates a client on the reqwest transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configuration is invalid.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::new(config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a client on a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] if the configuration is invalid.
    pub fn with_transport(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self, ClientError> {
        config.validate()?;
        let builder = RequestBuilder::new(
            config.parsed_base_url()?,
            Headers::new(),
            config.cache_policy,
            config.request_timeout(),
        );
        let dispatcher = Dispatcher::spawn(transport, config.server_trust);
        debug!(base_url = ?config.base_url, "client created");
        Ok(Self {
            context: Arc::new(Context {
                dispatcher,
                builder,
                authorizer: None,
                default_format: config.response_format,
                download_dir: config.download_dir.clone(),
            }),
        })
    }

    /// Returns a client that runs `authorizer` before every request.
    #[must_use]
    pub fn with_authorizer(self, authorizer: Arc<dyn Authorizer>) -> Self {
        let mut context = (*self.context).clone();
        context.authorizer = Some(authorizer);
        Self {
            context: Arc::new(context),
        }
    }

    /// Resolves `path` against the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRequest`] if the result is not a URL.
    pub fn compose_url(&self, path: &str) -> Result<Url, ClientError> {
        compose_url(self.context.builder.base_url(), path)
    }

    /// `GET` with parameters in the query.
    pub fn get(&self, url: &str, parameters: Parameters) -> RequestHandle {
        self.request(Method::Get, url, parameters, RequestOptions::default())
    }

    /// `HEAD` with parameters in the query.
    pub fn head(&self, url: &str, parameters: Parameters) -> RequestHandle {
        self.request(Method::Head, url, parameters, RequestOptions::default())
    }

    /// `DELETE` with parameters in the query.
    pub fn delete(&self, url: &str, parameters: Parameters) -> RequestHandle {
        self.request(Method::Delete, url, parameters, RequestOptions::default())
    }

    /// `POST` with parameters in the body.
    pub fn post(&self, url: &str, parameters: Parameters) -> RequestHandle {
        self.request(Method::Post, url, parameters, RequestOptions::default())
    }

    /// `PUT` with parameters in the body.
    pub fn put(&self, url: &str, parameters: Parameters) -> RequestHandle {
        self.request(Method::Put, url, parameters, RequestOptions::default())
    }

    /// Any verb with explicit options.
    pub fn request(
        &self,
        method: Method,
        url: &str,
        parameters: Parameters,
        options: RequestOptions,
    ) -> RequestHandle {
        self.spawn(LogicalRequest {
            method,
            url: url.to_string(),
            parameters,
            options,
            transfer: Transfer::Data,
        })
    }

    /// Downloads to disk. Resolves to a [`ResponseValue::File`](crate::response::ResponseValue::File)
    /// holding the saved path. The status is not validated; check `head.status`.
    pub fn download(&self, url: &str, options: DownloadOptions) -> RequestHandle {
        let DownloadOptions {
            destination_dir,
            parameters,
            method,
            progress,
            request,
        } = options;
        self.spawn(LogicalRequest {
            method,
            url: url.to_string(),
            parameters,
            options: request,
            transfer: Transfer::Download {
                destination_dir,
                progress,
            },
        })
    }

    /// Uploads `payload` as the request body; parameters go in the query.
    pub fn upload(&self, url: &str, payload: UploadPayload, options: UploadOptions) -> RequestHandle {
        let UploadOptions {
            parameters,
            method,
            progress,
            request,
        } = options;
        self.spawn(LogicalRequest {
            method,
            url: url.to_string(),
            parameters,
            options: request,
            transfer: Transfer::Upload { payload, progress },
        })
    }

    /// Number of transport tasks currently in flight.
    pub async fn pending_tasks(&self) -> usize {
        self.context.dispatcher.pending_tasks().await
    }

    /// Closes the client. Outstanding requests resolve to [`ClientError::Closed`],
    /// and so does every request issued afterwards.
    pub async fn close(&self) {
        self.context.dispatcher.close().await;
    }

    fn spawn(&self, request: LogicalRequest) -> RequestHandle {
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();
        let url = request.url.clone();
        let context = Arc::clone(&self.context);
        let token = cancel.clone();
        tokio::spawn(async move {
            let result = retry::execute(context, request, token).await;
            let _ = tx.send(result);
        });
        RequestHandle::new(url, cancel, rx)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.context.builder.base_url().map(Url::as_str))
            .field("authorizer", &self.context.authorizer.is_some())
            .field("closed", &self.context.dispatcher.is_closed())
            .finish_non_exhaustive()
    }
}

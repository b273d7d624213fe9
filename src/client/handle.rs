//! Awaitable handle for a submitted request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::ClientError;
use crate::response::Response;

/// Result of a logical request, delivered once.
///
/// Await the handle to get the result. Dropping it does not cancel the
/// request; call [`cancel`](Self::cancel) for that.
#[derive(Debug)]
pub struct RequestHandle {
    url: String,
    cancel: CancellationToken,
    result: oneshot::Receiver<Result<Response, ClientError>>,
}

impl RequestHandle {
    pub(crate) fn new(
        url: String,
        cancel: CancellationToken,
        result: oneshot::Receiver<Result<Response, ClientError>>,
    ) -> Self {
        Self { url, cancel, result }
    }

    /// Requested URL or path, as given.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Abandons the request. The handle then resolves to [`ClientError::Cancelled`]
    /// unless a result was already produced.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token cancelling this request, for wiring into other cancellation scopes.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Future for RequestHandle {
    type Output = Result<Response, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        Pin::new(&mut this.result).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(ClientError::Closed {
                    url: this.url.clone(),
                })
            })
        })
    }
}

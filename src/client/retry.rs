//! Authorization pre-flight and the single retry after a rejected token.
//!
//! A logical request makes at most two network attempts. Before each one the
//! authorizer (if any) is asked for access; when the first attempt fails with
//! 400, 401 or 403 the authorizer's cached token is revoked and the request is
//! resubmitted once. The caller only ever sees the final result.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::options::{RequestOptions, UploadPayload};
use crate::auth::Authorizer;
use crate::dispatch::{DispatcherHandle, ProgressHook, TaskDelegate};
use crate::error::ClientError;
use crate::request::{Headers, Method, Parameters, RequestBuilder};
use crate::response::{Response, ResponseFormat};
use crate::transport::UploadSource;

/// Everything an attempt needs from the client.
#[derive(Clone)]
pub(crate) struct Context {
    pub(crate) dispatcher: DispatcherHandle,
    pub(crate) builder: RequestBuilder,
    pub(crate) authorizer: Option<Arc<dyn Authorizer>>,
    pub(crate) default_format: ResponseFormat,
    pub(crate) download_dir: PathBuf,
}

/// What happens to the body.
pub(crate) enum Transfer {
    Data,
    Download {
        destination_dir: Option<PathBuf>,
        progress: Option<ProgressHook>,
    },
    Upload {
        payload: UploadPayload,
        progress: Option<ProgressHook>,
    },
}

/// A request as the caller issued it, replayable for the retry.
pub(crate) struct LogicalRequest {
    pub(crate) method: Method,
    pub(crate) url: String,
    pub(crate) parameters: Parameters,
    pub(crate) options: RequestOptions,
    pub(crate) transfer: Transfer,
}

/// Runs a logical request to its single final result.
#[instrument(skip_all, fields(method = %request.method, url = %request.url))]
pub(crate) async fn execute(
    context: Arc<Context>,
    request: LogicalRequest,
    cancel: CancellationToken,
) -> Result<Response, ClientError> {
    let mut retried = false;
    loop {
        if let Some(authorizer) = &context.authorizer {
            let access = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return Err(ClientError::Cancelled { url: request.url.clone() });
                }
                access = authorizer.request_access() => access,
            };
            if let Err(e) = access {
                warn!(error = %e, "authorization pre-flight failed");
                return Err(ClientError::authorization(e.to_string()));
            }
        }

        let error = match attempt(&context, &request, &cancel).await {
            Ok(response) => return Ok(response),
            Err(error) => error,
        };

        match &context.authorizer {
            Some(authorizer) if !retried && error.is_authorization_failure() => {
                warn!(
                    status = error.status(),
                    "authorization rejected, revoking token and retrying once"
                );
                authorizer.revoke_local_access_token();
                retried = true;
            }
            _ => return Err(error),
        }
    }
}

/// Builds, submits and awaits one network attempt.
async fn attempt(
    context: &Context,
    request: &LogicalRequest,
    cancel: &CancellationToken,
) -> Result<Response, ClientError> {
    if cancel.is_cancelled() {
        return Err(ClientError::Cancelled {
            url: request.url.clone(),
        });
    }

    let options = &request.options;
    let serializer = options.format.unwrap_or(context.default_format).serializer();
    let mut headers = Headers::new();
    if !matches!(request.transfer, Transfer::Download { .. }) {
        headers.insert("Accept", serializer.accept());
    }
    if let Some(authorizer) = &context.authorizer {
        headers.extend(&authorizer.authorization_fields());
    }
    headers.extend(&options.headers);

    let builder = context
        .builder
        .with_overrides(options.cache_policy, options.timeout);
    let credential = options.credential.clone();
    let (completion, result) = oneshot::channel();

    let (built, upload, delegate) = match &request.transfer {
        Transfer::Data => {
            let built = builder
                .build(request.method, &request.url, &request.parameters, &headers)
                .await?;
            let delegate = TaskDelegate::data(built.url(), serializer, credential, completion);
            (built, None, delegate)
        }
        Transfer::Download {
            destination_dir,
            progress,
        } => {
            let built = builder
                .build(request.method, &request.url, &request.parameters, &headers)
                .await?;
            let dir = destination_dir
                .clone()
                .unwrap_or_else(|| context.download_dir.clone());
            let delegate =
                TaskDelegate::download(built.url(), dir, credential, progress.clone(), completion);
            (built, None, delegate)
        }
        Transfer::Upload { payload, progress } => {
            let built =
                builder.build_upload(request.method, &request.url, &request.parameters, &headers)?;
            let (source, stream) = match payload {
                UploadPayload::Bytes(bytes) => (UploadSource::Bytes(bytes.clone()), None),
                UploadPayload::File(path) => {
                    tokio::fs::metadata(path)
                        .await
                        .map_err(|e| ClientError::filesystem(path.clone(), e))?;
                    (UploadSource::File(path.clone()), None)
                }
                UploadPayload::Stream(provider) => (UploadSource::Stream, Some(Arc::clone(provider))),
            };
            let delegate = TaskDelegate::upload(
                built.url(),
                serializer,
                credential,
                progress.clone(),
                stream,
                completion,
            );
            (built, Some(source), delegate)
        }
    };

    let url = built.url().to_string();
    let id = context
        .dispatcher
        .submit(built, upload, delegate, cancel.clone());
    debug!(task = %id, "attempt submitted");
    result
        .await
        .unwrap_or_else(|_| Err(ClientError::Closed { url }))
}

//! Per-task handlers.
//!
//! A [`TaskDelegate`] owns everything one transport task produces: the
//! accumulated body, progress reporting, the credential used for challenges,
//! and the channel the final result is delivered on.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use super::placement;
use crate::auth::Credential;
use crate::error::{ClientError, TransportError};
use crate::response::{Response, ResponseHead, ResponseSerializer, ResponseValue};
use crate::transport::{
    Challenge, ChallengeDisposition, RedirectDecision, StreamProvider, TaskKind, TransportEvent,
    UploadStream,
};

/// Transfer progress for one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes moved in this chunk.
    pub bytes_this_chunk: u64,
    /// Bytes moved so far.
    pub bytes_so_far: u64,
    /// Total expected, when known.
    pub bytes_expected: Option<u64>,
}

/// Callback receiving [`Progress`].
///
/// Called on the dispatcher loop, so it should return quickly.
pub type ProgressHook = Arc<dyn Fn(Progress) + Send + Sync>;

/// Channel the final result of a task is delivered on.
pub type Completion = oneshot::Sender<Result<Response, ClientError>>;

/// Handler for one transport task.
pub struct TaskDelegate {
    url: String,
    credential: Option<Credential>,
    head: Option<ResponseHead>,
    completion: Completion,
    role: Role,
}

enum Role {
    Data {
        serializer: Arc<dyn ResponseSerializer>,
        buffer: Vec<u8>,
    },
    Upload {
        serializer: Arc<dyn ResponseSerializer>,
        buffer: Vec<u8>,
        progress: Option<ProgressHook>,
        stream: Option<StreamProvider>,
    },
    Download {
        destination_dir: PathBuf,
        progress: Option<ProgressHook>,
        finished: Option<(PathBuf, String)>,
    },
}

impl TaskDelegate {
    /// Delegate buffering the body in memory and decoding it with `serializer`.
    #[must_use]
    pub fn data(
        url: &Url,
        serializer: Arc<dyn ResponseSerializer>,
        credential: Option<Credential>,
        completion: Completion,
    ) -> Self {
        Self::with_role(
            url,
            credential,
            completion,
            Role::Data {
                serializer,
                buffer: Vec::new(),
            },
        )
    }

    /// Delegate for an upload. `stream` answers every body-stream request
    /// of the transport with a fresh stream.
    #[must_use]
    pub fn upload(
        url: &Url,
        serializer: Arc<dyn ResponseSerializer>,
        credential: Option<Credential>,
        progress: Option<ProgressHook>,
        stream: Option<StreamProvider>,
        completion: Completion,
    ) -> Self {
        Self::with_role(
            url,
            credential,
            completion,
            Role::Upload {
                serializer,
                buffer: Vec::new(),
                progress,
                stream,
            },
        )
    }

    /// Delegate moving the downloaded file into `destination_dir`.
    #[must_use]
    pub fn download(
        url: &Url,
        destination_dir: PathBuf,
        credential: Option<Credential>,
        progress: Option<ProgressHook>,
        completion: Completion,
    ) -> Self {
        Self::with_role(
            url,
            credential,
            completion,
            Role::Download {
                destination_dir,
                progress,
                finished: None,
            },
        )
    }

    fn with_role(url: &Url, credential: Option<Credential>, completion: Completion, role: Role) -> Self {
        Self {
            url: url.to_string(),
            credential,
            head: None,
            completion,
            role,
        }
    }

    /// The transport task kind this delegate handles.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self.role {
            Role::Data { .. } => TaskKind::Data,
            Role::Upload { .. } => TaskKind::Upload,
            Role::Download { .. } => TaskKind::Download,
        }
    }

    /// URL of the request this delegate serves.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Redirects are followed as proposed.
    #[must_use]
    pub fn on_redirect(&self, response: &ResponseHead, location: Url) -> RedirectDecision {
        debug!(url = %self.url, status = response.status, to = %location, "redirect passthrough");
        RedirectDecision::Follow(location)
    }

    /// Answers an authentication challenge.
    ///
    /// The attached credential is offered once; a repeated challenge for the
    /// same task is refused.
    #[must_use]
    pub fn on_challenge(&self, challenge: &Challenge) -> ChallengeDisposition {
        match (challenge, &self.credential) {
            (
                Challenge::Credential {
                    previous_failures: 0,
                    ..
                },
                Some(credential),
            ) => ChallengeDisposition::UseCredential(credential.clone()),
            (
                Challenge::Credential {
                    previous_failures, ..
                },
                Some(_),
            ) => {
                warn!(url = %self.url, previous_failures, "credential rejected, refusing challenge");
                ChallengeDisposition::CancelChallenge
            }
            _ => ChallengeDisposition::PerformDefaultHandling,
        }
    }

    /// A new upload body stream. The transport asks again whenever it
    /// re-sends the request (credential challenge, 307/308 redirect).
    #[must_use]
    pub fn body_stream(&self) -> Option<UploadStream> {
        match &self.role {
            Role::Upload {
                stream: Some(provider),
                ..
            } => Some(UploadStream(provider())),
            _ => None,
        }
    }

    /// Processes a non-terminal transport event.
    pub fn on_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Redirect {
                response,
                location,
                reply,
            } => {
                let decision = self.on_redirect(&response, location);
                let _ = reply.send(decision);
            }
            TransportEvent::Challenge { challenge, reply } => {
                let disposition = self.on_challenge(&challenge);
                let _ = reply.send(disposition);
            }
            TransportEvent::NeedBodyStream { reply } => {
                let stream = self.body_stream();
                if stream.is_none() {
                    debug!(url = %self.url, "no body stream to supply");
                }
                let _ = reply.send(stream);
            }
            TransportEvent::Response(head) => self.head = Some(head),
            TransportEvent::Data(chunk) => match &mut self.role {
                Role::Data { buffer, .. } | Role::Upload { buffer, .. } => {
                    buffer.extend_from_slice(&chunk);
                }
                Role::Download { .. } => {}
            },
            TransportEvent::SendProgress {
                bytes_sent,
                total_sent,
                total_expected,
            } => {
                if let Role::Upload {
                    progress: Some(hook),
                    ..
                } = &self.role
                {
                    hook(Progress {
                        bytes_this_chunk: bytes_sent,
                        bytes_so_far: total_sent,
                        bytes_expected: total_expected,
                    });
                }
            }
            TransportEvent::ReceiveProgress {
                bytes_written,
                total_written,
                total_expected,
            } => {
                if let Role::Download {
                    progress: Some(hook),
                    ..
                } = &self.role
                {
                    hook(Progress {
                        bytes_this_chunk: bytes_written,
                        bytes_so_far: total_written,
                        bytes_expected: total_expected,
                    });
                }
            }
            TransportEvent::FinishedDownloading {
                temp_path,
                suggested_filename,
            } => {
                if let Role::Download { finished, .. } = &mut self.role {
                    *finished = Some((temp_path, suggested_filename));
                } else {
                    warn!(url = %self.url, "download finished for a non-download task");
                }
            }
            TransportEvent::Completed { .. } => {
                warn!(url = %self.url, "completion routed as a plain event, ignoring");
            }
        }
    }

    /// Produces the final result and delivers it.
    pub async fn complete(self, response: Option<ResponseHead>, error: Option<TransportError>) {
        let Self {
            url,
            head,
            completion,
            role,
            ..
        } = self;
        let result = finish(&url, response.or(head), error, role).await;
        if let Err(error) = &result {
            debug!(url = %url, code = error.code(), "task failed");
        }
        let _ = completion.send(result);
    }

    /// Delivers `error` without waiting for the transport.
    ///
    /// A finished but unplaced download is removed on a background task, so
    /// this must be called inside a tokio runtime.
    pub fn fail(self, error: ClientError) {
        if let Role::Download {
            finished: Some((temp_path, _)),
            ..
        } = self.role
        {
            tokio::spawn(async move { remove_temp(&temp_path).await });
        }
        let _ = self.completion.send(Err(error));
    }
}

impl fmt::Debug for TaskDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDelegate")
            .field("kind", &self.kind())
            .field("url", &self.url)
            .field("credential", &self.credential.is_some())
            .field("head", &self.head)
            .finish_non_exhaustive()
    }
}

async fn finish(
    url: &str,
    head: Option<ResponseHead>,
    error: Option<TransportError>,
    role: Role,
) -> Result<Response, ClientError> {
    if let Some(error) = error {
        if let Role::Download {
            finished: Some((temp_path, _)),
            ..
        } = &role
        {
            remove_temp(temp_path).await;
        }
        return Err(ClientError::transport(url, error));
    }
    let Some(head) = head else {
        return Err(ClientError::transport(
            url,
            TransportError::Other("task completed without a response".into()),
        ));
    };

    match role {
        Role::Data { serializer, buffer } | Role::Upload { serializer, buffer, .. } => {
            let body = Bytes::from(buffer);
            let value = serializer.serialize(&head, &body)?;
            Ok(Response { head, value })
        }
        Role::Download {
            destination_dir,
            finished,
            ..
        } => {
            let Some((temp_path, suggested_filename)) = finished else {
                return Err(ClientError::transport(
                    url,
                    TransportError::Other("download completed without a file".into()),
                ));
            };
            let path = placement::place_download(&temp_path, &destination_dir, &suggested_filename).await?;
            if head.is_success() {
                info!(url = %url, path = %path.display(), "download complete");
            } else {
                warn!(url = %url, status = head.status, path = %path.display(), "download saved with error status");
            }
            Ok(Response {
                head,
                value: ResponseValue::File(path),
            })
        }
    }
}

async fn remove_temp(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = %path.display(), error = %e, "temporary file already gone");
    }
}

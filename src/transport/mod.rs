//! Boundary between the dispatcher and the network stack.
//!
//! A [`Transport`] executes submitted tasks concurrently and reports
//! everything that happens to them as [`TransportEvent`]s on a shared
//! [`EventSink`]. Events that need an answer (redirects, challenges, body
//! streams) carry a oneshot reply; a dropped reply means "use the default".

pub mod constants;
pub mod filename;
mod http;

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::auth::Credential;
use crate::error::TransportError;
use crate::request::Request;
use crate::response::ResponseHead;

pub use http::ReqwestTransport;

/// Streamed upload body.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Produces a fresh body stream each time a streamed upload is sent.
pub type StreamProvider = Arc<dyn Fn() -> BodyStream + Send + Sync>;

/// A [`BodyStream`] handed from a delegate to the transport.
pub struct UploadStream(pub BodyStream);

impl fmt::Debug for UploadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UploadStream(..)")
    }
}

/// Opaque identifier of a submitted task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw identifier.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// What a task does with its response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Body delivered in memory as [`TransportEvent::Data`].
    Data,
    /// Request body sent from an [`UploadSource`]; response delivered in memory.
    Upload,
    /// Body written to a temporary file, then [`TransportEvent::FinishedDownloading`].
    Download,
}

/// Where an upload body comes from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// In-memory bytes.
    Bytes(Bytes),
    /// A local file.
    File(PathBuf),
    /// A stream obtained through [`TransportEvent::NeedBodyStream`].
    Stream,
}

/// A unit of work handed to a transport.
#[derive(Debug)]
pub struct TransportTask {
    /// Identifier under which events are reported.
    pub id: TaskId,
    /// Task kind.
    pub kind: TaskKind,
    /// The request to send.
    pub request: Request,
    /// Upload body, for [`TaskKind::Upload`].
    pub upload: Option<UploadSource>,
    /// Fires when the task should be abandoned.
    pub cancel: CancellationToken,
}

/// Decision returned for a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectDecision {
    /// Follow to the given URL.
    Follow(Url),
    /// Stop and treat the redirect response as final.
    Stop,
}

/// An authentication challenge raised while sending a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    /// The server's certificate needs a trust decision.
    ServerTrust {
        /// Host presenting the certificate.
        host: String,
    },
    /// The server asked for credentials (`401` with `WWW-Authenticate`).
    Credential {
        /// Realm from the challenge, if given.
        realm: Option<String>,
        /// How many credentials were already rejected for this task.
        previous_failures: u32,
    },
}

/// Answer to a [`Challenge`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeDisposition {
    /// Retry with this credential.
    UseCredential(Credential),
    /// Let the transport apply its own default handling.
    PerformDefaultHandling,
    /// Give up on the challenge; the challenge response becomes final.
    CancelChallenge,
    /// Trust the server certificate unconditionally.
    AcceptServerTrust,
}

/// Something that happened to a task.
#[derive(Debug)]
pub enum TransportEvent {
    /// A 3xx with `Location` was received.
    Redirect {
        /// The redirect response.
        response: ResponseHead,
        /// Resolved target.
        location: Url,
        /// Decision channel; dropping it follows the redirect.
        reply: oneshot::Sender<RedirectDecision>,
    },
    /// An authentication challenge was received.
    Challenge {
        /// The challenge.
        challenge: Challenge,
        /// Disposition channel; dropping it performs default handling.
        reply: oneshot::Sender<ChallengeDisposition>,
    },
    /// A streamed upload needs its body.
    NeedBodyStream {
        /// Stream channel; `None` or a dropped sender sends no body.
        reply: oneshot::Sender<Option<UploadStream>>,
    },
    /// Final response head received.
    Response(ResponseHead),
    /// A chunk of an in-memory body.
    Data(Bytes),
    /// Upload progress.
    SendProgress {
        /// Bytes sent in this chunk.
        bytes_sent: u64,
        /// Bytes sent so far.
        total_sent: u64,
        /// Total to send, when known.
        total_expected: Option<u64>,
    },
    /// Download progress.
    ReceiveProgress {
        /// Bytes written in this chunk.
        bytes_written: u64,
        /// Bytes written so far.
        total_written: u64,
        /// Total expected, when the server declared a length.
        total_expected: Option<u64>,
    },
    /// A download finished writing to a temporary file.
    FinishedDownloading {
        /// Temporary file holding the body.
        temp_path: PathBuf,
        /// Filename derived from the response.
        suggested_filename: String,
    },
    /// The task ended. Always the last event for a task.
    Completed {
        /// Final response head, when one was received.
        response: Option<ResponseHead>,
        /// Transport failure, if any.
        error: Option<TransportError>,
    },
}

impl TransportEvent {
    /// Short name used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Redirect { .. } => "redirect",
            Self::Challenge { .. } => "challenge",
            Self::NeedBodyStream { .. } => "need_body_stream",
            Self::Response(_) => "response",
            Self::Data(_) => "data",
            Self::SendProgress { .. } => "send_progress",
            Self::ReceiveProgress { .. } => "receive_progress",
            Self::FinishedDownloading { .. } => "finished_downloading",
            Self::Completed { .. } => "completed",
        }
    }
}

/// Sending half of the event stream shared by all tasks of a transport.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: mpsc::UnboundedSender<(TaskId, TransportEvent)>,
}

impl EventSink {
    /// Creates a sink and the receiver the dispatcher consumes.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<(TaskId, TransportEvent)>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// Reports an event. Returns `false` once the dispatcher is gone.
    pub fn emit(&self, id: TaskId, event: TransportEvent) -> bool {
        self.sender.send((id, event)).is_ok()
    }

    /// Asks the dispatcher a question and waits for the answer.
    ///
    /// Returns `None` if the dispatcher is gone or dropped the reply.
    pub async fn ask<T>(
        &self,
        id: TaskId,
        make: impl FnOnce(oneshot::Sender<T>) -> TransportEvent,
    ) -> Option<T> {
        let (reply, answer) = oneshot::channel();
        if !self.emit(id, make(reply)) {
            return None;
        }
        answer.await.ok()
    }
}

/// Executes tasks and reports their events.
///
/// `submit` must not block: work runs in the background and every task ends
/// with exactly one [`TransportEvent::Completed`].
pub trait Transport: Send + Sync {
    /// Starts a task.
    fn submit(&self, task: TransportTask, events: EventSink);
}

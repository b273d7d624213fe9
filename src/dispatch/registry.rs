//! Task registry and event dispatcher.
//!
//! One [`Dispatcher`] loop owns the map from task identifier to delegate and
//! is the only consumer of transport events, so registry mutation is
//! serialized without locks. Callers talk to it through a cloneable
//! [`DispatcherHandle`].

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::delegate::TaskDelegate;
use crate::config::ServerTrustPolicy;
use crate::error::ClientError;
use crate::request::Request;
use crate::transport::{
    Challenge, ChallengeDisposition, EventSink, TaskId, Transport, TransportEvent, TransportTask,
    UploadSource,
};

enum Command {
    Submit {
        task: TransportTask,
        delegate: TaskDelegate,
    },
    Inspect {
        reply: oneshot::Sender<usize>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
}

struct Entry {
    delegate: TaskDelegate,
    cancel: CancellationToken,
}

/// Owner of the task registry.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    sink: EventSink,
    events: mpsc::UnboundedReceiver<(TaskId, TransportEvent)>,
    commands: mpsc::UnboundedReceiver<Command>,
    tasks: HashMap<TaskId, Entry>,
    server_trust: ServerTrustPolicy,
}

/// Cloneable handle used to submit tasks to a running [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    commands: mpsc::UnboundedSender<Command>,
    next_id: Arc<AtomicU64>,
}

impl Dispatcher {
    /// Creates a dispatcher and its handle. Call [`run`](Self::run) to start it.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, server_trust: ServerTrustPolicy) -> (Self, DispatcherHandle) {
        let (sink, events) = EventSink::channel();
        let (command_tx, commands) = mpsc::unbounded_channel();
        let dispatcher = Self {
            transport,
            sink,
            events,
            commands,
            tasks: HashMap::new(),
            server_trust,
        };
        let handle = DispatcherHandle {
            commands: command_tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (dispatcher, handle)
    }

    /// Creates a dispatcher and runs it on the current tokio runtime.
    #[must_use]
    pub fn spawn(transport: Arc<dyn Transport>, server_trust: ServerTrustPolicy) -> DispatcherHandle {
        let (dispatcher, handle) = Self::new(transport, server_trust);
        tokio::spawn(dispatcher.run());
        handle
    }

    /// Processes commands and events until closed or every handle is dropped.
    ///
    /// Commands are preferred over events, so a task is always registered
    /// before any of its events is routed.
    pub async fn run(mut self) {
        debug!("dispatcher started");
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).is_break() {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                Some((id, event)) = self.events.recv() => self.route(id, event),
            }
        }
        debug!("dispatcher stopped");
    }

    /// Number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Submit { task, delegate } => self.register(task, delegate),
            Command::Inspect { reply } => {
                let _ = reply.send(self.tasks.len());
            }
            Command::Close { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn register(&mut self, task: TransportTask, delegate: TaskDelegate) {
        let id = task.id;
        if self.tasks.contains_key(&id) {
            warn!(task = %id, "task identifier already live, rejecting");
            let url = delegate.url().to_string();
            delegate.fail(ClientError::invalid_request(url, format!("duplicate task identifier {id}")));
            return;
        }
        debug!(task = %id, kind = ?task.kind, url = %task.request.url(), "registering task");
        self.tasks.insert(
            id,
            Entry {
                delegate,
                cancel: task.cancel.clone(),
            },
        );
        self.transport.submit(task, self.sink.clone());
    }

    /// Routes one transport event to the delegate registered for `id`.
    fn route(&mut self, id: TaskId, event: TransportEvent) {
        trace!(task = %id, event = event.name(), "routing event");
        match event {
            TransportEvent::Completed { response, error } => {
                let Some(entry) = self.tasks.remove(&id) else {
                    debug!(task = %id, "completion for unknown task");
                    return;
                };
                debug!(task = %id, remaining = self.tasks.len(), "task removed");
                tokio::spawn(entry.delegate.complete(response, error));
            }
            TransportEvent::Challenge { challenge, reply } => {
                let disposition = match self.tasks.get(&id) {
                    Some(entry) => entry.delegate.on_challenge(&challenge),
                    None => self.unowned_challenge(id, &challenge),
                };
                let _ = reply.send(disposition);
            }
            event => match self.tasks.get_mut(&id) {
                Some(entry) => entry.delegate.on_event(event),
                None => debug!(task = %id, event = event.name(), "event for unknown task dropped"),
            },
        }
    }

    /// Challenge for a task with no delegate: server trust is only accepted
    /// when the client was configured to accept any certificate.
    fn unowned_challenge(&self, id: TaskId, challenge: &Challenge) -> ChallengeDisposition {
        match (challenge, self.server_trust) {
            (Challenge::ServerTrust { host }, ServerTrustPolicy::AcceptAny) => {
                warn!(task = %id, host = %host, "accepting server trust for task without delegate");
                ChallengeDisposition::AcceptServerTrust
            }
            _ => ChallengeDisposition::PerformDefaultHandling,
        }
    }

    /// Cancels every live task and completes its delegate with [`ClientError::Closed`].
    fn shutdown(&mut self) {
        if !self.tasks.is_empty() {
            warn!(count = self.tasks.len(), "closing with tasks in flight");
        }
        for (id, entry) in self.tasks.drain() {
            debug!(task = %id, "abandoning task");
            entry.cancel.cancel();
            let url = entry.delegate.url().to_string();
            entry.delegate.fail(ClientError::Closed { url });
        }
        self.commands.close();
    }
}

impl DispatcherHandle {
    /// Registers `delegate` and starts the task on the transport.
    ///
    /// If the dispatcher is already closed the delegate is completed with
    /// [`ClientError::Closed`] immediately.
    pub fn submit(
        &self,
        request: Request,
        upload: Option<UploadSource>,
        delegate: TaskDelegate,
        cancel: CancellationToken,
    ) -> TaskId {
        let id = TaskId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let task = TransportTask {
            id,
            kind: delegate.kind(),
            request,
            upload,
            cancel,
        };
        if let Err(mpsc::error::SendError(Command::Submit { delegate, .. })) =
            self.commands.send(Command::Submit { task, delegate })
        {
            debug!(task = %id, "dispatcher closed, failing task");
            let url = delegate.url().to_string();
            delegate.fail(ClientError::Closed { url });
        }
        id
    }

    /// Number of tasks currently registered; zero once closed.
    pub async fn pending_tasks(&self) -> usize {
        let (reply, count) = oneshot::channel();
        if self.commands.send(Command::Inspect { reply }).is_err() {
            return 0;
        }
        count.await.unwrap_or(0)
    }

    /// Stops the dispatcher, failing outstanding tasks. Idempotent.
    pub async fn close(&self) {
        let (reply, done) = oneshot::channel();
        if self.commands.send(Command::Close { reply }).is_ok() {
            let _ = done.await;
        }
    }

    /// Whether the dispatcher has stopped accepting tasks.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Submit { task, .. } => f.debug_struct("Submit").field("task", &task.id).finish(),
            Self::Inspect { .. } => f.write_str("Inspect"),
            Self::Close { .. } => f.write_str("Close"),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tasks", &self.tasks.len())
            .field("server_trust", &self.server_trust)
            .finish_non_exhaustive()
    }
}

//! Single-worker serializer for heterogeneous state-mutating requests.
//!
//! Producers submit tagged tasks through a bounded queue; one worker
//! dequeues them in FIFO order and dispatches each to the handler
//! registered for its kind. The worker exclusively owns the state value,
//! so handlers mutate it without any locking.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::errors::TaskError;

/// A unit of work accepted by a [`TaskProcessor`].
pub trait Task: Send + 'static {
    /// Discriminant routing the task to its registered handler.
    type Kind: Copy + Eq + Hash + fmt::Display + Send + 'static;

    fn kind(&self) -> Self::Kind;

    /// Invoked when the processor cannot run the task: no handler is
    /// registered for its kind, or the queue is drained at shutdown.
    /// Implementations forward the error to a blocking submitter.
    fn reject(self, error: TaskError);
}

/// Handler for one task kind. Borrows the worker-owned state for the
/// duration of the task.
pub type TaskHandler<S, T> =
    Box<dyn for<'a> FnMut(&'a mut S, T) -> BoxFuture<'a, anyhow::Result<()>> + Send>;

struct WorkerParts<S, T: Task> {
    queue_rx: mpsc::Receiver<T>,
    handlers: HashMap<T::Kind, TaskHandler<S, T>>,
}

/// Multi-producer, single-consumer task serializer.
///
/// Handlers are registered before [`TaskProcessor::start`]; starting moves
/// the queue, the handlers, and the caller-provided state into a single
/// worker. Submission order is dispatch order.
pub struct TaskProcessor<S, T: Task> {
    name: String,
    submit_tx: mpsc::Sender<T>,
    worker: Mutex<Option<WorkerParts<S, T>>>,
}

impl<S, T> TaskProcessor<S, T>
where
    S: Send + 'static,
    T: Task,
{
    /// `capacity` bounds the submission queue; producers block once it
    /// fills.
    pub fn new(name: &str, capacity: usize) -> Self {
        let (submit_tx, queue_rx) = mpsc::channel(capacity.max(1));
        Self {
            name: name.to_string(),
            submit_tx,
            worker: Mutex::new(Some(WorkerParts {
                queue_rx,
                handlers: HashMap::new(),
            })),
        }
    }

    /// Register the handler for one task kind. Fails once the worker has
    /// started, or if the kind already has a handler.
    pub async fn register(&self, kind: T::Kind, handler: TaskHandler<S, T>) -> Result<(), TaskError> {
        let mut worker = self.worker.lock().await;
        let parts = worker.as_mut().ok_or(TaskError::AlreadyStarted)?;
        if parts.handlers.contains_key(&kind) {
            return Err(TaskError::HandlerAlreadyRegistered(kind.to_string()));
        }
        parts.handlers.insert(kind, handler);
        Ok(())
    }

    /// Spawn the worker loop. A second start fails with
    /// [`TaskError::AlreadyStarted`].
    ///
    /// The worker runs until `scope` cancels (or every producer handle is
    /// dropped), then rejects whatever is still queued so blocking
    /// submitters unblock.
    pub async fn start(
        &self,
        state: S,
        scope: CancellationToken,
    ) -> Result<JoinHandle<()>, TaskError> {
        let parts = self
            .worker
            .lock()
            .await
            .take()
            .ok_or(TaskError::AlreadyStarted)?;
        let name = self.name.clone();

        Ok(tokio::spawn(async move {
            let WorkerParts {
                mut queue_rx,
                mut handlers,
            } = parts;
            let mut state = state;
            info!(target: "task_processor", processor = %name, "task worker started");
            loop {
                tokio::select! {
                    // Shutdown wins over queued work.
                    biased;
                    _ = scope.cancelled() => break,
                    next = queue_rx.recv() => match next {
                        Some(task) => {
                            Self::dispatch(&name, &mut handlers, &mut state, task).await;
                        }
                        None => break,
                    },
                }
            }
            queue_rx.close();
            while let Some(task) = queue_rx.recv().await {
                trace!(target: "task_processor", processor = %name, task = %task.kind(), "rejecting queued task at shutdown");
                task.reject(TaskError::Cancelled);
            }
            info!(target: "task_processor", processor = %name, "task worker stopped");
        }))
    }

    /// Enqueue a task. Blocks while the queue is full; returns
    /// [`TaskError::Cancelled`] if `scope` fires first and
    /// [`TaskError::QueueClosed`] once the worker has exited.
    pub async fn submit(&self, task: T, scope: &CancellationToken) -> Result<(), TaskError> {
        let kind = task.kind();
        tokio::select! {
            // A cancelled scope wins even when queue space is available.
            biased;
            _ = scope.cancelled() => {
                debug!(target: "task_processor", processor = %self.name, task = %kind, "submission cancelled");
                Err(TaskError::Cancelled)
            }
            sent = self.submit_tx.send(task) => sent.map_err(|_| TaskError::QueueClosed),
        }
    }

    async fn dispatch(
        name: &str,
        handlers: &mut HashMap<T::Kind, TaskHandler<S, T>>,
        state: &mut S,
        task: T,
    ) {
        let kind = task.kind();
        match handlers.get_mut(&kind) {
            Some(handler) => {
                if let Err(cause) = handler(state, task).await {
                    // Handler failures never stop the worker.
                    error!(target: "task_processor", processor = %name, task = %kind, error = %cause, "task handler failed");
                }
            }
            None => {
                error!(target: "task_processor", processor = %name, task = %kind, "no handler registered for task");
                task.reject(TaskError::UnknownKind(kind.to_string()));
            }
        }
    }
}

impl<S, T: Task> fmt::Debug for TaskProcessor<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
#[path = "task_processor_test.rs"]
mod tests;

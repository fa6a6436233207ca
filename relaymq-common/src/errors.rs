use thiserror::Error;

/// Contract violations and lifecycle failures of a [`crate::TaskProcessor`].
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("already started")]
    AlreadyStarted,

    #[error("handler already registered for task kind {0}")]
    HandlerAlreadyRegistered(String),

    #[error("no handler registered for task kind {0}")]
    UnknownKind(String),

    #[error("task queue closed")]
    QueueClosed,

    #[error("operation cancelled")]
    Cancelled,
}

/// Lifecycle failures of an [`crate::IntervalTimer`].
#[derive(Debug, Error)]
pub enum TimerError {
    #[error("timer scope cancelled")]
    Cancelled,
}

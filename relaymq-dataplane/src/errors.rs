use thiserror::Error;

use relaymq_common::TaskError;
use relaymq_core::{BrokerError, WireError};

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("already started")]
    AlreadyStarted,

    #[error("already reading")]
    AlreadyReading,

    #[error("message expected for {expected}, but meta says {actual}")]
    ConsumerMismatch { expected: String, actual: String },

    #[error("no records related to stream {0}")]
    NoRecordsForStream(String),

    #[error("no records related to consumer {consumer} on stream {stream}")]
    NoRecordsForConsumer { stream: String, consumer: String },

    #[error("no records related message [{sequence}] for {consumer}@{stream}")]
    NoRecordsForSequence {
        stream: String,
        consumer: String,
        sequence: u64,
    },

    #[error("client sink failure: {0}")]
    Sink(String),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("task result channel dropped before completion")]
    ResultChannelDropped,
}

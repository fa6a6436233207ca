use thiserror::Error;

/// Failures surfaced by a broker client implementation.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("read failure: {0}")]
    Read(String),

    #[error("publish failure: {0}")]
    Publish(String),

    #[error("ack-sync failure: {0}")]
    AckFailed(String),

    #[error("message metadata unavailable: {0}")]
    Metadata(String),

    #[error("publish ack future dropped before completion")]
    AckFutureDropped,
}

/// Failures decoding the ack-report wire format.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed ack subject: {0}")]
    MalformedSubject(String),

    #[error("malformed ack payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),
}

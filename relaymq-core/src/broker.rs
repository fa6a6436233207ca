use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::errors::BrokerError;
use crate::message::MessageMetadata;

/// A delivered message shared between the client sink and the inflight
/// registry until it is acked back to the broker.
pub type SharedMessage = Arc<dyn BrokerMessage>;

/// Handle to a single message delivered by the broker.
#[async_trait]
pub trait BrokerMessage: Send + Sync + fmt::Debug + 'static {
    fn subject(&self) -> &str;

    fn payload(&self) -> &[u8];

    /// The broker-side descriptor for this delivery.
    fn metadata(&self) -> Result<MessageMetadata, BrokerError>;

    /// Confirm delivery to the broker. Completes only once the broker has
    /// accepted the ack.
    async fn ack_sync(&self) -> Result<(), BrokerError>;
}

/// A durable subscription owned by exactly one reader.
#[async_trait]
pub trait BrokerSubscription: Send + Sync + fmt::Debug + 'static {
    /// Obtain the next delivery. Pends until a message arrives or the
    /// subscription becomes unusable.
    async fn next_message(&self) -> Result<SharedMessage, BrokerError>;

    async fn unsubscribe(&self) -> Result<(), BrokerError>;

    async fn drain(&self) -> Result<(), BrokerError>;
}

/// The broker operations the dispatch core consumes. Implemented by the
/// gateway's broker client, mocked in tests.
#[async_trait]
pub trait BrokerClient: Send + Sync + fmt::Debug + 'static {
    /// Durable subscription for `consumer` on `subject`.
    async fn subscribe(
        &self,
        subject: &str,
        consumer: &str,
    ) -> Result<Box<dyn BrokerSubscription>, BrokerError>;

    /// Durable subscription inside a delivery group, load-shared across
    /// consumers carrying the same name.
    async fn queue_subscribe(
        &self,
        subject: &str,
        consumer: &str,
        group: &str,
    ) -> Result<Box<dyn BrokerSubscription>, BrokerError>;

    /// Fire-and-track publish. The returned future resolves once the broker
    /// acks or rejects the message.
    async fn publish_async(
        &self,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<PublishAckFuture, BrokerError>;
}

/// Broker confirmation of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub stream: String,
    pub sequence: u64,
}

/// One-shot completion for an async publish. Exactly one outcome is
/// reported; a dropped sender surfaces as [`BrokerError::AckFutureDropped`].
#[derive(Debug)]
pub struct PublishAckFuture {
    outcome: oneshot::Receiver<Result<PublishReceipt, BrokerError>>,
}

impl PublishAckFuture {
    /// Endpoint pair for broker implementations: resolve the returned
    /// sender to complete the future handed to the publisher.
    pub fn endpoints() -> (
        oneshot::Sender<Result<PublishReceipt, BrokerError>>,
        PublishAckFuture,
    ) {
        let (tx, rx) = oneshot::channel();
        (tx, PublishAckFuture { outcome: rx })
    }

    pub async fn outcome(self) -> Result<PublishReceipt, BrokerError> {
        match self.outcome.await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::AckFutureDropped),
        }
    }
}

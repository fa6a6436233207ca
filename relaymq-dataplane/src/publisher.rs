//! Publish path into the broker, plus the gateway-side ack broadcast.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use relaymq_core::{AckIndication, BrokerClient};

use crate::errors::{DispatchError, Result};

/// Publishes messages into the broker and awaits the broker's verdict.
#[derive(Debug)]
pub struct StreamPublisher {
    instance: String,
    client: Arc<dyn BrokerClient>,
}

impl StreamPublisher {
    pub fn new(client: Arc<dyn BrokerClient>, instance: &str) -> Self {
        Self {
            instance: instance.to_string(),
            client,
        }
    }

    /// Publish `payload` on `subject` and wait for exactly one outcome:
    /// broker ack, broker rejection, or scope cancellation.
    pub async fn publish(
        &self,
        subject: &str,
        payload: Vec<u8>,
        scope: &CancellationToken,
    ) -> Result<()> {
        let ack = self.client.publish_async(subject, payload).await?;
        tokio::select! {
            _ = scope.cancelled() => {
                warn!(target: "stream_publisher", instance = %self.instance, subject, "publish cancelled while awaiting broker ack");
                Err(DispatchError::Cancelled)
            }
            outcome = ack.outcome() => match outcome {
                Ok(receipt) => {
                    debug!(
                        target: "stream_publisher",
                        instance = %self.instance,
                        stream = %receipt.stream,
                        sequence = receipt.sequence,
                        subject,
                        "publish confirmed"
                    );
                    Ok(())
                }
                Err(error) => {
                    error!(target: "stream_publisher", instance = %self.instance, subject, error = %error, "publish failed");
                    Err(error.into())
                }
            },
        }
    }
}

/// Broadcasts a client acknowledgement to every gateway instance serving
/// the consumer, via the ack-report subject.
#[derive(Debug)]
pub struct AckBroadcaster {
    publisher: StreamPublisher,
}

impl AckBroadcaster {
    pub fn new(client: Arc<dyn BrokerClient>, instance: &str) -> Self {
        Self {
            publisher: StreamPublisher::new(client, instance),
        }
    }

    pub async fn broadcast(&self, ack: &AckIndication, scope: &CancellationToken) -> Result<()> {
        let (subject, payload) = ack.to_wire()?;
        debug!(target: "ack_broadcaster", ack = %ack, "broadcasting client ack");
        self.publisher.publish(&subject, payload, scope).await
    }
}

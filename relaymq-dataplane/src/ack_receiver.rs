//! Reverse path entry: listens on the broker's ack-report subject and
//! turns each notification into an [`AckIndication`] for the tracker.

use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use relaymq_common::RequestParam;
use relaymq_core::{ack_report_subject, AckIndication, BrokerClient, BrokerSubscription};

use crate::errors::{DispatchError, Result};
use crate::subscriber::AlertOnError;
use crate::utils::component_span;

/// Callback receiving each decoded ack indication.
pub type AckIndicationHandler = Arc<dyn Fn(AckIndication) -> BoxFuture<'static, ()> + Send + Sync>;

/// Sole reader of the ack-report subject for one `(stream, consumer)`.
#[derive(Debug)]
pub struct AckReceiver {
    subscription: Mutex<Option<Box<dyn BrokerSubscription>>>,
    span: tracing::Span,
}

impl AckReceiver {
    /// Subscribe to the ack-report subject of `consumer` on `stream`.
    pub async fn new(
        client: &dyn BrokerClient,
        stream: &str,
        consumer: &str,
        request: Option<&RequestParam>,
    ) -> Result<Self> {
        let subject = ack_report_subject(stream, consumer);
        let monitor = format!("{consumer}-ack-monitor");
        let subscription = client.subscribe(&subject, &monitor).await?;
        Ok(Self {
            subscription: Mutex::new(Some(subscription)),
            span: component_span("ack-receiver", stream, &subject, consumer, request),
        })
    }

    /// Start decoding ack notifications into `on_ack`. Fails with
    /// [`DispatchError::AlreadyReading`] on re-entry.
    ///
    /// Undecodable notifications are logged and skipped. A broker read
    /// failure is reported through `on_error` and ends the loop; cleanup
    /// mirrors the push subscriber.
    pub async fn subscribe_for_acks(
        &self,
        on_ack: AckIndicationHandler,
        on_error: AlertOnError,
        scope: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let subscription = self
            .subscription
            .lock()
            .await
            .take()
            .ok_or(DispatchError::AlreadyReading)?;

        let worker = async move {
            info!(target: "ack_receiver", "listening for ack notifications");
            loop {
                tokio::select! {
                    _ = scope.cancelled() => {
                        debug!(target: "ack_receiver", "ack loop cancelled");
                        break;
                    }
                    next = subscription.next_message() => match next {
                        Ok(message) => {
                            match AckIndication::parse(message.subject(), message.payload()) {
                                Ok(ack) => {
                                    debug!(target: "ack_receiver", ack = %ack, "received ack indication");
                                    on_ack(ack).await;
                                }
                                Err(error) => {
                                    warn!(target: "ack_receiver", error = %error, subject = message.subject(), "skipping undecodable ack notification");
                                }
                            }
                        }
                        Err(error) => {
                            error!(target: "ack_receiver", error = %error, "read failure");
                            on_error(error.into());
                            break;
                        }
                    },
                }
            }
            if let Err(error) = subscription.drain().await {
                warn!(target: "ack_receiver", error = %error, "drain failed");
            } else {
                info!(target: "ack_receiver", "drained ack subscription");
            }
            if let Err(error) = subscription.unsubscribe().await {
                warn!(target: "ack_receiver", error = %error, "unsubscribe failed");
            } else {
                info!(target: "ack_receiver", "unsubscribed from ack subject");
            }
            info!(target: "ack_receiver", "ack loop stopped");
        };
        Ok(tokio::spawn(worker.instrument(self.span.clone())))
    }
}

//! Forward path: reads deliveries off a durable broker subscription and
//! hands each one to the client sink.

use futures::future::BoxFuture;
use metrics::counter;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn, Instrument};

use relaymq_common::RequestParam;
use relaymq_core::{BrokerSubscription, SharedMessage};

use crate::dataplane_metrics::MESSAGES_FORWARDED_TOTAL;
use crate::errors::{DispatchError, Result};
use crate::utils::component_span;

/// Callback forwarding a delivery to the next pipeline stage.
pub type ForwardMessageHandler =
    Arc<dyn Fn(SharedMessage) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Callback exposing a fatal internal error to the owning context.
pub type AlertOnError = Arc<dyn Fn(DispatchError) + Send + Sync>;

/// Sole reader of one durable subscription. The subscription handle moves
/// into the worker on [`PushSubscriber::start_reading`]; nothing else
/// touches the broker's read side.
#[derive(Debug)]
pub struct PushSubscriber {
    stream: String,
    consumer: String,
    subscription: Mutex<Option<Box<dyn BrokerSubscription>>>,
    span: tracing::Span,
}

impl PushSubscriber {
    pub fn new(
        stream: &str,
        subject: &str,
        consumer: &str,
        subscription: Box<dyn BrokerSubscription>,
        request: Option<&RequestParam>,
    ) -> Self {
        Self {
            stream: stream.to_string(),
            consumer: consumer.to_string(),
            subscription: Mutex::new(Some(subscription)),
            span: component_span("push-reader", stream, subject, consumer, request),
        }
    }

    /// Become the subscription's reader. Fails with
    /// [`DispatchError::AlreadyReading`] on re-entry.
    ///
    /// The worker forwards each delivery through `forward`; forward errors
    /// are reported via `on_error` and the loop continues. A broker read
    /// failure is reported and ends the loop. On exit the subscription is
    /// drained and unsubscribed, both best-effort.
    pub async fn start_reading(
        &self,
        forward: ForwardMessageHandler,
        on_error: AlertOnError,
        scope: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let subscription = self
            .subscription
            .lock()
            .await
            .take()
            .ok_or(DispatchError::AlreadyReading)?;
        let stream = self.stream.clone();
        let consumer = self.consumer.clone();

        let worker = async move {
            info!(target: "push_subscriber", "reading from subscription");
            loop {
                tokio::select! {
                    _ = scope.cancelled() => {
                        debug!(target: "push_subscriber", "read loop cancelled");
                        break;
                    }
                    next = subscription.next_message() => match next {
                        Ok(message) => {
                            trace!(target: "push_subscriber", subject = message.subject(), "received message");
                            match forward(message).await {
                                Ok(()) => {
                                    counter!(MESSAGES_FORWARDED_TOTAL.name, "stream" => stream.clone(), "consumer" => consumer.clone()).increment(1);
                                }
                                Err(error) => {
                                    error!(target: "push_subscriber", error = %error, "unable to forward message");
                                    on_error(error);
                                }
                            }
                        }
                        Err(error) => {
                            error!(target: "push_subscriber", error = %error, "read failure");
                            on_error(error.into());
                            break;
                        }
                    },
                }
            }
            // Cleanup is best-effort; attempt both even if one fails.
            if let Err(error) = subscription.drain().await {
                warn!(target: "push_subscriber", error = %error, "drain failed");
            } else {
                info!(target: "push_subscriber", "drained subscription");
            }
            if let Err(error) = subscription.unsubscribe().await {
                warn!(target: "push_subscriber", error = %error, "unsubscribe failed");
            } else {
                info!(target: "push_subscriber", "unsubscribed from subject");
            }
            info!(target: "push_subscriber", "read loop stopped");
        };
        Ok(tokio::spawn(worker.instrument(self.span.clone())))
    }
}

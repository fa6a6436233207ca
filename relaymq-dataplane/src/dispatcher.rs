//! Wires the per-subscription pipeline together: task processor, ack
//! receiver, and push subscriber under one cancellation scope.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use relaymq_common::RequestParam;
use relaymq_core::BrokerClient;

use crate::ack_receiver::{AckIndicationHandler, AckReceiver};
use crate::errors::{DispatchError, Result};
use crate::inflight::InflightTracker;
use crate::subscriber::{AlertOnError, ForwardMessageHandler, PushSubscriber};

/// Per-subscription configuration handed in by the management layer.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub stream: String,
    pub subject: String,
    pub consumer: String,
    /// Load-share deliveries across consumers carrying the same name.
    pub delivery_group: Option<String>,
    /// Sizes the tracker's task queue at four times this value.
    pub max_inflight: usize,
    /// Parameters of the client request this pipeline serves, if any.
    pub request: Option<RequestParam>,
}

/// Serves one consumer subscription: deliveries flow broker → client sink
/// → inflight tracker, acks flow ack subject → tracker → broker.
#[derive(Debug)]
pub struct MessageDispatcher {
    stream: String,
    consumer: String,
    scope: CancellationToken,
    started: Mutex<bool>,
    tracker: Arc<InflightTracker>,
    ack_receiver: AckReceiver,
    subscriber: PushSubscriber,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl MessageDispatcher {
    /// Build the collaborators for one subscription. Any failure aborts
    /// construction.
    pub async fn new(
        client: Arc<dyn BrokerClient>,
        settings: DispatcherSettings,
        scope: CancellationToken,
    ) -> Result<Self> {
        let DispatcherSettings {
            stream,
            subject,
            consumer,
            delivery_group,
            max_inflight,
            request,
        } = settings;

        let ack_receiver = AckReceiver::new(client.as_ref(), &stream, &consumer, request.as_ref())
            .await
            .map_err(|error| {
                error!(target: "dispatcher", stream = %stream, consumer = %consumer, error = %error, "unable to define ack receiver");
                error
            })?;

        let queue_capacity = max_inflight.saturating_mul(4).max(1);
        let tracker = InflightTracker::new(&stream, &subject, &consumer, queue_capacity)
            .await
            .map_err(|error| {
                error!(target: "dispatcher", stream = %stream, consumer = %consumer, error = %error, "unable to define message tracker");
                error
            })?;

        let subscription = match &delivery_group {
            Some(group) => client.queue_subscribe(&subject, &consumer, group).await,
            None => client.subscribe(&subject, &consumer).await,
        }
        .map_err(|error| {
            error!(target: "dispatcher", stream = %stream, consumer = %consumer, error = %error, "unable to define subscription");
            DispatchError::from(error)
        })?;
        let subscriber =
            PushSubscriber::new(&stream, &subject, &consumer, subscription, request.as_ref());

        Ok(Self {
            stream,
            consumer,
            scope,
            started: Mutex::new(false),
            tracker: Arc::new(tracker),
            ack_receiver,
            subscriber,
            workers: Mutex::new(Vec::new()),
        })
    }

    /// Start the pipeline: task worker first, then the ack listener, then
    /// the subscription reader. Re-entry fails with `already started`.
    ///
    /// `forward` is the client sink; it sees every delivery before the
    /// tracker records it, so no ack can resolve against an unseen
    /// message. `on_error` receives fatal source-side failures.
    ///
    /// A failure partway through startup cancels the scope and joins the
    /// workers already spawned; the dispatcher cannot be restarted.
    pub async fn start(&self, forward: ForwardMessageHandler, on_error: AlertOnError) -> Result<()> {
        // Flag flip only; the startup awaits below run outside the lock.
        {
            let mut started = self.started.lock().await;
            if *started {
                return Err(DispatchError::AlreadyStarted);
            }
            *started = true;
        }

        if let Err(error) = self.start_workers(forward, on_error).await {
            error!(target: "dispatcher", stream = %self.stream, consumer = %self.consumer, error = %error, "startup failed, tearing down partial pipeline");
            self.scope.cancel();
            self.wait_for_shutdown().await;
            return Err(error);
        }
        info!(target: "dispatcher", stream = %self.stream, consumer = %self.consumer, "dispatch pipeline started");
        Ok(())
    }

    async fn start_workers(
        &self,
        forward: ForwardMessageHandler,
        on_error: AlertOnError,
    ) -> Result<()> {
        let worker = self.tracker.start(self.scope.clone()).await?;
        self.workers.lock().await.push(worker);

        let tracker = self.tracker.clone();
        let scope = self.scope.clone();
        let on_ack: AckIndicationHandler = Arc::new(move |ack| {
            let tracker = tracker.clone();
            let scope = scope.clone();
            Box::pin(async move {
                let label = ack.to_string();
                if let Err(error) = tracker.handle_ack(ack, false, &scope).await {
                    error!(target: "dispatcher", ack = %label, error = %error, "failed to submit ack for tracking");
                }
            })
        });
        let worker = self
            .ack_receiver
            .subscribe_for_acks(on_ack, on_error.clone(), self.scope.clone())
            .await?;
        self.workers.lock().await.push(worker);

        let tracker = self.tracker.clone();
        let scope = self.scope.clone();
        let chained: ForwardMessageHandler = Arc::new(move |message| {
            let tracker = tracker.clone();
            let scope = scope.clone();
            // Client sink first; a tracker failure must not hide the
            // message from the client.
            let downstream = forward(message.clone());
            Box::pin(async move {
                downstream.await?;
                tracker.record(message, false, &scope).await
            })
        });
        let worker = self
            .subscriber
            .start_reading(chained, on_error, self.scope.clone())
            .await?;
        self.workers.lock().await.push(worker);
        Ok(())
    }

    /// Block until every worker spawned by [`MessageDispatcher::start`]
    /// has exited.
    pub async fn wait_for_shutdown(&self) {
        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for outcome in join_all(workers).await {
            if let Err(error) = outcome {
                error!(target: "dispatcher", stream = %self.stream, consumer = %self.consumer, error = %error, "worker terminated abnormally");
            }
        }
    }

    /// Cancel the scope and wait for the pipeline to drain.
    pub async fn shutdown(&self) {
        self.scope.cancel();
        self.wait_for_shutdown().await;
    }

    pub fn scope(&self) -> &CancellationToken {
        &self.scope
    }
}

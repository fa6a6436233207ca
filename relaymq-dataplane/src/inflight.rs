//! Registry of delivered messages awaiting client acknowledgement.
//!
//! All mutations of the registry funnel through a [`TaskProcessor`], so the
//! nested map is owned by a single worker and needs no locking. Acks route
//! to the stored message handle and are confirmed to the broker with
//! `ack_sync` before the entry is evicted.

use futures::future::BoxFuture;
use metrics::{counter, gauge};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use relaymq_common::{Task, TaskError, TaskProcessor};
use relaymq_core::{AckIndication, SharedMessage};

use crate::dataplane_metrics::{
    ACKS_PROCESSED_TOTAL, ACKS_REJECTED_TOTAL, INFLIGHT_MESSAGES, MESSAGES_RECORDED_TOTAL,
};
use crate::errors::{DispatchError, Result};

type ReplySender = oneshot::Sender<Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum TrackerTaskKind {
    Record,
    Ack,
}

impl fmt::Display for TrackerTaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TrackerTaskKind::Record => "record-inflight",
            TrackerTaskKind::Ack => "handle-ack",
        };
        write!(f, "{label}")
    }
}

/// Requests accepted by the tracker's task worker. `reply` is present iff
/// the submitter is blocking on the outcome.
pub(crate) enum TrackerTask {
    Record {
        received_at: Instant,
        message: SharedMessage,
        reply: Option<ReplySender>,
    },
    Ack {
        received_at: Instant,
        ack: AckIndication,
        reply: Option<ReplySender>,
    },
}

impl Task for TrackerTask {
    type Kind = TrackerTaskKind;

    fn kind(&self) -> TrackerTaskKind {
        match self {
            TrackerTask::Record { .. } => TrackerTaskKind::Record,
            TrackerTask::Ack { .. } => TrackerTaskKind::Ack,
        }
    }

    fn reject(self, error: TaskError) {
        let reply = match self {
            TrackerTask::Record { reply, .. } => reply,
            TrackerTask::Ack { reply, .. } => reply,
        };
        if let Some(reply) = reply {
            let outcome = match error {
                TaskError::Cancelled => DispatchError::Cancelled,
                other => other.into(),
            };
            let _ = reply.send(Err(outcome));
        }
    }
}

#[derive(Default)]
struct PerConsumerInflight {
    inflight: HashMap<u64, SharedMessage>,
}

#[derive(Default)]
struct PerStreamInflight {
    consumers: HashMap<String, PerConsumerInflight>,
}

/// Worker-owned state: `stream → consumer → stream_sequence → message`.
struct InflightState {
    consumer: String,
    inflight_per_stream: HashMap<String, PerStreamInflight>,
}

impl InflightState {
    fn new(consumer: &str) -> Self {
        Self {
            consumer: consumer.to_string(),
            inflight_per_stream: HashMap::new(),
        }
    }

    fn record_task(state: &mut InflightState, task: TrackerTask) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(Self::apply_record(state, task))
    }

    fn ack_task(state: &mut InflightState, task: TrackerTask) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(Self::apply_ack(state, task))
    }

    async fn apply_record(state: &mut InflightState, task: TrackerTask) -> anyhow::Result<()> {
        let TrackerTask::Record {
            received_at,
            message,
            reply,
        } = task
        else {
            anyhow::bail!("record handler received a mismatched task");
        };
        trace!(target: "inflight_tracker", queued_for = ?received_at.elapsed(), "processing inflight record");
        complete(state.record_message(message), reply)
    }

    async fn apply_ack(state: &mut InflightState, task: TrackerTask) -> anyhow::Result<()> {
        let TrackerTask::Ack {
            received_at,
            ack,
            reply,
        } = task
        else {
            anyhow::bail!("ack handler received a mismatched task");
        };
        trace!(target: "inflight_tracker", queued_for = ?received_at.elapsed(), ack = %ack, "processing ack");
        let outcome = state.ack_message(&ack).await;
        if matches!(
            outcome,
            Err(DispatchError::NoRecordsForStream(_)
                | DispatchError::NoRecordsForConsumer { .. }
                | DispatchError::NoRecordsForSequence { .. })
        ) {
            counter!(ACKS_REJECTED_TOTAL.name, "stream" => ack.stream.clone(), "consumer" => ack.consumer.clone()).increment(1);
        }
        complete(outcome, reply)
    }

    fn record_message(&mut self, message: SharedMessage) -> Result<()> {
        let meta = message.metadata()?;
        if self.consumer != meta.consumer {
            return Err(DispatchError::ConsumerMismatch {
                expected: self.consumer.clone(),
                actual: meta.consumer,
            });
        }

        let per_consumer = self
            .inflight_per_stream
            .entry(meta.stream.clone())
            .or_default()
            .consumers
            .entry(meta.consumer.clone())
            .or_default();
        if per_consumer
            .inflight
            .insert(meta.stream_sequence, message)
            .is_some()
        {
            // Broker redelivery supersedes the stored handle.
            debug!(target: "inflight_tracker", message = %meta, "replaced inflight record on redelivery");
        } else {
            gauge!(INFLIGHT_MESSAGES.name, "stream" => meta.stream.clone(), "consumer" => meta.consumer.clone()).increment(1.0);
        }
        counter!(MESSAGES_RECORDED_TOTAL.name, "stream" => meta.stream.clone(), "consumer" => meta.consumer.clone()).increment(1);
        debug!(target: "inflight_tracker", message = %meta, "recorded inflight message");
        Ok(())
    }

    async fn ack_message(&mut self, ack: &AckIndication) -> Result<()> {
        let per_stream = self
            .inflight_per_stream
            .get_mut(&ack.stream)
            .ok_or_else(|| DispatchError::NoRecordsForStream(ack.stream.clone()))?;
        let per_consumer = per_stream
            .consumers
            .get_mut(&ack.consumer)
            .ok_or_else(|| DispatchError::NoRecordsForConsumer {
                stream: ack.stream.clone(),
                consumer: ack.consumer.clone(),
            })?;
        let message =
            per_consumer
                .inflight
                .get(&ack.stream_sequence)
                .ok_or_else(|| DispatchError::NoRecordsForSequence {
                    stream: ack.stream.clone(),
                    consumer: ack.consumer.clone(),
                    sequence: ack.stream_sequence,
                })?;

        // A failed ack-sync keeps the entry; the broker redelivers after
        // its ack-wait timeout.
        message.ack_sync().await?;
        per_consumer.inflight.remove(&ack.stream_sequence);
        gauge!(INFLIGHT_MESSAGES.name, "stream" => ack.stream.clone(), "consumer" => ack.consumer.clone()).decrement(1.0);
        counter!(ACKS_PROCESSED_TOTAL.name, "stream" => ack.stream.clone(), "consumer" => ack.consumer.clone()).increment(1);
        debug!(target: "inflight_tracker", ack = %ack, "confirmed ack and evicted record");
        Ok(())
    }
}

/// Deliver the outcome to a blocking submitter, then report it to the
/// worker for logging.
fn complete(outcome: Result<()>, reply: Option<ReplySender>) -> anyhow::Result<()> {
    let summary = outcome.as_ref().err().map(|error| anyhow::anyhow!("{error}"));
    if let Some(reply) = reply {
        let _ = reply.send(outcome);
    }
    match summary {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

/// Tracks messages delivered to one consumer until they are acked back to
/// the broker. Owns the task processor that serializes every mutation.
#[derive(Debug)]
pub struct InflightTracker {
    stream: String,
    subject: String,
    consumer: String,
    processor: TaskProcessor<InflightState, TrackerTask>,
}

impl InflightTracker {
    pub async fn new(
        stream: &str,
        subject: &str,
        consumer: &str,
        queue_capacity: usize,
    ) -> Result<Self> {
        let instance = format!("{consumer}@{stream}/{subject}");
        let processor = TaskProcessor::new(&instance, queue_capacity);
        processor
            .register(TrackerTaskKind::Record, Box::new(InflightState::record_task))
            .await?;
        processor
            .register(TrackerTaskKind::Ack, Box::new(InflightState::ack_task))
            .await?;
        Ok(Self {
            stream: stream.to_string(),
            subject: subject.to_string(),
            consumer: consumer.to_string(),
            processor,
        })
    }

    /// Spawn the task worker that owns the inflight map.
    pub async fn start(&self, scope: CancellationToken) -> Result<JoinHandle<()>> {
        let state = InflightState::new(&self.consumer);
        Ok(self.processor.start(state, scope).await?)
    }

    /// Record a delivered message as awaiting ack. With `blocking` the call
    /// suspends until the worker reports the outcome or `scope` cancels.
    pub async fn record(
        &self,
        message: SharedMessage,
        blocking: bool,
        scope: &CancellationToken,
    ) -> Result<()> {
        let (reply, wait) = reply_endpoints(blocking);
        let task = TrackerTask::Record {
            received_at: Instant::now(),
            message,
            reply,
        };
        self.run(task, wait, scope).await
    }

    /// Route a client ack to its recorded message and confirm it to the
    /// broker. Blocking semantics as for [`InflightTracker::record`].
    pub async fn handle_ack(
        &self,
        ack: AckIndication,
        blocking: bool,
        scope: &CancellationToken,
    ) -> Result<()> {
        let (reply, wait) = reply_endpoints(blocking);
        let task = TrackerTask::Ack {
            received_at: Instant::now(),
            ack,
            reply,
        };
        self.run(task, wait, scope).await
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    async fn run(
        &self,
        task: TrackerTask,
        wait: Option<oneshot::Receiver<Result<()>>>,
        scope: &CancellationToken,
    ) -> Result<()> {
        match self.processor.submit(task, scope).await {
            Ok(()) => {}
            Err(TaskError::Cancelled) => return Err(DispatchError::Cancelled),
            Err(error) => return Err(error.into()),
        }
        let Some(wait) = wait else {
            return Ok(());
        };
        tokio::select! {
            _ = scope.cancelled() => Err(DispatchError::Cancelled),
            outcome = wait => match outcome {
                Ok(result) => result,
                Err(_) => Err(DispatchError::ResultChannelDropped),
            },
        }
    }
}

fn reply_endpoints(blocking: bool) -> (Option<ReplySender>, Option<oneshot::Receiver<Result<()>>>) {
    if blocking {
        let (tx, rx) = oneshot::channel();
        (Some(tx), Some(rx))
    } else {
        (None, None)
    }
}

#[cfg(test)]
#[path = "inflight_test.rs"]
mod tests;

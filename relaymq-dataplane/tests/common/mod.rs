#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use relaymq_core::{
    AckIndication, BrokerClient, BrokerError, BrokerMessage, BrokerSubscription, MessageMetadata,
    PublishAckFuture, PublishReceipt, SharedMessage,
};

/// Observable side effects of one mock subscription.
#[derive(Debug, Default)]
pub struct SubscriptionEvents {
    pub unsubscribed: AtomicBool,
    pub drained: AtomicBool,
    pub group: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    Ack,
    Reject,
    Hold,
}

/// Channel-backed broker double. Subscriptions are keyed by subject;
/// tests push deliveries with [`MockBroker::deliver`].
#[derive(Debug)]
pub struct MockBroker {
    topics: Mutex<HashMap<String, mpsc::Sender<SharedMessage>>>,
    events: Mutex<HashMap<String, Arc<SubscriptionEvents>>>,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    publish_mode: Mutex<PublishMode>,
    held_acks: Mutex<Vec<tokio::sync::oneshot::Sender<Result<PublishReceipt, BrokerError>>>>,
    sequence: AtomicU64,
}

impl MockBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            topics: Mutex::new(HashMap::new()),
            events: Mutex::new(HashMap::new()),
            published: Mutex::new(Vec::new()),
            publish_mode: Mutex::new(PublishMode::Ack),
            held_acks: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        })
    }

    pub async fn deliver(&self, subject: &str, message: SharedMessage) {
        let tx = self
            .topics
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .unwrap_or_else(|| panic!("no subscription on {subject}"));
        // A subscription whose reader is gone just drops the delivery.
        let _ = tx.send(message).await;
    }

    /// Drop the delivery channel for `subject`; the subscription's next
    /// read fails.
    pub fn close_subject(&self, subject: &str) {
        self.topics.lock().unwrap().remove(subject);
    }

    pub fn events(&self, subject: &str) -> Arc<SubscriptionEvents> {
        self.events
            .lock()
            .unwrap()
            .get(subject)
            .cloned()
            .unwrap_or_else(|| panic!("no subscription on {subject}"))
    }

    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    pub fn set_publish_mode(&self, mode: PublishMode) {
        *self.publish_mode.lock().unwrap() = mode;
    }

    fn register(&self, subject: &str, group: Option<&str>) -> Box<dyn BrokerSubscription> {
        let (tx, rx) = mpsc::channel(32);
        self.topics.lock().unwrap().insert(subject.to_string(), tx);
        let events = Arc::new(SubscriptionEvents::default());
        if let Some(group) = group {
            *events.group.lock().unwrap() = Some(group.to_string());
        }
        self.events
            .lock()
            .unwrap()
            .insert(subject.to_string(), events.clone());
        Box::new(MockSubscription {
            subject: subject.to_string(),
            rx: tokio::sync::Mutex::new(rx),
            events,
        })
    }
}

#[async_trait]
impl BrokerClient for MockBroker {
    async fn subscribe(
        &self,
        subject: &str,
        _consumer: &str,
    ) -> Result<Box<dyn BrokerSubscription>, BrokerError> {
        Ok(self.register(subject, None))
    }

    async fn queue_subscribe(
        &self,
        subject: &str,
        _consumer: &str,
        group: &str,
    ) -> Result<Box<dyn BrokerSubscription>, BrokerError> {
        Ok(self.register(subject, Some(group)))
    }

    async fn publish_async(
        &self,
        subject: &str,
        payload: Vec<u8>,
    ) -> Result<PublishAckFuture, BrokerError> {
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), payload));
        let (tx, future) = PublishAckFuture::endpoints();
        match *self.publish_mode.lock().unwrap() {
            PublishMode::Ack => {
                let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = tx.send(Ok(PublishReceipt {
                    stream: "MOCK".to_string(),
                    sequence,
                }));
            }
            PublishMode::Reject => {
                let _ = tx.send(Err(BrokerError::Publish("rejected by broker".to_string())));
            }
            PublishMode::Hold => self.held_acks.lock().unwrap().push(tx),
        }
        Ok(future)
    }
}

#[derive(Debug)]
pub struct MockSubscription {
    subject: String,
    rx: tokio::sync::Mutex<mpsc::Receiver<SharedMessage>>,
    events: Arc<SubscriptionEvents>,
}

#[async_trait]
impl BrokerSubscription for MockSubscription {
    async fn next_message(&self) -> Result<SharedMessage, BrokerError> {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| BrokerError::Read(format!("subscription on {} closed", self.subject)))
    }

    async fn unsubscribe(&self) -> Result<(), BrokerError> {
        self.events.unsubscribed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn drain(&self) -> Result<(), BrokerError> {
        self.events.drained.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
pub struct TestMessage {
    subject: String,
    payload: Vec<u8>,
    meta: MessageMetadata,
    acked: AtomicUsize,
}

impl TestMessage {
    /// A regular stream delivery.
    pub fn deliverable(
        stream: &str,
        consumer: &str,
        subject: &str,
        stream_sequence: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            subject: subject.to_string(),
            payload: format!("payload-{stream_sequence}").into_bytes(),
            meta: MessageMetadata {
                stream: stream.to_string(),
                consumer: consumer.to_string(),
                stream_sequence,
                consumer_sequence: stream_sequence,
                publish_time: 0,
            },
            acked: AtomicUsize::new(0),
        })
    }

    /// An ack-report delivery carrying `ack` in wire form.
    pub fn ack_notification(ack: &AckIndication) -> Arc<Self> {
        let (subject, payload) = ack.to_wire().expect("render ack");
        Arc::new(Self {
            subject,
            payload,
            meta: MessageMetadata {
                stream: ack.stream.clone(),
                consumer: ack.consumer.clone(),
                stream_sequence: 0,
                consumer_sequence: 0,
                publish_time: 0,
            },
            acked: AtomicUsize::new(0),
        })
    }

    pub fn ack_count(&self) -> usize {
        self.acked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerMessage for TestMessage {
    fn subject(&self) -> &str {
        &self.subject
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }

    fn metadata(&self) -> Result<MessageMetadata, BrokerError> {
        Ok(self.meta.clone())
    }

    async fn ack_sync(&self) -> Result<(), BrokerError> {
        self.acked.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

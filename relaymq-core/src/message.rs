use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Broker-assigned descriptor attached to every delivered message.
///
/// `stream_sequence` is the position of the message within its stream,
/// `consumer_sequence` the position within the consumer's delivery cursor.
/// Both are required to route an acknowledgement back to the message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub stream: String,
    pub consumer: String,
    pub stream_sequence: u64,
    pub consumer_sequence: u64,
    // Publish timestamp in milliseconds since the epoch, as reported by the broker
    pub publish_time: u64,
}

impl Display for MessageMetadata {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}[{}/{}]",
            self.consumer, self.stream, self.stream_sequence, self.consumer_sequence,
        )
    }
}

/// Out-of-band notification that a client acknowledged a specific message.
///
/// Equality is structural; two indications naming the same
/// `(stream, consumer, sequences)` tuple are interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckIndication {
    pub stream: String,
    pub consumer: String,
    pub stream_sequence: u64,
    pub consumer_sequence: u64,
}

impl AckIndication {
    pub fn new(stream: &str, consumer: &str, stream_sequence: u64, consumer_sequence: u64) -> Self {
        Self {
            stream: stream.into(),
            consumer: consumer.into(),
            stream_sequence,
            consumer_sequence,
        }
    }
}

impl Display for AckIndication {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ack for {}@{} [{}/{}]",
            self.consumer, self.stream, self.stream_sequence, self.consumer_sequence,
        )
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;

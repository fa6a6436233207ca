use serde::{Deserialize, Serialize};

use crate::errors::WireError;
use crate::message::AckIndication;

/// Subject prefix under which gateway instances broadcast client acks.
pub const ACK_REPORT_PREFIX: &str = "ack-rx";

/// Ack-report subject for one `(stream, consumer)` pair.
///
/// Stream and consumer names are broker subject tokens and must not
/// contain `.`.
pub fn ack_report_subject(stream: &str, consumer: &str) -> String {
    format!("{}.{}.{}", ACK_REPORT_PREFIX, stream, consumer)
}

/// Payload of an ack-report message. The stream and consumer names travel
/// in the subject, only the sequence pair travels in the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckSeqNum {
    pub stream_sequence: u64,
    pub consumer_sequence: u64,
}

impl AckIndication {
    /// Reconstruct an indication from an ack-report delivery.
    pub fn parse(subject: &str, payload: &[u8]) -> Result<Self, WireError> {
        let mut tokens = subject.split('.');
        match (tokens.next(), tokens.next(), tokens.next(), tokens.next()) {
            (Some(ACK_REPORT_PREFIX), Some(stream), Some(consumer), None)
                if !stream.is_empty() && !consumer.is_empty() =>
            {
                let seq: AckSeqNum = serde_json::from_slice(payload)?;
                Ok(AckIndication {
                    stream: stream.into(),
                    consumer: consumer.into(),
                    stream_sequence: seq.stream_sequence,
                    consumer_sequence: seq.consumer_sequence,
                })
            }
            _ => Err(WireError::MalformedSubject(subject.into())),
        }
    }

    /// Render the indication as an ack-report `(subject, payload)` pair.
    pub fn to_wire(&self) -> Result<(String, Vec<u8>), WireError> {
        let payload = serde_json::to_vec(&AckSeqNum {
            stream_sequence: self.stream_sequence,
            consumer_sequence: self.consumer_sequence,
        })?;
        Ok((ack_report_subject(&self.stream, &self.consumer), payload))
    }
}

#[cfg(test)]
#[path = "wire_test.rs"]
mod tests;

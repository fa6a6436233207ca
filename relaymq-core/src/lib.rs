mod broker;
mod errors;
mod message;
mod wire;

pub use broker::{
    BrokerClient, BrokerMessage, BrokerSubscription, PublishAckFuture, PublishReceipt,
    SharedMessage,
};
pub use errors::{BrokerError, WireError};
pub use message::{AckIndication, MessageMetadata};
pub use wire::{ack_report_subject, AckSeqNum, ACK_REPORT_PREFIX};

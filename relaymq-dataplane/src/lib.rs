//! Per-subscription message dispatch for the relaymq gateway.
//!
//! Each active consumer subscription gets a [`MessageDispatcher`] that
//! fuses broker deliveries, client acknowledgements, and cancellation into
//! one pipeline: deliveries flow to the client sink and into the
//! [`InflightTracker`]; acks arriving on the broker's ack-report subject
//! route back to the recorded message and are confirmed with `ack_sync`.

mod ack_receiver;
mod dataplane_metrics;
mod dispatcher;
mod errors;
mod inflight;
mod publisher;
mod subscriber;
mod utils;

pub use ack_receiver::{AckIndicationHandler, AckReceiver};
pub use dataplane_metrics::describe_dataplane_metrics;
pub use dispatcher::{DispatcherSettings, MessageDispatcher};
pub use errors::{DispatchError, Result};
pub use inflight::InflightTracker;
pub use publisher::{AckBroadcaster, StreamPublisher};
pub use subscriber::{AlertOnError, ForwardMessageHandler, PushSubscriber};

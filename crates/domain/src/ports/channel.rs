use std::time::Duration;

use thiserror::Error;

use super::BoxFuture;
use crate::event::{CaptureEvent, EventFilter};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
    #[error("channel serialization error: {0}")]
    Serialization(String),
    #[error("channel operation failed: {0}")]
    Operation(String),
}

/// One message handed to a consumer. Must be acked once fully processed;
/// un-acked deliveries come back through `reclaim`.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    pub delivery_id: String,
    pub key: String,
    pub event: CaptureEvent,
}

/// Durable, partitioned, at-least-once log. All messages published with the
/// same key reach a given group in publish order; handlers must be
/// idempotent. `receive` evaluates the subscription filter per message and
/// acks non-matching messages without surfacing them.
pub trait EventChannel: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        key: &str,
        event: &CaptureEvent,
    ) -> BoxFuture<'_, Result<(), ChannelError>>;

    fn receive(
        &self,
        topic: &str,
        group: &str,
        filter: EventFilter,
        wait: Duration,
    ) -> BoxFuture<'_, Result<Option<Delivery>, ChannelError>>;

    fn ack(
        &self,
        topic: &str,
        group: &str,
        delivery_id: &str,
    ) -> BoxFuture<'_, Result<(), ChannelError>>;

    /// Returns deliveries handed out earlier but never acked, once they have
    /// been idle for `min_idle`. Redelivered messages are not re-filtered;
    /// callers apply their subscription filter again.
    fn reclaim(
        &self,
        topic: &str,
        group: &str,
        min_idle: Duration,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Delivery>, ChannelError>>;
}

//! Transport-agnostic bus contract (spec §3, §5) shared between the Bridge
//! (which implements it over in-process channels) and any component that
//! only needs to talk to the Bridge, not embed it.
//!
//! Generalizes the teacher's `MessageBus` trait from a generic pub/sub
//! primitive to the Bridge's specific publish/subscribe/history surface.

use async_trait::async_trait;
use thiserror::Error;

use crate::wire::Message;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("unknown target component: {0}")]
    UnknownTarget(String),
    #[error("source rate limited")]
    RateLimited,
    #[error("message exceeds size bound")]
    TooLarge,
    #[error("signature invalid or missing")]
    BadSignature,
    #[error("channel closed")]
    Closed,
}

/// What to do when a subscriber's inbound channel is full (spec §3: the
/// Bridge must not block a fast publisher on one slow subscriber).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagPolicy {
    /// Drop the message and count it as a dead letter.
    DropAndDeadLetter,
    /// Drop the oldest buffered message to make room.
    DropOldest,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), BusError>;

    /// Register a component and return its inbound receiver channel name/id.
    /// Concrete transports (the Bridge) hand back an actual `Receiver`; the
    /// trait only commits to the registration side effect.
    async fn register(&self, component_id: &str) -> Result<(), BusError>;

    async fn unregister(&self, component_id: &str) -> Result<(), BusError>;

    /// Most recent `limit` messages involving `component_id`, newest-last.
    async fn history(&self, component_id: &str, limit: usize) -> Vec<Message>;
}

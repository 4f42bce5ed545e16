// src/domain/channel.rs

//! Broker channel and connection abstractions.
//!
//! This module defines the domain-level interface to a broker. It names the
//! primitives the publish pipeline and the topology model need (publish,
//! declare, bind, consume) without committing to any client library.
//!
//! A broker channel accepts one operation at a time. Implementations of
//! [`Channel`] are not required to enforce that themselves; callers reach a
//! channel only through a [`ChannelReference`](crate::ChannelReference), which
//! serializes access.
//!
//! Concrete implementations live under `src/transport/`.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{Bindable, Exchange, PublishProperties, Queue, Result, TopologyOp};

/// Confirmation returned for each successful publish.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PublishReceipt {
    /// Handed to the broker; no acknowledgement was requested.
    Accepted,
    /// The broker acknowledged the message.
    Confirmed {
        /// Channel-local publish sequence number assigned by the transport.
        sequence: u64,
    },
}

impl PublishReceipt {
    /// Whether the broker acknowledged the message.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, PublishReceipt::Confirmed { .. })
    }
}

/// A message delivered from a queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    /// Exchange the message was originally published to.
    pub exchange: String,
    /// Routing key it was published with.
    pub routing_key: String,
    /// Properties it was published with.
    pub properties: PublishProperties,
    /// Serialized payload.
    pub payload: Bytes,
}

/// Receiver side of a queue consumer.
///
/// Dropping it cancels the consumer.
pub struct DeliveryStream {
    /// Deliveries in arrival order.
    pub inbox: mpsc::Receiver<Delivery>,
}

/// A single broker channel.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show explicit
/// lifetimes and a boxed `Future`. Treat the methods as plain `async fn`s.
#[async_trait::async_trait]
pub trait Channel: Send + Sync {
    // ---
    /// Identifier used in log lines.
    fn channel_id(&self) -> &str;

    /// Publish `payload` to `exchange` with `routing_key`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &PublishProperties,
        payload: Bytes,
    ) -> Result<PublishReceipt>;

    /// Declare an exchange. Idempotent at the broker.
    async fn declare_exchange(&self, exchange: &Exchange) -> Result<()>;

    /// Declare a queue. Idempotent at the broker.
    async fn declare_queue(&self, queue: &Queue) -> Result<()>;

    /// Bind `destination` to the exchange named `source`. Idempotent at the broker.
    async fn bind(&self, source: &str, destination: &Bindable, routing_key: &str) -> Result<()>;

    /// Start consuming `queue`.
    async fn consume(&self, queue: &str) -> Result<DeliveryStream>;

    /// Close the channel.
    async fn close(&self) -> Result<()>;

    /// Apply one topology operation.
    async fn apply(&self, op: &TopologyOp) -> Result<()> {
        // ---
        match op {
            TopologyOp::DeclareExchange(exchange) => self.declare_exchange(exchange).await,
            TopologyOp::DeclareQueue(queue) => self.declare_queue(queue).await,
            TopologyOp::Bind {
                source,
                destination,
                routing_key,
            } => self.bind(source, destination, routing_key).await,
        }
    }
}

/// Shared channel pointer.
pub type ChannelPtr = Arc<dyn Channel>;

/// A broker connection that hands out channels.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    // ---
    /// Identifier used in log lines.
    fn connection_id(&self) -> &str;

    /// Open a new channel on this connection.
    async fn create_channel(&self) -> Result<ChannelPtr>;

    /// Close the connection and every channel opened on it.
    async fn close(&self) -> Result<()>;
}

/// Shared connection pointer.
///
/// Clones share the same underlying connection.
pub type ConnectionPtr = Arc<dyn Connection>;

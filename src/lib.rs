//! Typed publishing and runtime topology over topic-routing message brokers.
//!
//! This library wraps an AMQP-style broker in a small set of typed services:
//!
//! - [`Publisher`]: serializes, routes and publishes values of one message
//!   type, with per-message properties derived from opt-in capabilities
//!   ([`Publishable`]).
//! - [`TopologyModel`]: declares exchanges, queues and bindings at runtime,
//!   idempotently, through a serialized channel.
//! - [`Bus::subscribe`]: drives a [`Consumer`] from a queue.
//!
//! Every channel-touching operation goes through a [`ChannelReference`], which
//! guarantees one operation at a time per broker channel.
//!
//! The in-memory transport ([`MemoryBroker`]) is always available and defines
//! reference routing semantics; the AMQP transport is enabled with the
//! `transport_lapin` feature.

// Import all sub modules once...
mod bus;
mod bus_builder;
mod bus_config;
mod channel_ref;
mod consumer;
mod correlation;
mod domain;
mod error;
mod macros;
mod publisher;
mod serializer;
mod sync;
mod topology_model;
mod transport;

pub(crate) use macros::{log_debug, log_error, log_info, log_trace, log_warn};

// Re-export main types
pub use bus::Bus;
pub use bus_builder::{create_connection, BusBuilder};
pub use bus_config::{BusConfig, DEFAULT_CONSUMER_BUFFER};

pub use channel_ref::{BoxFuture, ChannelReference};
pub use consumer::{ConnectRequest, Consumer, KeyTemplate, TopologyConsumer};
pub use publisher::{Publish, Publisher, PublisherBuilder};
pub use serializer::{JsonSerializer, MessageSerializer, CONTENT_TYPE_JSON};
pub use topology_model::{TopologyModel, TopologyPlan};

pub use correlation::CorrelationId;
pub use error::{Error, Result};

pub use transport::{
    //
    create_lapin_connection,
    create_memory_connection,
    create_memory_connection_with_broker,
    MemoryBroker,
    PublishedMessage,
    DEFAULT_INSPECTION_LIMIT,
};

// --- public re-exports
pub use domain::{
    //
    format_expiration,
    resolve_routing_key,
    Bindable,
    Binding,
    Channel,
    ChannelPtr,
    Connection,
    ConnectionPtr,
    DefaultRouter,
    Delivery,
    DeliveryStream,
    Exchange,
    ExchangeKind,
    FnHeaders,
    FnRouter,
    HeaderValue,
    Headers,
    HeadersStrategy,
    Message,
    MessageHeaders,
    MessageMetadata,
    PublishProperties,
    PublishReceipt,
    Publishable,
    Queue,
    ReplyTo,
    Router,
    StaticRouter,
    Topology,
    TopologyOp,
    DEFAULT_ROUTING_KEY,
    DELIVERY_MODE_PERSISTENT,
    DELIVERY_MODE_TRANSIENT,
};

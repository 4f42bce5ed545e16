//! Domain layer public interface.
//!
//! This module defines the message, routing, property and topology
//! abstractions, and the broker channel interface they are applied through.
//! None of it refers to a concrete broker client.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod channel;
mod headers;
mod message;
mod properties;
mod routing;
mod topology;

pub use channel::{
    //
    Channel,
    ChannelPtr,
    Connection,
    ConnectionPtr,
    Delivery,
    DeliveryStream,
    PublishReceipt,
};

pub use headers::{FnHeaders, HeadersStrategy, MessageHeaders};

pub use message::{HeaderValue, Headers, Message, MessageMetadata, Publishable};

pub use properties::{
    //
    format_expiration,
    PublishProperties,
    DELIVERY_MODE_PERSISTENT,
    DELIVERY_MODE_TRANSIENT,
};

pub use routing::{
    //
    resolve_routing_key,
    DefaultRouter,
    FnRouter,
    ReplyTo,
    Router,
    StaticRouter,
    DEFAULT_ROUTING_KEY,
};

pub use topology::{Bindable, Binding, Exchange, ExchangeKind, Queue, Topology, TopologyOp};

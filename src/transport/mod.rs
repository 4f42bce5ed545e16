//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Connection` and `Channel` traits. Broker transports are hidden behind
//! feature flags and exposed only through constructor functions.
//!
//! Domain code must not depend on transport-specific types.

mod amqp;
mod memory;

pub use amqp::create_lapin_connection;

pub use memory::{
    //
    create_connection as create_memory_connection,
    create_connection_with_broker as create_memory_connection_with_broker,
    MemoryBroker,
    PublishedMessage,
    DEFAULT_INSPECTION_LIMIT,
};

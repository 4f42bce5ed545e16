// src/transport/memory/mod.rs

//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! [`Connection`](crate::Connection) and [`Channel`](crate::Channel) traits. It
//! is intended primarily for testing, local execution, and as a reference for
//! broker semantics.
//!
//! ## Reference Semantics
//!
//! The in-memory transport defines the **reference behavior** for the
//! transport layer. Broker-backed transports are expected to approximate it as
//! closely as their underlying systems allow and to document any unavoidable
//! deviations. In particular:
//!
//! - Declarations and bindings are idempotent.
//! - Publishing never waits on a consumer; slow consumers only grow the
//!   queue's backlog.
//! - Once `consume()` returns, messages routed to the queue afterwards are
//!   deliverable, as are messages buffered before it.
//! - Message delivery is deterministic within a single process.
//!
//! ## Non-Goals
//!
//! This transport does not emulate persistence, clustering, header-based
//! matching or the failure modes of any specific broker. Headers exchanges
//! deliver to every binding.

mod broker;
mod channel;

pub use broker::{MemoryBroker, PublishedMessage, DEFAULT_INSPECTION_LIMIT};
pub use channel::{create_connection, create_connection_with_broker};

//! AMQP protocol transports.
//!
//! This module contains transport implementations for AMQP-based brokers.
//! Currently supports:
//! - lapin - AMQP 0-9-1 (RabbitMQ)
//!
//! Without the `transport_lapin` feature the factory is a stub that always
//! fails, so transport selection can try it unconditionally.

#[cfg(feature = "transport_lapin")]
mod lapin;

#[cfg(feature = "transport_lapin")]
pub use lapin::create_connection as create_lapin_connection;

#[cfg(not(feature = "transport_lapin"))]
pub async fn create_lapin_connection(
    _config: &crate::BusConfig,
) -> crate::Result<crate::ConnectionPtr> {
    Err(crate::Error::Transport(
        "lapin transport not enabled (build with feature \"transport_lapin\")".into(),
    ))
}

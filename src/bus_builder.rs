//! Bus builder and transport selection.
//!
//! Provides a fluent builder API for constructing a [`Bus`] with clear
//! separation between required and optional configuration.

use crate::{
    // ---
    create_lapin_connection,
    create_memory_connection,
    create_memory_connection_with_broker,
    log_debug,
    Bus,
    BusConfig,
    ConnectionPtr,
    Error,
    MemoryBroker,
    Result,
    DEFAULT_CONSUMER_BUFFER,
};

/// Builder for creating [`Bus`] instances.
///
/// # Examples
///
/// ## In-memory bus for tests
/// ```no_run
/// use mom_pubsub::{BusBuilder, MemoryBroker};
///
/// # async fn example() -> mom_pubsub::Result<()> {
/// let bus = BusBuilder::new()
///     .bus_id("ticker-server")
///     .memory_broker(MemoryBroker::new())
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## AMQP with publisher confirms
/// ```no_run
/// use mom_pubsub::BusBuilder;
///
/// # async fn example() -> mom_pubsub::Result<()> {
/// let bus = BusBuilder::new()
///     .uri("amqp://localhost:5672/%2f")
///     .bus_id("ticker-server")
///     .transport_type("lapin")
///     .publisher_confirms(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct BusBuilder {
    uri: Option<String>,
    bus_id: Option<String>,
    transport_type: Option<String>,
    publisher_confirms: bool,
    consumer_buffer: Option<usize>,
    memory_broker: Option<MemoryBroker>,
}

impl BusBuilder {
    /// Create a new bus builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broker URI.
    ///
    /// Required by broker transports, e.g. `"amqp://localhost:5672/%2f"`.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the bus ID (required).
    pub fn bus_id(mut self, id: impl Into<String>) -> Self {
        self.bus_id = Some(id.into());
        self
    }

    /// Set explicit transport type.
    ///
    /// Valid values: `"memory"`, `"lapin"`
    ///
    /// If not specified, a URI selects the first broker transport that
    /// connects and memory is the fallback.
    pub fn transport_type(mut self, flag: impl Into<String>) -> Self {
        self.transport_type = Some(flag.into());
        self
    }

    /// Wait for broker acknowledgement on every publish.
    pub fn publisher_confirms(mut self, enabled: bool) -> Self {
        self.publisher_confirms = enabled;
        self
    }

    /// Capacity of each consumer's delivery buffer.
    ///
    /// Default: 64.
    pub fn consumer_buffer(mut self, capacity: usize) -> Self {
        self.consumer_buffer = Some(capacity);
        self
    }

    /// Use `broker` instead of the process-global memory broker.
    ///
    /// Implies the memory transport.
    pub fn memory_broker(mut self, broker: MemoryBroker) -> Self {
        self.memory_broker = Some(broker);
        self
    }

    /// Build the bus (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `bus_id` is missing
    /// - the lapin transport is selected without a URI
    /// - a memory broker is combined with another transport type
    /// - `consumer_buffer` is zero
    /// - connecting to the broker fails
    pub async fn build(self) -> Result<Bus> {
        // ---
        let bus_id = self
            .bus_id
            .ok_or_else(|| Error::MissingConfig("bus_id".into()))?;

        if self.consumer_buffer == Some(0) {
            return Err(Error::ConfigConflict(
                "consumer_buffer must be at least 1".into(),
            ));
        }

        let transport_type = match (&self.memory_broker, self.transport_type) {
            (Some(_), Some(t)) if t != "memory" => {
                return Err(Error::ConfigConflict(format!(
                    "memory_broker cannot be combined with transport_type {t:?}"
                )));
            }
            (Some(_), _) => Some("memory".to_string()),
            (None, t) => t,
        };

        if transport_type.as_deref() == Some("lapin") && self.uri.is_none() {
            return Err(Error::MissingConfig("uri (required by transport lapin)".into()));
        }

        let config = BusConfig {
            uri: self.uri,
            bus_id,
            transport_type,
            publisher_confirms: self.publisher_confirms,
            consumer_buffer: self.consumer_buffer.unwrap_or(DEFAULT_CONSUMER_BUFFER),
        };

        let connection = match self.memory_broker {
            Some(broker) => create_memory_connection_with_broker(&config, broker).await?,
            None => create_connection(&config).await?,
        };

        Bus::with_connection(connection, config).await
    }
}

/// Open a connection with the transport `config` selects.
///
/// When `transport_type` is explicit it is used directly. Otherwise, if a URI
/// is present, each broker transport is tried in turn; disabled transports
/// fail immediately through their stubs, so the first success wins. Memory is
/// the unconditional fallback.
///
/// # Errors
///
/// Returns [`Error::Transport`] for an unknown transport type and any error of
/// the selected transport.
pub async fn create_connection(config: &BusConfig) -> Result<ConnectionPtr> {
    // ---
    match config.transport_type.as_deref() {
        Some("memory") => create_memory_connection(config).await,
        Some("lapin") => create_lapin_connection(config).await,
        Some(other) => Err(Error::Transport(format!(
            "unrecognized transport_type: {other}, valid values: memory, lapin"
        ))),
        None => {
            if config.uri.is_some() {
                match create_lapin_connection(config).await {
                    Ok(connection) => return Ok(connection),
                    Err(_err) => log_debug!("lapin transport unavailable: {_err}"),
                }
            }
            create_memory_connection(config).await
        }
    }
}

//! Public, transport-agnostic bus configuration.
//!
//! This type contains no client-library concepts (AMQP
//! connection properties and the like). Transport layers interpret it into
//! concrete connection settings.

/// Default capacity of each consumer's delivery buffer.
pub const DEFAULT_CONSUMER_BUFFER: usize = 64;

/// Bus configuration and connection parameters.
#[derive(Debug, Clone)]
pub struct BusConfig {
    // ---
    /// Broker connection URI (e.g. `"amqp://localhost:5672/%2f"`).
    ///
    /// `None` for the in-memory transport.
    pub uri: Option<String>,

    /// Identifier of this bus instance, used in channel ids and log lines.
    pub bus_id: String,

    /// Explicit transport selection (`"memory"` or `"lapin"`).
    ///
    /// `None` uses lapin when a `uri` is set and memory otherwise.
    pub transport_type: Option<String>,

    /// Ask the broker to acknowledge each publish before returning a receipt.
    ///
    /// Receipts become [`PublishReceipt::Confirmed`](crate::PublishReceipt::Confirmed)
    /// on transports that support it.
    pub publisher_confirms: bool,

    /// Capacity of each consumer's delivery buffer.
    pub consumer_buffer: usize,
}

impl BusConfig {
    /// Configuration for the in-memory transport.
    pub fn memory(bus_id: impl Into<String>) -> Self {
        // ---
        Self {
            uri: None,
            bus_id: bus_id.into(),
            transport_type: Some("memory".into()),
            publisher_confirms: false,
            consumer_buffer: DEFAULT_CONSUMER_BUFFER,
        }
    }

    /// Configuration for an AMQP broker at `uri`.
    pub fn amqp(uri: impl Into<String>, bus_id: impl Into<String>) -> Self {
        // ---
        Self {
            uri: Some(uri.into()),
            bus_id: bus_id.into(),
            transport_type: Some("lapin".into()),
            publisher_confirms: false,
            consumer_buffer: DEFAULT_CONSUMER_BUFFER,
        }
    }

    /// Enable or disable publisher confirms.
    pub fn with_publisher_confirms(mut self, enabled: bool) -> Self {
        self.publisher_confirms = enabled;
        self
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::memory("bus")
    }
}

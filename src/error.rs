use thiserror::Error;

/// Errors that can occur while publishing or shaping the topology.
#[derive(Error, Debug)]
pub enum Error {
    /// The routing strategy produced no usable key for the message.
    ///
    /// This is a configuration defect, not a transient failure; retrying the
    /// same message through the same router fails the same way.
    #[error(
        "cannot publish a message of type {message_type}: the router resolved an empty or \
         missing routing key"
    )]
    RoutingKey {
        /// Short type name of the rejected message.
        message_type: String,
    },

    /// Payload serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The channel reference was disposed before the operation ran.
    #[error("channel is closed")]
    ChannelClosed,

    /// Broker or transport level failure (connection loss, protocol error).
    #[error("transport error: {0}")]
    Transport(String),

    /// The broker refused a declaration that clashes with an existing entity.
    #[error("topology conflict: {0}")]
    TopologyConflict(String),

    /// A delivery could not be turned into the expected message type.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Required configuration is missing.
    #[error("missing required configuration: {0}")]
    MissingConfig(String),

    /// Mutually exclusive configuration options were combined.
    #[error("conflicting configuration: {0}")]
    ConfigConflict(String),
}

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a [`Error::RoutingKey`] for message type `T`.
    pub(crate) fn routing_key<T: ?Sized>() -> Self {
        // ---
        Error::RoutingKey {
            message_type: short_type_name::<T>().to_string(),
        }
    }
}

/// Last path segment of a type name, without generic arguments.
///
/// `my_app::messages::PriceMessage` becomes `PriceMessage`.
pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    // ---
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    mod prices {
        pub struct PriceMessage;
        pub struct Wrapper<T>(pub T);
    }

    #[test]
    fn test_short_type_name_strips_module_path() {
        // ---
        assert_eq!(short_type_name::<prices::PriceMessage>(), "PriceMessage");
        assert_eq!(
            short_type_name::<prices::Wrapper<prices::PriceMessage>>(),
            "Wrapper"
        );
        assert_eq!(short_type_name::<u64>(), "u64");
    }

    #[test]
    fn test_routing_key_error_names_message_type() {
        // ---
        let err = Error::routing_key::<prices::PriceMessage>();
        assert!(matches!(
            &err,
            Error::RoutingKey { message_type } if message_type == "PriceMessage"
        ));
        assert!(err.to_string().contains("PriceMessage"));
    }
}

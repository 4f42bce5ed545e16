//! Topology mutation driven by application messages.
//!
//! A [`TopologyConsumer`] reacts to connect-style requests: it derives one
//! routing-key pattern per requested topic and binds the requester's
//! destination to an upstream topic exchange with the whole key set in a
//! single [`TopologyModel::visit`].

use std::fmt;
use std::sync::Arc;

use crate::{
    // ---
    log_info,
    Binding,
    Exchange,
    Result,
    TopologyModel,
};

use super::Consumer;

/// A request to receive messages on a set of topics.
pub trait ConnectRequest: Send + 'static {
    /// Identity of the requesting consumer, for logging.
    fn consumer_id(&self) -> &str;

    /// Name of the destination to bind.
    fn queue_name(&self) -> &str;

    /// Topics the requester wants.
    fn topics(&self) -> Vec<String>;
}

/// Turns a topic name into a routing-key pattern.
#[derive(Clone)]
pub enum KeyTemplate {
    /// `"{namespace}.{topic}"`.
    Namespace(String),
    /// Arbitrary mapping.
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl KeyTemplate {
    /// Prefix each topic with `namespace` and a dot.
    pub fn namespace(namespace: impl Into<String>) -> Self {
        KeyTemplate::Namespace(namespace.into())
    }

    /// Map each topic with `func`.
    pub fn custom<F>(func: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        KeyTemplate::Custom(Arc::new(func))
    }

    /// Routing-key pattern for `topic`.
    pub fn key_for(&self, topic: &str) -> String {
        match self {
            KeyTemplate::Namespace(namespace) => format!("{namespace}.{topic}"),
            KeyTemplate::Custom(func) => func(topic),
        }
    }
}

impl fmt::Debug for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyTemplate::Namespace(ns) => f.debug_tuple("Namespace").field(ns).finish(),
            KeyTemplate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Binds requesters to an upstream exchange on demand.
///
/// Destinations are topic exchanges named after the request's queue, so a
/// client can fan the subscription out further on its side.
pub struct TopologyConsumer {
    topology: TopologyModel,
    upstream: Exchange,
    template: KeyTemplate,
}

impl TopologyConsumer {
    /// Bind requesters to `upstream`, deriving keys with `template`.
    pub fn new(topology: TopologyModel, upstream: Exchange, template: KeyTemplate) -> Self {
        Self {
            topology,
            upstream,
            template,
        }
    }

    /// Binding a request resolves to.
    pub fn binding_for<R: ConnectRequest>(&self, request: &R) -> Binding {
        // ---
        let keys = request
            .topics()
            .iter()
            .map(|topic| self.template.key_for(topic))
            .collect::<Vec<_>>();

        Binding::new(
            self.upstream.clone(),
            Exchange::topic(request.queue_name()),
            keys,
        )
    }
}

#[async_trait::async_trait]
impl<R: ConnectRequest> Consumer<R> for TopologyConsumer {
    async fn consume(&self, request: R) -> Result<()> {
        // ---
        log_info!(
            "client connected: {} on {}",
            request.consumer_id(),
            request.queue_name()
        );

        let binding = self.binding_for(&request);
        self.topology.visit(binding).await
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_namespace_template() {
        // ---
        let template = KeyTemplate::namespace("prices");
        assert_eq!(template.key_for("AAPL"), "prices.AAPL");
    }

    #[test]
    fn test_custom_template() {
        // ---
        let template = KeyTemplate::custom(|topic| format!("quotes.{}.*", topic.to_lowercase()));
        assert_eq!(template.key_for("MSFT"), "quotes.msft.*");
        assert_eq!(format!("{template:?}"), "Custom(..)");
    }
}

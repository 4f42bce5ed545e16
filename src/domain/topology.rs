// src/domain/topology.rs

//! Topology model types.
//!
//! Exchanges and queues are nodes, bindings are directed edges carrying a set
//! of routing-key patterns. Mutations are expressed as [`TopologyOp`] values so
//! the channel can apply them by matching on the variant.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Broker-side routing behaviour of an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    /// Exact routing-key match.
    Direct,
    /// Dotted-word pattern match with `*` and `#` wildcards.
    Topic,
    /// Every bound destination, key ignored.
    Fanout,
    /// Match on header values rather than the routing key.
    Headers,
}

impl ExchangeKind {
    /// Protocol name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeKind::Direct => "direct",
            ExchangeKind::Topic => "topic",
            ExchangeKind::Fanout => "fanout",
            ExchangeKind::Headers => "headers",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named exchange.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Exchange {
    /// Exchange name; identity of the node.
    pub name: String,
    /// Routing behaviour.
    pub kind: ExchangeKind,
    /// Survives broker restart.
    pub durable: bool,
    /// Deleted once the last binding is removed.
    pub auto_delete: bool,
}

impl Exchange {
    /// Durable exchange of the given kind.
    pub fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: true,
            auto_delete: false,
        }
    }

    /// Durable topic exchange.
    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Topic)
    }

    /// Durable direct exchange.
    pub fn direct(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Direct)
    }

    /// Durable fanout exchange.
    pub fn fanout(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Fanout)
    }

    /// Durable headers exchange.
    pub fn headers(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Headers)
    }

    /// Make the exchange non-durable and auto-deleting.
    pub fn ephemeral(mut self) -> Self {
        self.durable = false;
        self.auto_delete = true;
        self
    }
}

/// A named queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Queue {
    /// Queue name; identity of the node.
    pub name: String,
    /// Survives broker restart.
    pub durable: bool,
    /// Private to the declaring connection.
    pub exclusive: bool,
    /// Deleted when the last consumer goes away.
    pub auto_delete: bool,
}

impl Queue {
    /// Durable, shared queue.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            exclusive: false,
            auto_delete: false,
        }
    }

    /// Private per-consumer queue: exclusive, non-durable, auto-deleting.
    pub fn private(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: false,
            exclusive: true,
            auto_delete: true,
        }
    }
}

/// Destination end of a binding.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bindable {
    /// Exchange-to-exchange binding.
    Exchange(Exchange),
    /// Exchange-to-queue binding.
    Queue(Queue),
}

impl Bindable {
    /// Name of the destination node.
    pub fn name(&self) -> &str {
        match self {
            Bindable::Exchange(e) => &e.name,
            Bindable::Queue(q) => &q.name,
        }
    }
}

impl From<Exchange> for Bindable {
    fn from(value: Exchange) -> Self {
        Bindable::Exchange(value)
    }
}

impl From<Queue> for Bindable {
    fn from(value: Queue) -> Self {
        Bindable::Queue(value)
    }
}

/// Directed edge from an exchange to an exchange or queue.
///
/// Several bindings may connect the same endpoints with different key sets.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Binding {
    /// Exchange messages flow out of.
    pub source: Exchange,
    /// Node messages flow into.
    pub destination: Bindable,
    /// Routing-key patterns; ordered and de-duplicated.
    pub routing_keys: BTreeSet<String>,
}

impl Binding {
    /// Bind `source` to `destination` with `routing_keys`.
    pub fn new<I, K>(source: Exchange, destination: impl Into<Bindable>, routing_keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            source,
            destination: destination.into(),
            routing_keys: routing_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Expand the binding into broker operations.
    ///
    /// Both endpoints are declared first, then one bind per key. A binding
    /// without keys binds once with the empty key, which is what fanout and
    /// headers exchanges expect.
    pub fn operations(&self) -> Vec<TopologyOp> {
        // ---
        let mut ops = Vec::with_capacity(2 + self.routing_keys.len().max(1));

        ops.push(TopologyOp::DeclareExchange(self.source.clone()));
        ops.push(match &self.destination {
            Bindable::Exchange(e) => TopologyOp::DeclareExchange(e.clone()),
            Bindable::Queue(q) => TopologyOp::DeclareQueue(q.clone()),
        });

        if self.routing_keys.is_empty() {
            ops.push(self.bind_op(String::new()));
        } else {
            for key in &self.routing_keys {
                ops.push(self.bind_op(key.clone()));
            }
        }

        ops
    }

    fn bind_op(&self, routing_key: String) -> TopologyOp {
        TopologyOp::Bind {
            source: self.source.name.clone(),
            destination: self.destination.clone(),
            routing_key,
        }
    }
}

/// A single idempotent broker mutation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopologyOp {
    /// Declare an exchange (no-op if it already exists with the same kind).
    DeclareExchange(Exchange),
    /// Declare a queue (no-op if it already exists).
    DeclareQueue(Queue),
    /// Bind `destination` to the exchange named `source` with one key.
    Bind {
        /// Source exchange name.
        source: String,
        /// Destination node.
        destination: Bindable,
        /// Routing-key pattern.
        routing_key: String,
    },
}

/// Everything declared through one topology model.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Topology {
    exchanges: BTreeMap<String, Exchange>,
    queues: BTreeMap<String, Queue>,
    bindings: BTreeSet<Binding>,
}

impl Topology {
    /// Empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a declared exchange.
    pub fn add_exchange(&mut self, exchange: Exchange) {
        self.exchanges.insert(exchange.name.clone(), exchange);
    }

    /// Record a declared queue.
    pub fn add_queue(&mut self, queue: Queue) {
        self.queues.insert(queue.name.clone(), queue);
    }

    /// Record a binding together with both of its endpoints.
    pub fn add_binding(&mut self, binding: Binding) {
        // ---
        self.add_exchange(binding.source.clone());
        match &binding.destination {
            Bindable::Exchange(e) => self.add_exchange(e.clone()),
            Bindable::Queue(q) => self.add_queue(q.clone()),
        }
        self.bindings.insert(binding);
    }

    /// Look up an exchange by name.
    pub fn exchange(&self, name: &str) -> Option<&Exchange> {
        self.exchanges.get(name)
    }

    /// Look up a queue by name.
    pub fn queue(&self, name: &str) -> Option<&Queue> {
        self.queues.get(name)
    }

    /// All declared exchanges, ordered by name.
    pub fn exchanges(&self) -> impl Iterator<Item = &Exchange> {
        self.exchanges.values()
    }

    /// All declared queues, ordered by name.
    pub fn queues(&self) -> impl Iterator<Item = &Queue> {
        self.queues.values()
    }

    /// All recorded bindings.
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    /// Whether `binding` has been recorded.
    pub fn contains(&self, binding: &Binding) -> bool {
        self.bindings.contains(binding)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_binding_operations_declare_then_bind() {
        // ---
        let binding = Binding::new(
            Exchange::topic("prices"),
            Exchange::topic("queue-C1"),
            ["prices.MSFT", "prices.AAPL"],
        );

        let ops = binding.operations();

        assert_eq!(ops.len(), 4);
        assert_eq!(ops[0], TopologyOp::DeclareExchange(Exchange::topic("prices")));
        assert_eq!(ops[1], TopologyOp::DeclareExchange(Exchange::topic("queue-C1")));
        // keys are ordered
        assert!(matches!(
            &ops[2],
            TopologyOp::Bind { routing_key, .. } if routing_key == "prices.AAPL"
        ));
        assert!(matches!(
            &ops[3],
            TopologyOp::Bind { source, routing_key, .. }
                if source == "prices" && routing_key == "prices.MSFT"
        ));
    }

    #[test]
    fn test_keyless_binding_binds_once() {
        // ---
        let binding = Binding::new(
            Exchange::fanout("audit"),
            Queue::new("audit-log"),
            Vec::<String>::new(),
        );

        let ops = binding.operations();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[1], TopologyOp::DeclareQueue(Queue::new("audit-log")));
        assert!(matches!(&ops[2], TopologyOp::Bind { routing_key, .. } if routing_key.is_empty()));
    }

    #[test]
    fn test_duplicate_keys_collapse() {
        // ---
        let binding = Binding::new(Exchange::topic("t"), Queue::new("q"), ["a", "a", "b"]);
        assert_eq!(binding.routing_keys.len(), 2);
    }

    #[test]
    fn test_topology_records_endpoints_once() {
        // ---
        let binding = Binding::new(Exchange::topic("prices"), Queue::private("q1"), ["prices.*"]);
        let mut topology = Topology::new();

        topology.add_binding(binding.clone());
        let snapshot = topology.clone();
        topology.add_binding(binding.clone());

        assert_eq!(topology, snapshot);
        assert!(topology.contains(&binding));
        assert_eq!(topology.exchanges().count(), 1);
        assert!(topology.queue("q1").unwrap().exclusive);
    }
}

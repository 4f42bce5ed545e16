// src/transport/memory/broker.rs

//! Shared in-process broker state.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_trace,
    Bindable,
    Delivery,
    DeliveryStream,
    Error,
    Exchange,
    ExchangeKind,
    PublishProperties,
    Queue,
    Result,
};

/// One publish call as seen by the broker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Id of the channel that published it.
    pub channel_id: String,
    /// Target exchange.
    pub exchange: String,
    /// Routing key.
    pub routing_key: String,
    /// Publish properties.
    pub properties: PublishProperties,
    /// Serialized payload.
    pub payload: Bytes,
}

/// Destination of a binding edge, by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Target {
    Exchange(String),
    Queue(String),
}

/// Publish calls kept for inspection by [`MemoryBroker::new`].
pub const DEFAULT_INSPECTION_LIMIT: usize = 1024;

#[derive(Default)]
struct QueueState {
    queue: Option<Queue>,
    consumers: Vec<mpsc::Sender<Delivery>>,
    next_consumer: usize,
    backlog: VecDeque<Delivery>,
    dispatching: bool,
    wake: Arc<Notify>,
}

struct State {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, QueueState>,
    bindings: HashMap<String, BTreeSet<(Target, String)>>,
    published: VecDeque<PublishedMessage>,
    publish_count: usize,
    inspection_limit: usize,
    declarations: usize,
}

impl State {
    fn with_inspection_limit(inspection_limit: usize) -> Self {
        Self {
            exchanges: HashMap::new(),
            queues: HashMap::new(),
            bindings: HashMap::new(),
            published: VecDeque::new(),
            publish_count: 0,
            inspection_limit,
            declarations: 0,
        }
    }
}

/// In-process message broker shared by memory connections.
///
/// Simulates enough of an AMQP broker to exercise the publish pipeline and
/// runtime topology changes inside one process:
///
/// - Declarations are idempotent. Redeclaring an entity with different
///   attributes fails with [`Error::TopologyConflict`].
/// - Topic exchanges match dotted words with `*` (one word) and `#` (zero or
///   more words); direct exchanges match exactly; fanout and headers exchanges
///   deliver to every binding.
/// - Exchange-to-exchange bindings are followed transitively; each queue
///   receives a message at most once per publish.
/// - Routed messages land in the queue's backlog. While the queue has
///   consumers, a dispatcher task hands each message to one of them,
///   round-robin, waiting whenever that consumer's inbox is full. Publishing
///   never waits on a consumer.
/// - Unroutable messages are dropped.
/// - The empty exchange name routes directly to the queue named by the key.
///
/// The most recent publish calls are kept so tests can inspect what reached
/// the broker; see [`with_inspection_limit`](Self::with_inspection_limit).
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-global broker used when none is supplied explicitly.
static GLOBAL_BROKER: OnceLock<MemoryBroker> = OnceLock::new();

impl MemoryBroker {
    /// Create a new, empty broker keeping the last
    /// [`DEFAULT_INSPECTION_LIMIT`] publish calls.
    pub fn new() -> Self {
        Self::with_inspection_limit(DEFAULT_INSPECTION_LIMIT)
    }

    /// Create a new, empty broker keeping the last `limit` publish calls.
    ///
    /// A limit of zero records nothing; [`publish_count`](Self::publish_count)
    /// still counts every call.
    pub fn with_inspection_limit(limit: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::with_inspection_limit(limit))),
        }
    }

    /// Broker shared by every memory connection created from a config alone.
    ///
    /// It keeps no inspection log.
    pub fn global() -> Self {
        GLOBAL_BROKER
            .get_or_init(|| MemoryBroker::with_inspection_limit(0))
            .clone()
    }

    pub(crate) fn declare_exchange(&self, exchange: &Exchange) -> Result<()> {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        state.declarations += 1;

        match state.exchanges.get(&exchange.name) {
            Some(existing) if existing != exchange => Err(Error::TopologyConflict(format!(
                "exchange '{}' already declared as {} (durable: {}), requested {} (durable: {})",
                exchange.name, existing.kind, existing.durable, exchange.kind, exchange.durable
            ))),
            Some(_) => Ok(()),
            None => {
                state
                    .exchanges
                    .insert(exchange.name.clone(), exchange.clone());
                Ok(())
            }
        }
    }

    pub(crate) fn declare_queue(&self, queue: &Queue) -> Result<()> {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        state.declarations += 1;

        let entry = state.queues.entry(queue.name.clone()).or_default();
        match &entry.queue {
            Some(existing) if existing != queue => Err(Error::TopologyConflict(format!(
                "queue '{}' already declared with different attributes",
                queue.name
            ))),
            Some(_) => Ok(()),
            None => {
                entry.queue = Some(queue.clone());
                Ok(())
            }
        }
    }

    pub(crate) fn bind(&self, source: &str, destination: &Bindable, routing_key: &str) -> Result<()> {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        state.declarations += 1;

        if !state.exchanges.contains_key(source) {
            return Err(Error::Transport(format!("memory: no exchange '{source}'")));
        }

        let target = match destination {
            Bindable::Exchange(e) => {
                if !state.exchanges.contains_key(&e.name) {
                    return Err(Error::Transport(format!("memory: no exchange '{}'", e.name)));
                }
                Target::Exchange(e.name.clone())
            }
            Bindable::Queue(q) => {
                if !state.queue_declared(&q.name) {
                    return Err(Error::Transport(format!("memory: no queue '{}'", q.name)));
                }
                Target::Queue(q.name.clone())
            }
        };

        state
            .bindings
            .entry(source.to_string())
            .or_default()
            .insert((target, routing_key.to_string()));
        Ok(())
    }

    pub(crate) fn publish(
        &self,
        channel_id: &str,
        exchange: &str,
        routing_key: &str,
        properties: &PublishProperties,
        payload: Bytes,
    ) -> Result<()> {
        // ---
        let mut state = lock_ignore_poison(&self.state);

        if !exchange.is_empty() && !state.exchanges.contains_key(exchange) {
            return Err(Error::Transport(format!("memory: no exchange '{exchange}'")));
        }

        state.publish_count += 1;
        if state.inspection_limit > 0 {
            if state.published.len() == state.inspection_limit {
                state.published.pop_front();
            }
            state.published.push_back(PublishedMessage {
                channel_id: channel_id.to_string(),
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                properties: properties.clone(),
                payload: payload.clone(),
            });
        }

        let queues = state.route(exchange, routing_key);
        log_trace!("[{channel_id}] {exchange}/{routing_key} routed to {queues:?}");

        let delivery = Delivery {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            properties: properties.clone(),
            payload,
        };
        for name in queues {
            state.enqueue(&name, delivery.clone());
        }
        Ok(())
    }

    /// Attach a consumer to `queue`.
    ///
    /// The inbox holds at most `buffer` deliveries; the rest wait in the
    /// queue's backlog until the consumer catches up.
    pub(crate) fn consume(&self, queue: &str, buffer: usize) -> Result<DeliveryStream> {
        // ---
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let mut state = lock_ignore_poison(&self.state);
        let entry = match state.queues.get_mut(queue) {
            Some(entry) if entry.queue.is_some() => entry,
            _ => return Err(Error::Transport(format!("memory: no queue '{queue}'"))),
        };
        entry.consumers.push(tx);

        if entry.dispatching {
            entry.wake.notify_one();
        } else {
            entry.dispatching = true;
            tokio::spawn(dispatch(
                Arc::clone(&self.state),
                queue.to_string(),
                Arc::clone(&entry.wake),
            ));
        }

        Ok(DeliveryStream { inbox: rx })
    }

    // --- inspection

    /// Recorded publish calls, oldest first.
    pub fn published(&self) -> Vec<PublishedMessage> {
        lock_ignore_poison(&self.state)
            .published
            .iter()
            .cloned()
            .collect()
    }

    /// Number of publish calls accepted so far, recorded or not.
    pub fn publish_count(&self) -> usize {
        lock_ignore_poison(&self.state).publish_count
    }

    /// Number of declare and bind calls received so far.
    pub fn declaration_count(&self) -> usize {
        lock_ignore_poison(&self.state).declarations
    }

    /// Declared exchange named `name`.
    pub fn exchange(&self, name: &str) -> Option<Exchange> {
        lock_ignore_poison(&self.state).exchanges.get(name).cloned()
    }

    /// Declared queue named `name`.
    pub fn queue(&self, name: &str) -> Option<Queue> {
        lock_ignore_poison(&self.state)
            .queues
            .get(name)
            .and_then(|q| q.queue.clone())
    }

    /// Routing keys binding `destination` to `source`, ordered.
    pub fn binding_keys(&self, source: &str, destination: &str) -> Vec<String> {
        // ---
        let state = lock_ignore_poison(&self.state);
        state
            .bindings
            .get(source)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|(target, _)| match target {
                        Target::Exchange(name) | Target::Queue(name) => name == destination,
                    })
                    .map(|(_, key)| key.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Total number of binding edges.
    pub fn binding_count(&self) -> usize {
        lock_ignore_poison(&self.state)
            .bindings
            .values()
            .map(BTreeSet::len)
            .sum()
    }

    /// Messages in `queue` not yet handed to a consumer.
    pub fn queue_depth(&self, queue: &str) -> usize {
        lock_ignore_poison(&self.state)
            .queues
            .get(queue)
            .map(|q| q.backlog.len())
            .unwrap_or(0)
    }
}

impl State {
    fn queue_declared(&self, name: &str) -> bool {
        self.queues.get(name).is_some_and(|q| q.queue.is_some())
    }

    /// Names of the queues a publish reaches, each at most once.
    fn route(&self, exchange: &str, routing_key: &str) -> Vec<String> {
        // ---
        if exchange.is_empty() {
            return if self.queue_declared(routing_key) {
                vec![routing_key.to_string()]
            } else {
                Vec::new()
            };
        }

        let mut queues = Vec::new();
        let mut seen_queues = HashSet::new();
        let mut visited = HashSet::new();
        let mut pending = vec![exchange.to_string()];

        while let Some(current) = pending.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(kind) = self.exchanges.get(&current).map(|e| e.kind) else {
                continue;
            };
            let Some(edges) = self.bindings.get(&current) else {
                continue;
            };

            for (target, pattern) in edges {
                if !binding_matches(kind, pattern, routing_key) {
                    continue;
                }
                match target {
                    Target::Exchange(name) => pending.push(name.clone()),
                    Target::Queue(name) => {
                        if seen_queues.insert(name.clone()) {
                            queues.push(name.clone());
                        }
                    }
                }
            }
        }

        queues
    }

    fn enqueue(&mut self, queue: &str, delivery: Delivery) {
        // ---
        if let Some(entry) = self.queues.get_mut(queue) {
            entry.backlog.push_back(delivery);
            if entry.dispatching {
                entry.wake.notify_one();
            }
        }
    }
}

/// What the dispatcher does next for one queue.
enum Step {
    Deliver(mpsc::Sender<Delivery>, Delivery),
    Idle(mpsc::Sender<Delivery>),
    Stop,
}

/// Move backlog messages of `queue` into its consumers' inboxes.
///
/// Runs while the queue has at least one live consumer. Only this task
/// waits on a full inbox; the state lock is never held across an await.
async fn dispatch(state: Arc<Mutex<State>>, queue: String, wake: Arc<Notify>) {
    // ---
    log_debug!("memory: dispatcher started for {queue}");

    loop {
        let step = {
            let mut state = lock_ignore_poison(&state);
            match state.queues.get_mut(&queue) {
                None => Step::Stop,
                Some(entry) => {
                    entry.consumers.retain(|c| !c.is_closed());
                    if entry.consumers.is_empty() {
                        entry.dispatching = false;
                        Step::Stop
                    } else {
                        let index = entry.next_consumer % entry.consumers.len();
                        let consumer = entry.consumers[index].clone();
                        match entry.backlog.pop_front() {
                            Some(delivery) => {
                                entry.next_consumer = entry.next_consumer.wrapping_add(1);
                                Step::Deliver(consumer, delivery)
                            }
                            None => Step::Idle(consumer),
                        }
                    }
                }
            }
        };

        match step {
            Step::Deliver(consumer, delivery) => {
                if let Err(mpsc::error::SendError(delivery)) = consumer.send(delivery).await {
                    // consumer went away; the next live one gets the message
                    let mut state = lock_ignore_poison(&state);
                    if let Some(entry) = state.queues.get_mut(&queue) {
                        entry.backlog.push_front(delivery);
                    }
                }
            }
            Step::Idle(consumer) => {
                tokio::select! {
                    _ = wake.notified() => {}
                    _ = consumer.closed() => {}
                }
            }
            Step::Stop => break,
        }
    }

    log_debug!("memory: dispatcher stopped for {queue}");
}

fn binding_matches(kind: ExchangeKind, pattern: &str, routing_key: &str) -> bool {
    match kind {
        ExchangeKind::Direct => pattern == routing_key,
        ExchangeKind::Topic => topic_matches(pattern, routing_key),
        ExchangeKind::Fanout | ExchangeKind::Headers => true,
    }
}

/// AMQP topic matching: `*` is exactly one word, `#` is zero or more words.
pub(crate) fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    // ---
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = if routing_key.is_empty() {
        Vec::new()
    } else {
        routing_key.split('.').collect()
    };
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            match_words(rest, key) || (!key.is_empty() && match_words(pattern, &key[1..]))
        }
        (Some((&"*", rest)), Some((_, key_rest))) => match_words(rest, key_rest),
        (Some((word, rest)), Some((key_word, key_rest))) => {
            word == key_word && match_words(rest, key_rest)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_topic_matching() {
        // ---
        assert!(topic_matches("prices.AAPL", "prices.AAPL"));
        assert!(!topic_matches("prices.AAPL", "prices.MSFT"));
        assert!(topic_matches("prices.*", "prices.slow"));
        assert!(!topic_matches("prices.*", "prices.slow.eu"));
        assert!(topic_matches("prices.#", "prices"));
        assert!(topic_matches("prices.#", "prices.slow.eu"));
        assert!(topic_matches("#", "anything.at.all"));
        assert!(topic_matches("#", ""));
        assert!(topic_matches("*.slow", "prices.slow"));
        assert!(!topic_matches("*.slow", "slow"));
        assert!(topic_matches("a.#.z", "a.b.c.z"));
        assert!(topic_matches("a.#.z", "a.z"));
    }

    #[test]
    fn test_redeclare_with_other_kind_conflicts() {
        // ---
        let broker = MemoryBroker::new();
        broker.declare_exchange(&Exchange::topic("prices")).unwrap();
        broker.declare_exchange(&Exchange::topic("prices")).unwrap();

        let err = broker
            .declare_exchange(&Exchange::fanout("prices"))
            .unwrap_err();
        assert!(matches!(err, Error::TopologyConflict(_)));
        assert_eq!(broker.exchange("prices").unwrap().kind, ExchangeKind::Topic);
    }

    #[test]
    fn test_bind_requires_declared_endpoints() {
        // ---
        let broker = MemoryBroker::new();
        let queue = Queue::new("q");

        assert!(broker.bind("missing", &queue.clone().into(), "k").is_err());

        broker.declare_exchange(&Exchange::direct("d")).unwrap();
        assert!(broker.bind("d", &queue.clone().into(), "k").is_err());

        broker.declare_queue(&queue).unwrap();
        broker.bind("d", &queue.clone().into(), "k").unwrap();
        broker.bind("d", &queue.into(), "k").unwrap();

        assert_eq!(broker.binding_keys("d", "q"), vec!["k".to_string()]);
        assert_eq!(broker.binding_count(), 1);
    }

    #[tokio::test]
    async fn test_routes_through_exchange_chain() {
        // ---
        let broker = MemoryBroker::new();
        let client = Queue::private("client-1");

        broker.declare_exchange(&Exchange::topic("prices")).unwrap();
        broker.declare_exchange(&Exchange::topic("client-1-x")).unwrap();
        broker.declare_queue(&client).unwrap();
        broker
            .bind("prices", &Exchange::topic("client-1-x").into(), "prices.AAPL")
            .unwrap();
        broker.bind("client-1-x", &client.into(), "#").unwrap();

        let props = PublishProperties::default();
        broker
            .publish("c", "prices", "prices.AAPL", &props, Bytes::from_static(b"1"))
            .unwrap();
        broker
            .publish("c", "prices", "prices.MSFT", &props, Bytes::from_static(b"2"))
            .unwrap();

        assert_eq!(broker.publish_count(), 2);
        assert_eq!(broker.queue_depth("client-1"), 1);

        let mut stream = broker.consume("client-1", 4).unwrap();
        let delivery = stream.inbox.recv().await.unwrap();
        assert_eq!(delivery.routing_key, "prices.AAPL");
        assert_eq!(&delivery.payload[..], b"1");
        assert_eq!(broker.queue_depth("client-1"), 0);
    }

    #[tokio::test]
    async fn test_publish_to_unknown_exchange_fails() {
        // ---
        let broker = MemoryBroker::new();
        let result = broker.publish("c", "nope", "k", &PublishProperties::default(), Bytes::new());

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(broker.publish_count(), 0);
    }

    #[tokio::test]
    async fn test_queue_round_robins_consumers() {
        // ---
        let broker = MemoryBroker::new();
        broker.declare_queue(&Queue::new("work")).unwrap();

        let mut first = broker.consume("work", 4).unwrap();
        let mut second = broker.consume("work", 4).unwrap();

        let props = PublishProperties::default();
        for i in 0..4u8 {
            broker
                .publish("c", "", "work", &props, Bytes::from(vec![i]))
                .unwrap();
        }

        let a: Vec<u8> = vec![
            first.inbox.recv().await.unwrap().payload[0],
            first.inbox.recv().await.unwrap().payload[0],
        ];
        let b: Vec<u8> = vec![
            second.inbox.recv().await.unwrap().payload[0],
            second.inbox.recv().await.unwrap().payload[0],
        ];
        assert_eq!(a, vec![0, 2]);
        assert_eq!(b, vec![1, 3]);
    }

    #[test]
    fn test_inspection_log_keeps_only_the_latest_calls() {
        // ---
        let broker = MemoryBroker::with_inspection_limit(2);
        broker.declare_exchange(&Exchange::fanout("f")).unwrap();

        let props = PublishProperties::default();
        for i in 0..3u8 {
            broker
                .publish("c", "f", "k", &props, Bytes::from(vec![i]))
                .unwrap();
        }

        let kept: Vec<u8> = broker.published().iter().map(|p| p.payload[0]).collect();
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(broker.publish_count(), 3);
    }

    #[test]
    fn test_zero_limit_records_nothing() {
        // ---
        let broker = MemoryBroker::with_inspection_limit(0);
        broker.declare_exchange(&Exchange::fanout("f")).unwrap();
        broker
            .publish("c", "f", "k", &PublishProperties::default(), Bytes::new())
            .unwrap();

        assert!(broker.published().is_empty());
        assert_eq!(broker.publish_count(), 1);
    }

    #[tokio::test]
    async fn test_backlog_larger_than_inbox_is_delivered() {
        // ---
        let broker = MemoryBroker::new();
        broker.declare_queue(&Queue::new("deep")).unwrap();

        let props = PublishProperties::default();
        for i in 0..10u8 {
            broker
                .publish("c", "", "deep", &props, Bytes::from(vec![i]))
                .unwrap();
        }

        let mut stream = broker.consume("deep", 2).unwrap();
        for i in 0..10u8 {
            let delivery = tokio::time::timeout(
                std::time::Duration::from_millis(500),
                stream.inbox.recv(),
            )
            .await
            .expect("timed out waiting for backlog")
            .unwrap();
            assert_eq!(delivery.payload[0], i);
        }
        assert_eq!(broker.queue_depth("deep"), 0);
    }
}

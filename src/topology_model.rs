//! Runtime topology mutation.
//!
//! A [`TopologyModel`] applies declarations and bindings through a channel
//! reference and remembers what it has declared. Every mutation is idempotent
//! at the broker, so visiting the same binding twice issues the same
//! declarations again and leaves the model unchanged.
//!
//! Several consumers may call [`TopologyModel::visit`] concurrently; each call
//! runs all of its operations inside one serialized channel execution.

use std::sync::{Arc, Mutex};

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    Binding,
    ChannelReference,
    Exchange,
    Queue,
    Result,
    Topology,
    TopologyOp,
};

/// Handle for declaring and binding broker entities at runtime.
///
/// Cheap to clone; clones share the channel and the recorded topology.
#[derive(Clone)]
pub struct TopologyModel {
    channel: ChannelReference,
    declared: Arc<Mutex<Topology>>,
}

impl TopologyModel {
    /// Apply mutations through `channel`.
    pub fn new(channel: ChannelReference) -> Self {
        Self {
            channel,
            declared: Arc::new(Mutex::new(Topology::new())),
        }
    }

    /// Declare both ends of `binding` and bind them with every key.
    ///
    /// # Errors
    ///
    /// Broker errors (for example a clashing exchange kind) and
    /// [`Error::ChannelClosed`](crate::Error::ChannelClosed) are returned
    /// unchanged. Nothing is recorded on failure.
    pub async fn visit(&self, binding: Binding) -> Result<()> {
        // ---
        log_debug!(
            "[{}] binding {} -> {} with {:?}",
            self.channel.id(),
            binding.source.name,
            binding.destination.name(),
            binding.routing_keys
        );

        self.apply(binding.operations()).await?;
        lock_ignore_poison(&self.declared).add_binding(binding);
        Ok(())
    }

    /// Declare an exchange.
    pub async fn declare_exchange(&self, exchange: Exchange) -> Result<()> {
        // ---
        self.apply(vec![TopologyOp::DeclareExchange(exchange.clone())])
            .await?;
        lock_ignore_poison(&self.declared).add_exchange(exchange);
        Ok(())
    }

    /// Declare a queue.
    pub async fn declare_queue(&self, queue: Queue) -> Result<()> {
        // ---
        self.apply(vec![TopologyOp::DeclareQueue(queue.clone())])
            .await?;
        lock_ignore_poison(&self.declared).add_queue(queue);
        Ok(())
    }

    /// Collect several mutations and apply them in one channel execution.
    ///
    /// ```no_run
    /// # use mom_pubsub::{Binding, Exchange, Queue, TopologyModel};
    /// # async fn example(topology: TopologyModel) -> mom_pubsub::Result<()> {
    /// topology
    ///     .modify(|plan| {
    ///         plan.declare_queue(Queue::private("ticker-client-1"))
    ///             .visit(Binding::new(
    ///                 Exchange::topic("prices"),
    ///                 Queue::private("ticker-client-1"),
    ///                 ["prices.AAPL"],
    ///             ));
    ///     })
    ///     .await
    /// # }
    /// ```
    pub async fn modify<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(&mut TopologyPlan),
    {
        // ---
        let mut plan = TopologyPlan::default();
        build(&mut plan);

        if plan.items.is_empty() {
            return Ok(());
        }

        let ops = plan.items.iter().flat_map(PlanItem::operations).collect();
        self.apply(ops).await?;

        let mut declared = lock_ignore_poison(&self.declared);
        for item in plan.items {
            match item {
                PlanItem::Exchange(e) => declared.add_exchange(e),
                PlanItem::Queue(q) => declared.add_queue(q),
                PlanItem::Binding(b) => declared.add_binding(b),
            }
        }
        Ok(())
    }

    /// Copy of everything declared so far.
    pub fn snapshot(&self) -> Topology {
        lock_ignore_poison(&self.declared).clone()
    }

    /// Channel the model mutates through.
    pub fn channel(&self) -> &ChannelReference {
        &self.channel
    }

    async fn apply(&self, ops: Vec<TopologyOp>) -> Result<()> {
        // ---
        self.channel
            .execute(move |ch| {
                Box::pin(async move {
                    for op in &ops {
                        ch.apply(op).await?;
                    }
                    Ok(())
                })
            })
            .await
    }
}

/// Mutations collected by [`TopologyModel::modify`].
#[derive(Debug, Default)]
pub struct TopologyPlan {
    items: Vec<PlanItem>,
}

#[derive(Debug)]
enum PlanItem {
    Exchange(Exchange),
    Queue(Queue),
    Binding(Binding),
}

impl PlanItem {
    fn operations(&self) -> Vec<TopologyOp> {
        match self {
            PlanItem::Exchange(e) => vec![TopologyOp::DeclareExchange(e.clone())],
            PlanItem::Queue(q) => vec![TopologyOp::DeclareQueue(q.clone())],
            PlanItem::Binding(b) => b.operations(),
        }
    }
}

impl TopologyPlan {
    /// Plan a binding.
    pub fn visit(&mut self, binding: Binding) -> &mut Self {
        self.items.push(PlanItem::Binding(binding));
        self
    }

    /// Plan an exchange declaration.
    pub fn declare_exchange(&mut self, exchange: Exchange) -> &mut Self {
        self.items.push(PlanItem::Exchange(exchange));
        self
    }

    /// Plan a queue declaration.
    pub fn declare_queue(&mut self, queue: Queue) -> &mut Self {
        self.items.push(PlanItem::Queue(queue));
        self
    }

    /// Number of planned mutations.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing is planned.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

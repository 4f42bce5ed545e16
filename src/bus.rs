//! The bus: one broker connection plus the services built on it.
//!
//! A [`Bus`] owns the connection, a [`TopologyModel`] on its own channel,
//! and the receive loops started by [`Bus::subscribe`]. Publishers created
//! from it each get a dedicated channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tokio::task::{AbortHandle, JoinHandle};

use crate::sync::lock_ignore_poison;
use crate::{
    // ---
    log_debug,
    log_info,
    log_warn,
    BusConfig,
    ChannelReference,
    ConnectionPtr,
    Consumer,
    Error,
    Exchange,
    JsonSerializer,
    Publishable,
    PublisherBuilder,
    Queue,
    Result,
    Topology,
    TopologyModel,
    TopologyPlan,
};

/// Connection to a broker with publish, subscribe and topology services.
///
/// Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct Bus {
    inner: Arc<Inner>,
}

struct Inner {
    connection: ConnectionPtr,
    config: BusConfig,
    serializer: Arc<JsonSerializer>,
    topology: TopologyModel,
    subscriptions: Mutex<Vec<Subscription>>,
    closed: AtomicBool,
}

/// A running receive loop and the channel it consumes on.
struct Subscription {
    task: AbortHandle,
    channel: ChannelReference,
}

impl Bus {
    /// Connect with the transport `config` selects.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot connect or the topology
    /// channel cannot be opened.
    pub async fn connect(config: BusConfig) -> Result<Self> {
        // ---
        let connection = crate::create_connection(&config).await?;
        Self::with_connection(connection, config).await
    }

    /// Build a bus on an existing connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the topology channel cannot be opened.
    pub async fn with_connection(connection: ConnectionPtr, config: BusConfig) -> Result<Self> {
        // ---
        let channel = ChannelReference::new(connection.create_channel().await?);
        log_info!("[{}] bus ready", config.bus_id);

        Ok(Self {
            inner: Arc::new(Inner {
                connection,
                config,
                serializer: Arc::new(JsonSerializer),
                topology: TopologyModel::new(channel),
                subscriptions: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Identifier from the configuration.
    pub fn bus_id(&self) -> &str {
        &self.inner.config.bus_id
    }

    /// Configuration the bus was built with.
    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Underlying connection.
    pub fn connection(&self) -> &ConnectionPtr {
        &self.inner.connection
    }

    /// Start configuring a publisher of `T` to `exchange`.
    pub fn publisher<T: Publishable>(&self, exchange: Exchange) -> PublisherBuilder<T> {
        PublisherBuilder::new(
            self.inner.connection.clone(),
            self.inner.topology.clone(),
            exchange,
            self.inner.serializer.clone(),
        )
    }

    /// The bus's topology model.
    pub fn topology(&self) -> &TopologyModel {
        &self.inner.topology
    }

    /// Apply several topology mutations in one channel execution.
    ///
    /// Shorthand for [`TopologyModel::modify`] on [`topology`](Self::topology).
    pub async fn modify_topology<F>(&self, build: F) -> Result<()>
    where
        F: FnOnce(&mut TopologyPlan),
    {
        self.inner.topology.modify(build).await
    }

    /// Number of receive loops still tracked by the bus.
    pub fn subscription_count(&self) -> usize {
        let mut subscriptions = lock_ignore_poison(&self.inner.subscriptions);
        subscriptions.retain(|s| !s.task.is_finished());
        subscriptions.len()
    }

    /// Copy of everything declared through this bus.
    pub fn declared_topology(&self) -> Topology {
        self.inner.topology.snapshot()
    }

    /// Declare `queue` and deliver its messages to `consumer`.
    ///
    /// The receive loop runs on its own channel until the bus is closed. The
    /// returned handle completes when the loop exits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] after [`close`](Self::close), and any
    /// error declaring the queue or starting the broker consumer.
    pub async fn subscribe<T, C>(&self, queue: Queue, consumer: C) -> Result<JoinHandle<()>>
    where
        T: DeserializeOwned + Send + 'static,
        C: Consumer<T> + 'static,
    {
        // ---
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::ChannelClosed);
        }

        self.inner.topology.declare_queue(queue.clone()).await?;

        let channel = ChannelReference::new(self.inner.connection.create_channel().await?);
        let name = queue.name.clone();
        let stream = match channel
            .execute(move |ch| Box::pin(async move { ch.consume(&name).await }))
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                if let Err(_close_err) = channel.dispose().await {
                    log_warn!(
                        "[{}] failed to close consumer channel: {_close_err}",
                        channel.id()
                    );
                }
                return Err(err);
            }
        };

        log_debug!("[{}] subscribed to {}", channel.id(), queue.name);

        let handle = crate::consumer::run::<T, C, JsonSerializer>(
            queue.name,
            channel.clone(),
            stream,
            consumer,
            self.inner.serializer.clone(),
        );

        {
            let mut subscriptions = lock_ignore_poison(&self.inner.subscriptions);
            subscriptions.retain(|s| !s.task.is_finished());
            subscriptions.push(Subscription {
                task: handle.abort_handle(),
                channel,
            });
        }

        Ok(handle)
    }

    /// Stop every receive loop and close its channel, then the topology
    /// channel and the connection.
    ///
    /// Publishers created from the bus should be disposed first. Calling it
    /// again is a no-op.
    pub async fn close(&self) -> Result<()> {
        // ---
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let subscriptions: Vec<_> = lock_ignore_poison(&self.inner.subscriptions)
            .drain(..)
            .collect();
        for subscription in subscriptions {
            subscription.task.abort();
            if let Err(_err) = subscription.channel.dispose().await {
                log_warn!(
                    "[{}] failed to close consumer channel: {_err}",
                    subscription.channel.id()
                );
            }
        }

        if let Err(_err) = self.inner.topology.channel().dispose().await {
            log_warn!("[{}] failed to close topology channel: {_err}", self.bus_id());
        }

        self.inner.connection.close().await?;
        log_info!("[{}] bus closed", self.bus_id());
        Ok(())
    }
}

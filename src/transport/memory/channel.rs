// src/transport/memory/channel.rs

//! Memory connection and channel.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use super::MemoryBroker;
use crate::{
    // ---
    log_debug,
    Bindable,
    BusConfig,
    Channel,
    ChannelPtr,
    Connection,
    ConnectionPtr,
    DeliveryStream,
    Error,
    Exchange,
    PublishProperties,
    PublishReceipt,
    Queue,
    Result,
};

/// Connection to a [`MemoryBroker`].
struct MemoryConnection {
    // ---
    connection_id: String,
    broker: MemoryBroker,
    publisher_confirms: bool,
    consumer_buffer: usize,
    next_channel: AtomicUsize,
    closed: Arc<AtomicBool>,
}

/// Channel on a [`MemoryConnection`].
///
/// Closing the connection closes every channel opened on it.
struct MemoryChannel {
    // ---
    channel_id: String,
    broker: MemoryBroker,
    publisher_confirms: bool,
    consumer_buffer: usize,
    sequence: AtomicU64,
    closed: AtomicBool,
    connection_closed: Arc<AtomicBool>,
}

impl MemoryChannel {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || self.connection_closed.load(Ordering::Acquire) {
            return Err(Error::ChannelClosed);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Channel for MemoryChannel {
    // ---
    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        properties: &PublishProperties,
        payload: Bytes,
    ) -> Result<PublishReceipt> {
        // ---
        self.ensure_open()?;
        self.broker
            .publish(&self.channel_id, exchange, routing_key, properties, payload)?;

        if self.publisher_confirms {
            let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
            Ok(PublishReceipt::Confirmed { sequence })
        } else {
            Ok(PublishReceipt::Accepted)
        }
    }

    async fn declare_exchange(&self, exchange: &Exchange) -> Result<()> {
        self.ensure_open()?;
        self.broker.declare_exchange(exchange)
    }

    async fn declare_queue(&self, queue: &Queue) -> Result<()> {
        self.ensure_open()?;
        self.broker.declare_queue(queue)
    }

    async fn bind(&self, source: &str, destination: &Bindable, routing_key: &str) -> Result<()> {
        self.ensure_open()?;
        self.broker.bind(source, destination, routing_key)
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        self.ensure_open()?;
        self.broker.consume(queue, self.consumer_buffer)
    }

    async fn close(&self) -> Result<()> {
        // ---
        if !self.closed.swap(true, Ordering::AcqRel) {
            log_debug!("[{}] memory channel closed", self.channel_id);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Connection for MemoryConnection {
    // ---
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn create_channel(&self) -> Result<ChannelPtr> {
        // ---
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Transport(format!(
                "[{}] connection is closed",
                self.connection_id
            )));
        }

        let n = self.next_channel.fetch_add(1, Ordering::AcqRel) + 1;
        let channel = MemoryChannel {
            channel_id: format!("{}/ch-{n}", self.connection_id),
            broker: self.broker.clone(),
            publisher_confirms: self.publisher_confirms,
            consumer_buffer: self.consumer_buffer,
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            connection_closed: Arc::clone(&self.closed),
        };

        log_debug!("[{}] opened memory channel", channel.channel_id);
        Ok(Arc::new(channel))
    }

    async fn close(&self) -> Result<()> {
        // ---
        self.closed.store(true, Ordering::Release);
        log_debug!("[{}] memory connection closed", self.connection_id);
        Ok(())
    }
}

/// Create a memory connection on the process-global broker.
///
/// All connections created with this function share one broker, matching the
/// semantics of processes connected to a real broker.
///
/// # Errors
///
/// Currently infallible; always returns `Ok`.
pub async fn create_connection(config: &BusConfig) -> Result<ConnectionPtr> {
    // ---
    create_connection_with_broker(config, MemoryBroker::global()).await
}

/// Create a memory connection on `broker`.
///
/// Tests use a fresh broker each to stay isolated when run in parallel.
///
/// # Errors
///
/// Currently infallible; always returns `Ok`.
pub async fn create_connection_with_broker(
    config: &BusConfig,
    broker: MemoryBroker,
) -> Result<ConnectionPtr> {
    // ---
    log_debug!("{}: create memory connection", config.bus_id);

    Ok(Arc::new(MemoryConnection {
        connection_id: config.bus_id.clone(),
        broker,
        publisher_confirms: config.publisher_confirms,
        consumer_buffer: config.consumer_buffer,
        next_channel: AtomicUsize::new(0),
        closed: Arc::new(AtomicBool::new(false)),
    }))
}

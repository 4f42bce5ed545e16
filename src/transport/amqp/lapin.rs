//! AMQP transport implementation using `lapin`.
//!
//! This module implements the domain [`Connection`] and [`Channel`] traits on
//! top of an AMQP 0-9-1 broker connection.
//!
//! ## Concurrency model
//!
//! An AMQP channel must not see interleaved operations. This module does not
//! serialize calls itself: every [`AmqpChannel`] is reached through a
//! [`ChannelReference`](crate::ChannelReference), which grants the channel to
//! one operation at a time. Consumers are the exception; each `consume()` call
//! spawns a task that drains lapin's delivery stream into a bounded inbox and
//! acknowledges each message after handing it over.
//!
//! ## Publisher confirms
//!
//! With `BusConfig::publisher_confirms` set, channels are put into confirm mode
//! when created and `publish()` waits for the broker's ack before returning
//! [`PublishReceipt::Confirmed`]. A nack is reported as a transport error.
//!
//! ## Mapping
//!
//! - Exchange kinds map one-to-one onto lapin's `ExchangeKind`.
//! - Exchange-to-queue bindings use `queue.bind`, exchange-to-exchange
//!   bindings use `exchange.bind`.
//! - Header values map to long strings, 64-bit integers and booleans.
//! - The persistence flag maps to delivery mode 2 (persistent) or 1.

use lapin::{
    //
    options::{
        //
        BasicAckOptions,
        BasicConsumeOptions,
        BasicPublishOptions,
        ConfirmSelectOptions,
        ExchangeBindOptions,
        ExchangeDeclareOptions,
        QueueBindOptions,
        QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties,
    Connection as LapinConnection,
    ConnectionProperties,
};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::sync::lock_ignore_poison;
use crate::{
    //
    log_debug,
    log_error,
    log_info,
    Bindable,
    BusConfig,
    Channel,
    ChannelPtr,
    Connection,
    ConnectionPtr,
    Delivery,
    DeliveryStream,
    Error,
    Exchange,
    ExchangeKind,
    HeaderValue,
    Headers,
    PublishProperties,
    PublishReceipt,
    Queue,
    Result,
};

type TaskList = Arc<Mutex<Vec<JoinHandle<()>>>>;

/// AMQP connection handing out [`AmqpChannel`]s.
struct AmqpConnection {
    // ---
    connection_id: String,
    connection: LapinConnection,
    publisher_confirms: bool,
    consumer_buffer: usize,
    next_channel: AtomicUsize,
}

/// One lapin channel.
struct AmqpChannel {
    // ---
    channel_id: String,
    channel: lapin::Channel,
    publisher_confirms: bool,
    consumer_buffer: usize,
    sequence: AtomicU64,
    consumers: TaskList,
}

fn transport_err(context: &str, err: impl std::fmt::Display) -> Error {
    Error::Transport(format!("amqp: {context}: {err}"))
}

fn lapin_kind(kind: ExchangeKind) -> lapin::ExchangeKind {
    match kind {
        ExchangeKind::Direct => lapin::ExchangeKind::Direct,
        ExchangeKind::Topic => lapin::ExchangeKind::Topic,
        ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
        ExchangeKind::Headers => lapin::ExchangeKind::Headers,
    }
}

fn to_field_table(headers: &Headers) -> FieldTable {
    // ---
    let mut table = FieldTable::default();
    for (key, value) in headers {
        let value = match value {
            HeaderValue::Str(s) => AMQPValue::LongString(s.clone().into()),
            HeaderValue::Int(i) => AMQPValue::LongLongInt(*i),
            HeaderValue::Bool(b) => AMQPValue::Boolean(*b),
        };
        table.insert(key.clone().into(), value);
    }
    table
}

fn from_field_table(table: &FieldTable) -> Headers {
    // ---
    let mut headers = Headers::new();
    for (key, value) in table.inner() {
        let value = match value {
            AMQPValue::LongString(s) => {
                HeaderValue::Str(String::from_utf8_lossy(s.as_bytes()).into_owned())
            }
            AMQPValue::ShortString(s) => HeaderValue::Str(s.as_str().to_string()),
            AMQPValue::LongLongInt(i) => HeaderValue::Int(*i),
            AMQPValue::LongInt(i) => HeaderValue::Int(i64::from(*i)),
            AMQPValue::ShortInt(i) => HeaderValue::Int(i64::from(*i)),
            AMQPValue::Boolean(b) => HeaderValue::Bool(*b),
            _ => continue,
        };
        headers.insert(key.as_str().to_string(), value);
    }
    headers
}

fn to_basic_properties(properties: &PublishProperties) -> BasicProperties {
    // ---
    let mut props = BasicProperties::default()
        .with_content_type(properties.content_type.clone().into())
        .with_delivery_mode(properties.delivery_mode());

    if let Some(id) = &properties.correlation_id {
        props = props.with_correlation_id(id.clone().into());
    }
    if let Some(expiration) = &properties.expiration {
        props = props.with_expiration(expiration.clone().into());
    }
    if let Some(headers) = &properties.headers {
        props = props.with_headers(to_field_table(headers));
    }
    if let Some(reply_to) = &properties.reply_to {
        props = props.with_reply_to(reply_to.clone().into());
    }
    props
}

fn from_basic_properties(props: &BasicProperties) -> PublishProperties {
    // ---
    PublishProperties {
        content_type: props
            .content_type()
            .as_ref()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        correlation_id: props
            .correlation_id()
            .as_ref()
            .map(|s| s.as_str().to_string()),
        expiration: props.expiration().as_ref().map(|s| s.as_str().to_string()),
        headers: props.headers().as_ref().map(from_field_table),
        persistent: *props.delivery_mode() == Some(crate::DELIVERY_MODE_PERSISTENT),
        reply_to: props.reply_to().as_ref().map(|s| s.as_str().to_string()),
    }
}

#[async_trait::async_trait]
impl Channel for AmqpChannel {
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
        let confirm = self
            .channel
            .basic_publish(
                exchange.into(),
                routing_key.into(),
                BasicPublishOptions::default(),
                &payload,
                to_basic_properties(properties),
            )
            .await
            .map_err(|e| transport_err("publish failed", e))?;

        log_debug!("[{}] published to {exchange}/{routing_key}", self.channel_id);

        if !self.publisher_confirms {
            return Ok(PublishReceipt::Accepted);
        }

        let confirmation = confirm
            .await
            .map_err(|e| transport_err("publisher confirm failed", e))?;
        if confirmation.is_nack() {
            return Err(Error::Transport(format!(
                "amqp: broker rejected publish to {exchange}/{routing_key}"
            )));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        Ok(PublishReceipt::Confirmed { sequence })
    }

    async fn declare_exchange(&self, exchange: &Exchange) -> Result<()> {
        // ---
        let options = ExchangeDeclareOptions {
            durable: exchange.durable,
            auto_delete: exchange.auto_delete,
            ..ExchangeDeclareOptions::default()
        };

        self.channel
            .exchange_declare(
                exchange.name.as_str().into(),
                lapin_kind(exchange.kind),
                options,
                FieldTable::default(),
            )
            .await
            .map_err(|e| transport_err("exchange declare failed", e))?;

        log_info!(
            "[{}] declared {} exchange: {}",
            self.channel_id,
            exchange.kind,
            exchange.name
        );
        Ok(())
    }

    async fn declare_queue(&self, queue: &Queue) -> Result<()> {
        // ---
        let options = QueueDeclareOptions {
            passive: false,
            durable: queue.durable,
            exclusive: queue.exclusive,
            auto_delete: queue.auto_delete,
            nowait: false,
        };

        self.channel
            .queue_declare(queue.name.as_str().into(), options, FieldTable::default())
            .await
            .map_err(|e| transport_err("queue declare failed", e))?;

        log_info!("[{}] declared queue: {}", self.channel_id, queue.name);
        Ok(())
    }

    async fn bind(&self, source: &str, destination: &Bindable, routing_key: &str) -> Result<()> {
        // ---
        match destination {
            Bindable::Queue(queue) => self
                .channel
                .queue_bind(
                    queue.name.as_str().into(),
                    source.into(),
                    routing_key.into(),
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| transport_err("queue bind failed", e))?,
            Bindable::Exchange(exchange) => self
                .channel
                .exchange_bind(
                    exchange.name.as_str().into(),
                    source.into(),
                    routing_key.into(),
                    ExchangeBindOptions::default(),
                    FieldTable::default(),
                )
                .await
                .map_err(|e| transport_err("exchange bind failed", e))?,
        }

        log_debug!(
            "[{}] bound {} -> {} ({routing_key})",
            self.channel_id,
            source,
            destination.name()
        );
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<DeliveryStream> {
        // ---
        let consumer_tag = format!("{}-{queue}", self.channel_id);
        let consumer = self
            .channel
            .basic_consume(
                queue.into(),
                consumer_tag.as_str().into(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| transport_err("consume failed", e))?;

        log_info!("[{}] started consuming queue: {queue}", self.channel_id);

        let (tx, rx) = mpsc::channel(self.consumer_buffer.max(1));
        let channel_id = self.channel_id.clone();
        let queue_name = queue.to_string();

        let handle = tokio::spawn(async move {
            use futures_lite::stream::StreamExt;

            let mut consumer = consumer;
            while let Some(delivery_result) = consumer.next().await {
                let delivery = match delivery_result {
                    Ok(delivery) => delivery,
                    Err(e) => {
                        log_error!("[{channel_id}] consumer error on {queue_name}: {e}");
                        break;
                    }
                };

                let converted = Delivery {
                    exchange: delivery.exchange.as_str().to_string(),
                    routing_key: delivery.routing_key.as_str().to_string(),
                    properties: from_basic_properties(&delivery.properties),
                    payload: Bytes::from(delivery.data.clone()),
                };

                if tx.send(converted).await.is_err() {
                    log_debug!("[{channel_id}] inbox for {queue_name} dropped");
                    break;
                }

                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    log_error!("[{channel_id}] failed to ack message: {e}");
                }
            }

            log_info!("[{channel_id}] consumer task ended for queue: {queue_name}");
        });

        lock_ignore_poison(&self.consumers).push(handle);
        Ok(DeliveryStream { inbox: rx })
    }

    async fn close(&self) -> Result<()> {
        // ---
        let handles: Vec<_> = lock_ignore_poison(&self.consumers).drain(..).collect();
        for handle in handles {
            handle.abort();
        }

        self.channel
            .close(200, "Normal shutdown".into())
            .await
            .map_err(|e| transport_err("channel close failed", e))?;

        log_info!("[{}] channel closed", self.channel_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Connection for AmqpConnection {
    // ---
    fn connection_id(&self) -> &str {
        &self.connection_id
    }

    async fn create_channel(&self) -> Result<ChannelPtr> {
        // ---
        let channel = self.connection.create_channel().await.map_err(|e| {
            let err = transport_err("channel creation failed", e);
            log_error!("{err}");
            err
        })?;

        if self.publisher_confirms {
            channel
                .confirm_select(ConfirmSelectOptions::default())
                .await
                .map_err(|e| transport_err("confirm select failed", e))?;
        }

        let n = self.next_channel.fetch_add(1, Ordering::AcqRel) + 1;
        let channel_id = format!("{}/ch-{n}", self.connection_id);
        log_info!("[{channel_id}] created AMQP channel");

        Ok(Arc::new(AmqpChannel {
            channel_id,
            channel,
            publisher_confirms: self.publisher_confirms,
            consumer_buffer: self.consumer_buffer,
            sequence: AtomicU64::new(0),
            consumers: Arc::new(Mutex::new(Vec::new())),
        }))
    }

    async fn close(&self) -> Result<()> {
        // ---
        self.connection
            .close(200, "Normal shutdown".into())
            .await
            .map_err(|e| transport_err("connection close failed", e))?;

        log_info!("[{}] AMQP connection closed", self.connection_id);
        Ok(())
    }
}

/// Creates a lapin-based AMQP connection from the given configuration.
///
/// # Errors
///
/// Returns an error if:
/// - The broker URI is missing
/// - Connection to the broker fails
///
/// # Connection Behavior
///
/// The connection to the broker happens immediately.
pub async fn create_connection(config: &BusConfig) -> Result<ConnectionPtr> {
    // ---
    let uri = config
        .uri
        .as_deref()
        .ok_or_else(|| Error::MissingConfig("uri (required by the lapin transport)".into()))?;

    log_info!("Connecting to AMQP broker: {uri}");

    let connection = LapinConnection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|e| {
            let err = transport_err("connection failed", e);
            log_error!("{err}");
            err
        })?;

    log_info!("Connected to AMQP broker");

    Ok(Arc::new(AmqpConnection {
        connection_id: config.bus_id.clone(),
        connection,
        publisher_confirms: config.publisher_confirms,
        consumer_buffer: config.consumer_buffer,
        next_channel: AtomicUsize::new(0),
    }))
}

//! Consumers and the receive loop that drives them.
//!
//! A [`Consumer`] handles decoded messages of one type. [`Bus::subscribe`]
//! attaches it to a queue and spawns the receive loop implemented here.
//!
//! ## Receive loop
//!
//! The loop owns a dedicated channel and waits on its delivery stream. Each
//! delivery is decoded with the bus serializer and handed to the consumer in
//! arrival order; the next delivery is not decoded until the consumer returns.
//! When the stream ends the loop disposes the channel and exits.
//!
//! ## Error handling
//!
//! Undecodable deliveries and consumer errors are logged at `warn` level and
//! skipped. One bad message never stops the loop.
//!
//! [`Bus::subscribe`]: crate::Bus::subscribe

mod topology;

pub use topology::{ConnectRequest, KeyTemplate, TopologyConsumer};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_warn,
    ChannelReference,
    Delivery,
    DeliveryStream,
    Error,
    MessageSerializer,
    Result,
};

/// Handler for messages of type `T`.
///
/// Returning an error marks this message as failed but does not stop the
/// subscription.
#[async_trait::async_trait]
pub trait Consumer<T: Send + 'static>: Send + Sync {
    /// Handle one message.
    async fn consume(&self, message: T) -> Result<()>;
}

#[async_trait::async_trait]
impl<T, C> Consumer<T> for Arc<C>
where
    T: Send + 'static,
    C: Consumer<T> + ?Sized,
{
    async fn consume(&self, message: T) -> Result<()> {
        (**self).consume(message).await
    }
}

fn decode<T, S>(serializer: &S, delivery: &Delivery) -> Result<T>
where
    T: DeserializeOwned,
    S: MessageSerializer,
{
    // ---
    let content_type = delivery.properties.content_type.as_str();
    if !content_type.is_empty() && content_type != serializer.content_type() {
        return Err(Error::InvalidMessage(format!(
            "unsupported content type {content_type:?} (expected {:?})",
            serializer.content_type()
        )));
    }

    serializer
        .deserialize(&delivery.payload)
        .map_err(|e| Error::InvalidMessage(format!("payload does not decode: {e}")))
}

/// Spawn the receive loop for `consumer`.
pub(crate) fn run<T, C, S>(
    queue: String,
    channel: ChannelReference,
    stream: DeliveryStream,
    consumer: C,
    serializer: Arc<S>,
) -> JoinHandle<()>
where
    T: DeserializeOwned + Send + 'static,
    C: Consumer<T> + 'static,
    S: MessageSerializer,
{
    // ---
    let mut inbox = stream.inbox;

    tokio::spawn(async move {
        // ---
        log_debug!("[{}] receive loop started for {queue}", channel.id());

        while let Some(delivery) = inbox.recv().await {
            let message = match decode::<T, S>(&serializer, &delivery) {
                Ok(message) => message,
                Err(err) => {
                    log_warn!(
                        "[{}] dropping delivery from {}/{}: {err}",
                        channel.id(),
                        delivery.exchange,
                        delivery.routing_key
                    );
                    continue;
                }
            };

            if let Err(err) = consumer.consume(message).await {
                log_warn!("[{}] consumer error on {queue}: {err}", channel.id());
            }
        }

        log_debug!("[{}] delivery stream for {queue} ended", channel.id());
        if let Err(err) = channel.dispose().await {
            log_warn!("[{}] failed to close consumer channel: {err}", channel.id());
        }
    })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{JsonSerializer, PublishProperties};
    use bytes::Bytes;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Ping {
        n: u32,
    }

    fn delivery(content_type: &str, payload: &'static [u8]) -> Delivery {
        Delivery {
            exchange: "pings".into(),
            routing_key: "#".into(),
            properties: PublishProperties {
                content_type: content_type.into(),
                ..PublishProperties::default()
            },
            payload: Bytes::from_static(payload),
        }
    }

    #[test]
    fn test_decode_json_delivery() {
        // ---
        let ping: Ping = decode(&JsonSerializer, &delivery("application/json", br#"{"n":3}"#))
            .unwrap();
        assert_eq!(ping, Ping { n: 3 });
    }

    #[test]
    fn test_decode_rejects_foreign_content_type() {
        // ---
        let result: Result<Ping> = decode(&JsonSerializer, &delivery("text/plain", b"3"));
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_decode_reports_bad_payload_as_invalid_message() {
        // ---
        let result: Result<Ping> = decode(&JsonSerializer, &delivery("", b"not json"));
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }
}

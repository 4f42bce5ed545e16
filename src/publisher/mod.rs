//! Typed publishing.
//!
//! A [`Publisher`] turns values of one message type into broker publishes:
//!
//! 1. wrap the value in a [`Message`] (capabilities captured once)
//! 2. serialize the payload
//! 3. resolve the routing key
//! 4. inside one channel execution, build the properties and publish
//! 5. bump the published counter
//!
//! Failures in steps 2 and 3 return before the channel is touched, so a failed
//! publish never reaches the broker and never moves the counter.

mod builder;

pub use builder::PublisherBuilder;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::{
    // ---
    log_debug,
    log_trace,
    resolve_routing_key,
    ChannelReference,
    Error,
    Exchange,
    Headers,
    HeadersStrategy,
    JsonSerializer,
    Message,
    MessageSerializer,
    Publishable,
    PublishProperties,
    PublishReceipt,
    Result,
    Router,
    TopologyModel,
    TopologyOp,
};

/// Lifecycle of a typed publisher.
///
/// `start` is where a publisher performs broker-side setup it needs before
/// first use; the default does nothing.
#[async_trait::async_trait]
pub trait Publish<T: Send + 'static>: Send + Sync {
    // ---
    /// Prepare for publishing.
    async fn start(&self) -> Result<()> {
        Ok(())
    }

    /// Publish one message.
    async fn publish(&self, message: T) -> Result<PublishReceipt>;

    /// Release the channel. Calling it again has no effect.
    async fn dispose(&self) -> Result<()>;
}

/// Publishes values of `T` to one exchange.
///
/// Safe to share between tasks; concurrent publishes are serialized by the
/// channel reference and counted without lost updates.
pub struct Publisher<T, S = JsonSerializer> {
    // ---
    channel: ChannelReference,
    topology: Option<TopologyModel>,
    exchange: Exchange,
    router: Box<dyn Router<T>>,
    headers: Box<dyn HeadersStrategy<T>>,
    serializer: Arc<S>,
    default_headers: Headers,
    declare_on_start: bool,
    published: AtomicU64,
    disposed: AtomicBool,
}

/// Parts a [`Publisher`] is assembled from.
pub(crate) struct PublisherParts<T, S> {
    pub channel: ChannelReference,
    pub topology: Option<TopologyModel>,
    pub exchange: Exchange,
    pub router: Box<dyn Router<T>>,
    pub headers: Box<dyn HeadersStrategy<T>>,
    pub serializer: Arc<S>,
    pub default_headers: Headers,
    pub declare_on_start: bool,
}

impl<T: Publishable> Publisher<T, JsonSerializer> {
    /// Publisher on `channel` with the default router, header strategy and
    /// JSON serializer.
    ///
    /// Most callers go through [`Bus::publisher`](crate::Bus::publisher)
    /// instead, which opens a dedicated channel.
    pub fn new(channel: ChannelReference, exchange: Exchange) -> Self {
        // ---
        Self::from_parts(PublisherParts {
            channel,
            topology: None,
            exchange,
            router: Box::new(crate::DefaultRouter),
            headers: Box::new(crate::MessageHeaders),
            serializer: Arc::new(JsonSerializer),
            default_headers: Headers::new(),
            declare_on_start: false,
        })
    }
}

impl<T, S> Publisher<T, S>
where
    T: Publishable,
    S: MessageSerializer,
{
    pub(crate) fn from_parts(parts: PublisherParts<T, S>) -> Self {
        // ---
        Self {
            channel: parts.channel,
            topology: parts.topology,
            exchange: parts.exchange,
            router: parts.router,
            headers: parts.headers,
            serializer: parts.serializer,
            default_headers: parts.default_headers,
            declare_on_start: parts.declare_on_start,
            published: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        }
    }

    /// Number of successful publishes.
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Exchange this publisher targets.
    pub fn exchange(&self) -> &Exchange {
        &self.exchange
    }

    /// Channel this publisher publishes through.
    pub fn channel(&self) -> &ChannelReference {
        &self.channel
    }

    /// Whether [`dispose`](Publish::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    async fn declare_exchange(&self) -> Result<()> {
        // ---
        if self.exchange.name.is_empty() {
            log_debug!("[{}] default exchange needs no declaration", self.channel.id());
            return Ok(());
        }

        match &self.topology {
            Some(topology) => topology.declare_exchange(self.exchange.clone()).await,
            None => {
                let op = TopologyOp::DeclareExchange(self.exchange.clone());
                self.channel
                    .execute(move |ch| Box::pin(async move { ch.apply(&op).await }))
                    .await
            }
        }
    }
}

#[async_trait::async_trait]
impl<T, S> Publish<T> for Publisher<T, S>
where
    T: Publishable,
    S: MessageSerializer,
{
    async fn start(&self) -> Result<()> {
        // ---
        if self.declare_on_start {
            self.declare_exchange().await?;
        }
        Ok(())
    }

    async fn publish(&self, message: T) -> Result<PublishReceipt> {
        // ---
        if self.is_disposed() {
            return Err(Error::ChannelClosed);
        }

        let message = Message::create(message);
        let payload = self.serializer.serialize(&message)?;
        let routing_key = resolve_routing_key(self.router.as_ref(), message.body())?;

        let exchange = self.exchange.name.clone();
        let content_type = self.serializer.content_type();
        let router = self.router.as_ref();
        let headers = self.headers.as_ref();
        let default_headers = &self.default_headers;
        let message = &message;

        let receipt = self
            .channel
            .execute(move |ch| {
                let properties = PublishProperties::build(
                    message,
                    router,
                    headers,
                    default_headers,
                    content_type,
                );
                Box::pin(async move {
                    ch.publish(&exchange, &routing_key, &properties, payload)
                        .await
                })
            })
            .await?;

        let count = self.published.fetch_add(1, Ordering::AcqRel) + 1;
        log_trace!("[{}] publish #{count} accepted", self.channel.id());

        Ok(receipt)
    }

    async fn dispose(&self) -> Result<()> {
        // ---
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        log_debug!(
            "[{}] disposing publisher after {} messages",
            self.channel.id(),
            self.published_count()
        );
        self.channel.dispose().await
    }
}

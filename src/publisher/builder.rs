//! Publisher builder.
//!
//! Provides a fluent builder API for configuring typed publishers created from
//! a [`Bus`](crate::Bus).

use std::marker::PhantomData;
use std::sync::Arc;

use super::{Publisher, PublisherParts};
use crate::{
    // ---
    log_debug,
    ChannelReference,
    ConnectionPtr,
    DefaultRouter,
    Exchange,
    HeaderValue,
    Headers,
    HeadersStrategy,
    JsonSerializer,
    MessageHeaders,
    MessageSerializer,
    Publishable,
    ReplyTo,
    Result,
    Router,
    TopologyModel,
};

/// Builder for [`Publisher`] instances.
///
/// Every setting is optional. Defaults: [`DefaultRouter`],
/// [`MessageHeaders`], the bus serializer, no default headers, no reply-to
/// address, and a fresh channel opened on the bus connection.
///
/// # Examples
///
/// ```no_run
/// use mom_pubsub::{Bus, BusConfig, Exchange, FnRouter, Publish, Publishable};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Price { symbol: String, cents: u64 }
///
/// impl Publishable for Price {}
///
/// # async fn example() -> mom_pubsub::Result<()> {
/// let bus = Bus::connect(BusConfig::memory("ticker")).await?;
///
/// let publisher = bus
///     .publisher::<Price>(Exchange::topic("prices"))
///     .router(FnRouter::new(|p: &Price| Some(format!("prices.{}", p.symbol))))
///     .default_header("source", "ticker")
///     .declare_on_start()
///     .build()
///     .await?;
///
/// publisher.start().await?;
/// publisher.publish(Price { symbol: "AAPL".into(), cents: 19_050 }).await?;
/// # Ok(())
/// # }
/// ```
pub struct PublisherBuilder<T, S = JsonSerializer> {
    // ---
    connection: ConnectionPtr,
    topology: TopologyModel,
    exchange: Exchange,
    serializer: Arc<S>,

    // Optional configuration
    channel: Option<ChannelReference>,
    router: Option<Box<dyn Router<T>>>,
    headers: Option<Box<dyn HeadersStrategy<T>>>,
    default_headers: Headers,
    reply_to: Option<String>,
    declare_on_start: bool,

    _phantom: PhantomData<fn(T)>,
}

impl<T, S> PublisherBuilder<T, S>
where
    T: Publishable,
    S: MessageSerializer,
{
    pub(crate) fn new(
        connection: ConnectionPtr,
        topology: TopologyModel,
        exchange: Exchange,
        serializer: Arc<S>,
    ) -> Self {
        // ---
        Self {
            connection,
            topology,
            exchange,
            serializer,
            channel: None,
            router: None,
            headers: None,
            default_headers: Headers::new(),
            reply_to: None,
            declare_on_start: false,
            _phantom: PhantomData,
        }
    }

    /// Route messages with `router`.
    pub fn router<R>(mut self, router: R) -> Self
    where
        R: Router<T> + 'static,
    {
        self.router = Some(Box::new(router));
        self
    }

    /// Populate headers with `strategy`.
    pub fn headers<H>(mut self, strategy: H) -> Self
    where
        H: HeadersStrategy<T> + 'static,
    {
        self.headers = Some(Box::new(strategy));
        self
    }

    /// Seed every header table with `key`.
    ///
    /// Only applies to messages that advertise headers.
    pub fn default_header(mut self, key: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.default_headers.insert(key.into(), value.into());
        self
    }

    /// Advertise `address` as the reply-to address of every message.
    pub fn reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }

    /// Declare the exchange when the publisher is started.
    pub fn declare_on_start(mut self) -> Self {
        self.declare_on_start = true;
        self
    }

    /// Publish through an existing channel reference instead of opening one.
    ///
    /// Publishers sharing a reference are serialized against each other.
    pub fn channel(mut self, channel: ChannelReference) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Encode payloads with `serializer`.
    pub fn serializer<S2>(self, serializer: S2) -> PublisherBuilder<T, S2>
    where
        S2: MessageSerializer,
    {
        // ---
        PublisherBuilder {
            connection: self.connection,
            topology: self.topology,
            exchange: self.exchange,
            serializer: Arc::new(serializer),
            channel: self.channel,
            router: self.router,
            headers: self.headers,
            default_headers: self.default_headers,
            reply_to: self.reply_to,
            declare_on_start: self.declare_on_start,
            _phantom: PhantomData,
        }
    }

    /// Build the publisher (consumes self).
    ///
    /// # Errors
    ///
    /// Returns an error if a new channel is needed and the connection cannot
    /// open one.
    pub async fn build(self) -> Result<Publisher<T, S>> {
        // ---
        let channel = match self.channel {
            Some(channel) => channel,
            None => ChannelReference::new(self.connection.create_channel().await?),
        };

        let router = self
            .router
            .unwrap_or_else(|| Box::new(DefaultRouter) as Box<dyn Router<T>>);
        let router: Box<dyn Router<T>> = match self.reply_to {
            Some(address) => Box::new(ReplyTo::new(router, address)),
            None => router,
        };

        let headers = self
            .headers
            .unwrap_or_else(|| Box::new(MessageHeaders) as Box<dyn HeadersStrategy<T>>);

        log_debug!(
            "[{}] publisher ready for exchange {:?}",
            channel.id(),
            self.exchange.name
        );

        Ok(Publisher::from_parts(PublisherParts {
            channel,
            topology: Some(self.topology),
            exchange: self.exchange,
            router,
            headers,
            serializer: self.serializer,
            default_headers: self.default_headers,
            declare_on_start: self.declare_on_start,
        }))
    }
}

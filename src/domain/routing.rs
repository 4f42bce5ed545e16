// src/domain/routing.rs

//! Routing strategies.
//!
//! A router maps a message to the routing key the broker matches against
//! binding patterns, and optionally names a reply-to address. Routers are pure:
//! they never touch the channel.

use std::marker::PhantomData;

use crate::{Publishable, Result};

/// Key used when a message does not choose its own routing key.
pub const DEFAULT_ROUTING_KEY: &str = "#";

/// Strategy mapping a message instance to its routing key.
pub trait Router<T>: Send + Sync {
    /// Routing key for `message`, or `None` if it cannot be routed.
    fn route(&self, message: &T) -> Option<String>;

    /// Address replies should be sent to, when request/reply is configured.
    fn reply_to(&self) -> Option<String> {
        None
    }
}

impl<T, R> Router<T> for Box<R>
where
    R: Router<T> + ?Sized,
{
    fn route(&self, message: &T) -> Option<String> {
        (**self).route(message)
    }

    fn reply_to(&self) -> Option<String> {
        (**self).reply_to()
    }
}

/// Resolve the routing key for `message`, rejecting absent or empty keys.
pub fn resolve_routing_key<T, R>(router: &R, message: &T) -> Result<String>
where
    R: Router<T> + ?Sized,
{
    // ---
    match router.route(message) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(crate::Error::routing_key::<T>()),
    }
}

/// Uses the message's own [`Publishable::routing_key`], or `"#"` when it has none.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultRouter;

impl<T: Publishable> Router<T> for DefaultRouter {
    fn route(&self, message: &T) -> Option<String> {
        match message.routing_key() {
            Some(key) => Some(key),
            None => Some(DEFAULT_ROUTING_KEY.to_string()),
        }
    }
}

/// Routes every message with the same key.
#[derive(Clone, Debug)]
pub struct StaticRouter {
    key: String,
    reply_to: Option<String>,
}

impl StaticRouter {
    /// Route everything with `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reply_to: None,
        }
    }

    /// Also advertise `address` as the reply-to address.
    pub fn with_reply_to(mut self, address: impl Into<String>) -> Self {
        self.reply_to = Some(address.into());
        self
    }
}

impl<T> Router<T> for StaticRouter {
    fn route(&self, _message: &T) -> Option<String> {
        Some(self.key.clone())
    }

    fn reply_to(&self) -> Option<String> {
        self.reply_to.clone()
    }
}

/// Derives the key from message content with a closure.
///
/// ```
/// # use mom_pubsub::{FnRouter, Router};
/// struct Tick { kind: &'static str }
///
/// let router = FnRouter::new(|t: &Tick| Some(format!("prices.{}", t.kind.to_lowercase())));
/// assert_eq!(router.route(&Tick { kind: "Slow" }).as_deref(), Some("prices.slow"));
/// ```
pub struct FnRouter<T, F> {
    func: F,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, F> FnRouter<T, F>
where
    F: Fn(&T) -> Option<String> + Send + Sync,
{
    /// Wrap `func` as a router.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> Router<T> for FnRouter<T, F>
where
    F: Fn(&T) -> Option<String> + Send + Sync,
{
    fn route(&self, message: &T) -> Option<String> {
        (self.func)(message)
    }
}

/// Adds a reply-to address to any router.
#[derive(Clone, Debug)]
pub struct ReplyTo<R> {
    inner: R,
    address: String,
}

impl<R> ReplyTo<R> {
    /// Wrap `inner`, replying to `address`.
    pub fn new(inner: R, address: impl Into<String>) -> Self {
        Self {
            inner,
            address: address.into(),
        }
    }
}

impl<T, R: Router<T>> Router<T> for ReplyTo<R> {
    fn route(&self, message: &T) -> Option<String> {
        self.inner.route(message)
    }

    fn reply_to(&self) -> Option<String> {
        Some(self.address.clone())
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Keyed(Option<&'static str>);

    impl Publishable for Keyed {
        fn routing_key(&self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    #[derive(Serialize, Clone, Copy)]
    enum Speed {
        Slow,
        Fast,
    }

    #[derive(Serialize)]
    struct Tick {
        id: u32,
        speed: Speed,
    }

    fn speed_router() -> FnRouter<Tick, impl Fn(&Tick) -> Option<String> + Send + Sync> {
        FnRouter::new(|t: &Tick| {
            let name = match t.speed {
                Speed::Slow => "Slow",
                Speed::Fast => "Fast",
            };
            Some(format!("prices.{}", name.to_lowercase()))
        })
    }

    #[test]
    fn test_field_derived_key() {
        // ---
        let router = speed_router();
        let slow = Tick {
            id: 5,
            speed: Speed::Slow,
        };
        let fast = Tick {
            id: 6,
            speed: Speed::Fast,
        };

        assert_eq!(slow.id, 5);
        assert_eq!(resolve_routing_key(&router, &slow).unwrap(), "prices.slow");
        assert_eq!(resolve_routing_key(&router, &fast).unwrap(), "prices.fast");
    }

    #[test]
    fn test_default_router_prefers_message_key() {
        // ---
        assert_eq!(
            DefaultRouter.route(&Keyed(Some("orders.eu"))).as_deref(),
            Some("orders.eu")
        );
        assert_eq!(DefaultRouter.route(&Keyed(None)).as_deref(), Some("#"));
    }

    #[test]
    fn test_empty_key_is_rejected() {
        // ---
        let err = resolve_routing_key(&DefaultRouter, &Keyed(Some(""))).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::RoutingKey { ref message_type } if message_type == "Keyed"
        ));
    }

    #[test]
    fn test_absent_key_is_rejected() {
        // ---
        let router = FnRouter::new(|_: &Keyed| None);
        assert!(matches!(
            resolve_routing_key(&router, &Keyed(None)),
            Err(crate::Error::RoutingKey { .. })
        ));
    }

    #[test]
    fn test_reply_to() {
        // ---
        let plain = StaticRouter::new("k");
        assert_eq!(Router::<Keyed>::reply_to(&plain), None);

        let replying = StaticRouter::new("k").with_reply_to("replies.client-1");
        assert_eq!(
            Router::<Keyed>::reply_to(&replying).as_deref(),
            Some("replies.client-1")
        );

        let wrapped = ReplyTo::new(DefaultRouter, "replies.svc");
        assert_eq!(Router::<Keyed>::reply_to(&wrapped).as_deref(), Some("replies.svc"));
        assert_eq!(wrapped.route(&Keyed(Some("x"))).as_deref(), Some("x"));
    }
}

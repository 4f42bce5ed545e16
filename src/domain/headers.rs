// src/domain/headers.rs

//! Header strategies.

use std::marker::PhantomData;

use crate::{Headers, Publishable};

/// Populates the header table of an outgoing message.
///
/// Only invoked for messages whose metadata advertises headers. Strategies
/// must be deterministic for a given message value and must not remove keys
/// they did not add.
pub trait HeadersStrategy<T>: Send + Sync {
    /// Add headers for `message`.
    fn populate(&self, message: &T, headers: &mut Headers);
}

/// Delegates to [`Publishable::populate_headers`].
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageHeaders;

impl<T: Publishable> HeadersStrategy<T> for MessageHeaders {
    fn populate(&self, message: &T, headers: &mut Headers) {
        message.populate_headers(headers);
    }
}

/// Populates headers with a closure, after the message's own headers.
pub struct FnHeaders<T, F> {
    func: F,
    _phantom: PhantomData<fn(&T)>,
}

impl<T, F> FnHeaders<T, F>
where
    F: Fn(&T, &mut Headers) + Send + Sync,
{
    /// Wrap `func` as a header strategy.
    pub fn new(func: F) -> Self {
        Self {
            func,
            _phantom: PhantomData,
        }
    }
}

impl<T, F> HeadersStrategy<T> for FnHeaders<T, F>
where
    T: Publishable,
    F: Fn(&T, &mut Headers) + Send + Sync,
{
    fn populate(&self, message: &T, headers: &mut Headers) {
        message.populate_headers(headers);
        (self.func)(message, headers);
    }
}

impl<T, S> HeadersStrategy<T> for Box<S>
where
    S: HeadersStrategy<T> + ?Sized,
{
    fn populate(&self, message: &T, headers: &mut Headers) {
        (**self).populate(message, headers)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::HeaderValue;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Order {
        region: &'static str,
        priority: i64,
    }

    impl Publishable for Order {
        fn has_headers(&self) -> bool {
            true
        }

        fn populate_headers(&self, headers: &mut Headers) {
            headers.insert("region".into(), self.region.into());
        }
    }

    #[test]
    fn test_message_headers_keep_existing_keys() {
        // ---
        let order = Order {
            region: "eu",
            priority: 1,
        };
        let mut headers = Headers::new();
        headers.insert("source".into(), "gateway".into());

        MessageHeaders.populate(&order, &mut headers);

        assert_eq!(headers.get("source"), Some(&HeaderValue::from("gateway")));
        assert_eq!(headers.get("region"), Some(&HeaderValue::from("eu")));
    }

    #[test]
    fn test_population_is_deterministic() {
        // ---
        let strategy = FnHeaders::new(|o: &Order, h: &mut Headers| {
            h.insert("priority".into(), o.priority.into());
        });
        let order = Order {
            region: "us",
            priority: 9,
        };

        let mut first = Headers::new();
        let mut second = Headers::new();
        strategy.populate(&order, &mut first);
        strategy.populate(&order, &mut second);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(first.get("priority"), Some(&HeaderValue::Int(9)));
    }
}

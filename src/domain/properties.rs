// src/domain/properties.rs

//! Publish-time properties.
//!
//! Pure transformation from an envelope, a router and the serializer's content
//! type into the property set handed to the broker alongside the payload.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{log_warn, Headers, HeadersStrategy, Message, Router};

/// AMQP delivery mode for messages lost on broker restart.
pub const DELIVERY_MODE_TRANSIENT: u8 = 1;

/// AMQP delivery mode for messages written to disk by the broker.
pub const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Properties sent with a single publish.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishProperties {
    /// MIME-like tag of the payload encoding.
    pub content_type: String,
    /// Correlation identifier, if the message is correlated.
    pub correlation_id: Option<String>,
    /// Time-to-live in milliseconds, rendered as a decimal string.
    pub expiration: Option<String>,
    /// Header table, if the message has headers.
    pub headers: Option<Headers>,
    /// Whether the broker should persist the message.
    pub persistent: bool,
    /// Address replies should be sent to.
    pub reply_to: Option<String>,
}

impl PublishProperties {
    /// Build the properties for `message`.
    ///
    /// `default_headers` seeds the header table for messages that advertise
    /// headers; the strategy may add or overwrite keys but seeded keys it drops
    /// are put back.
    pub fn build<T, R, H>(
        message: &Message<T>,
        router: &R,
        headers_strategy: &H,
        default_headers: &Headers,
        content_type: &str,
    ) -> Self
    where
        R: Router<T> + ?Sized,
        H: HeadersStrategy<T> + ?Sized,
    {
        // ---
        let meta = message.metadata();

        let headers = meta.has_headers.then(|| {
            let mut headers = default_headers.clone();
            headers_strategy.populate(message.body(), &mut headers);

            for (key, value) in default_headers {
                if !headers.contains_key(key) {
                    log_warn!("headers strategy removed seeded header {key}; restoring it");
                    headers.insert(key.clone(), value.clone());
                }
            }
            headers
        });

        let reply_to = router.reply_to().filter(|addr| !addr.is_empty());

        Self {
            content_type: content_type.to_string(),
            correlation_id: meta.correlation_id.as_ref().map(|id| id.to_string()),
            expiration: meta.timeout.map(format_expiration),
            headers,
            persistent: !meta.transient,
            reply_to,
        }
    }

    /// AMQP delivery mode matching the persistence flag.
    pub fn delivery_mode(&self) -> u8 {
        if self.persistent {
            DELIVERY_MODE_PERSISTENT
        } else {
            DELIVERY_MODE_TRANSIENT
        }
    }
}

/// Render `timeout` as total milliseconds.
///
/// Whole milliseconds print without a fractional part (`2.5s` → `"2500"`);
/// sub-millisecond remainders print exactly with trailing zeros trimmed
/// (`1.5ms` → `"1.5"`). The output never depends on locale.
pub fn format_expiration(timeout: Duration) -> String {
    // ---
    let millis = timeout.as_millis();
    let sub_millis_nanos = timeout.subsec_nanos() % 1_000_000;

    if sub_millis_nanos == 0 {
        return millis.to_string();
    }

    let fraction = format!("{sub_millis_nanos:06}");
    format!("{millis}.{}", fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{CorrelationId, HeaderValue, MessageHeaders, Publishable, StaticRouter};
    use serde::Serialize;

    #[derive(Serialize, Default)]
    struct Quote {
        correlated: bool,
        timeout_ms: Option<u64>,
        headers: bool,
        transient: bool,
    }

    impl Publishable for Quote {
        fn correlation_id(&self) -> Option<CorrelationId> {
            self.correlated.then(|| CorrelationId::from("corr-1"))
        }

        fn timeout(&self) -> Option<Duration> {
            self.timeout_ms.map(Duration::from_millis)
        }

        fn has_headers(&self) -> bool {
            self.headers
        }

        fn populate_headers(&self, headers: &mut Headers) {
            headers.insert("flagged".into(), true.into());
        }

        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn build(quote: Quote, router: &StaticRouter) -> PublishProperties {
        PublishProperties::build(
            &Message::create(quote),
            router,
            &MessageHeaders,
            &Headers::new(),
            "application/json",
        )
    }

    #[test]
    fn test_plain_message_properties() {
        // ---
        let props = build(Quote::default(), &StaticRouter::new("k"));

        assert_eq!(props.content_type, "application/json");
        assert_eq!(props.correlation_id, None);
        assert_eq!(props.expiration, None);
        assert_eq!(props.headers, None);
        assert!(props.persistent);
        assert_eq!(props.delivery_mode(), DELIVERY_MODE_PERSISTENT);
        assert_eq!(props.reply_to, None);
    }

    #[test]
    fn test_all_capabilities() {
        // ---
        let quote = Quote {
            correlated: true,
            timeout_ms: Some(2500),
            headers: true,
            transient: true,
        };
        let router = StaticRouter::new("k").with_reply_to("replies.me");

        let props = build(quote, &router);

        assert_eq!(props.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(props.expiration.as_deref(), Some("2500"));
        assert_eq!(
            props.headers.as_ref().unwrap().get("flagged"),
            Some(&HeaderValue::Bool(true))
        );
        assert!(!props.persistent);
        assert_eq!(props.delivery_mode(), DELIVERY_MODE_TRANSIENT);
        assert_eq!(props.reply_to.as_deref(), Some("replies.me"));
    }

    #[test]
    fn test_empty_reply_to_is_dropped() {
        // ---
        let props = build(Quote::default(), &StaticRouter::new("k").with_reply_to(""));
        assert_eq!(props.reply_to, None);
    }

    #[test]
    fn test_seeded_headers_survive_strategy() {
        // ---
        struct Clearing;
        impl HeadersStrategy<Quote> for Clearing {
            fn populate(&self, _message: &Quote, headers: &mut Headers) {
                headers.clear();
                headers.insert("mine".into(), 1_i64.into());
            }
        }

        let mut seeded = Headers::new();
        seeded.insert("app".into(), "ticker".into());

        let message = Message::create(Quote {
            headers: true,
            ..Quote::default()
        });
        let props = PublishProperties::build(
            &message,
            &StaticRouter::new("k"),
            &Clearing,
            &seeded,
            "application/json",
        );

        let headers = props.headers.unwrap();
        assert_eq!(headers.get("app"), Some(&HeaderValue::from("ticker")));
        assert_eq!(headers.get("mine"), Some(&HeaderValue::Int(1)));
    }

    #[test]
    fn test_format_expiration() {
        // ---
        assert_eq!(format_expiration(Duration::from_millis(2500)), "2500");
        assert_eq!(format_expiration(Duration::from_secs_f64(2.5)), "2500");
        assert_eq!(format_expiration(Duration::ZERO), "0");
        assert_eq!(format_expiration(Duration::from_micros(1500)), "1.5");
        assert_eq!(format_expiration(Duration::from_nanos(1_000_001)), "1.000001");
    }
}

// src/domain/message.rs

//! Message envelope and capability markers.
//!
//! Application payloads opt in to publish-time metadata by overriding the
//! default methods of [`Publishable`]. The envelope captures those answers
//! once, at construction, in a plain [`MessageMetadata`] value, so the rest of
//! the pipeline reads fields instead of asking the payload again.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::CorrelationId;

/// Header table attached to a published message.
///
/// Ordered so that two populations of the same message compare equal and
/// serialize identically.
pub type Headers = BTreeMap<String, HeaderValue>;

/// A single header value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// UTF-8 text.
    Str(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// Boolean flag.
    Bool(bool),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderValue::Str(s) => f.write_str(s),
            HeaderValue::Int(i) => write!(f, "{i}"),
            HeaderValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<String> for HeaderValue {
    fn from(value: String) -> Self {
        HeaderValue::Str(value)
    }
}

impl From<&str> for HeaderValue {
    fn from(value: &str) -> Self {
        HeaderValue::Str(value.to_string())
    }
}

impl From<i64> for HeaderValue {
    fn from(value: i64) -> Self {
        HeaderValue::Int(value)
    }
}

impl From<i32> for HeaderValue {
    fn from(value: i32) -> Self {
        HeaderValue::Int(i64::from(value))
    }
}

impl From<u32> for HeaderValue {
    fn from(value: u32) -> Self {
        HeaderValue::Int(i64::from(value))
    }
}

impl From<bool> for HeaderValue {
    fn from(value: bool) -> Self {
        HeaderValue::Bool(value)
    }
}

/// A payload that can travel through a [`Publisher`](crate::Publisher).
///
/// Every capability has a default that means "not present", so a plain
/// message type only needs an empty `impl`:
///
/// ```
/// # use mom_pubsub::Publishable;
/// #[derive(serde::Serialize)]
/// struct Heartbeat { seq: u64 }
///
/// impl Publishable for Heartbeat {}
/// ```
///
/// Override the methods for the capabilities the type actually has:
///
/// ```
/// # use mom_pubsub::{Headers, Publishable};
/// # use std::time::Duration;
/// #[derive(serde::Serialize)]
/// struct Quote { symbol: String, bid: u64 }
///
/// impl Publishable for Quote {
///     fn timeout(&self) -> Option<Duration> {
///         Some(Duration::from_millis(2500))
///     }
///
///     fn has_headers(&self) -> bool {
///         true
///     }
///
///     fn populate_headers(&self, headers: &mut Headers) {
///         headers.insert("symbol".into(), self.symbol.as_str().into());
///     }
///
///     fn is_transient(&self) -> bool {
///         true
///     }
/// }
/// ```
pub trait Publishable: Serialize + Send + Sync + 'static {
    /// Correlation identifier, for messages that take part in a conversation.
    fn correlation_id(&self) -> Option<CorrelationId> {
        None
    }

    /// How long the broker may hold the message before discarding it.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Whether the message contributes headers.
    ///
    /// Header strategies only run for messages that return `true`.
    fn has_headers(&self) -> bool {
        false
    }

    /// Add this message's headers to `headers`.
    ///
    /// Implementations must be deterministic and must only add or overwrite
    /// their own keys.
    fn populate_headers(&self, _headers: &mut Headers) {}

    /// Whether the message should be lost on broker restart.
    fn is_transient(&self) -> bool {
        false
    }

    /// Routing key chosen by the message itself.
    ///
    /// Consulted by [`DefaultRouter`](crate::DefaultRouter).
    fn routing_key(&self) -> Option<String> {
        None
    }
}

/// Metadata captured from a payload's capabilities.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MessageMetadata {
    /// Correlation identifier, if the payload is correlated.
    pub correlation_id: Option<CorrelationId>,
    /// Time-to-live, if the payload has a timeout.
    pub timeout: Option<Duration>,
    /// Whether header strategies should run for the payload.
    pub has_headers: bool,
    /// Whether the payload opted out of persistence.
    pub transient: bool,
}

/// Immutable envelope around one outgoing payload.
///
/// Created per publish call and dropped once the bytes are handed to the
/// channel.
#[derive(Debug)]
pub struct Message<T> {
    body: T,
    metadata: MessageMetadata,
}

impl<T: Publishable> Message<T> {
    /// Wrap `body`, capturing its capabilities.
    pub fn create(body: T) -> Self {
        // ---
        let metadata = MessageMetadata {
            correlation_id: body.correlation_id(),
            timeout: body.timeout(),
            has_headers: body.has_headers(),
            transient: body.is_transient(),
        };

        Self { body, metadata }
    }
}

impl<T> Message<T> {
    /// Wrap `body` with explicitly supplied metadata.
    pub fn with_metadata(body: T, metadata: MessageMetadata) -> Self {
        Self { body, metadata }
    }

    /// Borrow the payload.
    pub fn body(&self) -> &T {
        &self.body
    }

    /// Borrow the captured metadata.
    pub fn metadata(&self) -> &MessageMetadata {
        &self.metadata
    }

    /// Unwrap the payload.
    pub fn into_body(self) -> T {
        self.body
    }
}

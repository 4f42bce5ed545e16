//! Payload serializers.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Message, Result};

/// Content type advertised by [`JsonSerializer`].
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Turns message payloads into bytes and back.
///
/// The content type is copied into every publish's properties so consumers
/// can pick a matching decoder.
pub trait MessageSerializer: Send + Sync + 'static {
    /// MIME-like tag describing the encoding.
    fn content_type(&self) -> &str;

    /// Encode the payload of `message`.
    fn serialize<T: Serialize>(&self, message: &Message<T>) -> Result<Bytes>;

    /// Decode a payload produced by [`serialize`](Self::serialize).
    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T>;
}

/// JSON encoding via `serde_json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl MessageSerializer for JsonSerializer {
    fn content_type(&self) -> &str {
        CONTENT_TYPE_JSON
    }

    fn serialize<T: Serialize>(&self, message: &Message<T>) -> Result<Bytes> {
        let bytes = serde_json::to_vec(message.body())?;
        Ok(Bytes::from(bytes))
    }

    fn deserialize<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(payload)?)
    }
}

//! Serialized access to a broker channel.
//!
//! Broker channels accept one operation at a time; interleaving calls from
//! several tasks corrupts protocol framing. A [`ChannelReference`] owns the
//! channel behind an async mutex and hands it out for exactly one operation at
//! a time. Clones share the same slot, so the exclusion holds across every
//! publisher and topology model that uses the reference, not just within one.
//!
//! The critical section is one broker round-trip. Callers build everything
//! they need (payload bytes, properties) before calling [`ChannelReference::execute`]
//! or do it inside the operation only if it is cheap.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::{log_debug, log_trace, Channel, ChannelPtr, Error, Result};

/// Boxed future returned by operations passed to [`ChannelReference::execute`].
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Cloneable handle granting exclusive, one-at-a-time use of a channel.
#[derive(Clone)]
pub struct ChannelReference {
    inner: Arc<Inner>,
}

struct Inner {
    id: String,
    slot: Mutex<Option<ChannelPtr>>,
    closed: AtomicBool,
}

impl ChannelReference {
    /// Take ownership of `channel`.
    pub fn new(channel: ChannelPtr) -> Self {
        // ---
        let id = channel.channel_id().to_string();
        Self {
            inner: Arc::new(Inner {
                id,
                slot: Mutex::new(Some(channel)),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Identifier of the underlying channel.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Run `operation` against the channel.
    ///
    /// Waits until no other operation holds the channel. The operation's own
    /// errors are returned unchanged.
    ///
    /// ```no_run
    /// # use mom_pubsub::{ChannelReference, Exchange, Result};
    /// # async fn example(channel: ChannelReference) -> Result<()> {
    /// let exchange = Exchange::topic("prices");
    /// channel
    ///     .execute(|ch| Box::pin(async move { ch.declare_exchange(&exchange).await }))
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::ChannelClosed`] if the reference was disposed.
    pub async fn execute<R, F>(&self, operation: F) -> Result<R>
    where
        F: for<'c> FnOnce(&'c dyn Channel) -> BoxFuture<'c, Result<R>> + Send,
        R: Send,
    {
        // ---
        let guard = self.inner.slot.lock().await;
        let channel = guard.as_ref().ok_or(Error::ChannelClosed)?;

        log_trace!("[{}] channel acquired", self.inner.id);
        let result = operation(channel.as_ref()).await;
        log_trace!("[{}] channel released", self.inner.id);

        result
    }

    /// Close the channel. Later [`execute`](Self::execute) calls fail with
    /// [`Error::ChannelClosed`].
    ///
    /// Waits for an in-flight operation to finish. Calling it again is a no-op.
    pub async fn dispose(&self) -> Result<()> {
        // ---
        let channel = {
            let mut guard = self.inner.slot.lock().await;
            self.inner.closed.store(true, Ordering::Release);
            guard.take()
        };

        match channel {
            Some(channel) => {
                log_debug!("[{}] disposing channel", self.inner.id);
                channel.close().await
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ChannelReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelReference")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::{
        Bindable, DeliveryStream, Exchange, PublishProperties, PublishReceipt, Queue,
    };
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Channel that counts calls and detects overlapping operations.
    #[derive(Default)]
    struct TrackingChannel {
        in_flight: AtomicBool,
        overlaps: AtomicUsize,
        calls: AtomicUsize,
        closes: AtomicUsize,
    }

    impl TrackingChannel {
        async fn enter(&self) {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.in_flight.store(false, Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl Channel for TrackingChannel {
        fn channel_id(&self) -> &str {
            "tracking"
        }

        async fn publish(
            &self,
            _exchange: &str,
            _routing_key: &str,
            _properties: &PublishProperties,
            _payload: Bytes,
        ) -> Result<PublishReceipt> {
            self.enter().await;
            Ok(PublishReceipt::Accepted)
        }

        async fn declare_exchange(&self, _exchange: &Exchange) -> Result<()> {
            self.enter().await;
            Ok(())
        }

        async fn declare_queue(&self, _queue: &Queue) -> Result<()> {
            self.enter().await;
            Ok(())
        }

        async fn bind(&self, _s: &str, _d: &Bindable, _k: &str) -> Result<()> {
            self.enter().await;
            Ok(())
        }

        async fn consume(&self, _queue: &str) -> Result<DeliveryStream> {
            Err(Error::Transport("tracking channel cannot consume".into()))
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_operations_never_overlap() {
        // ---
        let tracked = Arc::new(TrackingChannel::default());
        let reference = ChannelReference::new(tracked.clone());

        let mut handles = Vec::new();
        for i in 0..32 {
            let reference = reference.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    reference
                        .execute(|ch| {
                            Box::pin(async move {
                                ch.publish("x", "k", &PublishProperties::default(), Bytes::new())
                                    .await
                            })
                        })
                        .await
                        .map(|_| ())
                } else {
                    let exchange = Exchange::topic(format!("e{i}"));
                    reference
                        .execute(|ch| Box::pin(async move { ch.declare_exchange(&exchange).await }))
                        .await
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(tracked.calls.load(Ordering::SeqCst), 32);
        assert_eq!(tracked.overlaps.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_execute_after_dispose_fails() {
        // ---
        let tracked = Arc::new(TrackingChannel::default());
        let reference = ChannelReference::new(tracked.clone());
        let other_handle = reference.clone();

        reference.dispose().await.unwrap();

        let result = other_handle
            .execute(|ch| Box::pin(async move { ch.declare_queue(&Queue::new("q")).await }))
            .await;

        assert!(matches!(result, Err(Error::ChannelClosed)));
        assert!(other_handle.is_closed());
        assert_eq!(tracked.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        // ---
        let tracked = Arc::new(TrackingChannel::default());
        let reference = ChannelReference::new(tracked.clone());

        reference.dispose().await.unwrap();
        reference.dispose().await.unwrap();

        assert_eq!(tracked.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_operation_errors_propagate_unchanged() {
        // ---
        let reference = ChannelReference::new(Arc::new(TrackingChannel::default()));

        let result = reference
            .execute(|ch| Box::pin(async move { ch.consume("q").await }))
            .await;

        assert!(matches!(result, Err(Error::Transport(_))));
    }
}

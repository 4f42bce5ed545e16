// tests/common/mod.rs

#![allow(dead_code)]

use std::time::Duration;

use mom_pubsub::{Bus, BusBuilder, MemoryBroker, Result};

/// How long tests wait for an asynchronous delivery.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_millis(500);

/// Bus on a fresh broker, so tests running in parallel never share state.
pub async fn memory_bus(id: &str) -> Result<(Bus, MemoryBroker)> {
    // ---
    init_logging();

    let broker = MemoryBroker::new();
    let bus = BusBuilder::new()
        .bus_id(id)
        .memory_broker(broker.clone())
        .build()
        .await?;

    Ok((bus, broker))
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}

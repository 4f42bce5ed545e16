//! Shared subscriptions: competing consumers on one queue.
//!
//! A publisher emits one slow message for every four fast ones and routes them
//! by type with a custom router. Two workers share the `fast-work` queue and
//! split its messages round-robin; one worker drains `slow-work`.
//!
//! Run with: cargo run --example shared_subscriptions

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

mod common;

use std::time::Duration;

use common::{MessageType, SharedMessage};
use mom_pubsub::{Binding, Consumer, Exchange, Publish, Queue, Result, Router};

/// Routes by message type: `shared.slow` or `shared.fast`.
struct SharedMessageRouter;

impl Router<SharedMessage> for SharedMessageRouter {
    fn route(&self, message: &SharedMessage) -> Option<String> {
        let kind = match message.message_type {
            MessageType::Slow => "slow",
            MessageType::Fast => "fast",
        };
        Some(format!("shared.{kind}"))
    }
}

struct Worker {
    name: &'static str,
    delay: Duration,
}

#[async_trait::async_trait]
impl Consumer<SharedMessage> for Worker {
    async fn consume(&self, message: SharedMessage) -> Result<()> {
        // ---
        tokio::time::sleep(self.delay).await;
        println!("{:>8} handled #{:<3} ({:?})", self.name, message.id, message.message_type);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    common::init_tracing();

    let bus = common::connect("shared-subscriptions").await?;
    let exchange = Exchange::topic("shared");

    bus.modify_topology(|plan| {
        plan.visit(Binding::new(exchange.clone(), Queue::new("slow-work"), ["*.slow"]))
            .visit(Binding::new(exchange.clone(), Queue::new("fast-work"), ["*.fast"]));
    })
    .await?;

    bus.subscribe::<SharedMessage, _>(
        Queue::new("slow-work"),
        Worker {
            name: "slow-1",
            delay: Duration::from_millis(250),
        },
    )
    .await?;
    for name in ["fast-1", "fast-2"] {
        bus.subscribe::<SharedMessage, _>(
            Queue::new("fast-work"),
            Worker {
                name,
                delay: Duration::from_millis(20),
            },
        )
        .await?;
    }

    let publisher = bus
        .publisher::<SharedMessage>(exchange)
        .router(SharedMessageRouter)
        .build()
        .await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    for id in 0..20 {
        ticker.tick().await;
        let message_type = if id % 5 == 0 {
            MessageType::Slow
        } else {
            MessageType::Fast
        };
        publisher.publish(SharedMessage { id, message_type }).await?;
    }

    // let the workers drain
    tokio::time::sleep(Duration::from_millis(500)).await;
    println!("published {} messages", publisher.published_count());

    publisher.dispose().await?;
    bus.close().await?;
    Ok(())
}

//! Stock ticker: topology driven by application messages.
//!
//! The server publishes prices to the `prices` topic exchange and listens for
//! connect messages. Each client owns a topic exchange and a private queue
//! bound to it, then asks the server for a set of tickers. The server answers
//! by binding `prices` to the client's exchange with one key per ticker, so
//! each client only sees the prices it asked for.
//!
//! Run with: cargo run --example stock_ticker

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::panic_in_result_fn
)]

mod common;

use std::time::Duration;

use common::{ConnectMessage, PriceMessage};
use mom_pubsub::{
    // ---
    Binding,
    Bus,
    Consumer,
    Exchange,
    KeyTemplate,
    Publish,
    Queue,
    Result,
    StaticRouter,
    TopologyConsumer,
};

const CONNECT_QUEUE: &str = "ticker-connect";
const TICKERS: [&str; 4] = ["AAPL", "MSFT", "GOOG", "IBM"];

struct PrintPrices {
    client_id: String,
}

#[async_trait::async_trait]
impl Consumer<PriceMessage> for PrintPrices {
    async fn consume(&self, message: PriceMessage) -> Result<()> {
        println!("[{}] {} {:.2}", self.client_id, message.ticker, message.price);
        Ok(())
    }
}

async fn start_server(bus: &Bus) -> Result<()> {
    // ---
    bus.topology().declare_exchange(Exchange::topic("prices")).await?;

    bus.subscribe::<ConnectMessage, _>(
        Queue::new(CONNECT_QUEUE),
        TopologyConsumer::new(
            bus.topology().clone(),
            Exchange::topic("prices"),
            KeyTemplate::namespace("prices"),
        ),
    )
    .await?;
    Ok(())
}

async fn start_client(bus: &Bus, client_id: &str, tickers: &[&str]) -> Result<()> {
    // ---
    let exchange = format!("client-{client_id}");
    let queue = Queue::private(format!("client-{client_id}-inbox"));

    bus.modify_topology(|plan| {
        plan.visit(Binding::new(Exchange::topic(&exchange), queue.clone(), ["#"]));
    })
    .await?;

    bus.subscribe::<PriceMessage, _>(
        queue,
        PrintPrices {
            client_id: client_id.to_string(),
        },
    )
    .await?;

    let connects = bus
        .publisher::<ConnectMessage>(Exchange::direct(""))
        .router(StaticRouter::new(CONNECT_QUEUE))
        .build()
        .await?;
    connects
        .publish(ConnectMessage {
            client_id: client_id.to_string(),
            queue_name: exchange,
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
        })
        .await?;
    connects.dispose().await
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    common::init_tracing();

    let bus = common::connect("stock-ticker").await?;

    start_server(&bus).await?;
    start_client(&bus, "C1", &["AAPL", "MSFT"]).await?;
    start_client(&bus, "C2", &["GOOG"]).await?;

    // give the server a moment to apply the bindings
    tokio::time::sleep(Duration::from_millis(100)).await;

    let prices = bus
        .publisher::<PriceMessage>(Exchange::topic("prices"))
        .build()
        .await?;

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    for round in 0..5u32 {
        ticker.tick().await;
        for (n, symbol) in TICKERS.iter().enumerate() {
            let price = 100.0 + f64::from(round) * 1.5 + n as f64 * 10.0;
            prices
                .publish(PriceMessage {
                    ticker: symbol.to_string(),
                    price,
                })
                .await?;
        }
    }

    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("published {} prices", prices.published_count());

    prices.dispose().await?;
    bus.close().await?;
    Ok(())
}

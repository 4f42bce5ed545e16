//! Shared wire types and setup for the demos.
//!
//! Both demos run against the in-memory broker by default. Set
//! `MOM_PUBSUB_URI` (for example `amqp://localhost:5672/%2f`) and build with
//! `--features transport_lapin` to run them against RabbitMQ instead.

#![allow(dead_code)]

use mom_pubsub::{Bus, BusConfig, ConnectRequest, Publishable, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

pub fn init_tracing() {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();
}

/// Connect to `MOM_PUBSUB_URI` when set, else to the in-memory broker.
pub async fn connect(bus_id: &str) -> Result<Bus> {
    // ---
    let config = match std::env::var("MOM_PUBSUB_URI") {
        Ok(uri) => BusConfig::amqp(uri, bus_id),
        Err(_) => BusConfig::memory(bus_id),
    };
    Bus::connect(config).await
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum MessageType {
    Slow,
    Fast,
}

/// Message fanned out to competing workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedMessage {
    pub id: u64,
    pub message_type: MessageType,
}

impl Publishable for SharedMessage {}

/// A stock price tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceMessage {
    pub ticker: String,
    pub price: f64,
}

impl Publishable for PriceMessage {
    fn routing_key(&self) -> Option<String> {
        Some(format!("prices.{}", self.ticker))
    }

    fn is_transient(&self) -> bool {
        true
    }
}

/// Sent by a ticker client to ask for prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectMessage {
    pub client_id: String,
    pub queue_name: String,
    pub tickers: Vec<String>,
}

impl Publishable for ConnectMessage {}

impl ConnectRequest for ConnectMessage {
    fn consumer_id(&self) -> &str {
        &self.client_id
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }

    fn topics(&self) -> Vec<String> {
        self.tickers.clone()
    }
}

// tests/transport_memory.rs

use bytes::Bytes;
use tokio::time::{timeout, Duration};

use mom_pubsub::{
    // ---
    Bindable,
    BusConfig,
    Channel,
    ChannelReference,
    Connection,
    Error,
    Exchange,
    MemoryBroker,
    PublishProperties,
    PublishReceipt,
    Queue,
    Result,
    TopologyOp,
};

fn json_properties() -> PublishProperties {
    PublishProperties {
        content_type: "application/json".into(),
        persistent: true,
        ..PublishProperties::default()
    }
}

#[tokio::test]
async fn memory_consume_then_publish_delivers() -> Result<()> {
    // ---
    // Arrange
    // ---
    let broker = MemoryBroker::new();
    let config = BusConfig::memory("mcpd");
    let connection = mom_pubsub::create_memory_connection_with_broker(&config, broker.clone())
        .await
        .expect("failed to create memory connection");
    let channel = connection.create_channel().await?;

    let exchange = Exchange::topic("prices");
    let queue = Queue::new("watch");
    channel.declare_exchange(&exchange).await?;
    channel.declare_queue(&queue).await?;
    channel
        .bind("prices", &Bindable::Queue(queue.clone()), "prices.*")
        .await?;

    let mut stream = channel.consume("watch").await?;
    let payload = Bytes::from_static(b"{\"cents\":1}");

    // ---
    // Act
    // ---
    let receipt = channel
        .publish("prices", "prices.AAPL", &json_properties(), payload.clone())
        .await?;

    // ---
    // Assert
    // ---
    assert_eq!(receipt, PublishReceipt::Accepted);

    let received = timeout(Duration::from_millis(100), stream.inbox.recv())
        .await
        .expect("timed out waiting for message")
        .expect("delivery stream closed unexpectedly");

    assert_eq!(received.payload, payload);
    assert_eq!(received.exchange, "prices");
    assert_eq!(received.routing_key, "prices.AAPL");
    assert_eq!(received.properties, json_properties());

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].channel_id, channel.channel_id());

    Ok(())
}

#[tokio::test]
async fn memory_consumers_share_a_queue_round_robin() -> Result<()> {
    // ---
    let broker = MemoryBroker::new();
    let config = BusConfig::memory("mrr");
    let connection =
        mom_pubsub::create_memory_connection_with_broker(&config, broker.clone()).await?;
    let channel = connection.create_channel().await?;

    channel.declare_exchange(&Exchange::fanout("ticks")).await?;
    channel.declare_queue(&Queue::new("workers")).await?;
    channel
        .bind("ticks", &Bindable::Queue(Queue::new("workers")), "")
        .await?;

    let mut first = channel.consume("workers").await?;
    let mut second = channel.consume("workers").await?;

    for n in 0..4u8 {
        channel
            .publish("ticks", "ignored", &json_properties(), Bytes::from(vec![n]))
            .await?;
    }

    let mut got_first = Vec::new();
    let mut got_second = Vec::new();
    for _ in 0..2 {
        got_first.push(first.inbox.recv().await.expect("first closed").payload[0]);
        got_second.push(second.inbox.recv().await.expect("second closed").payload[0]);
    }

    assert_eq!(got_first, vec![0, 2]);
    assert_eq!(got_second, vec![1, 3]);

    Ok(())
}

#[tokio::test]
async fn memory_confirms_when_enabled() -> Result<()> {
    // ---
    let broker = MemoryBroker::new();
    let config = BusConfig::memory("mconf").with_publisher_confirms(true);
    let connection = mom_pubsub::create_memory_connection_with_broker(&config, broker).await?;
    let channel = connection.create_channel().await?;

    channel.declare_exchange(&Exchange::topic("prices")).await?;

    let first = channel
        .publish("prices", "a", &json_properties(), Bytes::new())
        .await?;
    let second = channel
        .publish("prices", "b", &json_properties(), Bytes::new())
        .await?;

    assert_eq!(first, PublishReceipt::Confirmed { sequence: 1 });
    assert_eq!(second, PublishReceipt::Confirmed { sequence: 2 });

    Ok(())
}

#[tokio::test]
async fn memory_closed_connection_closes_channels() -> Result<()> {
    // ---
    let config = BusConfig::memory("mclose");
    let connection =
        mom_pubsub::create_memory_connection_with_broker(&config, MemoryBroker::new()).await?;
    let channel = connection.create_channel().await?;

    connection.close().await?;

    let err = channel
        .declare_queue(&Queue::new("q"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChannelClosed));
    assert!(connection.create_channel().await.is_err());

    Ok(())
}

#[tokio::test]
async fn memory_apply_runs_topology_ops_through_reference() -> Result<()> {
    // ---
    let broker = MemoryBroker::new();
    let config = BusConfig::memory("mapply");
    let connection =
        mom_pubsub::create_memory_connection_with_broker(&config, broker.clone()).await?;
    let reference = ChannelReference::new(connection.create_channel().await?);

    let ops = vec![
        TopologyOp::DeclareExchange(Exchange::topic("prices")),
        TopologyOp::DeclareExchange(Exchange::topic("client")),
        TopologyOp::Bind {
            source: "prices".into(),
            destination: Bindable::Exchange(Exchange::topic("client")),
            routing_key: "prices.AAPL".into(),
        },
    ];

    reference
        .execute(move |ch| {
            Box::pin(async move {
                for op in &ops {
                    ch.apply(op).await?;
                }
                Ok(())
            })
        })
        .await?;

    assert_eq!(broker.binding_keys("prices", "client"), vec!["prices.AAPL"]);

    reference.dispose().await?;
    let err = reference
        .execute(|ch| Box::pin(async move { ch.declare_queue(&Queue::new("late")).await }))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ChannelClosed));

    Ok(())
}

//! Broker lifecycle tests
//!
//! The NATS tests need a local server (`nats-server` on 127.0.0.1:4222)
//! and are ignored by default: `cargo test -- --ignored` runs them.

#[cfg(test)]
mod tests {
    use bus_tracker::{
        broker::{Broker, MemoryBroker, NatsBroker},
        settings::BrokerSettings,
        TrackerError,
    };
    use bytes::Bytes;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    /// Every `Broker` must behave the same way once stopped.
    async fn assert_stop_lifecycle(broker: &dyn Broker) {
        let mut deliveries = assert_ok!(broker.consume().await);
        assert_ok!(broker.publish(Bytes::from_static(b"before")).await);
        let first = tokio::time::timeout(Duration::from_secs(5), deliveries.next()).await;
        assert_eq!(first.ok().flatten(), Some(Bytes::from_static(b"before")));

        broker.stop().await;
        broker.stop().await;

        let err = assert_err!(broker.publish(Bytes::from_static(b"after")).await);
        assert!(matches!(err, TrackerError::Broker(_)));

        let ended = tokio::time::timeout(Duration::from_secs(5), deliveries.next()).await;
        assert_eq!(ended.ok(), Some(None), "delivery stream must end after stop");
    }

    // -----------------------------------------------------------------------
    // In-memory
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn memory_broker_stop_ends_stream_and_rejects_publish() {
        let broker = MemoryBroker::new();
        assert_stop_lifecycle(&broker).await;
    }

    // -----------------------------------------------------------------------
    // NATS
    // -----------------------------------------------------------------------

    fn local_nats() -> BrokerSettings {
        BrokerSettings {
            subject: "buses.positions.test".into(),
            ..BrokerSettings::default()
        }
    }

    #[tokio::test]
    #[ignore = "needs nats-server on 127.0.0.1:4222"]
    async fn nats_broker_stop_ends_stream_and_rejects_publish() {
        let broker = assert_ok!(NatsBroker::start(&local_nats()).await);
        assert_stop_lifecycle(&broker).await;
    }

    #[tokio::test]
    #[ignore = "needs nats-server on 127.0.0.1:4222"]
    async fn nats_broker_refuses_consume_after_stop() {
        let broker = assert_ok!(NatsBroker::start(&local_nats()).await);
        broker.stop().await;
        assert!(matches!(broker.consume().await, Err(TrackerError::Broker(_))));
    }
}

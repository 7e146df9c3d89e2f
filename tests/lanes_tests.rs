//! Publish lane unit tests

#[cfg(test)]
mod tests {
    use bus_tracker::{
        broker::{Broker, MemoryBroker},
        lanes::{LaneExit, LanePool},
        simulator::{Placement, Simulator},
        types::{Coord, PositionSample, Route},
    };
    use futures::{FutureExt, StreamExt};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn sample(id: &str) -> PositionSample {
        PositionSample::new(id, Coord::new(1.0, 2.0), "R")
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn idle_pump_stops_within_one_tick_without_publishing() {
        let refresh = Duration::from_secs(1);
        let shutdown = CancellationToken::new();
        let broker = Arc::new(MemoryBroker::new());
        let mut deliveries = broker.consume().await.unwrap();
        let pool = LanePool::start(1, refresh, broker.clone(), shutdown.clone());

        // Let the pump settle into waiting for a sample.
        tokio::time::sleep(refresh / 2).await;
        shutdown.cancel();

        let reports = tokio::time::timeout(refresh, pool.join())
            .await
            .expect("pump did not stop within one tick");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].exit, LaneExit::Shutdown);
        assert_eq!(reports[0].published, 0);
        assert!(deliveries.next().now_or_never().is_none());
    }

    #[tokio::test]
    async fn pump_drains_out_when_every_sender_is_gone() {
        let shutdown = CancellationToken::new();
        let pool = LanePool::start(2, Duration::from_millis(10), Arc::new(MemoryBroker::new()), shutdown);
        let reports = pool.join().await;
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.exit == LaneExit::Drained));
    }

    #[tokio::test]
    async fn zero_lanes_is_promoted_to_one() {
        let shutdown = CancellationToken::new();
        let pool = LanePool::start(0, Duration::from_millis(10), Arc::new(MemoryBroker::new()), shutdown.clone());
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.lane(5).index(), 0);
        shutdown.cancel();
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn publish_failure_stops_only_that_pump() {
        let shutdown = CancellationToken::new();
        let broker = Arc::new(MemoryBroker::new());
        broker.stop().await;

        let pool = LanePool::start(2, Duration::from_millis(10), broker, shutdown.clone());
        pool.lane(0).send(sample("bus-a")).await.unwrap();

        // Give lane 0 a chance to fail before shutting lane 1 down.
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();

        let reports = pool.join().await;
        assert_eq!(reports[0].exit, LaneExit::PublishFailed);
        assert_eq!(reports[0].published, 0);
        assert_eq!(reports[1].exit, LaneExit::Shutdown);
    }

    // -----------------------------------------------------------------------
    // Rate limiting
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn publish_rate_is_bounded_by_lane_count() {
        let refresh = Duration::from_millis(100);
        let shutdown = CancellationToken::new();
        let broker = Arc::new(MemoryBroker::new());
        let lanes = LanePool::start(2, refresh, broker, shutdown.clone());
        let mut sim = Simulator::new(lanes, Some(3), shutdown.clone());

        let route = Arc::new(Route::new(
            "R",
            (0..20).map(|i| Coord::new(i as f64, 0.0)).collect(),
        ));
        for i in 0..30 {
            sim.spawn_bus(route.clone(), Placement { offset: 0, lane: i % 2 });
        }

        // Ticks at 100ms..=1000ms plus the publish at t=0.
        tokio::time::sleep(Duration::from_millis(1050)).await;
        shutdown.cancel();

        let reports = sim.join().await;
        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert!(
                (10..=12).contains(&report.published),
                "lane {} published {}",
                report.lane,
                report.published
            );
        }
    }
}

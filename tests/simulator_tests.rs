//! Simulator unit tests

#[cfg(test)]
mod tests {
    use bus_tracker::{
        broker::{Broker, MemoryBroker},
        lanes::{LaneExit, LanePool},
        protocol::decode_position,
        simulator::{Placement, RouteWalk, Simulator, BUS_SUFFIX_LEN},
        types::{Coord, Route},
    };
    use futures::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn diagonal_route(name: &str, len: usize) -> Arc<Route> {
        let path = (0..len).map(|i| Coord::new(i as f64, i as f64)).collect();
        Arc::new(Route::new(name, path))
    }

    fn lats(walk: RouteWalk, n: usize) -> Vec<f64> {
        walk.take(n).map(|c| c.lat).collect()
    }

    // -----------------------------------------------------------------------
    // Route walk
    // -----------------------------------------------------------------------

    #[test]
    fn walk_ping_pongs_without_repeating_turning_points() {
        let walk = RouteWalk::new(diagonal_route("R1", 3), 0);
        let coords: Vec<Coord> = walk.take(7).collect();
        let expected: Vec<Coord> = [0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0]
            .iter()
            .map(|&v| Coord::new(v, v))
            .collect();
        assert_eq!(coords, expected);
    }

    #[test]
    fn walk_from_offset_finishes_leg_then_covers_full_path() {
        let walk = RouteWalk::new(diagonal_route("R2", 5), 2);
        assert_eq!(
            lats(walk, 12),
            vec![2.0, 3.0, 4.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0, 4.0, 3.0]
        );
    }

    #[test]
    fn walk_on_single_point_route_repeats_it() {
        let walk = RouteWalk::new(diagonal_route("R3", 1), 0);
        assert_eq!(lats(walk, 4), vec![0.0; 4]);
    }

    #[test]
    fn walk_clamps_offset_into_path() {
        let walk = RouteWalk::new(diagonal_route("R4", 3), 99);
        assert_eq!(lats(walk, 3), vec![2.0, 1.0, 0.0]);
    }

    #[test]
    fn walk_never_skips_or_duplicates_a_coordinate() {
        for len in 2..9 {
            for offset in 0..len / 2 {
                let walk = RouteWalk::new(diagonal_route("R", len), offset);
                let seq = lats(walk, len * 5);
                for pair in seq.windows(2) {
                    assert_eq!(
                        (pair[1] - pair[0]).abs(),
                        1.0,
                        "len={} offset={} seq={:?}",
                        len,
                        offset,
                        seq
                    );
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Placement & ids
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn placement_stays_in_range() {
        let shutdown = CancellationToken::new();
        let broker = Arc::new(MemoryBroker::new());
        let lanes = LanePool::start(4, Duration::from_millis(100), broker, shutdown.clone());
        let mut sim = Simulator::new(lanes, Some(7), shutdown.clone());

        let route = diagonal_route("R", 10);
        for _ in 0..200 {
            let p = sim.place(&route);
            assert!(p.offset < 5, "offset {} outside first half", p.offset);
            assert!(p.lane < 4);
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn same_seed_gives_same_bus_ids() {
        let shutdown = CancellationToken::new();
        let route = diagonal_route("R7", 6);

        let mut ids = Vec::new();
        for _ in 0..2 {
            let broker = Arc::new(MemoryBroker::new());
            let lanes = LanePool::start(3, Duration::from_millis(100), broker, shutdown.clone());
            let mut sim = Simulator::new(lanes, Some(42), shutdown.clone());
            ids.push(sim.spawn_route(route.clone(), 4));
        }

        assert_eq!(ids[0], ids[1]);
        for id in &ids[0] {
            assert!(id.starts_with("R7-"));
            assert_eq!(id.len(), "R7-".len() + BUS_SUFFIX_LEN);
        }
        shutdown.cancel();
    }

    // -----------------------------------------------------------------------
    // End to end through a lane
    // -----------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn bus_publishes_route_in_ping_pong_order() {
        let shutdown = CancellationToken::new();
        let broker = Arc::new(MemoryBroker::new());
        let mut deliveries = broker.consume().await.unwrap();

        let lanes = LanePool::start(1, Duration::from_millis(10), broker.clone(), shutdown.clone());
        let mut sim = Simulator::new(lanes, Some(1), shutdown.clone());
        let id = sim.spawn_bus(diagonal_route("R1", 3), Placement { offset: 0, lane: 0 });
        assert_eq!(sim.bus_count(), 1);

        let mut seen = Vec::new();
        for _ in 0..7 {
            let payload = deliveries.next().await.unwrap();
            let sample = decode_position(&payload).unwrap();
            assert_eq!(sample.bus_id, id);
            assert_eq!(sample.route, "R1");
            seen.push(sample.lat);
        }
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 1.0, 0.0, 1.0, 2.0]);

        shutdown.cancel();
        let reports = sim.join().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].exit, LaneExit::Shutdown);
        assert!(reports[0].published >= 7);
    }
}

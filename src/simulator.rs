//! Bus simulator – spawns buses that drive routes back and forth forever.
//!
//! ## Traversal
//!
//! A bus starts at a random offset inside the first half of its route and
//! drives to the end. From then on it ping-pongs over the full path: back to
//! the start, forward to the end, and so on. Turning points are emitted once.
//!
//! ```text
//! path   A B C D E        offset 2
//! emits  C D E | D C B A | B C D E | D C …
//! ```
//!
//! ## Backpressure
//!
//! Each bus pushes samples onto its lane as fast as the lane will take them.
//! The lane pump only drains one sample per tick, so a bus spends almost all
//! of its life parked in [`Lane::send`].

use crate::lanes::{Lane, LanePool, LaneReport};
use crate::types::{Coord, PositionSample, Route};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Length of the random suffix in a bus id (`"<route>-<suffix>"`).
pub const BUS_SUFFIX_LEN: usize = 5;

// ---------------------------------------------------------------------------
// Route walk
// ---------------------------------------------------------------------------

/// Infinite ping-pong iterator over a route's coordinates.
#[derive(Debug, Clone)]
pub struct RouteWalk {
    route: Arc<Route>,
    index: usize,
    forward: bool,
}

impl RouteWalk {
    /// Start at `offset`, heading toward the end of the path.
    ///
    /// `offset` is clamped into the path.
    pub fn new(route: Arc<Route>, offset: usize) -> Self {
        let index = offset.min(route.len().saturating_sub(1));
        Self {
            route,
            index,
            forward: true,
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    fn advance(&mut self) {
        let last = self.route.len().saturating_sub(1);
        if last == 0 {
            return;
        }
        if self.forward {
            if self.index < last {
                self.index += 1;
            } else {
                self.forward = false;
                self.index -= 1;
            }
        } else if self.index > 0 {
            self.index -= 1;
        } else {
            self.forward = true;
            self.index += 1;
        }
    }
}

impl Iterator for RouteWalk {
    type Item = Coord;

    fn next(&mut self) -> Option<Coord> {
        let coord = *self.route.path.get(self.index)?;
        self.advance();
        Some(coord)
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Where a new bus starts and which lane it publishes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub offset: usize,
    pub lane: usize,
}

struct Bus {
    id: String,
    walk: RouteWalk,
    lane: Lane,
}

impl Bus {
    async fn run(self, shutdown: CancellationToken) {
        let Bus { id, walk, lane } = self;
        let route_name = walk.route().name.clone();

        for coord in walk {
            let sample = PositionSample::new(id.as_str(), coord, route_name.as_str());
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                sent = lane.send(sample) => if sent.is_err() {
                    debug!("Bus {}: lane {} closed", id, lane.index());
                    break;
                },
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// Owns the lane pool and every running bus.
pub struct Simulator {
    lanes: LanePool,
    rng: StdRng,
    buses: JoinSet<()>,
    shutdown: CancellationToken,
}

impl Simulator {
    /// `seed` fixes lane choice, start offsets and bus ids for repeatable runs.
    pub fn new(lanes: LanePool, seed: Option<u64>, shutdown: CancellationToken) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            lanes,
            rng,
            buses: JoinSet::new(),
            shutdown,
        }
    }

    pub fn bus_count(&self) -> usize {
        self.buses.len()
    }

    /// Draw a random start offset and lane for a bus on `route`.
    pub fn place(&mut self, route: &Route) -> Placement {
        let half = route.len() / 2;
        let offset = if half > 0 { self.rng.gen_range(0..half) } else { 0 };
        let lane = self.rng.gen_range(0..self.lanes.len());
        Placement { offset, lane }
    }

    /// Spawn `count` buses on `route`, returning their ids.
    pub fn spawn_route(&mut self, route: Arc<Route>, count: usize) -> Vec<String> {
        let ids: Vec<String> = (0..count)
            .map(|_| {
                let placement = self.place(&route);
                self.spawn_bus(route.clone(), placement)
            })
            .collect();
        info!("Route '{}': spawned {} buses", route.name, ids.len());
        ids
    }

    /// Spawn one bus with an explicit placement.
    ///
    /// An out-of-range lane wraps around the pool.
    pub fn spawn_bus(&mut self, route: Arc<Route>, placement: Placement) -> String {
        let id = self.bus_id(&route.name);
        let lane = self.lanes.lane(placement.lane);

        debug!(
            "Spawning bus {} at offset {} on lane {}",
            id,
            placement.offset,
            lane.index()
        );
        let bus = Bus {
            id: id.clone(),
            walk: RouteWalk::new(route, placement.offset),
            lane,
        };
        self.buses.spawn(bus.run(self.shutdown.clone()));
        id
    }

    /// Wait for every bus and then every lane pump to stop. Buses only stop
    /// on shutdown, so call this after cancelling the token.
    pub async fn join(mut self) -> Vec<LaneReport> {
        while self.buses.join_next().await.is_some() {}
        self.lanes.join().await
    }

    fn bus_id(&mut self, route_name: &str) -> String {
        let token = uuid::Builder::from_random_bytes(self.rng.gen()).into_uuid();
        let suffix = &token.simple().to_string()[..BUS_SUFFIX_LEN];
        format!("{}-{}", route_name, suffix)
    }
}

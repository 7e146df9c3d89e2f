//! Publish multiplexer – a fixed pool of rate-limited outbound lanes.
//!
//! Every bus is bound to exactly one lane for its whole life. Each lane owns a
//! single pump task that moves at most one sample per tick from the lane onto
//! the broker, so the aggregate publish rate is bounded by the lane count
//! regardless of how many buses exist.
//!
//! ```text
//! WAIT_FOR_SAMPLE ──▶ PUBLISH ──▶ WAIT_FOR_TICK ──┐
//!        ▲                                        │
//!        └────────────────────────────────────────┘
//!   (any state) ── shutdown ──▶ STOPPED
//! ```

use crate::broker::Broker;
use crate::protocol::encode_position;
use crate::types::PositionSample;
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Lane handle
// ---------------------------------------------------------------------------

/// Sending half of one lane, handed to a bus when it is spawned.
#[derive(Debug, Clone)]
pub struct Lane {
    index: usize,
    tx: mpsc::Sender<PositionSample>,
}

/// The lane's pump is gone; nothing will ever drain it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneClosed;

impl Lane {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Hand a sample to the lane, waiting until the pump takes it.
    pub async fn send(&self, sample: PositionSample) -> Result<(), LaneClosed> {
        self.tx.send(sample).await.map_err(|_| LaneClosed)
    }
}

// ---------------------------------------------------------------------------
// Pump outcome
// ---------------------------------------------------------------------------

/// Why a lane pump stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneExit {
    Shutdown,
    /// Every sender was dropped.
    Drained,
    MarshalFailed,
    PublishFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneReport {
    pub lane: usize,
    pub published: u64,
    pub exit: LaneExit,
}

// ---------------------------------------------------------------------------
// LanePool
// ---------------------------------------------------------------------------

pub struct LanePool {
    lanes: Vec<Lane>,
    pumps: Vec<JoinHandle<LaneReport>>,
}

impl LanePool {
    /// Spawn `count` lane pumps publishing to `broker` every `refresh`.
    ///
    /// All pumps are running when this returns, so buses may be spawned
    /// against the pool straight away.
    pub fn start(
        count: usize,
        refresh: Duration,
        broker: Arc<dyn Broker>,
        shutdown: CancellationToken,
    ) -> Self {
        let count = count.max(1);
        let mut lanes = Vec::with_capacity(count);
        let mut pumps = Vec::with_capacity(count);

        for index in 0..count {
            // Capacity 1 is the smallest tokio allows: at most one sample
            // waits on a lane while its pump sits out the tick.
            let (tx, rx) = mpsc::channel(1);
            lanes.push(Lane { index, tx });
            pumps.push(tokio::spawn(pump(
                index,
                rx,
                refresh,
                broker.clone(),
                shutdown.clone(),
            )));
        }

        info!("Started {} publish lanes (refresh {:?})", count, refresh);
        Self { lanes, pumps }
    }

    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Lane `index`, wrapping around the pool.
    pub fn lane(&self, index: usize) -> Lane {
        self.lanes[index % self.lanes.len()].clone()
    }

    /// Drop the pool's own senders and wait for every pump to stop.
    ///
    /// Pumps stop once shutdown is signalled, or once every bus holding one
    /// of their lanes has gone away.
    pub async fn join(self) -> Vec<LaneReport> {
        drop(self.lanes);
        let mut reports = Vec::with_capacity(self.pumps.len());
        for (lane, handle) in self.pumps.into_iter().enumerate() {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => error!("Lane {} pump panicked: {}", lane, e),
            }
        }
        reports
    }
}

// ---------------------------------------------------------------------------
// Pump
// ---------------------------------------------------------------------------

#[tracing::instrument(name = "lane", skip(rx, refresh, broker, shutdown))]
async fn pump(
    lane: usize,
    mut rx: mpsc::Receiver<PositionSample>,
    refresh: Duration,
    broker: Arc<dyn Broker>,
    shutdown: CancellationToken,
) -> LaneReport {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + refresh, refresh);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut published = 0u64;

    let exit = loop {
        // WAIT_FOR_SAMPLE
        let sample = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break LaneExit::Shutdown,
            sample = rx.recv() => match sample {
                Some(s) => s,
                None => break LaneExit::Drained,
            },
        };

        // PUBLISH
        let payload = match encode_position(&sample) {
            Ok(p) => p,
            Err(e) => {
                error!("Lane {}: marshal error for {}: {}", lane, sample.bus_id, e);
                break LaneExit::MarshalFailed;
            }
        };
        if let Err(e) = broker.publish(Bytes::from(payload)).await {
            warn!("Lane {}: {}", lane, e);
            break LaneExit::PublishFailed;
        }
        published += 1;

        // WAIT_FOR_TICK
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break LaneExit::Shutdown,
            _ = ticker.tick() => {}
        }
    };

    debug!("Lane {} stopped ({:?}) after {} publishes", lane, exit, published);
    LaneReport {
        lane,
        published,
        exit,
    }
}

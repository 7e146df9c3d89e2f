//! PositionStore – latest known position per bus, plus the broker consumer
//! that feeds it.
//!
//! The store is written by exactly one consumer task and read by every
//! viewer's broadcast task. It is a sharded [`DashMap`], so readers never
//! contend on one global lock.

use crate::error::Result;
use crate::protocol::decode_position;
use crate::types::{PositionSample, Viewport};
use bytes::Bytes;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use log::{debug, info};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct PositionStore {
    positions: DashMap<String, PositionSample>,
}

impl PositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `sample` as the latest position of its bus, returning the one it
    /// replaced. The last write wins; sample content is never compared.
    pub fn upsert(&self, sample: PositionSample) -> Option<PositionSample> {
        self.positions.insert(sample.bus_id.clone(), sample)
    }

    pub fn get(&self, bus_id: &str) -> Option<PositionSample> {
        self.positions.get(bus_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Every stored position, ordered by bus id.
    pub fn snapshot(&self) -> Vec<PositionSample> {
        self.collect(|_| true)
    }

    /// Positions inside `viewport`, ordered by bus id. No viewport, no buses.
    pub fn within(&self, viewport: Option<&Viewport>) -> Vec<PositionSample> {
        match viewport {
            Some(vp) => self.collect(|s| vp.contains(s.lat, s.lng)),
            None => Vec::new(),
        }
    }

    fn collect(&self, keep: impl Fn(&PositionSample) -> bool) -> Vec<PositionSample> {
        let mut out: Vec<PositionSample> = self
            .positions
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by(|a, b| a.bus_id.cmp(&b.bus_id));
        out
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

/// Drain `deliveries` into `store` until shutdown or end of stream.
///
/// Returns how many deliveries were applied. A payload that does not decode
/// is returned as an error and stops the loop; everything stored before it
/// stays in place.
pub async fn consume_positions<S>(
    mut deliveries: S,
    store: &PositionStore,
    shutdown: CancellationToken,
) -> Result<u64>
where
    S: Stream<Item = Bytes> + Unpin,
{
    let mut applied = 0u64;
    loop {
        let payload = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = deliveries.next() => match next {
                Some(payload) => payload,
                None => break,
            },
        };

        let sample = decode_position(&payload)?;
        debug!(" [x] Received {}", sample.bus_id);
        store.upsert(sample);
        applied += 1;
    }

    info!(
        "Position consumer stopped after {} deliveries ({} buses known)",
        applied,
        store.len()
    );
    Ok(applied)
}

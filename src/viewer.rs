//! Viewport broadcaster – one per connected viewer.
//!
//! Each connection runs two halves side by side:
//!
//! | Half     | Reads                  | Writes                       |
//! |----------|------------------------|------------------------------|
//! | inbound  | viewer messages        | the connection's viewport    |
//! | outbound | store + viewport       | one `Buses` message per tick |
//!
//! The viewport is handed from the inbound half to the outbound half through
//! a `watch` channel: one writer, one reader, no lock shared with anything
//! else. Either half ending ends the connection.

use crate::error::{Result, TrackerError};
use crate::protocol::{BusesMessage, ViewerMessage};
use crate::store::PositionStore;
use crate::types::Viewport;
use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Longest a single broadcast write may take before the viewer is dropped.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(2);

/// Longest the close handshake may take on shutdown.
pub const CLOSE_DEADLINE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Transport seams
// ---------------------------------------------------------------------------

/// Receiving half of a viewer connection.
#[async_trait]
pub trait ViewerSource: Send {
    /// Next message from the viewer, `Ok(None)` once the viewer has closed.
    async fn read_json(&mut self) -> Result<Option<ViewerMessage>>;
}

/// Sending half of a viewer connection.
#[async_trait]
pub trait ViewerSink: Send {
    async fn write_json(&mut self, msg: &BusesMessage) -> Result<()>;

    /// Start the close handshake.
    async fn close(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Connection outcome
// ---------------------------------------------------------------------------

/// Why a viewer connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEnd {
    /// Process shutdown, or the viewer stopped talking to us.
    Closed,
    /// A broadcast could not be written in time.
    WriteFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionReport {
    pub end: ConnectionEnd,
    pub messages_sent: u64,
}

// ---------------------------------------------------------------------------
// Broadcaster
// ---------------------------------------------------------------------------

/// Serves viewer connections from a shared [`PositionStore`].
pub struct Broadcaster {
    store: Arc<PositionStore>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl Broadcaster {
    pub fn new(store: Arc<PositionStore>, interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            store,
            interval,
            shutdown,
        }
    }

    /// Run one viewer connection to completion.
    ///
    /// Returns after both halves have stopped.
    pub async fn serve<R, W>(&self, source: R, sink: W) -> ConnectionReport
    where
        R: ViewerSource,
        W: ViewerSink,
    {
        let connection = self.shutdown.child_token();
        let (viewport_tx, viewport_rx) = watch::channel(None);

        let inbound = {
            let connection = connection.clone();
            async move {
                listen_viewer(source, viewport_tx, connection.clone()).await;
                // The viewer is gone or misbehaving: take the outbound half down too.
                connection.cancel();
            }
        };
        let outbound = {
            let connection = connection.clone();
            async move {
                let report = self.broadcast(sink, viewport_rx, connection.clone()).await;
                connection.cancel();
                report
            }
        };

        let ((), report) = tokio::join!(inbound, outbound);
        info!(
            "Viewer disconnected ({:?}, {} messages sent)",
            report.end, report.messages_sent
        );
        report
    }

    async fn broadcast<W: ViewerSink>(
        &self,
        mut sink: W,
        viewport: watch::Receiver<Option<Viewport>>,
        connection: CancellationToken,
    ) -> ConnectionReport {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut messages_sent = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = connection.cancelled() => {
                    match tokio::time::timeout(CLOSE_DEADLINE, sink.close()).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => debug!("Close handshake failed: {}", e),
                        Err(_) => debug!("Close handshake timed out"),
                    }
                    return ConnectionReport { end: ConnectionEnd::Closed, messages_sent };
                }
                _ = ticker.tick() => {}
            }

            let buses = self.store.within(viewport.borrow().as_ref());
            if buses.is_empty() {
                continue;
            }

            let msg = BusesMessage::new(buses);
            let written = match tokio::time::timeout(WRITE_DEADLINE, sink.write_json(&msg)).await {
                Ok(result) => result,
                Err(_) => Err(TrackerError::WriteTimeout(WRITE_DEADLINE)),
            };
            if let Err(e) = written {
                debug!("Viewer write failed: {}", e);
                return ConnectionReport {
                    end: ConnectionEnd::WriteFailed,
                    messages_sent,
                };
            }
            messages_sent += 1;
        }
    }
}

/// Apply viewport updates from the viewer until it goes away or
/// `connection` is cancelled.
async fn listen_viewer<R: ViewerSource>(
    mut source: R,
    viewport: watch::Sender<Option<Viewport>>,
    connection: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            biased;
            _ = connection.cancelled() => return,
            msg = source.read_json() => msg,
        };

        match msg {
            Ok(Some(ViewerMessage { data: Some(vp), .. })) => {
                debug!("Viewport updated: {:?}", vp);
                viewport.send_replace(Some(vp));
            }
            Ok(Some(_)) => {}
            Ok(None) => return,
            Err(e) => {
                debug!("Viewer read ended: {}", e);
                return;
            }
        }
    }
}

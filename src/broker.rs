//! Broker integration – the transport between the simulator and the server.
//!
//! The rest of the crate only sees the [`Broker`] trait: opaque payload
//! bytes in, a stream of payload bytes out, and a stop call. Two
//! implementations are provided:
//!
//! | Type             | Transport                     | Used by               |
//! |------------------|-------------------------------|-----------------------|
//! | [`NatsBroker`]   | NATS via `async-nats`         | `fake-bus`, `bus-server` |
//! | [`MemoryBroker`] | in-process unbounded channel  | tests, single-process demos |

use crate::error::{Result, TrackerError};
use crate::settings::BrokerSettings;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use log::{info, warn};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Stream of raw payloads delivered by a broker.
pub type Deliveries = BoxStream<'static, Bytes>;

#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, payload: Bytes) -> Result<()>;

    /// Open the inbound delivery stream.
    async fn consume(&self) -> Result<Deliveries>;

    /// Flush and release the connection. Safe to call more than once.
    async fn stop(&self);
}

// ---------------------------------------------------------------------------
// NATS
// ---------------------------------------------------------------------------

pub struct NatsBroker {
    client: async_nats::Client,
    subject: String,
    stopped: CancellationToken,
}

impl NatsBroker {
    /// Connect to `nats://host:port` with the configured credentials.
    pub async fn start(settings: &BrokerSettings) -> Result<Self> {
        let endpoint = format!("nats://{}:{}", settings.host, settings.port);
        info!(
            "Connecting to broker at {} as '{}'",
            endpoint, settings.login
        );

        let client = async_nats::ConnectOptions::with_user_and_password(
            settings.login.clone(),
            settings.password.clone(),
        )
        .connect(endpoint.as_str())
        .await
        .map_err(|e| TrackerError::Broker(format!("connect to {} failed: {}", endpoint, e)))?;

        Ok(Self {
            client,
            subject: settings.subject.clone(),
            stopped: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl Broker for NatsBroker {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        if self.stopped.is_cancelled() {
            return Err(TrackerError::Broker("broker stopped".into()));
        }
        self.client
            .publish(self.subject.clone(), payload)
            .await
            .map_err(|e| TrackerError::Broker(format!("publish failed: {}", e)))
    }

    async fn consume(&self) -> Result<Deliveries> {
        if self.stopped.is_cancelled() {
            return Err(TrackerError::Broker("broker stopped".into()));
        }
        let sub = self
            .client
            .subscribe(self.subject.clone())
            .await
            .map_err(|e| TrackerError::Broker(format!("subscribe failed: {}", e)))?;
        info!("Consuming positions from '{}'", self.subject);
        Ok(sub.map(|msg| msg.payload).boxed())
    }

    async fn stop(&self) {
        if self.stopped.is_cancelled() {
            return;
        }
        self.stopped.cancel();
        // Drain flushes pending publishes, ends every subscription stream
        // and then closes the connection.
        match self.client.drain().await {
            Ok(()) => info!("Broker connection drained"),
            Err(e) => warn!("Broker drain on stop failed: {}", e),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Single-consumer in-process broker.
///
/// Every published payload is queued for the one stream returned by
/// [`Broker::consume`]. After [`Broker::stop`] publishes fail and the
/// stream ends.
pub struct MemoryBroker {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Bytes>>>,
    stopped: CancellationToken,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            stopped: CancellationToken::new(),
        }
    }

    /// Inject a raw payload as if some remote producer had published it.
    pub fn inject(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.tx
            .send(payload.into())
            .map_err(|_| TrackerError::Broker("memory broker closed".into()))
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn publish(&self, payload: Bytes) -> Result<()> {
        if self.stopped.is_cancelled() {
            return Err(TrackerError::Broker("memory broker stopped".into()));
        }
        self.inject(payload)
    }

    async fn consume(&self) -> Result<Deliveries> {
        let rx = self
            .rx
            .lock()
            .take()
            .ok_or_else(|| TrackerError::Broker("memory broker already consumed".into()))?;
        let stopped = self.stopped.clone();

        Ok(futures::stream::unfold((rx, stopped), |(mut rx, stopped)| async move {
            let next = tokio::select! {
                biased;
                _ = stopped.cancelled() => None,
                msg = rx.recv() => msg,
            };
            next.map(|msg| (msg, (rx, stopped)))
        })
        .boxed())
    }

    async fn stop(&self) {
        self.stopped.cancel();
    }
}

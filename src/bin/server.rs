//! bus-server binary
//!
//! Consumes bus positions from the broker into the position store and
//! serves viewport-filtered snapshots to websocket viewers on `/ws`.
//!
//! ## Configuration (flags / env / TOML via `config` crate)
//!
//! | Flag          | Env                   | Default        | Description               |
//! |---------------|-----------------------|----------------|---------------------------|
//! | `--r-host`    | `BROKER_HOST`         | `127.0.0.1`    | Broker host               |
//! | `--r-port`    | `BROKER_PORT`         | `4222`         | Broker port               |
//! | `--r-login`   | `BROKER_LOGIN`        | `rabbitmq`     | Broker login              |
//! | `--r-pass`    | `BROKER_PASSWORD`     | `rabbitmq`     | Broker password           |
//! | `--listen`    | `SERVER_LISTEN`       | `0.0.0.0:8000` | Websocket listen address  |
//! | `--broadcast` | `SERVER_BROADCAST_MS` | `100`          | Viewer broadcast cadence  |

use anyhow::{Context, Result};
use bus_tracker::{
    broker::{Broker, NatsBroker},
    settings::Settings,
    shutdown,
    store::{consume_positions, PositionStore},
    viewer::Broadcaster,
    ws,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "bus-server", about = "Bus position websocket server", version)]
struct Args {
    /// Optional TOML settings file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Broker host
    #[arg(long = "r-host", env = "BROKER_HOST")]
    host: Option<String>,

    /// Broker port
    #[arg(long = "r-port", env = "BROKER_PORT")]
    port: Option<u16>,

    /// Broker login
    #[arg(long = "r-login", env = "BROKER_LOGIN")]
    login: Option<String>,

    /// Broker password
    #[arg(long = "r-pass", env = "BROKER_PASSWORD")]
    password: Option<String>,

    /// Websocket listen address
    #[arg(long, env = "SERVER_LISTEN")]
    listen: Option<String>,

    /// Viewer broadcast cadence (milliseconds)
    #[arg(long, env = "SERVER_BROADCAST_MS")]
    broadcast: Option<u64>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        if let Some(v) = self.host {
            settings.broker.host = v;
        }
        if let Some(v) = self.port {
            settings.broker.port = v;
        }
        if let Some(v) = self.login {
            settings.broker.login = v;
        }
        if let Some(v) = self.password {
            settings.broker.password = v;
        }
        if let Some(v) = self.listen {
            settings.server.listen = v;
        }
        if let Some(v) = self.broadcast {
            settings.server.broadcast_ms = v;
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bus_tracker=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut settings =
        Settings::load(args.config.as_deref()).context("Failed to load settings")?;
    args.apply(&mut settings);

    log::info!(
        "Starting bus-server (broker={}:{}, listen={}, broadcast={}ms)",
        settings.broker.host,
        settings.broker.port,
        settings.server.listen,
        settings.server.broadcast_ms,
    );

    let broker = Arc::new(
        NatsBroker::start(&settings.broker)
            .await
            .context("Failed to connect to broker")?,
    );
    let deliveries = broker.consume().await.context("Failed to subscribe")?;
    let listener = tokio::net::TcpListener::bind(settings.server.listen.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", settings.server.listen))?;

    let shutdown = CancellationToken::new();
    shutdown::cancel_on_signal(shutdown.clone());

    let store = Arc::new(PositionStore::new());

    // Broker → store
    let consumer = {
        let store = store.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = consume_positions(deliveries, &store, shutdown).await {
                log::error!("Position consumer stopped: {}", e);
            }
        })
    };

    // Store → viewers
    let broadcaster = Arc::new(Broadcaster::new(
        store.clone(),
        Duration::from_millis(settings.server.broadcast_ms),
        shutdown.clone(),
    ));
    let http = tokio::spawn(ws::serve(listener, broadcaster, shutdown.clone()));

    shutdown.cancelled().await;
    tokio::time::sleep(shutdown::GRACE).await;
    broker.stop().await;

    if let Err(e) = consumer.await {
        log::error!("Position consumer panicked: {}", e);
    }
    match tokio::time::timeout(shutdown::GRACE, http).await {
        Ok(Ok(Err(e))) => log::error!("Websocket server failed: {}", e),
        Ok(Err(e)) => log::error!("Websocket server panicked: {}", e),
        Ok(Ok(Ok(()))) => {}
        Err(_) => log::warn!("Websocket server did not stop within {:?}", shutdown::GRACE),
    }

    log::info!("Stopped with {} buses known", store.len());
    Ok(())
}

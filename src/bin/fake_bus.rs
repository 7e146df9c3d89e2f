//! fake-bus binary
//!
//! Loads route files, spawns simulated buses on each route and publishes
//! their positions to the broker through a fixed pool of lanes.
//!
//! ## Configuration (flags / env / TOML via `config` crate)
//!
//! | Flag         | Env                 | Default     | Description                      |
//! |--------------|---------------------|-------------|----------------------------------|
//! | `--r-host`   | `BROKER_HOST`       | `127.0.0.1` | Broker host                      |
//! | `--r-port`   | `BROKER_PORT`       | `4222`      | Broker port                      |
//! | `--r-login`  | `BROKER_LOGIN`      | `rabbitmq`  | Broker login                     |
//! | `--r-pass`   | `BROKER_PASSWORD`   | `rabbitmq`  | Broker password                  |
//! | `--routes`   | `BUS_ROUTES`        | `20`        | Number of routes to simulate     |
//! | `--buses`    | `BUS_PER_ROUTE`     | `5`         | Buses on one route               |
//! | `--refresh`  | `BUS_REFRESH_MS`    | `100`       | Lane publish cadence (ms)        |
//! | `--chans`    | `BUS_LANES`         | `10`        | Number of publishing lanes       |
//! | `--dir`      | `BUS_ROUTES_DIR`    | `routes`    | Route file directory             |
//! | `--seed`     | `BUS_SEED`          | *(random)*  | Fixed RNG seed                   |

use anyhow::{Context, Result};
use bus_tracker::{
    broker::{Broker, NatsBroker},
    lanes::LanePool,
    route::{DirRouteSource, RouteSource},
    shutdown,
    simulator::Simulator,
    settings::Settings,
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
#[command(name = "fake-bus", about = "Simulated bus fleet publisher", version)]
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

    /// Count of routes
    #[arg(long, env = "BUS_ROUTES")]
    routes: Option<usize>,

    /// Count of buses on one route
    #[arg(long, env = "BUS_PER_ROUTE")]
    buses: Option<usize>,

    /// Refresh timeout (milliseconds)
    #[arg(long, env = "BUS_REFRESH_MS")]
    refresh: Option<u64>,

    /// Count of parallel lanes publishing bus data to the broker
    #[arg(long, env = "BUS_LANES")]
    chans: Option<usize>,

    /// Directory with one JSON file per route
    #[arg(long, env = "BUS_ROUTES_DIR")]
    dir: Option<PathBuf>,

    /// Fixed RNG seed for repeatable runs
    #[arg(long, env = "BUS_SEED")]
    seed: Option<u64>,
}

impl Args {
    fn apply(self, settings: &mut Settings) {
        let broker = &mut settings.broker;
        let sim = &mut settings.simulator;
        if let Some(v) = self.host {
            broker.host = v;
        }
        if let Some(v) = self.port {
            broker.port = v;
        }
        if let Some(v) = self.login {
            broker.login = v;
        }
        if let Some(v) = self.password {
            broker.password = v;
        }
        if let Some(v) = self.routes {
            sim.routes = v;
        }
        if let Some(v) = self.buses {
            sim.buses_per_route = v;
        }
        if let Some(v) = self.refresh {
            sim.refresh_ms = v;
        }
        if let Some(v) = self.chans {
            sim.lanes = v;
        }
        if let Some(v) = self.dir {
            sim.routes_dir = v;
        }
        if self.seed.is_some() {
            sim.seed = self.seed;
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
    let sim = &settings.simulator;

    log::info!(
        "Starting fake-bus (routes={}, buses={}, lanes={}, refresh={}ms, dir={})",
        sim.routes,
        sim.buses_per_route,
        sim.lanes,
        sim.refresh_ms,
        sim.routes_dir.display(),
    );

    // Routes first: a missing directory aborts before touching the broker.
    let source = DirRouteSource::new(&sim.routes_dir).context("Unable to open routes directory")?;
    let route_files: Vec<String> = source
        .list()
        .context("Unable to read routes directory")?
        .into_iter()
        .take(sim.routes)
        .collect();

    let broker: Arc<dyn Broker> = Arc::new(
        NatsBroker::start(&settings.broker)
            .await
            .context("Failed to connect to broker")?,
    );

    let shutdown = CancellationToken::new();
    shutdown::cancel_on_signal(shutdown.clone());

    let lanes = LanePool::start(
        sim.lanes,
        Duration::from_millis(sim.refresh_ms),
        broker.clone(),
        shutdown.clone(),
    );
    let mut simulator = Simulator::new(lanes, sim.seed, shutdown.clone());

    println!("Start imitator");
    for file in &route_files {
        match source.load(file) {
            Ok(route) => {
                simulator.spawn_route(Arc::new(route), sim.buses_per_route);
            }
            Err(e) => log::error!("Skipping route {}: {}", file, e),
        }
    }
    log::info!("{} buses running", simulator.bus_count());

    shutdown.cancelled().await;
    broker.stop().await;

    match tokio::time::timeout(shutdown::GRACE, simulator.join()).await {
        Ok(reports) => {
            let published: u64 = reports.iter().map(|r| r.published).sum();
            log::info!("Published {} positions", published);
        }
        Err(_) => log::warn!("Simulator did not stop within {:?}", shutdown::GRACE),
    }

    println!("DONE OK");
    Ok(())
}

//! Layered settings: built-in defaults, an optional TOML file, then
//! `BUS_TRACKER__*` environment variables. Binaries apply CLI flags last.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `BUS_TRACKER__BROKER__HOST`.
pub const ENV_PREFIX: &str = "BUS_TRACKER";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub login: String,
    pub password: String,
    /// Subject positions are published on and consumed from.
    pub subject: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4222,
            login: "rabbitmq".into(),
            password: "rabbitmq".into(),
            subject: crate::protocol::subjects::POSITIONS.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Directory holding one JSON file per route.
    pub routes_dir: PathBuf,
    /// Maximum number of routes to simulate.
    pub routes: usize,
    /// Buses spawned per route.
    pub buses_per_route: usize,
    /// Lane publish cadence in milliseconds.
    pub refresh_ms: u64,
    /// Number of publishing lanes.
    pub lanes: usize,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            routes_dir: PathBuf::from("routes"),
            routes: 20,
            buses_per_route: 5,
            refresh_ms: 100,
            lanes: 10,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerSettings {
    /// Address the websocket endpoint listens on.
    pub listen: String,
    /// Per-viewer broadcast cadence in milliseconds.
    pub broadcast_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8000".into(),
            broadcast_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub simulator: SimulatorSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings, reading `file` when given.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}

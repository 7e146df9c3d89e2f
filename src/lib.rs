//! Bus Tracker
//!
//! A simulated bus fleet streamed through a broker and rebroadcast to map
//! viewers, each filtered to its own viewport.
//!
//! ## Architecture
//!
//! ```text
//! fake-bus                                   bus-server
//!   RouteSource  (route.rs)                    consume_positions (store.rs)
//!     └── Simulator  (simulator.rs)              └── PositionStore (store.rs)
//!           └── LanePool  (lanes.rs) ──▶ Broker ──▶    └── Broadcaster (viewer.rs)
//!                                  (broker.rs)               └── /ws (ws.rs) ──▶ viewers
//! ```
//!
//! Every long-lived task watches one process-wide `CancellationToken`
//! (see `shutdown.rs`).

// Protocol types are always available (no server feature needed).
pub mod error;
pub mod protocol;
pub mod settings;
pub mod types;

// Runtime modules require the `server` feature.
#[cfg(feature = "server")]
pub mod broker;
#[cfg(feature = "server")]
pub mod lanes;
#[cfg(feature = "server")]
pub mod route;
#[cfg(feature = "server")]
pub mod shutdown;
#[cfg(feature = "server")]
pub mod simulator;
#[cfg(feature = "server")]
pub mod store;
#[cfg(feature = "server")]
pub mod viewer;
#[cfg(feature = "server")]
pub mod ws;

// Convenience re-exports (server only)
#[cfg(feature = "server")]
pub use broker::{Broker, MemoryBroker, NatsBroker};
#[cfg(feature = "server")]
pub use lanes::{Lane, LanePool};
#[cfg(feature = "server")]
pub use route::{DirRouteSource, RouteSource};
#[cfg(feature = "server")]
pub use simulator::{RouteWalk, Simulator};
#[cfg(feature = "server")]
pub use store::PositionStore;
#[cfg(feature = "server")]
pub use viewer::Broadcaster;
pub use error::{Result, TrackerError};
pub use settings::Settings;
pub use types::{Coord, PositionSample, Route, Viewport};

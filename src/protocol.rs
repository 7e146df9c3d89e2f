//! Wire protocol.
//!
//! This module owns **every message that crosses a process boundary**:
//! the position payload published on the broker, and the JSON messages
//! exchanged with map viewers over the websocket.
//!
//! | Message            | Direction           | Carried by        |
//! |--------------------|---------------------|-------------------|
//! | [`PositionSample`] | simulator → server  | broker payload    |
//! | [`ViewerMessage`]  | viewer → server     | websocket text    |
//! | [`BusesMessage`]   | server → viewer     | websocket text    |
//!
//! Field names are fixed by existing map front-ends and must not change:
//! positions use `BusID`/`Lat`/`Lng`/`Route`, viewer messages use
//! `msgType` plus `Data` or `Buses`.

use crate::error::{Result, TrackerError};
use crate::types::{PositionSample, Viewport};
use serde::{Deserialize, Serialize};

/// `msgType` of every server → viewer broadcast.
pub const BUSES_MSG_TYPE: &str = "Buses";

// ---------------------------------------------------------------------------
// Viewer → server
// ---------------------------------------------------------------------------

/// Inbound viewer message. Front-ends send `newBounds` whenever the map is
/// panned or zoomed; other message types carry no viewport and are ignored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerMessage {
    #[serde(rename = "msgType", default)]
    pub msg_type: String,
    #[serde(rename = "Data", default)]
    pub data: Option<Viewport>,
}

impl ViewerMessage {
    pub fn bounds(viewport: Viewport) -> Self {
        Self {
            msg_type: "newBounds".into(),
            data: Some(viewport),
        }
    }
}

// ---------------------------------------------------------------------------
// Server → viewer
// ---------------------------------------------------------------------------

/// Batch of positions visible in a viewer's window.
///
/// Never sent empty: a tick with nothing in view sends nothing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusesMessage {
    #[serde(rename = "msgType")]
    pub msg_type: String,
    #[serde(rename = "Buses")]
    pub buses: Vec<PositionSample>,
}

impl BusesMessage {
    pub fn new(buses: Vec<PositionSample>) -> Self {
        Self {
            msg_type: BUSES_MSG_TYPE.into(),
            buses,
        }
    }
}

// ---------------------------------------------------------------------------
// Codec helpers
// ---------------------------------------------------------------------------

pub fn encode_position(sample: &PositionSample) -> Result<Vec<u8>> {
    serde_json::to_vec(sample).map_err(TrackerError::Encode)
}

pub fn decode_position(payload: &[u8]) -> Result<PositionSample> {
    serde_json::from_slice(payload).map_err(TrackerError::MalformedPosition)
}

pub fn decode_viewer_message(text: &str) -> Result<ViewerMessage> {
    serde_json::from_str(text).map_err(TrackerError::MalformedViewerMessage)
}

// ---------------------------------------------------------------------------
// Subject helpers
// ---------------------------------------------------------------------------

/// Broker subjects used by the tracker.
pub mod subjects {
    /// Every bus position sample is published here.
    pub const POSITIONS: &str = "buses.positions";
}

//! Core bus-tracker types shared across all modules.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Geography
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coord {
    pub lat: f64,
    pub lng: f64,
}

impl Coord {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

impl From<[f64; 2]> for Coord {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<Coord> for [f64; 2] {
    fn from(c: Coord) -> Self {
        [c.lat, c.lng]
    }
}

/// Map window a viewer is currently looking at.
///
/// Bounds are inclusive on all four sides. `south <= north` and
/// `west <= east` are expected but not checked; an inverted window matches
/// nothing. A bound missing from the wire decodes as 0.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Viewport {
    pub east_lng: f64,
    pub north_lat: f64,
    pub south_lat: f64,
    pub west_lng: f64,
}

impl Viewport {
    pub fn new(south_lat: f64, north_lat: f64, west_lng: f64, east_lng: f64) -> Self {
        Self {
            east_lng,
            north_lat,
            south_lat,
            west_lng,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        let lat_inside = self.south_lat <= lat && lat <= self.north_lat;
        let lng_inside = self.west_lng <= lng && lng <= self.east_lng;
        lat_inside && lng_inside
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

/// A named path buses drive back and forth along.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub name: String,
    pub path: Vec<Coord>,
}

impl Route {
    pub fn new(name: impl Into<String>, path: Vec<Coord>) -> Self {
        Self {
            name: name.into(),
            path,
        }
    }

    pub fn len(&self) -> usize {
        self.path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Position samples
// ---------------------------------------------------------------------------

/// One observed bus position. This is the broker payload and the element
/// type of the viewer broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionSample {
    #[serde(rename = "BusID")]
    pub bus_id: String,
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Lng")]
    pub lng: f64,
    #[serde(rename = "Route")]
    pub route: String,
}

impl PositionSample {
    pub fn new(bus_id: impl Into<String>, coord: Coord, route: impl Into<String>) -> Self {
        Self {
            bus_id: bus_id.into(),
            lat: coord.lat,
            lng: coord.lng,
            route: route.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_bounds_are_inclusive() {
        let vp = Viewport::new(0.0, 20.0, 0.0, 20.0);
        assert!(vp.contains(0.0, 0.0));
        assert!(vp.contains(20.0, 20.0));
        assert!(vp.contains(10.0, 10.0));
        assert!(!vp.contains(20.000001, 10.0));
        assert!(!vp.contains(10.0, -0.000001));
    }

    #[test]
    fn inverted_viewport_matches_nothing() {
        let vp = Viewport::new(20.0, 0.0, 20.0, 0.0);
        assert!(!vp.contains(10.0, 10.0));
        assert!(!vp.contains(0.0, 0.0));
    }

    #[test]
    fn coord_decodes_from_pair() {
        let c: Coord = serde_json::from_str("[55.75, 37.61]").unwrap();
        assert_eq!(c, Coord::new(55.75, 37.61));
    }
}

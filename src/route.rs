//! Route source: where route definitions come from.
//!
//! A route file is JSON with at least a `name` and a `coordinates` array of
//! `[lat, lng]` pairs. Any other keys (stations, colours…) are ignored.

use crate::error::{Result, TrackerError};
use crate::types::{Coord, Route};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Anything that can enumerate and load route definitions.
pub trait RouteSource: Send + Sync {
    /// Names of every route this source can load, in a stable order.
    fn list(&self) -> Result<Vec<String>>;

    fn load(&self, name: &str) -> Result<Route>;
}

// ---------------------------------------------------------------------------
// File format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RouteFile {
    name: String,
    coordinates: Vec<Coord>,
}

/// Decode a route file body. `origin` is only used for error messages.
pub fn parse_route(bytes: &[u8], origin: &Path) -> Result<Route> {
    let file: RouteFile =
        serde_json::from_slice(bytes).map_err(|source| TrackerError::MalformedRoute {
            path: origin.to_path_buf(),
            source,
        })?;

    if file.coordinates.is_empty() {
        return Err(TrackerError::EmptyRoute(file.name));
    }

    Ok(Route::new(file.name, file.coordinates))
}

// ---------------------------------------------------------------------------
// Directory source
// ---------------------------------------------------------------------------

/// One `*.json` file per route inside a single directory.
pub struct DirRouteSource {
    dir: PathBuf,
}

impl DirRouteSource {
    /// Fails if `dir` is missing or is not a directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let meta = std::fs::metadata(&dir).map_err(|source| TrackerError::Io {
            path: dir.clone(),
            source,
        })?;
        if !meta.is_dir() {
            return Err(TrackerError::Io {
                path: dir,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            });
        }
        Ok(Self { dir })
    }
}

impl RouteSource for DirRouteSource {
    fn list(&self) -> Result<Vec<String>> {
        let io_err = |source| TrackerError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn load(&self, name: &str) -> Result<Route> {
        let path = self.dir.join(name);
        let bytes = std::fs::read(&path).map_err(|source| TrackerError::Io {
            path: path.clone(),
            source,
        })?;
        let route = parse_route(&bytes, &path)?;
        debug!("Loaded route '{}' ({} points) from {}", route.name, route.len(), path.display());
        Ok(route)
    }
}

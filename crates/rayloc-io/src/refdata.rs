//! Reference-data loaders: craton polygons and zone depth statistics.
//!
//! Both files are plain JSON. Cratons are a list of named polygons; zone
//! statistics are a flat list of square centers with their depth summary.
//! Anything unreadable is `BadAuxData` so the driver can exit 114.

use std::path::Path;

use rayloc_core::{Craton, CratonSet, LocError, LocResult, ZoneStat, ZoneStats};
use serde::{Deserialize, Serialize};

/// One zone-statistics record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub mean_depth: f64,
    pub min_depth: f64,
    pub max_depth: f64,
}

/// Load craton polygons from a JSON file.
pub fn load_cratons(path: &Path) -> LocResult<CratonSet> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| LocError::BadAuxData(format!("{}: {e}", path.display())))?;
    parse_cratons(&text)
}

/// Parse craton polygons from JSON text.
pub fn parse_cratons(text: &str) -> LocResult<CratonSet> {
    let cratons: Vec<Craton> =
        serde_json::from_str(text).map_err(|e| LocError::BadAuxData(e.to_string()))?;
    for craton in &cratons {
        if craton.lats.len() != craton.lons.len() || craton.lats.len() < 3 {
            return Err(LocError::BadAuxData(format!(
                "craton '{}' has a degenerate polygon",
                craton.name
            )));
        }
    }
    Ok(CratonSet::new(cratons))
}

/// Load zone depth statistics from a JSON file.
pub fn load_zones(path: &Path) -> LocResult<ZoneStats> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| LocError::BadAuxData(format!("{}: {e}", path.display())))?;
    parse_zones(&text)
}

/// Parse zone depth statistics from JSON text.
pub fn parse_zones(text: &str) -> LocResult<ZoneStats> {
    let entries: Vec<ZoneEntry> =
        serde_json::from_str(text).map_err(|e| LocError::BadAuxData(e.to_string()))?;
    let mut zones = ZoneStats::new();
    for entry in entries {
        if entry.min_depth > entry.mean_depth || entry.mean_depth > entry.max_depth {
            return Err(LocError::BadAuxData(format!(
                "zone at ({}, {}) has inconsistent depths",
                entry.latitude, entry.longitude
            )));
        }
        zones.insert(
            entry.latitude,
            entry.longitude,
            ZoneStat {
                mean_depth: entry.mean_depth,
                min_depth: entry.min_depth,
                max_depth: entry.max_depth,
            },
        );
    }
    Ok(zones)
}

//! Zone depth statistics keyed by Marsden square.
//!
//! When no analyst supplies a Bayesian depth prior, the locator falls back to
//! historical seismicity statistics for the 10-degree Marsden square around
//! the trial epicenter.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Spread floor applied to zone-derived priors (km). Zone statistics for
/// quiet squares can be degenerate.
pub const MIN_ZONE_SPREAD: f64 = 10.0;

/// Depth statistics for one Marsden square.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ZoneStat {
    /// Mean free depth (km).
    pub mean_depth: f64,
    /// Shallowest free depth (km).
    pub min_depth: f64,
    /// Deepest free depth (km).
    pub max_depth: f64,
}

/// Marsden-square keyed table of zone depth statistics. Immutable after load
/// and shareable across events.
#[derive(Debug, Clone, Default)]
pub struct ZoneStats {
    squares: HashMap<(i32, i32), ZoneStat>,
}

/// Key of the 10-degree square containing (lat, lon).
fn square_key(lat: f64, lon: f64) -> (i32, i32) {
    let lat = lat.clamp(-90.0, 90.0);
    let lon = crate::geo::wrap_lon(lon);
    ((lat / 10.0).floor() as i32, (lon / 10.0).floor() as i32)
}

impl ZoneStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register statistics for the square containing (lat, lon).
    pub fn insert(&mut self, lat: f64, lon: f64, stat: ZoneStat) {
        self.squares.insert(square_key(lat, lon), stat);
    }

    pub fn len(&self) -> usize {
        self.squares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.squares.is_empty()
    }

    /// Raw statistics for the square containing (lat, lon).
    pub fn get(&self, lat: f64, lon: f64) -> Option<ZoneStat> {
        self.squares.get(&square_key(lat, lon)).copied()
    }

    /// Derive a Bayesian depth prior for (lat, lon): the mean depth, with the
    /// larger one-sided excursion as a 90th-percentile spread.
    pub fn bayes_depth(&self, lat: f64, lon: f64) -> Option<(f64, f64)> {
        let stat = self.get(lat, lon)?;
        let spread = (stat.mean_depth - stat.min_depth)
            .max(stat.max_depth - stat.mean_depth)
            .max(MIN_ZONE_SPREAD);
        Some((stat.mean_depth, spread))
    }
}

//! Craton polygons.
//!
//! Stable continental interiors change which phase identifications and
//! travel-time branches are preferred. The only question the locator asks is
//! whether the trial epicenter lies inside any craton.

use serde::{Deserialize, Serialize};

/// A named polygon of (latitude, longitude) vertices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Craton {
    pub name: String,
    /// Vertex latitudes (degrees).
    pub lats: Vec<f64>,
    /// Vertex longitudes (degrees).
    pub lons: Vec<f64>,
}

impl Craton {
    pub fn new(name: impl Into<String>, lats: Vec<f64>, lons: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            lats,
            lons,
        }
    }

    /// Ray-crossing test in (lat, lon) space. Vertices are taken as a closed
    /// ring whether or not the last vertex repeats the first.
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        let n = self.lats.len().min(self.lons.len());
        if n < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (yi, xi) = (self.lats[i], self.lons[i]);
            let (yj, xj) = (self.lats[j], self.lons[j]);
            if ((yi > lat) != (yj > lat))
                && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// The full set of craton polygons, immutable after load and shareable
/// across events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CratonSet {
    pub cratons: Vec<Craton>,
}

impl CratonSet {
    pub fn new(cratons: Vec<Craton>) -> Self {
        Self { cratons }
    }

    /// Is the point inside any craton?
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.cratons.iter().any(|c| c.contains(lat, lon))
    }
}

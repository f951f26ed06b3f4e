//! Seismic stations.

use serde::{Deserialize, Serialize};

use crate::geo::{geocen_colat, TrigCache};

/// Identity of a station: station, network, and location codes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StationKey {
    pub station: String,
    pub network: String,
    pub location: String,
}

impl StationKey {
    pub fn new(
        station: impl Into<String>,
        network: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            station: station.into(),
            network: network.into(),
            location: location.into(),
        }
    }
}

impl std::fmt::Display for StationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.network, self.station, self.location)
    }
}

/// A seismic station. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Station {
    pub key: StationKey,
    /// Geographic latitude (degrees)
    pub latitude: f64,
    /// Longitude (degrees)
    pub longitude: f64,
    /// Elevation (km above sea level)
    pub elevation: f64,
    /// Geocentric colatitude (degrees)
    pub colat: f64,
    /// Cached sin/cos of colatitude and longitude
    pub trig: TrigCache,
}

impl Station {
    pub fn new(key: StationKey, latitude: f64, longitude: f64, elevation: f64) -> Self {
        let colat = geocen_colat(latitude);
        Self {
            key,
            latitude,
            longitude,
            elevation,
            colat,
            trig: TrigCache::from_geocentric(colat, longitude),
        }
    }
}

//! Spherical geometry on the geocentric Earth.
//!
//! All distance/azimuth math in the locator runs on geocentric coordinates:
//! geographic latitudes are flattened into geocentric colatitudes once, and the
//! sines/cosines of colatitude and longitude are cached so the per-iteration
//! delta/azimuth updates are pure multiply-adds.

/// Kilometers per degree of arc on the mean-radius sphere (6371 km).
pub const DEG2KM: f64 = 6371.0 * std::f64::consts::PI / 180.0;

/// Ellipticity flattening factor applied when converting geographic latitude
/// to geocentric colatitude.
pub const GEOCEN_FLATTENING: f64 = 0.993305521;

/// Convert a geographic latitude in degrees to a geocentric colatitude in
/// degrees (0 at the north pole, 180 at the south pole).
pub fn geocen_colat(lat_deg: f64) -> f64 {
    90.0 - (GEOCEN_FLATTENING * lat_deg.to_radians().tan()).atan().to_degrees()
}

/// Convert a geocentric colatitude in degrees back to a geographic latitude
/// in degrees. Inverse of [`geocen_colat`].
pub fn geographic_lat(colat_deg: f64) -> f64 {
    ((90.0 - colat_deg).to_radians().tan() / GEOCEN_FLATTENING)
        .atan()
        .to_degrees()
}

/// Cached trigonometry for one geocentric point.
///
/// Both the hypocenter and every station carry one of these; delta and azimuth
/// between two points never re-evaluate sin/cos of the underlying angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrigCache {
    /// sin of geocentric colatitude
    pub sin_colat: f64,
    /// cos of geocentric colatitude
    pub cos_colat: f64,
    /// sin of longitude
    pub sin_lon: f64,
    /// cos of longitude
    pub cos_lon: f64,
}

impl TrigCache {
    /// Build the cache from a geographic latitude and a longitude in degrees.
    pub fn from_geographic(lat_deg: f64, lon_deg: f64) -> Self {
        Self::from_geocentric(geocen_colat(lat_deg), lon_deg)
    }

    /// Build the cache from a geocentric colatitude and a longitude in degrees.
    pub fn from_geocentric(colat_deg: f64, lon_deg: f64) -> Self {
        let colat = colat_deg.to_radians();
        let lon = lon_deg.to_radians();
        Self {
            sin_colat: colat.sin(),
            cos_colat: colat.cos(),
            sin_lon: lon.sin(),
            cos_lon: lon.cos(),
        }
    }
}

/// Great-circle distance (delta, degrees) and receiver azimuth (degrees
/// clockwise from north) from a source to a receiver.
///
/// Delta is formed with `atan2(sin, cos)` so antipodal pairs stay finite, and
/// the azimuth of a receiver at either pole is well defined (180 for the south
/// pole, 0 for the north pole).
pub fn delta_azimuth(source: &TrigCache, receiver: &TrigCache) -> (f64, f64) {
    // cos/sin of the longitude difference via the cached values
    let cos_dlon = source.cos_lon * receiver.cos_lon + source.sin_lon * receiver.sin_lon;
    let sin_dlon = source.cos_lon * receiver.sin_lon - source.sin_lon * receiver.cos_lon;

    let cos_delta =
        source.cos_colat * receiver.cos_colat + source.sin_colat * receiver.sin_colat * cos_dlon;
    // East and north components of the receiver direction seen from the source
    let east = receiver.sin_colat * sin_dlon;
    let north =
        source.sin_colat * receiver.cos_colat - source.cos_colat * receiver.sin_colat * cos_dlon;

    let sin_delta = (east * east + north * north).sqrt();
    let delta = sin_delta.atan2(cos_delta).to_degrees();

    let mut azimuth = east.atan2(north).to_degrees();
    if azimuth < 0.0 {
        azimuth += 360.0;
    }
    (delta, azimuth)
}

/// Wrap a longitude into [-180, 180] degrees.
pub fn wrap_lon(lon_deg: f64) -> f64 {
    let mut lon = lon_deg;
    while lon > 180.0 {
        lon -= 360.0;
    }
    while lon < -180.0 {
        lon += 360.0;
    }
    lon
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn geocentric_roundtrip() {
        for lat in [-89.0, -45.0, -12.5, 0.0, 33.3, 60.0, 89.9] {
            let colat = geocen_colat(lat);
            assert!((geographic_lat(colat) - lat).abs() < 1e-9, "lat {lat}");
        }
    }

    #[test]
    fn equator_is_untouched_by_flattening() {
        assert!((geocen_colat(0.0) - 90.0).abs() < TOL);
    }

    #[test]
    fn flattening_pulls_midlatitudes_toward_equator() {
        // Geocentric latitude is smaller in magnitude than geographic latitude.
        let colat = geocen_colat(45.0);
        assert!(colat > 45.0 && colat < 45.3);
    }

    #[test]
    fn south_pole_station() {
        // A station at the geographic south pole sits at colatitude 180; its
        // azimuth from any source is due south and its delta is the
        // complement of the source colatitude.
        let src_colat = geocen_colat(50.0);
        let source = TrigCache::from_geocentric(src_colat, -114.0);
        let receiver = TrigCache::from_geocentric(180.0, 0.0);

        let (delta, azimuth) = delta_azimuth(&source, &receiver);
        assert!((azimuth - 180.0).abs() < 1e-6, "azimuth {azimuth}");
        assert!((delta - (180.0 - src_colat)).abs() < 1e-6, "delta {delta}");
    }

    #[test]
    fn antipode_is_finite() {
        let source = TrigCache::from_geocentric(60.0, 20.0);
        let receiver = TrigCache::from_geocentric(120.0, -160.0);
        let (delta, _) = delta_azimuth(&source, &receiver);
        assert!(delta.is_finite());
        assert!((delta - 180.0).abs() < 1e-6);
    }

    #[test]
    fn due_east_quarter_circle() {
        let source = TrigCache::from_geocentric(90.0, 0.0);
        let receiver = TrigCache::from_geocentric(90.0, 90.0);
        let (delta, azimuth) = delta_azimuth(&source, &receiver);
        assert!((delta - 90.0).abs() < 1e-6);
        assert!((azimuth - 90.0).abs() < 1e-6);
    }

    #[test]
    fn wrap_lon_bounds() {
        assert!((wrap_lon(190.0) + 170.0).abs() < TOL);
        assert!((wrap_lon(-200.0) - 160.0).abs() < TOL);
        assert!((wrap_lon(45.0) - 45.0).abs() < TOL);
    }
}

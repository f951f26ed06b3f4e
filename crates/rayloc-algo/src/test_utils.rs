//! Network builders for tests.
//!
//! Everything here rides on the built-in
//! [`UniformVelocityModel`](crate::traveltime::UniformVelocityModel): pick
//! times are generated from the same analytic travel times the solver will
//! see, so an unperturbed network has exactly zero residuals at the truth.

use rayloc_core::{AuthorType, Event, Hypocenter, Pick, Station, StationKey};

use crate::traveltime::{uniform_tt, UniformVelocityModel, UNIFORM_VP, UNIFORM_VPVS};

/// A fresh uniform model with the default velocities.
pub fn uniform_model() -> UniformVelocityModel {
    UniformVelocityModel::default()
}

/// Declarative builder for a synthetic network around one event.
#[derive(Debug, Clone)]
pub struct SyntheticNet {
    /// True source.
    pub lat: f64,
    pub lon: f64,
    pub depth: f64,
    pub origin: f64,
    /// Starting hypocenter handed to the locator (defaults to the truth).
    start: Option<(f64, f64, f64, f64)>,
    noise: f64,
    stations: Vec<(String, f64, f64)>,
    firsts: Vec<FirstSpec>,
    secondaries: Vec<SecondarySpec>,
}

#[derive(Debug, Clone)]
struct FirstSpec {
    code: String,
    author: AuthorType,
}

#[derive(Debug, Clone)]
struct SecondarySpec {
    group: usize,
    code: String,
    /// Offset from the reference time (s).
    dt: f64,
    /// Reference the theoretical S time instead of the first arrival.
    at_s_time: bool,
    author: AuthorType,
}

impl SyntheticNet {
    /// `n` stations on a ring of approximately `radius_deg` around a source
    /// at (45 N, 0 E), `depth` km down, origin at t = 600 s. All first
    /// arrivals are human P picks.
    pub fn ring(n: usize, radius_deg: f64, depth: f64) -> Self {
        Self::ring_at(45.0, 0.0, n, radius_deg, depth)
    }

    /// A station ring around an arbitrary source.
    pub fn ring_at(lat: f64, lon: f64, n: usize, radius_deg: f64, depth: f64) -> Self {
        let mut stations = Vec::with_capacity(n);
        for i in 0..n {
            let bearing = (i as f64 / n as f64) * std::f64::consts::TAU;
            let sta_lat = lat + radius_deg * bearing.cos();
            let sta_lon = lon + radius_deg * bearing.sin() / lat.to_radians().cos();
            stations.push((format!("S{i:03}"), sta_lat, sta_lon));
        }
        Self {
            lat,
            lon,
            depth,
            origin: 600.0,
            start: None,
            noise: 0.0,
            stations,
            firsts: vec![
                FirstSpec {
                    code: "P".to_string(),
                    author: AuthorType::LocalHuman,
                };
                n
            ],
            secondaries: Vec::new(),
        }
    }

    /// Start the locator somewhere other than the truth.
    pub fn with_start(mut self, lat: f64, lon: f64, depth: f64, origin: f64) -> Self {
        self.start = Some((lat, lon, depth, origin));
        self
    }

    /// Deterministic pseudo-noise amplitude added to every first arrival (s).
    pub fn with_noise(mut self, amp: f64) -> Self {
        self.noise = amp;
        self
    }

    /// Direct access to the station list for tests that reshape the
    /// geometry.
    pub fn stations_mut(&mut self) -> &mut Vec<(String, f64, f64)> {
        &mut self.stations
    }

    /// Change the label and author of group `g`'s first arrival.
    pub fn relabel_first(&mut self, g: usize, code: &str, author: AuthorType) {
        self.firsts[g] = FirstSpec {
            code: code.to_string(),
            author,
        };
    }

    /// Add a secondary pick `dt` seconds after group `g`'s first arrival.
    pub fn add_secondary(&mut self, g: usize, code: &str, dt: f64, author: AuthorType) {
        self.secondaries.push(SecondarySpec {
            group: g,
            code: code.to_string(),
            dt,
            at_s_time: false,
            author,
        });
    }

    /// Add a secondary pick at group `g`'s theoretical S time plus `dt`.
    pub fn add_s_pick(&mut self, g: usize, code: &str, dt: f64, author: AuthorType) {
        self.secondaries.push(SecondarySpec {
            group: g,
            code: code.to_string(),
            dt,
            at_s_time: true,
            author,
        });
    }

    /// Materialize the event, with geometry and travel times refreshed
    /// against the starting hypocenter.
    pub fn event(&self) -> Event {
        let (start_lat, start_lon, start_depth, start_origin) = self
            .start
            .unwrap_or((self.lat, self.lon, self.depth, self.origin));
        let mut ev = Event::new(Hypocenter::new(
            start_origin,
            start_lat,
            start_lon,
            start_depth,
        ));

        // Geometry of the true source, for generating arrival times
        let truth = Hypocenter::new(self.origin, self.lat, self.lon, self.depth);
        let vs = UNIFORM_VP / UNIFORM_VPVS;

        let mut first_times = Vec::with_capacity(self.stations.len());
        for (i, (name, sta_lat, sta_lon)) in self.stations.iter().enumerate() {
            let idx = ev.add_station(Station::new(
                StationKey::new(name.clone(), "SY", "--"),
                *sta_lat,
                *sta_lon,
                0.0,
            ));
            let (delta, _) = rayloc_core::delta_azimuth(&truth.trig, &ev.station(idx).trig);
            let noise = self.noise * pseudo_noise(i);
            let t_first = self.origin + uniform_tt(delta, self.depth, UNIFORM_VP) + noise;
            first_times.push((idx, delta, t_first));
            let spec = &self.firsts[i];
            ev.add_pick(Pick::new(
                idx,
                format!("pick-{name}"),
                "BHZ",
                t_first,
                0.2,
                spec.code.clone(),
                spec.author,
                true,
                1.0,
            ));
        }

        for (s, spec) in self.secondaries.iter().enumerate() {
            let (idx, delta, t_first) = first_times[spec.group];
            let time = if spec.at_s_time {
                self.origin + uniform_tt(delta, self.depth, vs) + spec.dt
            } else {
                t_first + spec.dt
            };
            ev.add_pick(Pick::new(
                idx,
                format!("sec-{s}"),
                "BHZ",
                time,
                0.4,
                spec.code.clone(),
                spec.author,
                true,
                1.0,
            ));
        }

        ev.update_geometry();
        ev.update_travel_times();
        ev
    }
}

/// Deterministic noise in [-0.5, 0.5]; tests must not depend on a live RNG.
pub fn pseudo_noise(i: usize) -> f64 {
    let x = ((i as f64) * 12.9898).sin() * 43758.5453;
    x - x.floor() - 0.5
}

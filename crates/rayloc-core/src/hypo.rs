//! Hypocenter state and audit snapshots.

use crate::geo::{geocen_colat, geographic_lat, wrap_lon, TrigCache, DEG2KM};
use crate::status::StepStatus;

/// Shallowest depth the locator will accept (km).
pub const DEPTH_MIN: f64 = 1.0;
/// Deepest depth the locator will accept (km).
pub const DEPTH_MAX: f64 = 700.0;

/// The trial hypocenter: origin time plus geographic position, with the
/// geocentric trigonometry and the refinement-loop scratch (step direction,
/// step length, dispersion) cached alongside.
///
/// Mutated only by the stepper and by the driver when a step is accepted; a
/// previous value may be restored from a [`HypoAudit`].
#[derive(Debug, Clone)]
pub struct Hypocenter {
    /// Origin time (seconds since the epoch).
    pub origin_time: f64,
    /// Geographic latitude (degrees).
    pub latitude: f64,
    /// Longitude (degrees).
    pub longitude: f64,
    /// Depth (km), always within [`DEPTH_MIN`, `DEPTH_MAX`].
    pub depth: f64,
    /// Geocentric colatitude (degrees).
    pub colat: f64,
    /// Cached sin/cos of colatitude and longitude.
    pub trig: TrigCache,

    /// The epicenter and depth are fixed by the analyst.
    pub held_loc: bool,
    /// The depth alone is fixed by the analyst.
    pub held_depth: bool,
    /// The Bayesian depth prior came from the analyst rather than from zone
    /// statistics.
    pub analyst_bayes: bool,
    /// Bayesian prior depth (km); meaningful when `bayes_weight > 0`.
    pub bayes_depth: f64,
    /// Bayesian prior spread (km, 90th-percentile width).
    pub bayes_spread: f64,
    /// Weight of the Bayesian depth constraint row.
    pub bayes_weight: f64,

    /// Degrees of freedom of the step: 0 (held), 2 (held depth), or 3 (free).
    pub dof: usize,
    /// Steepest-descent unit direction; only the first `dof` entries are live.
    pub step_dir: [f64; 3],
    /// Current step length (km).
    pub step_len: f64,
    /// Horizontal movement of the last accepted step (km).
    pub del_h: f64,
    /// Depth movement of the last accepted step (km).
    pub del_z: f64,
    /// Rank-sum dispersion (the penalty being minimized).
    pub dispersion: f64,
    /// Weighted rms of the residuals.
    pub rms: f64,
}

impl Hypocenter {
    pub fn new(origin_time: f64, latitude: f64, longitude: f64, depth: f64) -> Self {
        let depth = depth.clamp(DEPTH_MIN, DEPTH_MAX);
        let colat = geocen_colat(latitude);
        Self {
            origin_time,
            latitude,
            longitude,
            depth,
            colat,
            trig: TrigCache::from_geocentric(colat, longitude),
            held_loc: false,
            held_depth: false,
            analyst_bayes: false,
            bayes_depth: 0.0,
            bayes_spread: 0.0,
            bayes_weight: 0.0,
            dof: 3,
            step_dir: [0.0; 3],
            step_len: 0.0,
            del_h: 0.0,
            del_z: 0.0,
            dispersion: 0.0,
            rms: 0.0,
        }
    }

    /// Number of free parameters implied by the hold flags.
    pub fn degrees_of_freedom(held_loc: bool, held_depth: bool) -> usize {
        if held_loc {
            0
        } else if held_depth {
            2
        } else {
            3
        }
    }

    /// Install a Bayesian depth prior. Analyst priors carry weight
    /// `1/spread`; zone-statistics priors treat the spread as a
    /// 90th-percentile width and carry weight `3/spread`.
    pub fn set_bayes_prior(&mut self, depth: f64, spread: f64, analyst: bool) {
        let spread = spread.max(1.0);
        self.bayes_depth = depth.clamp(DEPTH_MIN, DEPTH_MAX);
        self.bayes_spread = spread;
        self.bayes_weight = if analyst { 1.0 / spread } else { 3.0 / spread };
        self.analyst_bayes = analyst;
    }

    /// True when a Bayesian depth constraint row should be appended to the
    /// weighted residuals.
    pub fn has_bayes_prior(&self) -> bool {
        self.bayes_weight > 0.0
    }

    /// Move the epicenter to a new geographic position, refreshing the
    /// geocentric cache.
    pub fn reposition(&mut self, latitude: f64, longitude: f64) {
        self.latitude = latitude;
        self.longitude = wrap_lon(longitude);
        self.colat = geocen_colat(latitude);
        self.trig = TrigCache::from_geocentric(self.colat, self.longitude);
    }

    /// Shift the origin time. Callers are responsible for refreshing pick
    /// travel times afterwards; this is applied exactly once per accepted
    /// step.
    pub fn update_origin(&mut self, dt: f64) {
        self.origin_time += dt;
    }

    /// Apply a step of `step_len` km along `step_dir` in local Cartesian
    /// coordinates (colatitude, longitude, depth), handling the coordinate
    /// wrap-around at the poles and the date line, and clamping depth.
    pub fn apply_step(&mut self, step_len: f64) {
        let mut colat = self.colat + step_len * self.step_dir[0] / DEG2KM;
        // sin(colat) from the pre-step cache; the longitude circle shrinks
        // toward the poles
        let sin_colat = self.trig.sin_colat.max(1e-10);
        let mut lon = self.longitude + step_len * self.step_dir[1] / (DEG2KM * sin_colat);

        // Walk over a pole and come down the other side
        if colat < 0.0 {
            colat = -colat;
            lon += 180.0;
        } else if colat > 180.0 {
            colat = 360.0 - colat;
            lon += 180.0;
        }
        lon = wrap_lon(lon);

        self.colat = colat;
        self.longitude = lon;
        self.latitude = geographic_lat(colat);
        self.trig = TrigCache::from_geocentric(colat, lon);

        if self.dof > 2 {
            self.depth = (self.depth + step_len * self.step_dir[2]).clamp(DEPTH_MIN, DEPTH_MAX);
        }
    }

    /// Snapshot the hypocenter for the audit trail.
    pub fn audit(&self, stage: usize, iter: usize, status: StepStatus) -> HypoAudit {
        HypoAudit {
            stage,
            iter,
            origin_time: self.origin_time,
            latitude: self.latitude,
            longitude: self.longitude,
            depth: self.depth,
            colat: self.colat,
            trig: self.trig,
            step_len: self.step_len,
            del_h: self.del_h,
            del_z: self.del_z,
            rms: self.rms,
            status,
        }
    }

    /// Restore the positional state from an audit snapshot. The step scratch
    /// (direction, dispersion) is left alone so damping can retry along the
    /// same direction.
    pub fn restore(&mut self, audit: &HypoAudit) {
        self.origin_time = audit.origin_time;
        self.latitude = audit.latitude;
        self.longitude = audit.longitude;
        self.depth = audit.depth;
        self.colat = audit.colat;
        self.trig = audit.trig;
    }
}

/// Immutable snapshot of the hypocenter after one iteration, used for both
/// logging and damping rollback.
#[derive(Debug, Clone)]
pub struct HypoAudit {
    pub stage: usize,
    pub iter: usize,
    pub origin_time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub colat: f64,
    pub trig: TrigCache,
    pub step_len: f64,
    pub del_h: f64,
    pub del_z: f64,
    pub rms: f64,
    pub status: StepStatus,
}

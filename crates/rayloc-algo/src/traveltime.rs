//! Travel-time oracle facade.
//!
//! The travel-time model itself is an external collaborator: anything that
//! can answer "given this source, what phases arrive at this distance and
//! when" can drive the locator. The facade pins the session/source lifecycle
//! (a session is valid for one source position) and owns the phase taxonomy
//! helpers the identifier needs.

use rayloc_core::{Hypocenter, LocError, LocResult, Station};

use crate::context::LocatorContext;

/// One theoretical arrival at a given distance, as returned by the
/// travel-time model. The list a session returns is already sorted by time.
#[derive(Debug, Clone)]
pub struct TtArrival {
    /// Phase code (e.g. "Pn", "PKPdf").
    pub phase: String,
    /// Travel time from origin (s).
    pub tt: f64,
    /// Ray parameter (s/deg).
    pub ray_param: f64,
    /// dT/dDelta (s/deg).
    pub d_tdd: f64,
    /// dT/dDepth (s/km).
    pub d_tdz: f64,
    /// Statistical spread (s, one-sigma equivalent).
    pub spread: f64,
    /// Relative observability.
    pub observability: f64,
    /// Association window half-width (s) used for clustering.
    pub window: f64,
    /// Phase group tag (e.g. "P", "PKP", "Lg").
    pub group: String,
    /// Auxiliary group tag.
    pub aux_group: String,
    /// The phase is a regional phase.
    pub regional: bool,
    /// The phase can be used in a location.
    pub usable: bool,
    /// The phase has been administratively disabled.
    pub disabled: bool,
}

/// Flags shaping which phases a session reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtRequest {
    /// Return only phases useful for location.
    pub useful_only: bool,
    /// The source is in a stable continental interior.
    pub tectonic: bool,
    /// Suppress back branches of triplications.
    pub no_back_branches: bool,
    /// Use the regional RSTT model where available.
    pub rstt: bool,
}

/// A complete source description for opening a session.
#[derive(Debug, Clone, Copy)]
pub struct SourceSpec {
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub request: TtRequest,
}

/// External travel-time model.
pub trait TravelTimeModel {
    /// Open a session for one source. Returns [`LocError::BadDepth`] when
    /// the depth is outside the model's range.
    fn open_session<'m>(&'m self, source: &SourceSpec) -> LocResult<Box<dyn TtSession + 'm>>;
}

/// A travel-time session, valid for a single source position.
pub trait TtSession {
    /// Theoretical arrivals at one receiver, sorted by time.
    fn arrivals(&self, recv_elev_km: f64, delta_deg: f64, azimuth_deg: f64) -> Vec<TtArrival>;
}

/// Thin adapter over the external model: re-opens the session whenever the
/// trial hypocenter moves and hands the identifier per-station arrival lists.
pub struct TtFacade<'m> {
    model: &'m dyn TravelTimeModel,
    session: Option<Box<dyn TtSession + 'm>>,
}

impl<'m> TtFacade<'m> {
    pub fn new(model: &'m dyn TravelTimeModel) -> Self {
        Self {
            model,
            session: None,
        }
    }

    /// Re-open the session at the current hypocenter.
    pub fn refresh(&mut self, hypo: &Hypocenter, ctx: &LocatorContext) -> LocResult<()> {
        let source = SourceSpec {
            latitude: hypo.latitude,
            longitude: hypo.longitude,
            depth: hypo.depth,
            request: TtRequest {
                useful_only: true,
                tectonic: ctx.tectonic,
                no_back_branches: true,
                rstt: ctx.rstt,
            },
        };
        self.session = Some(self.model.open_session(&source)?);
        Ok(())
    }

    /// Theoretical arrivals for one station at the cached source.
    pub fn arrivals(&self, station: &Station, delta: f64, azimuth: f64) -> LocResult<Vec<TtArrival>> {
        let session = self
            .session
            .as_ref()
            .ok_or(LocError::BadTravelTimeData("no open session".into()))?;
        Ok(session.arrivals(station.elevation, delta, azimuth))
    }
}

/// P velocity of the built-in uniform half-space model (km/s).
pub const UNIFORM_VP: f64 = 6.0;
/// Vp/Vs ratio of the built-in model.
pub const UNIFORM_VPVS: f64 = 1.8;
/// Depth ceiling of the built-in model (km).
const UNIFORM_DEPTH_MAX: f64 = 800.0;

/// Straight-ray travel time through a uniform half space (s).
pub fn uniform_tt(delta_deg: f64, depth_km: f64, velocity: f64) -> f64 {
    let r = delta_deg * rayloc_core::DEG2KM;
    (r * r + depth_km * depth_km).sqrt().max(1e-6) / velocity
}

/// Built-in uniform-velocity travel-time model: straight rays through a
/// constant-velocity half space, one P and one S branch.
///
/// This is the stand-in oracle that keeps the binary usable without an
/// external travel-time library; a production deployment plugs a real model
/// in behind [`TravelTimeModel`]. Every derivative is analytic, which also
/// makes it the reference model for the solver tests.
#[derive(Debug, Clone)]
pub struct UniformVelocityModel {
    pub vp: f64,
    pub vs: f64,
}

impl Default for UniformVelocityModel {
    fn default() -> Self {
        Self {
            vp: UNIFORM_VP,
            vs: UNIFORM_VP / UNIFORM_VPVS,
        }
    }
}

impl TravelTimeModel for UniformVelocityModel {
    fn open_session<'m>(&'m self, source: &SourceSpec) -> LocResult<Box<dyn TtSession + 'm>> {
        if !(0.0..=UNIFORM_DEPTH_MAX).contains(&source.depth) {
            return Err(LocError::BadDepth(source.depth));
        }
        Ok(Box::new(UniformSession {
            depth: source.depth,
            vp: self.vp,
            vs: self.vs,
        }))
    }
}

struct UniformSession {
    depth: f64,
    vp: f64,
    vs: f64,
}

impl UniformSession {
    fn branch(&self, phase: &str, velocity: f64, delta: f64, spread: f64, obs: f64) -> TtArrival {
        let r = delta * rayloc_core::DEG2KM;
        let d = (r * r + self.depth * self.depth).sqrt().max(1e-6);
        TtArrival {
            phase: phase.to_string(),
            tt: d / velocity,
            ray_param: r / (d * velocity) * rayloc_core::DEG2KM,
            d_tdd: r / (d * velocity) * rayloc_core::DEG2KM,
            d_tdz: self.depth / (d * velocity),
            spread,
            observability: obs,
            window: (2.0 * spread).max(2.0),
            group: if velocity >= self.vp { "P" } else { "S" }.to_string(),
            aux_group: String::new(),
            regional: delta < 10.0,
            usable: true,
            disabled: false,
        }
    }
}

impl TtSession for UniformSession {
    fn arrivals(&self, _recv_elev_km: f64, delta_deg: f64, _azimuth_deg: f64) -> Vec<TtArrival> {
        vec![
            self.branch("P", self.vp, delta_deg, 1.0, 10.0),
            self.branch("S", self.vs, delta_deg, 2.0, 5.0),
        ]
    }
}

/// Primary phase group of a phase code. Picks with no usable label fall in
/// the catch-all "all" group and may be identified as anything.
pub fn phase_group(code: &str) -> &'static str {
    let code = code.trim();
    if code.is_empty() || code == "?" || code.eq_ignore_ascii_case("all") {
        return "all";
    }
    if code == "Reg" {
        return "Reg";
    }
    if code == "Lg" {
        return "Lg";
    }
    if code == "LR" {
        return "LR";
    }
    if code.starts_with("PK") || code.starts_with("P'") || code.starts_with("pPK")
        || code.starts_with("sPK")
    {
        return "PKP";
    }
    if code.starts_with("SK") || code.starts_with("pSK") || code.starts_with("sSK") {
        return "SKS";
    }
    match code.chars().next() {
        Some('P') | Some('p') => "P",
        Some('S') | Some('s') => "S",
        _ => "all",
    }
}

/// Wave type of the final leg of a phase, used to compare a pick's group
/// against a theoretical phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaveType {
    P,
    S,
    Other,
}

/// Classify a phase code by the wave type of its last leg: "SKP" arrives as
/// P, "pS" arrives as S, "Lg"/"LR" ride the S side.
pub fn arrival_type(code: &str) -> WaveType {
    let code = code.trim();
    if code == "Lg" || code == "LR" {
        return WaveType::S;
    }
    let last_p = code.rfind('P');
    let last_s = code.rfind('S');
    match (last_p, last_s) {
        (Some(p), Some(s)) => {
            if p > s {
                WaveType::P
            } else {
                WaveType::S
            }
        }
        (Some(_), None) => WaveType::P,
        (None, Some(_)) => WaveType::S,
        (None, None) => WaveType::Other,
    }
}

//! JSON request/response payloads.
//!
//! The request mirrors the upstream pipeline's event message: one hypocenter
//! guess, the run flags, and a flat pick list carrying each pick's station
//! geometry inline. The response carries the refined hypocenter, the error
//! summary, and one row per pick sorted by distance.

use rayloc_core::{
    AuthorType, Event, Hypocenter, LocError, LocResult, Pick, Station, StationKey,
};
use serde::{Deserialize, Deserializer, Serialize};

use rayloc_algo::{LocateOptions, LocateOutcome};

fn default_true() -> bool {
    true
}

fn default_affinity() -> f64 {
    1.0
}

/// Tolerate author strings from foreign pipelines: anything unrecognized is
/// simply unknown.
fn lenient_author<'de, D: Deserializer<'de>>(de: D) -> Result<AuthorType, D::Error> {
    let raw = Option::<String>::deserialize(de)?.unwrap_or_default();
    Ok(match raw.as_str() {
        "LOCAL_HUMAN" => AuthorType::LocalHuman,
        "LOCAL_AUTO" => AuthorType::LocalAuto,
        "CONTRIB_HUMAN" => AuthorType::ContribHuman,
        "CONTRIB_AUTO" => AuthorType::ContribAuto,
        _ => AuthorType::Unknown,
    })
}

/// One pick in the request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickInput {
    #[serde(default)]
    pub source: String,
    pub pick_id: String,
    pub station: String,
    #[serde(default)]
    pub channel: String,
    pub network: String,
    #[serde(default)]
    pub location: String,
    pub station_latitude: f64,
    pub station_longitude: f64,
    #[serde(default)]
    pub station_elevation: f64,
    /// Picker standard error (s).
    #[serde(default)]
    pub quality: f64,
    #[serde(default)]
    pub original_phase: String,
    /// Arrival time, epoch seconds.
    pub arrival_time: f64,
    #[serde(default = "default_true")]
    pub use_pick: bool,
    #[serde(default, deserialize_with = "lenient_author")]
    pub author_type: AuthorType,
    /// Phase code a previous location pass settled on, if any.
    #[serde(default)]
    pub locator_phase: String,
    #[serde(default = "default_affinity")]
    pub pick_affinity: f64,
}

/// One event to locate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequest {
    /// Origin time, epoch seconds.
    pub origin_time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    #[serde(default)]
    pub held_loc: bool,
    #[serde(default)]
    pub held_depth: bool,
    /// The analyst supplied the Bayesian depth prior below.
    #[serde(default)]
    pub pref_depth: bool,
    #[serde(default)]
    pub bayes_depth: f64,
    #[serde(default)]
    pub bayes_spread: f64,
    #[serde(default)]
    pub use_rstt: bool,
    /// Disable the decorrelation projection.
    #[serde(default)]
    pub no_svd: bool,
    /// Restart from this hypocenter rather than refining a previous run.
    #[serde(default = "default_true")]
    pub new_loc: bool,
    pub picks: Vec<PickInput>,
}

impl LocationRequest {
    /// Parse a request from JSON text.
    pub fn from_json(text: &str) -> LocResult<Self> {
        serde_json::from_str(text).map_err(|e| LocError::BadEventInput(e.to_string()))
    }

    /// Validate and build the event plus the per-run options.
    pub fn build_event(&self) -> LocResult<(Event, LocateOptions)> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(LocError::BadEventInput(format!(
                "latitude {} out of range",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-360.0..=360.0).contains(&self.longitude) {
            return Err(LocError::BadEventInput(format!(
                "longitude {} out of range",
                self.longitude
            )));
        }
        if !self.depth.is_finite() || !self.origin_time.is_finite() {
            return Err(LocError::BadEventInput("non-finite origin".into()));
        }
        if self.picks.is_empty() {
            return Err(LocError::BadEventInput("no picks supplied".into()));
        }

        let mut hypo = Hypocenter::new(self.origin_time, self.latitude, self.longitude, self.depth);
        hypo.held_loc = self.held_loc;
        hypo.held_depth = self.held_depth;
        if self.pref_depth && self.bayes_spread > 0.0 {
            hypo.set_bayes_prior(self.bayes_depth, self.bayes_spread, true);
        }

        let mut ev = Event::new(hypo);
        for pick in &self.picks {
            if !pick.arrival_time.is_finite()
                || !pick.station_latitude.is_finite()
                || !pick.station_longitude.is_finite()
            {
                return Err(LocError::BadEventInput(format!(
                    "pick {} has non-finite fields",
                    pick.pick_id
                )));
            }
            let station = ev.add_station(Station::new(
                StationKey::new(
                    pick.station.clone(),
                    pick.network.clone(),
                    pick.location.clone(),
                ),
                pick.station_latitude,
                pick.station_longitude,
                pick.station_elevation,
            ));
            let idx = ev.add_pick(Pick::new(
                station,
                pick.pick_id.clone(),
                pick.channel.clone(),
                pick.arrival_time,
                pick.quality,
                pick.original_phase.clone(),
                pick.author_type,
                pick.use_pick,
                pick.pick_affinity,
            ));
            if !pick.locator_phase.is_empty() {
                ev.pick_mut(idx).phase = pick.locator_phase.clone();
            }
        }

        let options = LocateOptions {
            use_rstt: self.use_rstt,
            no_svd: self.no_svd,
            debug_level: 0,
        };
        Ok((ev, options))
    }
}

/// One axis of the error ellipsoid in the response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AxisOutput {
    pub semi_len: f64,
    pub azimuth: f64,
    pub plunge: f64,
}

/// The error summary block.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorsOutput {
    pub se_time: f64,
    pub se_latitude: f64,
    pub se_longitude: f64,
    pub se_depth: f64,
    pub se_residual: f64,
    pub err_h: f64,
    pub err_z: f64,
    pub ave_h: f64,
    pub bayes_depth: f64,
    pub bayes_spread: f64,
    pub bayes_import: f64,
    pub ellipse: [AxisOutput; 3],
}

/// One pick row in the response, in distance order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickOutput {
    pub pick_id: String,
    pub station: String,
    pub network: String,
    pub location: String,
    pub channel: String,
    pub phase: String,
    pub residual: f64,
    pub delta: f64,
    pub azimuth: f64,
    pub weight: f64,
    pub importance: f64,
    pub used: bool,
}

/// The full response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationResponse {
    pub exit_code: i32,
    pub quality_flags: String,
    pub origin_time: f64,
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub station_count: usize,
    pub phase_count: usize,
    pub azimuthal_gap: f64,
    pub robust_gap: f64,
    pub minimum_distance: f64,
    pub errors: ErrorsOutput,
    pub picks: Vec<PickOutput>,
}

impl LocationResponse {
    /// Assemble the response from the finished event.
    pub fn build(ev: &Event, outcome: &LocateOutcome) -> Self {
        let mut picks = Vec::with_capacity(ev.picks.len());
        for g in ev.groups_by_delta() {
            let group = &ev.groups[g];
            let station = ev.station(group.station);
            for &p in &group.picks {
                let pick = ev.pick(p);
                picks.push(PickOutput {
                    pick_id: pick.pick_id.clone(),
                    station: station.key.station.clone(),
                    network: station.key.network.clone(),
                    location: station.key.location.clone(),
                    channel: pick.channel.clone(),
                    phase: pick.phase.clone(),
                    residual: pick.residual,
                    delta: group.delta,
                    azimuth: group.azimuth,
                    weight: pick.weight,
                    importance: pick.importance,
                    used: pick.used,
                });
            }
        }

        let stats = &outcome.stats;
        let ellipse = stats.ellipsoid.map(|axis| AxisOutput {
            semi_len: axis.semi_len,
            azimuth: axis.azimuth,
            plunge: axis.plunge,
        });

        Self {
            exit_code: outcome.exit.code(),
            quality_flags: outcome.quality.clone(),
            origin_time: ev.hypo.origin_time,
            latitude: ev.hypo.latitude,
            longitude: ev.hypo.longitude,
            depth: ev.hypo.depth,
            station_count: ev.stations_used(),
            phase_count: ev.phases_used(),
            azimuthal_gap: outcome.coverage.azim_gap,
            robust_gap: outcome.coverage.lest_gap,
            minimum_distance: outcome.coverage.del_min,
            errors: ErrorsOutput {
                se_time: stats.se_time,
                se_latitude: stats.se_lat,
                se_longitude: stats.se_lon,
                se_depth: stats.se_depth,
                se_residual: stats.se_resid,
                err_h: stats.err_h,
                err_z: stats.err_z,
                ave_h: stats.ave_h,
                bayes_depth: ev.hypo.bayes_depth,
                bayes_spread: ev.hypo.bayes_spread,
                bayes_import: stats.bayes_import,
                ellipse,
            },
            picks,
        }
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> LocResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| LocError::Parse(e.to_string()))
    }
}

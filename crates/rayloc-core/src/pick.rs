//! Picks and per-station pick groups.

use serde::{Deserialize, Serialize};

/// Index of a station in the event's station arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StationIdx(pub usize);

/// Index of a pick in the event's pick arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickIdx(pub usize);

/// Who made the pick. Human authors are trusted more than automatic ones in
/// both triage and phase identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorType {
    #[default]
    Unknown,
    LocalHuman,
    LocalAuto,
    ContribHuman,
    ContribAuto,
}

impl AuthorType {
    /// Human analysts, local or contributed.
    pub fn is_human(self) -> bool {
        matches!(self, AuthorType::LocalHuman | AuthorType::ContribHuman)
    }

    /// Automatic pickers, local or contributed.
    pub fn is_automatic(self) -> bool {
        matches!(self, AuthorType::LocalAuto | AuthorType::ContribAuto)
    }
}

/// One phase arrival observation at one station.
#[derive(Debug, Clone)]
pub struct Pick {
    /// Owning station (exactly one).
    pub station: StationIdx,
    /// External pick identifier, carried through to the output.
    pub pick_id: String,
    /// Channel code.
    pub channel: String,
    /// Arrival time in seconds since the epoch.
    pub arrival_time: f64,
    /// Pick quality (standard error, s) as supplied by the picker.
    pub quality: f64,
    /// Phase label as observed, never changed.
    pub obs_phase: String,
    /// Who made the pick.
    pub author: AuthorType,
    /// Analyst directive that the pick should be used.
    pub cmnd_use: bool,
    /// Current phase label; phase identification rewrites this.
    pub phase: String,
    /// Observer confidence in the phase label; higher is harder to change.
    pub affinity: f64,
    /// Travel time = arrival_time - origin_time. Recomputed when the origin
    /// moves.
    pub tt: f64,
    /// Current travel-time residual (s).
    pub residual: f64,
    /// Current weight.
    pub weight: f64,
    /// Whether the pick participates in the location.
    pub used: bool,
    /// Surface-wave picks are never re-identified.
    pub surf_wave: bool,
    /// Data importance, written back during close-out.
    pub importance: f64,
    /// Figure-of-merit of the best theoretical match this iteration.
    pub fom_best: f64,
    /// Index of the best theoretical arrival in the group's current list.
    pub tt_best: Option<usize>,
    /// Figure-of-merit of the runner-up match.
    pub fom_alt: f64,
    /// Index of the runner-up theoretical arrival.
    pub tt_alt: Option<usize>,
}

impl Pick {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        station: StationIdx,
        pick_id: impl Into<String>,
        channel: impl Into<String>,
        arrival_time: f64,
        quality: f64,
        obs_phase: impl Into<String>,
        author: AuthorType,
        use_pick: bool,
        affinity: f64,
    ) -> Self {
        let obs_phase = obs_phase.into();
        Self {
            station,
            pick_id: pick_id.into(),
            channel: channel.into(),
            arrival_time,
            quality,
            phase: obs_phase.clone(),
            obs_phase,
            author,
            cmnd_use: use_pick,
            affinity: if affinity > 0.0 { affinity } else { 1.0 },
            tt: 0.0,
            residual: 0.0,
            weight: 0.0,
            used: use_pick,
            surf_wave: false,
            importance: 0.0,
            fom_best: 0.0,
            tt_best: None,
            fom_alt: 0.0,
            tt_alt: None,
        }
    }

    /// Recompute the travel time against a (possibly updated) origin time.
    pub fn update_travel_time(&mut self, origin_time: f64) {
        self.tt = self.arrival_time - origin_time;
    }

    /// Reset the phase-identification scratch before a re-identification pass.
    pub fn clear_match(&mut self) {
        self.fom_best = 0.0;
        self.tt_best = None;
        self.fom_alt = 0.0;
        self.tt_alt = None;
    }

    /// Take the pick out of the solution. First arrivals that are rejected in
    /// triage also lose their analyst use directive so they cannot return.
    pub fn reject(&mut self, clear_cmnd: bool) {
        self.used = false;
        self.weight = 0.0;
        if clear_cmnd {
            self.cmnd_use = false;
        }
    }
}

/// Picks from one station, sorted by arrival time, with the source-station
/// geometry cached.
#[derive(Debug, Clone)]
pub struct PickGroup {
    /// Owning station.
    pub station: StationIdx,
    /// Member picks, ordered by arrival time.
    pub picks: Vec<PickIdx>,
    /// Epicentral distance to the station (degrees).
    pub delta: f64,
    /// Azimuth from the source to the station (degrees clockwise from north).
    pub azimuth: f64,
}

impl PickGroup {
    pub fn new(station: StationIdx) -> Self {
        Self {
            station,
            picks: Vec::new(),
            delta: 0.0,
            azimuth: 0.0,
        }
    }
}

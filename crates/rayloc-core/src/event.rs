//! Event state: stations, picks, groups, hypocenter, audit trail.
//!
//! The event is the single owner of all per-run mutable state. Stations,
//! picks, and groups live in arenas addressed by newtype indices, so
//! cross-references (group → station, weighted residual → pick) never carry
//! lifetimes.

use std::collections::HashMap;

use crate::geo::delta_azimuth;
use crate::hypo::{HypoAudit, Hypocenter};
use crate::pick::{Pick, PickGroup, PickIdx, StationIdx};
use crate::station::{Station, StationKey};
use crate::wres::WeightedResidual;

/// One seismic event being located.
#[derive(Debug, Clone)]
pub struct Event {
    /// Station arena.
    pub stations: Vec<Station>,
    /// Pick arena.
    pub picks: Vec<Pick>,
    /// Per-station pick groups, in insertion order.
    pub groups: Vec<PickGroup>,
    /// The trial hypocenter.
    pub hypo: Hypocenter,
    /// Audit trail, one entry per accepted or abandoned iteration.
    pub audits: Vec<HypoAudit>,
    /// Raw weighted residuals (picks plus at most one Bayesian depth row).
    pub wres: Vec<WeightedResidual>,
    /// Decorrelated virtual residuals, when projection is active.
    pub wres_proj: Vec<WeightedResidual>,

    station_index: HashMap<StationKey, StationIdx>,
    group_index: HashMap<StationIdx, usize>,
}

impl Event {
    pub fn new(hypo: Hypocenter) -> Self {
        Self {
            stations: Vec::new(),
            picks: Vec::new(),
            groups: Vec::new(),
            hypo,
            audits: Vec::new(),
            wres: Vec::new(),
            wres_proj: Vec::new(),
            station_index: HashMap::new(),
            group_index: HashMap::new(),
        }
    }

    /// Add a station, or return the index it already has.
    pub fn add_station(&mut self, station: Station) -> StationIdx {
        if let Some(&idx) = self.station_index.get(&station.key) {
            return idx;
        }
        let idx = StationIdx(self.stations.len());
        self.station_index.insert(station.key.clone(), idx);
        self.stations.push(station);
        idx
    }

    /// Add a pick, creating the station's group on first sight and keeping
    /// the group ordered by arrival time (stable on ties).
    pub fn add_pick(&mut self, pick: Pick) -> PickIdx {
        let station = pick.station;
        let idx = PickIdx(self.picks.len());
        self.picks.push(pick);

        let group_pos = *self.group_index.entry(station).or_insert_with(|| {
            self.groups.push(PickGroup::new(station));
            self.groups.len() - 1
        });
        let group = &mut self.groups[group_pos];
        let at = group
            .picks
            .partition_point(|&p| self.picks[p.0].arrival_time <= self.picks[idx.0].arrival_time);
        group.picks.insert(at, idx);
        idx
    }

    pub fn station(&self, idx: StationIdx) -> &Station {
        &self.stations[idx.0]
    }

    pub fn pick(&self, idx: PickIdx) -> &Pick {
        &self.picks[idx.0]
    }

    pub fn pick_mut(&mut self, idx: PickIdx) -> &mut Pick {
        &mut self.picks[idx.0]
    }

    /// Recompute every group's delta and azimuth against the current
    /// hypocenter.
    pub fn update_geometry(&mut self) {
        for group in &mut self.groups {
            let station = &self.stations[group.station.0];
            let (delta, azimuth) = delta_azimuth(&self.hypo.trig, &station.trig);
            group.delta = delta;
            group.azimuth = azimuth;
        }
    }

    /// Recompute every pick's travel time against the current origin time.
    pub fn update_travel_times(&mut self) {
        let origin = self.hypo.origin_time;
        for pick in &mut self.picks {
            pick.update_travel_time(origin);
        }
    }

    /// Number of stations with at least one used pick.
    pub fn stations_used(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.picks.iter().any(|&p| self.picks[p.0].used))
            .count()
    }

    /// Number of used picks.
    pub fn phases_used(&self) -> usize {
        self.picks.iter().filter(|p| p.used).count()
    }

    /// Minimum delta over groups with used picks (degrees); 0 when nothing
    /// is used.
    pub fn delta_min(&self) -> f64 {
        let min = self
            .used_groups()
            .map(|g| g.delta)
            .fold(f64::INFINITY, f64::min);
        if min.is_finite() {
            min
        } else {
            0.0
        }
    }

    /// Standard azimuthal gap: the largest angular hole between adjacent
    /// used-station azimuths (degrees).
    pub fn azimuthal_gap(&self) -> f64 {
        let azimuths = self.used_azimuths();
        match azimuths.len() {
            0 => 360.0,
            1 => 360.0,
            _ => {
                let mut max_gap: f64 = azimuths[0] + 360.0 - azimuths[azimuths.len() - 1];
                for pair in azimuths.windows(2) {
                    max_gap = max_gap.max(pair[1] - pair[0]);
                }
                max_gap
            }
        }
    }

    /// Robust (L-estimator) azimuthal gap: the largest hole after removing
    /// any single station.
    pub fn robust_gap(&self) -> f64 {
        let azimuths = self.used_azimuths();
        let n = azimuths.len();
        if n < 3 {
            return 360.0;
        }
        let mut max_gap: f64 = 0.0;
        for j in 0..n {
            let prev = azimuths[(j + n - 1) % n];
            let next = azimuths[(j + 1) % n];
            let mut gap = next - prev;
            if gap <= 0.0 {
                gap += 360.0;
            }
            max_gap = max_gap.max(gap);
        }
        max_gap
    }

    /// Group indices ordered by delta, for the final output listing.
    pub fn groups_by_delta(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.groups.len()).collect();
        order.sort_by(|&a, &b| {
            self.groups[a]
                .delta
                .partial_cmp(&self.groups[b].delta)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order
    }

    fn used_groups(&self) -> impl Iterator<Item = &PickGroup> {
        self.groups
            .iter()
            .filter(|g| g.picks.iter().any(|&p| self.picks[p.0].used))
    }

    fn used_azimuths(&self) -> Vec<f64> {
        let mut azimuths: Vec<f64> = self.used_groups().map(|g| g.azimuth).collect();
        azimuths.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        azimuths
    }
}

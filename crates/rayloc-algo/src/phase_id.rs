//! Phase identification.
//!
//! Associates every used pick with at most one theoretical arrival given the
//! current trial hypocenter. Arrivals are clustered in time, picks fall into
//! clusters by their arrival-time windows, and each cluster is resolved by
//! scoring every order-preserving assignment with a figure of merit built on
//! the travel-time residual mixture model.

use rayloc_core::{Event, LocResult, PickIdx, WeightedResidual, DEG2KM};

use crate::traveltime::{arrival_type, phase_group, TtArrival, TtFacade, WaveType};

/// Downweight for matching across phases within the same primary group.
pub const GROUP_WEIGHT: f64 = 0.5;
/// Additional downweight when a trusted analyst's P/S call would be flipped.
pub const TYPE_WEIGHT: f64 = 0.1;
/// Downweight for administratively disabled theoretical phases.
const DISABLED_WEIGHT: f64 = 0.5;
/// Spread floor for pick weights (s).
const MIN_SPREAD: f64 = 0.2;
/// Largest cluster side resolved by exhaustive assignment; bigger clusters
/// fall back to greedy nearest-by-residual matching.
const MAX_ASSIGN: usize = 6;
/// Floor keeping log-space assignment scores finite.
const FOM_FLOOR: f64 = 1e-32;

/// Fraction of the travel-time residual model carried by the Cauchy limb.
const CAUCHY_FRACTION: f64 = 0.45;
/// Width normalization of the residual mixture.
const TT_WIDTH: f64 = 1.001691;

/// Travel-time residual probability density: a Cauchy/Gaussian mixture wide
/// enough to tolerate the occasional wildly misidentified phase.
pub fn tt_res_model(residual: f64, median: f64, spread: f64) -> f64 {
    let gauss_norm = (1.0 - CAUCHY_FRACTION) / (2.0 * std::f64::consts::PI).sqrt();
    let cauchy_norm = CAUCHY_FRACTION / std::f64::consts::PI;
    let tt_res_norm = gauss_norm + cauchy_norm;
    let gauss_spread = spread * TT_WIDTH;
    let cauchy_spread = spread * TT_WIDTH;
    let zg = (residual - median) / gauss_spread;
    let zc = (residual - median) / cauchy_spread;
    (gauss_norm / gauss_spread * (-0.5 * zg * zg).exp()
        + cauchy_norm / cauchy_spread / (1.0 + zc * zc))
        / tt_res_norm
}

/// Largest residual a match can carry before the pick is thrown out (s).
pub fn valid_limit(spread: f64) -> f64 {
    2.27 * (spread - 1.0) + 5.0
}

/// Knobs controlling one identification pass.
#[derive(Debug, Clone, Copy)]
pub struct PhaseIdOptions {
    /// Weight for matching entirely outside the pick's phase group.
    pub other_weight: f64,
    /// Boost for keeping the current identification.
    pub sticky_weight: f64,
    /// Allow identifications to change; otherwise only residuals are
    /// refreshed against the current phase codes.
    pub re_id: bool,
    /// Recompute pick weights from the matched arrival's spread.
    pub re_weight: bool,
}

/// Travel-time derivatives of one arrival resolved into the local
/// (colatitude, longitude, depth) step frame.
fn step_frame_derivs(arr: &TtArrival, azimuth_deg: f64) -> [f64; 3] {
    let az = azimuth_deg.to_radians();
    [
        arr.d_tdd * az.cos() / DEG2KM,
        -arr.d_tdd * az.sin() / DEG2KM,
        arr.d_tdz,
    ]
}

/// Identify phases for every group, refreshing residuals, weights, and the
/// weighted-residual list. Returns true iff any used pick's identification
/// moved (phase change or used flip).
pub fn do_id(ev: &mut Event, tt: &TtFacade, opts: &PhaseIdOptions) -> LocResult<bool> {
    ev.wres.clear();
    let mut changed = false;

    for g in 0..ev.groups.len() {
        let (station_idx, delta, azimuth, pick_ids) = {
            let group = &ev.groups[g];
            (group.station, group.delta, group.azimuth, group.picks.clone())
        };
        if delta <= 0.0 {
            continue;
        }
        let arrivals = {
            let station = ev.station(station_idx);
            tt.arrivals(station, delta, azimuth)?
        };
        changed |= identify_group(ev, &pick_ids, &arrivals, delta, azimuth, opts);
    }
    Ok(changed)
}

/// Identify one group's picks against its theoretical arrivals.
fn identify_group(
    ev: &mut Event,
    pick_ids: &[PickIdx],
    arrivals: &[TtArrival],
    delta: f64,
    azimuth: f64,
    opts: &PhaseIdOptions,
) -> bool {
    let mut changed = false;

    if arrivals.is_empty() {
        for &p in pick_ids {
            let pick = ev.pick_mut(p);
            if pick.used {
                pick.reject(false);
                changed = true;
            }
        }
        return changed;
    }

    // Re-identification passes reconsider every pick the analyst left in
    // play; refresh-only passes touch only currently used picks.
    let mut candidates: Vec<PickIdx> = Vec::new();
    let mut surface: Vec<PickIdx> = Vec::new();
    for &p in pick_ids {
        let pick = ev.pick(p);
        let eligible = if opts.re_id { pick.cmnd_use } else { pick.used };
        if !eligible {
            continue;
        }
        let is_surface = pick.surf_wave
            || ((pick.obs_phase == "Lg" || pick.obs_phase == "LR") && pick.author.is_human());
        if is_surface {
            surface.push(p);
        } else {
            candidates.push(p);
        }
    }

    // Surface waves bind to the first matching theoretical arrival and are
    // never reconsidered.
    for &p in &surface {
        let code = ev.pick(p).obs_phase.clone();
        match arrivals.iter().position(|a| a.phase == code) {
            Some(j) => {
                let arr = &arrivals[j];
                let deriv = step_frame_derivs(arr, azimuth);
                let pick = ev.pick_mut(p);
                let was_used = pick.used;
                pick.surf_wave = true;
                pick.used = true;
                if pick.phase != code {
                    pick.phase = code.clone();
                    changed = true;
                }
                pick.residual = pick.tt - arr.tt;
                if opts.re_weight || pick.weight == 0.0 {
                    pick.weight = 1.0 / arr.spread.max(MIN_SPREAD);
                }
                changed |= !was_used;
                let (residual, weight) = (pick.residual, pick.weight);
                ev.wres
                    .push(WeightedResidual::from_pick(p, residual, weight, deriv));
            }
            None => {
                let pick = ev.pick_mut(p);
                if pick.used {
                    pick.reject(false);
                    changed = true;
                }
            }
        }
    }

    if !opts.re_id {
        changed |= refresh_group(ev, &candidates, arrivals, azimuth, opts);
        return changed;
    }

    // Full re-identification: cluster, associate, assign.
    for &p in &candidates {
        ev.pick_mut(p).clear_match();
    }
    let first_pick = pick_ids.first().copied();
    let clusters = cluster_arrivals(arrivals);
    let mut assigned: Vec<(PickIdx, usize)> = Vec::new();
    let mut matched: Vec<PickIdx> = Vec::new();
    let mut next_candidate = 0usize;
    let mut first_populated = true;

    for cluster in &clusters {
        // Picks fall in the cluster iff their travel time is inside the
        // cluster window; picks and clusters both advance in time order.
        let mut members: Vec<PickIdx> = Vec::new();
        while next_candidate < candidates.len() {
            let p = candidates[next_candidate];
            let tt_pick = ev.pick(p).tt;
            if tt_pick < cluster.win_min {
                next_candidate += 1;
                continue;
            }
            if tt_pick > cluster.win_max {
                break;
            }
            members.push(p);
            next_candidate += 1;
        }
        if members.is_empty() {
            continue;
        }

        // Near-station boost applies to the first pick of the first
        // populated cluster only.
        let boost_pick = if first_populated && delta < 20.0 {
            members.first().copied()
        } else {
            None
        };
        first_populated = false;

        let pairs = assign_cluster(ev, &members, &cluster.arrivals, arrivals, delta, boost_pick, opts);
        for (p, j) in pairs {
            matched.push(p);
            assigned.push((p, j));
        }
    }

    // Apply the winning assignment.
    for (p, j) in assigned {
        let arr = &arrivals[j];
        let deriv = step_frame_derivs(arr, azimuth);
        let residual = ev.pick(p).tt - arr.tt;
        let is_first = first_pick == Some(p);
        let pick = ev.pick_mut(p);
        let was_used = pick.used;

        if residual.abs() > valid_limit(arr.spread) {
            pick.reject(is_first);
            changed |= was_used;
            continue;
        }
        if pick.phase != arr.phase {
            pick.phase = arr.phase.clone();
            changed = true;
        }
        if !arr.usable {
            // Identified, but the phase itself cannot locate (depth branches
            // like PKPpre); the pick sits out.
            pick.residual = residual;
            pick.reject(false);
            changed |= was_used;
            continue;
        }
        pick.used = true;
        pick.residual = residual;
        if opts.re_weight || pick.weight == 0.0 {
            pick.weight = 1.0 / arr.spread.max(MIN_SPREAD);
        }
        changed |= !was_used;
        let (residual, weight) = (pick.residual, pick.weight);
        ev.wres
            .push(WeightedResidual::from_pick(p, residual, weight, deriv));
    }

    // Candidates that landed in no cluster, or were left over by the
    // assignment, drop out of the solution.
    for &p in &candidates {
        if matched.contains(&p) {
            continue;
        }
        let pick = ev.pick_mut(p);
        pick.clear_match();
        if pick.used {
            pick.reject(false);
            changed = true;
        }
    }

    changed
}

/// Refresh residuals against the current phase codes without letting
/// identifications move.
fn refresh_group(
    ev: &mut Event,
    candidates: &[PickIdx],
    arrivals: &[TtArrival],
    azimuth: f64,
    opts: &PhaseIdOptions,
) -> bool {
    let mut changed = false;
    for &p in candidates {
        let code = ev.pick(p).phase.clone();
        match arrivals.iter().position(|a| a.phase == code) {
            Some(j) => {
                let arr = &arrivals[j];
                let deriv = step_frame_derivs(arr, azimuth);
                let residual = ev.pick(p).tt - arr.tt;
                let pick = ev.pick_mut(p);
                if residual.abs() > valid_limit(arr.spread) {
                    let was_used = pick.used;
                    pick.reject(false);
                    changed |= was_used;
                    continue;
                }
                pick.residual = residual;
                if opts.re_weight || pick.weight == 0.0 {
                    pick.weight = 1.0 / arr.spread.max(MIN_SPREAD);
                }
                let (residual, weight) = (pick.residual, pick.weight);
                ev.wres
                    .push(WeightedResidual::from_pick(p, residual, weight, deriv));
            }
            None => {
                let pick = ev.pick_mut(p);
                if pick.used {
                    pick.reject(false);
                    changed = true;
                }
            }
        }
    }
    changed
}

/// One cluster of theoretical arrivals overlapping in time.
#[derive(Debug, Clone)]
struct Cluster {
    arrivals: Vec<usize>,
    win_min: f64,
    win_max: f64,
}

/// Walk the time-sorted arrivals, merging any arrival whose window overlaps
/// the running cluster window.
fn cluster_arrivals(arrivals: &[TtArrival]) -> Vec<Cluster> {
    let mut clusters: Vec<Cluster> = Vec::new();
    for (j, arr) in arrivals.iter().enumerate() {
        let lo = arr.tt - arr.window;
        let hi = arr.tt + arr.window;
        if let Some(cluster) = clusters.last_mut() {
            if lo <= cluster.win_max {
                cluster.arrivals.push(j);
                cluster.win_min = cluster.win_min.min(lo);
                cluster.win_max = cluster.win_max.max(hi);
                continue;
            }
        }
        clusters.push(Cluster {
            arrivals: vec![j],
            win_min: lo,
            win_max: hi,
        });
    }
    clusters
}

/// Resolve one cluster: enumerate order-preserving assignments of the larger
/// side taken k at a time (k = min(picks, arrivals)) and keep the assignment
/// with the best product of figures of merit.
fn assign_cluster(
    ev: &mut Event,
    members: &[PickIdx],
    arr_ids: &[usize],
    arrivals: &[TtArrival],
    delta: f64,
    boost_pick: Option<PickIdx>,
    opts: &PhaseIdOptions,
) -> Vec<(PickIdx, usize)> {
    let p = members.len();
    let t = arr_ids.len();
    let k = p.min(t);
    if k == 0 {
        return Vec::new();
    }

    let fom_of = |ev: &Event, pick_id: PickIdx, j: usize| -> f64 {
        let pick = ev.pick(pick_id);
        let arr = &arrivals[j];
        let boost = if boost_pick == Some(pick_id) {
            1.0 + 0.067 * (20.0 - delta)
        } else {
            1.0
        };
        figure_of_merit(pick, arr, opts, boost)
    };

    if k > MAX_ASSIGN {
        return assign_greedy(ev, members, arr_ids, arrivals, &fom_of);
    }

    let mut best: Option<(f64, Vec<(PickIdx, usize)>)> = None;
    let mut scratch: Vec<(PickIdx, usize, f64)> = Vec::with_capacity(k);

    let larger = p.max(t);
    for combo in combinations(larger, k) {
        scratch.clear();
        let mut score = 0.0;
        for (i, &c) in combo.iter().enumerate() {
            let (pick_id, j) = if p <= t {
                (members[i], arr_ids[c])
            } else {
                (members[c], arr_ids[i])
            };
            let fom = fom_of(ev, pick_id, j);
            score += fom.max(FOM_FLOOR).ln();
            scratch.push((pick_id, j, fom));
        }
        for &(pick_id, j, fom) in &scratch {
            update_match_scratch(ev, pick_id, j, fom);
        }
        if best.as_ref().map_or(true, |(s, _)| score > *s) {
            best = Some((score, scratch.iter().map(|&(p, j, _)| (p, j)).collect()));
        }
    }

    best.map(|(_, pairs)| pairs).unwrap_or_default()
}

/// Keep the best and runner-up figure of merit seen for a pick across the
/// assignments considered.
fn update_match_scratch(ev: &mut Event, pick_id: PickIdx, j: usize, fom: f64) {
    let pick = ev.pick_mut(pick_id);
    if pick.tt_best == Some(j) {
        pick.fom_best = pick.fom_best.max(fom);
        return;
    }
    if fom > pick.fom_best {
        pick.fom_alt = pick.fom_best;
        pick.tt_alt = pick.tt_best;
        pick.fom_best = fom;
        pick.tt_best = Some(j);
    } else if fom > pick.fom_alt {
        pick.fom_alt = fom;
        pick.tt_alt = Some(j);
    }
}

/// Greedy nearest-by-residual fallback, bounding the combinatorics of very
/// large clusters.
fn assign_greedy(
    ev: &mut Event,
    members: &[PickIdx],
    arr_ids: &[usize],
    arrivals: &[TtArrival],
    fom_of: &dyn Fn(&Event, PickIdx, usize) -> f64,
) -> Vec<(PickIdx, usize)> {
    let mut taken = vec![false; arr_ids.len()];
    let mut out = Vec::new();
    for &p in members {
        let tt_pick = ev.pick(p).tt;
        let mut best: Option<(usize, f64)> = None;
        for (pos, &j) in arr_ids.iter().enumerate() {
            if taken[pos] {
                continue;
            }
            let miss = (tt_pick - arrivals[j].tt).abs();
            if best.map_or(true, |(_, m)| miss < m) {
                best = Some((pos, miss));
            }
        }
        if let Some((pos, _)) = best {
            taken[pos] = true;
            let j = arr_ids[pos];
            let fom = fom_of(ev, p, j);
            update_match_scratch(ev, p, j, fom);
            out.push((p, j));
        }
    }
    out
}

/// Order-preserving selections of `k` indices out of `0..n`.
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    fn recurse(n: usize, k: usize, start: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        let remaining = k - current.len();
        for i in start..=(n - remaining) {
            current.push(i);
            recurse(n, k, i + 1, current, out);
            current.pop();
        }
    }
    let mut out = Vec::new();
    if k == 0 || k > n {
        return out;
    }
    let mut current = Vec::with_capacity(k);
    recurse(n, k, 0, &mut current, &mut out);
    out
}

/// Figure of merit for matching one pick to one theoretical arrival.
fn figure_of_merit(
    pick: &rayloc_core::Pick,
    arr: &TtArrival,
    opts: &PhaseIdOptions,
    boost: f64,
) -> f64 {
    let residual = pick.tt - arr.tt;
    let mut fom = tt_res_model(residual, 0.0, arr.spread) * arr.observability;

    if arr.disabled {
        fom *= DISABLED_WEIGHT;
    }

    let obs_group = phase_group(&pick.obs_phase);
    if pick.obs_phase != arr.phase && obs_group != "all" {
        if obs_group == "Reg" && arr.regional {
            // A generic regional call matching a regional branch keeps the
            // within-group weight.
            fom *= GROUP_WEIGHT;
        } else if obs_group == phase_group(&arr.phase) {
            fom *= GROUP_WEIGHT;
        } else {
            fom *= opts.other_weight;
            if pick.author.is_human() {
                let pick_type = arrival_type(&pick.obs_phase);
                if pick_type != WaveType::Other && arrival_type(&arr.phase) != pick_type {
                    fom *= TYPE_WEIGHT;
                }
            }
        }
    }
    if pick.obs_phase == arr.phase {
        fom *= pick.affinity;
    }
    if pick.phase == arr.phase {
        fom *= opts.sticky_weight;
    }
    fom * boost
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayloc_core::{AuthorType, Pick, StationIdx};

    fn arrival(phase: &str, tt: f64) -> TtArrival {
        TtArrival {
            phase: phase.to_string(),
            tt,
            ray_param: 8.0,
            d_tdd: 8.0,
            d_tdz: -0.1,
            spread: 1.0,
            observability: 10.0,
            window: 2.0,
            group: phase_group(phase).to_string(),
            aux_group: String::new(),
            regional: false,
            usable: true,
            disabled: false,
        }
    }

    fn pick_with(obs: &str, tt: f64, author: AuthorType) -> Pick {
        let mut p = Pick::new(StationIdx(0), "p", "BHZ", tt, 0.2, obs, author, true, 1.0);
        p.tt = tt;
        p
    }

    #[test]
    fn residual_model_is_unit_at_center_for_unit_width() {
        // With spread*width == 1 the central density is exactly 1.
        let v = tt_res_model(0.0, 0.0, 1.0 / TT_WIDTH);
        assert!((v - 1.0).abs() < 1e-12, "v={v}");
    }

    #[test]
    fn residual_model_decays_symmetrically() {
        let center = tt_res_model(0.0, 0.0, 1.0);
        let off = tt_res_model(2.5, 0.0, 1.0);
        let off_neg = tt_res_model(-2.5, 0.0, 1.0);
        assert!(off < center);
        assert!((off - off_neg).abs() < 1e-15);
    }

    #[test]
    fn heavier_tail_than_gaussian() {
        // At five spreads out the Cauchy limb dominates a pure Gaussian.
        let mixture = tt_res_model(5.0, 0.0, 1.0);
        let gauss = (-0.5 * (5.0f64 / TT_WIDTH).powi(2)).exp()
            / (2.0 * std::f64::consts::PI).sqrt()
            / TT_WIDTH;
        assert!(mixture > gauss);
    }

    #[test]
    fn validity_limit_scales_with_spread() {
        assert!((valid_limit(1.0) - 5.0).abs() < 1e-12);
        assert!((valid_limit(3.0) - (2.27 * 2.0 + 5.0)).abs() < 1e-12);
    }

    #[test]
    fn clustering_merges_overlapping_windows() {
        let arrivals = vec![
            arrival("P", 100.0),
            arrival("pP", 102.0),
            arrival("PcP", 103.5),
            arrival("S", 180.0),
        ];
        let clusters = cluster_arrivals(&arrivals);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].arrivals, vec![0, 1, 2]);
        assert_eq!(clusters[1].arrivals, vec![3]);
        assert!((clusters[0].win_min - 98.0).abs() < 1e-12);
        assert!((clusters[0].win_max - 105.5).abs() < 1e-12);
    }

    #[test]
    fn combinations_preserve_order() {
        let combos = combinations(4, 2);
        assert_eq!(combos.len(), 6);
        for combo in &combos {
            assert!(combo[0] < combo[1]);
        }
        assert!(combinations(3, 0).is_empty());
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn matching_code_beats_group_crossing() {
        let opts = PhaseIdOptions {
            other_weight: 0.01,
            sticky_weight: 1.0,
            re_id: true,
            re_weight: true,
        };
        let pick = pick_with("Pn", 100.0, AuthorType::LocalHuman);
        let pn = arrival("Pn", 100.3);
        let sn = arrival("Sn", 100.2);
        let fom_pn = figure_of_merit(&pick, &pn, &opts, 1.0);
        let fom_sn = figure_of_merit(&pick, &sn, &opts, 1.0);
        assert!(fom_pn > fom_sn);
    }

    #[test]
    fn type_weight_punishes_flipping_a_human_call() {
        let opts = PhaseIdOptions {
            other_weight: 0.1,
            sticky_weight: 1.0,
            re_id: true,
            re_weight: true,
        };
        let human = pick_with("Sn", 100.0, AuthorType::LocalHuman);
        let auto = pick_with("Sn", 100.0, AuthorType::LocalAuto);
        let p_arr = arrival("Pg", 100.0);
        let fom_human = figure_of_merit(&human, &p_arr, &opts, 1.0);
        let fom_auto = figure_of_merit(&auto, &p_arr, &opts, 1.0);
        assert!((fom_human / fom_auto - TYPE_WEIGHT).abs() < 1e-9);
    }

    #[test]
    fn do_id_keeps_a_consistent_ring_stable() {
        use crate::context::LocatorContext;
        use crate::test_utils::{uniform_model, SyntheticNet};
        use crate::traveltime::TtFacade;

        let model = uniform_model();
        let net = SyntheticNet::ring(8, 4.0, 10.0).with_noise(0.3);
        let mut ev = net.event();
        let ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        tt.refresh(&ev.hypo, &ctx).unwrap();
        let opts = PhaseIdOptions {
            other_weight: 0.01,
            sticky_weight: 5.0,
            re_id: true,
            re_weight: true,
        };

        let changed = do_id(&mut ev, &tt, &opts).unwrap();
        assert!(!changed, "consistent P picks should not move");
        assert_eq!(ev.wres.len(), 8);
        for pick in &ev.picks {
            assert!(pick.used);
            assert_eq!(pick.phase, "P");
            assert!(pick.residual.abs() < 1.0);
            assert!(pick.weight > 0.0);
        }
    }

    #[test]
    fn do_id_reidentifies_a_mislabeled_pick() {
        use crate::context::LocatorContext;
        use crate::test_utils::{uniform_model, SyntheticNet};
        use crate::traveltime::TtFacade;
        use rayloc_core::AuthorType;

        let model = uniform_model();
        let mut net = SyntheticNet::ring(6, 4.0, 10.0);
        // A pick sitting exactly on the S branch but labeled P
        net.add_s_pick(0, "P", 0.0, AuthorType::LocalAuto);
        let mut ev = net.event();
        let ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        tt.refresh(&ev.hypo, &ctx).unwrap();
        let opts = PhaseIdOptions {
            other_weight: 0.1,
            sticky_weight: 1.0,
            re_id: true,
            re_weight: true,
        };

        let changed = do_id(&mut ev, &tt, &opts).unwrap();
        assert!(changed);
        let s_pick = ev.pick(*ev.groups[0].picks.last().unwrap());
        assert_eq!(s_pick.phase, "S");
        assert!(s_pick.used);
        assert!(s_pick.residual.abs() < 1.0);
    }

    #[test]
    fn do_id_drops_picks_outside_every_cluster() {
        use crate::context::LocatorContext;
        use crate::test_utils::{uniform_model, SyntheticNet};
        use crate::traveltime::TtFacade;
        use rayloc_core::AuthorType;

        let model = uniform_model();
        let mut net = SyntheticNet::ring(6, 4.0, 10.0);
        // Far beyond any theoretical window
        net.add_secondary(0, "P", 500.0, AuthorType::LocalHuman);
        let mut ev = net.event();
        let ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        tt.refresh(&ev.hypo, &ctx).unwrap();
        let opts = PhaseIdOptions {
            other_weight: 0.01,
            sticky_weight: 5.0,
            re_id: true,
            re_weight: true,
        };

        let changed = do_id(&mut ev, &tt, &opts).unwrap();
        assert!(changed);
        let stray = ev.pick(*ev.groups[0].picks.last().unwrap());
        assert!(!stray.used);
        assert_eq!(stray.weight, 0.0);
        // Analyst directive survives a mere association miss
        assert!(stray.cmnd_use);
    }

    #[test]
    fn sticky_weight_resists_churn() {
        let opts_sticky = PhaseIdOptions {
            other_weight: 0.1,
            sticky_weight: 5.0,
            re_id: true,
            re_weight: true,
        };
        let mut pick = pick_with("P", 100.0, AuthorType::LocalAuto);
        pick.phase = "Pn".to_string();
        let pn = arrival("Pn", 100.4);
        let without = figure_of_merit(
            &pick,
            &pn,
            &PhaseIdOptions {
                sticky_weight: 1.0,
                ..opts_sticky
            },
            1.0,
        );
        let with = figure_of_merit(&pick, &pn, &opts_sticky, 1.0);
        assert!((with / without - 5.0).abs() < 1e-9);
    }
}

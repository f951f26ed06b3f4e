//! First-pass triage of automatic picks.
//!
//! Before any iteration, the automatic first arrivals are surveyed against
//! the theoretical first arrivals. A clean network gets the strict treatment
//! (suspect first arrivals dropped); a network where automatic
//! misidentification is endemic gets the forgiving one (suspect first
//! arrivals re-labeled as the theoretical first arrival). Either way the
//! secondary automatic picks are dropped, leaving a cleanly biased starting
//! set for stage zero.

use rayloc_core::{Event, LocResult, PickIdx};
use tracing::debug;

use crate::traveltime::TtFacade;

/// Crustal and mantle P codes an automatic first arrival is allowed to keep.
const CRUSTAL_MANTLE_P: [&str; 4] = ["Pg", "Pb", "Pn", "P"];

/// Fraction of bad first arrivals separating the easy and hard treatments.
const BAD_P_FRACTION: f64 = 0.1;

/// Is the code a member of the core/surface families that a first-arrival
/// triage should simply drop rather than re-label?
fn is_core_or_surface(code: &str) -> bool {
    code.starts_with("PK")
        || code.starts_with("P'")
        || code.starts_with("Sc")
        || matches!(code, "Sg" | "Sb" | "Sn" | "Lg")
}

fn is_crustal_mantle_p(code: &str) -> bool {
    CRUSTAL_MANTLE_P.contains(&code)
}

/// Count automatic first arrivals whose codes are neither crustal/mantle P
/// nor core/surface phases.
pub fn survey(ev: &Event) -> usize {
    let mut bad_p = 0;
    for group in &ev.groups {
        let Some(first) = first_used_pick(ev, &group.picks) else {
            continue;
        };
        let pick = ev.pick(first);
        if pick.author.is_automatic()
            && !is_crustal_mantle_p(&pick.obs_phase)
            && !is_core_or_surface(&pick.obs_phase)
        {
            bad_p += 1;
        }
    }
    bad_p
}

/// Run the triage: survey, then apply the easy or hard treatment.
pub fn initial_id(ev: &mut Event, tt: &TtFacade) -> LocResult<()> {
    let sta_used = ev.stations_used();
    if sta_used == 0 {
        return Ok(());
    }
    let bad_p = survey(ev);
    let hard = bad_p as f64 / sta_used as f64 >= BAD_P_FRACTION;
    debug!(bad_p, sta_used, hard, "initial identification triage");

    for g in 0..ev.groups.len() {
        let (station_idx, delta, azimuth, pick_ids) = {
            let group = &ev.groups[g];
            (group.station, group.delta, group.azimuth, group.picks.clone())
        };
        let Some(first) = first_used_pick(ev, &pick_ids) else {
            continue;
        };

        // Secondary automatic picks are dropped in both treatments.
        for &p in &pick_ids {
            if p == first {
                continue;
            }
            let pick = ev.pick_mut(p);
            if pick.used && pick.author.is_automatic() {
                pick.reject(true);
            }
        }

        let first_pick = ev.pick(first);
        if !first_pick.author.is_automatic() || first_pick.surf_wave {
            continue;
        }
        let code = first_pick.obs_phase.clone();
        if is_crustal_mantle_p(&code) {
            continue;
        }

        if !hard {
            // Easy network: any suspect automatic first arrival goes.
            ev.pick_mut(first).reject(true);
            continue;
        }

        if is_core_or_surface(&code) {
            ev.pick_mut(first).reject(true);
            continue;
        }

        // Hard network: a plausible misidentification is forced onto the
        // theoretical first arrival.
        let theoretical = {
            let station = ev.station(station_idx);
            tt.arrivals(station, delta, azimuth)?
                .into_iter()
                .next()
        };
        if let Some(arr) = theoretical {
            let tt_pick = ev.pick(first).tt;
            let pick = ev.pick_mut(first);
            pick.phase = arr.phase.clone();
            pick.residual = tt_pick - arr.tt;
        } else {
            ev.pick_mut(first).reject(true);
        }
    }
    Ok(())
}

fn first_used_pick(ev: &Event, picks: &[PickIdx]) -> Option<PickIdx> {
    picks.iter().copied().find(|&p| ev.pick(p).used)
}

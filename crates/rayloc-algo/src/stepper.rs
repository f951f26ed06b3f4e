//! One iteration of the refinement loop.
//!
//! `set_dir` re-identifies phases, rebuilds the rank-sum problem (optionally
//! through the decorrelation projection), and leaves the dispersion and the
//! steepest-descent direction on the hypocenter. `make_step` line-searches
//! along that direction, applies the winning step and origin shift, and
//! damps its way back down when the full step overshoots.

use rayloc_core::{CratonSet, Event, LocResult, StepStatus, WeightedResidual, ZoneStats};
use tracing::debug;

use crate::context::LocatorContext;
use crate::decorr::DeCorr;
use crate::linear_step::{line_search, SearchBounds};
use crate::phase_id::{do_id, PhaseIdOptions};
use crate::restimator::Restimator;
use crate::traveltime::TtFacade;

/// Number of refinement stages.
pub const STAGE_LIM: usize = 5;
/// Step length the driver seeds each event with (km).
pub const INIT_STEP: f64 = 50.0;
/// Iteration budget per stage.
pub const ITER_LIM: [usize; STAGE_LIM] = [15, 20, 20, 20, 20];
/// Convergence limit per stage (km).
pub const CONV_LIM: [f64; STAGE_LIM] = [1.0, 0.1, 0.1, 0.1, 0.1];
/// Step cap per stage (km).
pub const STEP_LIM: [f64; STAGE_LIM] = [200.0, 50.0, 20.0, 20.0, 20.0];
/// Step length separating "did not converge" from "unstable" (km).
pub const STEP_TOL: f64 = 20.0;
/// Slack factor on the convergence limit for "nearly converged".
pub const ALMOST: f64 = 1.1;

/// Immutable reference data shared across events.
#[derive(Clone, Copy)]
pub struct RefData<'a> {
    pub cratons: &'a CratonSet,
    pub zones: &'a ZoneStats,
}

/// Outcome of a `set_dir` call.
#[derive(Debug, Clone, Copy)]
pub struct SetDirOutcome {
    pub status: StepStatus,
    /// At least one identification moved.
    pub changed: bool,
}

/// Per-event stepping state.
#[derive(Debug, Clone, Default)]
pub struct Stepper {
    rest: Restimator,
    decorr: DeCorr,
}

impl Stepper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-identify, rebuild the rank-sum problem, and compute the dispersion
    /// and steepest-descent direction at the current hypocenter.
    #[allow(clippy::too_many_arguments)]
    pub fn set_dir(
        &mut self,
        ev: &mut Event,
        tt: &mut TtFacade,
        ctx: &mut LocatorContext,
        aux: RefData<'_>,
        other_weight: f64,
        sticky_weight: f64,
        re_id: bool,
        re_weight: bool,
    ) -> LocResult<SetDirOutcome> {
        if re_weight {
            ctx.tectonic = !aux.cratons.contains(ev.hypo.latitude, ev.hypo.longitude);
            if !ev.hypo.analyst_bayes {
                if let Some((depth, spread)) =
                    aux.zones.bayes_depth(ev.hypo.latitude, ev.hypo.longitude)
                {
                    ev.hypo.set_bayes_prior(depth, spread, false);
                }
            }
        }

        tt.refresh(&ev.hypo, ctx)?;
        let opts = PhaseIdOptions {
            other_weight,
            sticky_weight,
            re_id,
            re_weight,
        };
        let changed = do_id(ev, tt, &opts)?;

        if ev.hypo.has_bayes_prior() {
            let residual = ev.hypo.bayes_depth - ev.hypo.depth;
            ev.wres
                .push(WeightedResidual::bayes_depth(residual, ev.hypo.bayes_weight));
        }

        if ev.stations_used() < 3 {
            return Ok(SetDirOutcome {
                status: StepStatus::InsufficientData,
                changed,
            });
        }

        let dof = ev.hypo.dof;
        self.rest.median(&mut ev.wres);
        self.rest.de_median_res(&mut ev.wres);

        let (dispersion, direction) = if ctx.decorrelate {
            let pick_rows = ev.wres.iter().filter(|w| !w.is_depth).count();
            if changed || self.decorr.pick_count() != pick_rows {
                self.decorr.update(ev)?;
            }
            self.decorr.project(ev);
            self.rest.median(&mut ev.wres_proj);
            self.rest.de_median_design(&mut ev.wres_proj);
            let dispersion = self.rest.penalty(&mut ev.wres_proj);
            (dispersion, self.rest.steepest(&ev.wres_proj, dof))
        } else {
            self.rest.de_median_design(&mut ev.wres);
            let dispersion = self.rest.penalty(&mut ev.wres);
            (dispersion, self.rest.steepest(&ev.wres, dof))
        };

        ev.hypo.dispersion = dispersion;
        ev.hypo.step_dir = direction;
        ev.hypo.rms = weighted_rms(&ev.wres);
        Ok(SetDirOutcome {
            status: StepStatus::Success,
            changed,
        })
    }

    /// Line-search, apply, and (if the dispersion rose) damp. Appends one
    /// audit entry whatever the outcome.
    pub fn make_step(
        &mut self,
        ev: &mut Event,
        tt: &mut TtFacade,
        ctx: &mut LocatorContext,
        aux: RefData<'_>,
        stage: usize,
        iter: usize,
    ) -> LocResult<StepStatus> {
        let dispersion0 = ev.hypo.dispersion;
        let last = ev.hypo.audit(stage, iter, StepStatus::Success);
        ev.hypo.step_len = ev.hypo.step_len.max(2.0 * CONV_LIM[stage]);

        let dof = ev.hypo.dof;
        let dir = ev.hypo.step_dir;
        let depth0 = ev.hypo.depth;
        let bounds = SearchBounds {
            step_min: CONV_LIM[stage],
            step_max: STEP_LIM[stage],
        };
        let rows = if ctx.decorrelate {
            &mut ev.wres_proj
        } else {
            &mut ev.wres
        };
        let result = line_search(
            rows,
            &mut self.rest,
            &dir,
            ev.hypo.step_len,
            bounds,
            dof,
            depth0,
        );
        debug!(
            stage,
            iter,
            step = result.step_len,
            chi_sq = result.chi_sq,
            "line search"
        );

        let mut step_len = result.step_len;
        let mut origin_shift = result.median;

        self.apply(ev, step_len, origin_shift, depth0);
        let outcome = self.set_dir(ev, tt, ctx, aux, 0.01, 5.0, false, false)?;
        if outcome.status == StepStatus::InsufficientData {
            ev.audits.push(ev.hypo.audit(stage, iter, StepStatus::InsufficientData));
            return Ok(StepStatus::InsufficientData);
        }
        if outcome.changed {
            ev.audits.push(ev.hypo.audit(stage, iter, StepStatus::PhaseIdChanged));
            return Ok(StepStatus::PhaseIdChanged);
        }
        if ev.hypo.dispersion < dispersion0 {
            ev.audits.push(ev.hypo.audit(stage, iter, StepStatus::Success));
            return Ok(StepStatus::Success);
        }

        // The full step made things worse: damp back toward the last
        // accepted hypocenter until the dispersion drops or the step becomes
        // too small to matter.
        loop {
            let damp = ctx.damp_factor();
            let next_len = damp * step_len;
            let unchanged = (ev.hypo.origin_time - last.origin_time).abs() <= 0.01
                && (ev.hypo.latitude - last.latitude).abs() <= 1.0e-4
                && (ev.hypo.longitude - last.longitude).abs() <= 1.0e-4
                && (ev.hypo.depth - last.depth).abs() <= 0.01;

            if next_len <= CONV_LIM[stage] || unchanged {
                let status = give_up_status(step_len, unchanged, stage);
                ev.hypo.restore(&last);
                ev.update_travel_times();
                ev.update_geometry();
                ev.hypo.step_len = step_len;
                ev.audits.push(ev.hypo.audit(stage, iter, status));
                debug!(stage, iter, ?status, "damping gave up");
                return Ok(status);
            }

            step_len = next_len;
            origin_shift *= damp;
            ev.hypo.restore(&last);
            // Redo the same step, damped: the re-evaluation above replaced
            // the direction, so put the one we stepped along back.
            ev.hypo.step_dir = dir;
            ev.update_travel_times();
            ev.update_geometry();
            self.apply(ev, step_len, origin_shift, last.depth);

            let outcome = self.set_dir(ev, tt, ctx, aux, 0.01, 5.0, false, false)?;
            if outcome.status == StepStatus::InsufficientData {
                ev.audits.push(ev.hypo.audit(stage, iter, StepStatus::InsufficientData));
                return Ok(StepStatus::InsufficientData);
            }
            if outcome.changed {
                ev.audits.push(ev.hypo.audit(stage, iter, StepStatus::PhaseIdChanged));
                return Ok(StepStatus::PhaseIdChanged);
            }
            if ev.hypo.dispersion < dispersion0 {
                ev.audits.push(ev.hypo.audit(stage, iter, StepStatus::Success));
                return Ok(StepStatus::Success);
            }
        }
    }

    /// Apply a step and the matching origin shift exactly once, refreshing
    /// the event's derived state.
    fn apply(&self, ev: &mut Event, step_len: f64, origin_shift: f64, depth_before: f64) {
        ev.hypo.step_len = step_len;
        ev.hypo.apply_step(step_len);
        let dir = ev.hypo.step_dir;
        ev.hypo.del_h = step_len * (dir[0] * dir[0] + dir[1] * dir[1]).sqrt();
        ev.hypo.del_z = (ev.hypo.depth - depth_before).abs();
        ev.hypo.update_origin(origin_shift);
        ev.update_travel_times();
        ev.update_geometry();
    }
}

/// Classify a damping failure by how far from convergence the step was.
fn give_up_status(step_len: f64, unchanged: bool, stage: usize) -> StepStatus {
    if step_len <= ALMOST * CONV_LIM[stage] {
        StepStatus::NearlyConverged
    } else if unchanged && step_len > STEP_TOL {
        StepStatus::UnstableSolution
    } else {
        StepStatus::DidNotConverge
    }
}

/// Weighted rms of the pick residuals.
fn weighted_rms(wres: &[WeightedResidual]) -> f64 {
    let mut sw2 = 0.0;
    let mut swr2 = 0.0;
    for w in wres {
        if !w.is_depth {
            sw2 += w.weight * w.weight;
            swr2 += (w.weight * w.residual) * (w.weight * w.residual);
        }
    }
    if sw2 > 0.0 {
        (swr2 / sw2).sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{uniform_model, SyntheticNet};
    use rayloc_core::{CratonSet, ZoneStats, DEPTH_MAX, DEPTH_MIN};

    fn empty_aux() -> (CratonSet, ZoneStats) {
        (CratonSet::default(), ZoneStats::new())
    }

    #[test]
    fn set_dir_reports_insufficient_data() {
        let model = uniform_model();
        let net = SyntheticNet::ring(2, 4.0, 10.0);
        let mut ev = net.event();
        let mut ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        let (cratons, zones) = empty_aux();
        let aux = RefData {
            cratons: &cratons,
            zones: &zones,
        };
        let mut stepper = Stepper::new();
        let out = stepper
            .set_dir(&mut ev, &mut tt, &mut ctx, aux, 0.01, 5.0, false, true)
            .unwrap();
        assert_eq!(out.status, StepStatus::InsufficientData);
    }

    #[test]
    fn set_dir_leaves_unit_direction_and_dispersion() {
        let model = uniform_model();
        let net = SyntheticNet::ring(10, 4.0, 10.0)
            .with_noise(0.3)
            .with_start(45.3, 0.0, 10.0, 600.0);
        let mut ev = net.event();
        let mut ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        let (cratons, zones) = empty_aux();
        let aux = RefData {
            cratons: &cratons,
            zones: &zones,
        };
        let mut stepper = Stepper::new();
        let out = stepper
            .set_dir(&mut ev, &mut tt, &mut ctx, aux, 0.01, 5.0, false, true)
            .unwrap();
        assert_eq!(out.status, StepStatus::Success);
        assert!(ev.hypo.dispersion > 0.0);
        let d = ev.hypo.step_dir;
        let norm = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt();
        assert!((norm - 1.0).abs() < 1e-9);
        // Outside every craton, so the source is tectonic
        assert!(ctx.tectonic);
    }

    #[test]
    fn step_reduces_dispersion_for_offset_start() {
        let model = uniform_model();
        // Truth at 45 N, start 0.3 degrees north of it
        let net = SyntheticNet::ring(12, 4.0, 10.0)
            .with_noise(0.2)
            .with_start(45.3, 0.0, 10.0, 600.0);
        let mut ev = net.event();
        let mut ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        let (cratons, zones) = empty_aux();
        let aux = RefData {
            cratons: &cratons,
            zones: &zones,
        };
        let mut stepper = Stepper::new();
        stepper
            .set_dir(&mut ev, &mut tt, &mut ctx, aux, 0.01, 5.0, false, true)
            .unwrap();
        let before = ev.hypo.dispersion;
        ev.hypo.step_len = INIT_STEP;

        let status = stepper
            .make_step(&mut ev, &mut tt, &mut ctx, aux, 0, 0)
            .unwrap();
        assert_eq!(status, StepStatus::Success);
        assert!(ev.hypo.dispersion < before);
        // Moved toward the truth
        assert!(ev.hypo.latitude < 45.3);
        assert_eq!(ev.audits.len(), 1);
    }

    #[test]
    fn depth_stays_clamped_through_steps() {
        let model = uniform_model();
        let net = SyntheticNet::ring(10, 4.0, 5.0)
            .with_noise(0.2)
            .with_start(45.2, 0.1, 650.0, 600.0);
        let mut ev = net.event();
        let mut ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        let (cratons, zones) = empty_aux();
        let aux = RefData {
            cratons: &cratons,
            zones: &zones,
        };
        let mut stepper = Stepper::new();
        for iter in 0..4 {
            let out = stepper
                .set_dir(&mut ev, &mut tt, &mut ctx, aux, 0.01, 5.0, false, true)
                .unwrap();
            if out.status != StepStatus::Success {
                break;
            }
            ev.hypo.step_len = ev.hypo.step_len.max(INIT_STEP);
            let _ = stepper
                .make_step(&mut ev, &mut tt, &mut ctx, aux, 0, iter)
                .unwrap();
            assert!((DEPTH_MIN..=DEPTH_MAX).contains(&ev.hypo.depth));
        }
    }

    #[test]
    fn zone_prior_installs_depth_row() {
        let model = uniform_model();
        let net = SyntheticNet::ring(8, 4.0, 10.0).with_noise(0.2);
        let mut ev = net.event();
        let mut ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        let cratons = CratonSet::default();
        let mut zones = ZoneStats::new();
        zones.insert(
            45.0,
            0.0,
            rayloc_core::ZoneStat {
                mean_depth: 15.0,
                min_depth: 5.0,
                max_depth: 40.0,
            },
        );
        let aux = RefData {
            cratons: &cratons,
            zones: &zones,
        };
        let mut stepper = Stepper::new();
        stepper
            .set_dir(&mut ev, &mut tt, &mut ctx, aux, 0.01, 5.0, false, true)
            .unwrap();
        assert!(ev.hypo.has_bayes_prior());
        assert!(!ev.hypo.analyst_bayes);
        assert_eq!(ev.wres.iter().filter(|w| w.is_depth).count(), 1);
    }

    #[test]
    fn decorrelated_path_steps_too() {
        let model = uniform_model();
        let net = SyntheticNet::ring(12, 4.0, 10.0)
            .with_noise(0.2)
            .with_start(45.25, 0.0, 10.0, 600.0);
        let mut ev = net.event();
        let mut ctx = LocatorContext::new();
        ctx.decorrelate = true;
        let mut tt = TtFacade::new(&model);
        let (cratons, zones) = empty_aux();
        let aux = RefData {
            cratons: &cratons,
            zones: &zones,
        };
        let mut stepper = Stepper::new();
        stepper
            .set_dir(&mut ev, &mut tt, &mut ctx, aux, 0.1, 1.0, true, true)
            .unwrap();
        assert!(!ev.wres_proj.is_empty());
        let before = ev.hypo.dispersion;
        ev.hypo.step_len = INIT_STEP;
        let status = stepper
            .make_step(&mut ev, &mut tt, &mut ctx, aux, 1, 0)
            .unwrap();
        if status == StepStatus::Success {
            assert!(ev.hypo.dispersion < before);
        }
    }
}

//! The location driver.
//!
//! Runs the initial triage once, then up to five refinement stages. Stage
//! zero works the analyst's identifications hard; later stages progressively
//! loosen the phase identification (and switch on decorrelation) so picks
//! can migrate to better branches as the hypocenter settles.

use chrono::DateTime;
use rayloc_core::{
    delta_azimuth, exit_code, CratonSet, Event, ExitCode, LocError, LocResult, LocStatus,
    StepStatus, TrigCache, ZoneStats, DEG2KM,
};
use tracing::{debug, info, warn};

use crate::close_out::{close_out, LocationStats};
use crate::context::LocatorContext;
use crate::initial_id::initial_id;
use crate::quality::{quality_flags, Coverage};
use crate::restimator::Restimator;
use crate::stepper::{RefData, SetDirOutcome, Stepper, CONV_LIM, INIT_STEP, ITER_LIM, STAGE_LIM};
use crate::traveltime::{TravelTimeModel, TtFacade};

/// Per-run options from the request payload.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocateOptions {
    /// Use the regional RSTT travel-time model where available.
    pub use_rstt: bool,
    /// Disable the decorrelation projection.
    pub no_svd: bool,
    /// Diagnostic verbosity.
    pub debug_level: u8,
}

/// Everything the caller needs to report a finished location.
#[derive(Debug, Clone)]
pub struct LocateOutcome {
    pub status: LocStatus,
    pub exit: ExitCode,
    pub stats: LocationStats,
    pub quality: String,
    pub coverage: Coverage,
    /// Total horizontal movement from the starting hypocenter (km).
    pub del_h: f64,
    /// Total depth movement (km).
    pub del_z: f64,
}

/// Single-event locator bound to shared, read-only reference data.
pub struct Locator<'a> {
    model: &'a dyn TravelTimeModel,
    cratons: &'a CratonSet,
    zones: &'a ZoneStats,
}

impl<'a> Locator<'a> {
    pub fn new(
        model: &'a dyn TravelTimeModel,
        cratons: &'a CratonSet,
        zones: &'a ZoneStats,
    ) -> Self {
        Self {
            model,
            cratons,
            zones,
        }
    }

    /// Locate one event in place.
    pub fn locate(&self, ev: &mut Event, opts: &LocateOptions) -> LocResult<LocateOutcome> {
        let mut ctx = LocatorContext::new();
        ctx.rstt = opts.use_rstt;
        ctx.debug_level = opts.debug_level;

        let mut tt = TtFacade::new(self.model);
        let mut stepper = Stepper::new();
        let aux = RefData {
            cratons: self.cratons,
            zones: self.zones,
        };

        ev.hypo.dof =
            rayloc_core::Hypocenter::degrees_of_freedom(ev.hypo.held_loc, ev.hypo.held_depth);
        ev.update_geometry();
        ev.update_travel_times();

        let start_trig = ev.hypo.trig;
        let start_depth = ev.hypo.depth;
        info!(
            origin = %format_origin(ev.hypo.origin_time),
            lat = ev.hypo.latitude,
            lon = ev.hypo.longitude,
            depth = ev.hypo.depth,
            picks = ev.picks.len(),
            "locating event"
        );

        let status = if ev.hypo.held_loc {
            self.run_held(ev, &mut tt, &mut ctx, aux, &mut stepper)
        } else {
            self.run_stages(ev, &mut tt, &mut ctx, aux, &mut stepper, opts)
        };
        let status = match status {
            Ok(status) => status,
            Err(LocError::BadDepth(depth)) => {
                warn!(depth, "travel-time model rejected the source depth");
                LocStatus::BadDepth
            }
            Err(LocError::Numerical(msg)) => {
                warn!(%msg, "numerical failure during iteration");
                LocStatus::SingularMatrix
            }
            Err(other) => return Err(other),
        };

        self.finish(ev, status, start_trig, start_depth, &ctx)
    }

    /// Held locations skip iteration entirely, but the statistics are still
    /// computed as if the solution were free, under a simulated depth prior.
    fn run_held(
        &self,
        ev: &mut Event,
        tt: &mut TtFacade,
        ctx: &mut LocatorContext,
        aux: RefData<'_>,
        stepper: &mut Stepper,
    ) -> LocResult<LocStatus> {
        let spread = if ev.hypo.held_depth { 3.0 } else { 15.0 };
        ev.hypo.set_bayes_prior(ev.hypo.depth, spread, true);
        let out = stepper.set_dir(ev, tt, ctx, aux, 0.01, 5.0, false, true)?;
        Ok(match out.status {
            StepStatus::InsufficientData => LocStatus::InsufficientData,
            _ => LocStatus::Converged,
        })
    }

    fn run_stages(
        &self,
        ev: &mut Event,
        tt: &mut TtFacade,
        ctx: &mut LocatorContext,
        aux: RefData<'_>,
        stepper: &mut Stepper,
        opts: &LocateOptions,
    ) -> LocResult<LocStatus> {
        tt.refresh(&ev.hypo, ctx)?;
        initial_id(ev, tt)?;

        ev.hypo.step_len = INIT_STEP;
        let mut status = LocStatus::Unknown;

        'stages: for stage in 0..STAGE_LIM {
            // Stage 0 trusts the triaged identifications; later stages let
            // the identification float and decorrelate the picks.
            let (other_weight, sticky_weight, re_id) = if stage == 0 {
                (0.01, 5.0, false)
            } else {
                (0.1, 1.0, true)
            };
            ctx.decorrelate = stage >= 1 && !opts.no_svd;

            let SetDirOutcome {
                status: dir_status, ..
            } = stepper.set_dir(ev, tt, ctx, aux, other_weight, sticky_weight, re_id, true)?;
            if dir_status == StepStatus::InsufficientData {
                status = LocStatus::InsufficientData;
                break 'stages;
            }

            let mut iter = 0;
            let mut id_resets = 0;
            while iter < ITER_LIM[stage] {
                match stepper.make_step(ev, tt, ctx, aux, stage, iter)? {
                    StepStatus::Success => {
                        if ev.hypo.step_len <= CONV_LIM[stage] {
                            debug!(stage, iter, "stage converged");
                            status = LocStatus::Converged;
                            continue 'stages;
                        }
                        iter += 1;
                    }
                    StepStatus::PhaseIdChanged => {
                        // Restart the stage's iteration budget, but refuse
                        // to do so forever.
                        id_resets += 1;
                        if id_resets > ITER_LIM[stage] {
                            iter += 1;
                        } else {
                            iter = 0;
                        }
                    }
                    StepStatus::InsufficientData => {
                        status = LocStatus::InsufficientData;
                        break 'stages;
                    }
                    StepStatus::NearlyConverged => {
                        status = LocStatus::NearlyConverged;
                        continue 'stages;
                    }
                    StepStatus::DidNotConverge => {
                        status = LocStatus::DidNotConverge;
                        continue 'stages;
                    }
                    StepStatus::UnstableSolution => {
                        status = LocStatus::UnstableSolution;
                        continue 'stages;
                    }
                }
            }
            if iter >= ITER_LIM[stage] {
                status = LocStatus::DidNotConverge;
            }
        }
        Ok(status)
    }

    fn finish(
        &self,
        ev: &mut Event,
        mut status: LocStatus,
        start_trig: TrigCache,
        start_depth: f64,
        ctx: &LocatorContext,
    ) -> LocResult<LocateOutcome> {
        let (moved_deg, _) = delta_azimuth(&start_trig, &ev.hypo.trig);
        let del_h = moved_deg * DEG2KM;
        let del_z = (ev.hypo.depth - start_depth).abs();

        let coverage = Coverage {
            ph_used: ev.phases_used(),
            del_min: ev.delta_min(),
            azim_gap: ev.azimuthal_gap(),
            lest_gap: ev.robust_gap(),
        };

        let insufficient = matches!(status, LocStatus::InsufficientData | LocStatus::BadDepth);
        let stats = if insufficient {
            // No usable geometry: every statistic is zeroed.
            LocationStats::default()
        } else {
            let decorrelated = ctx.decorrelate && !ev.wres_proj.is_empty();
            let mut rest = Restimator::new();
            let stats = close_out(ev, &mut rest, decorrelated);
            if let Some(failure) = stats.failure {
                if !matches!(status, LocStatus::SingularMatrix | LocStatus::EllipsoidFailed) {
                    status = failure;
                }
            }
            stats
        };

        let depth_held = ev.hypo.held_depth || ev.hypo.held_loc;
        let quality = quality_flags(&stats, &coverage, depth_held, insufficient);
        let exit = exit_code(status, del_h, del_z);
        info!(
            ?status,
            exit = exit.code(),
            %quality,
            del_h,
            del_z,
            "location finished"
        );

        Ok(LocateOutcome {
            status,
            exit,
            stats,
            quality,
            coverage,
            del_h,
            del_z,
        })
    }
}

/// Render an epoch-seconds origin time for the log.
fn format_origin(epoch_seconds: f64) -> String {
    let secs = epoch_seconds.floor() as i64;
    let nanos = ((epoch_seconds - secs as f64) * 1e9) as u32;
    match DateTime::from_timestamp(secs, nanos) {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
        None => format!("{epoch_seconds:.3}"),
    }
}

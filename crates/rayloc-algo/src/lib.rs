//! # rayloc-algo: The Hypocenter Location Engine
//!
//! This crate provides the iterative non-linear location engine: robust
//! rank-sum estimation, phase identification, line search, decorrelation,
//! and close-out statistics.
//!
//! ## The Refinement Loop
//!
//! | Component | Responsibility |
//! |-----------|----------------|
//! | [`initial_id`] | First-pass triage of automatic first arrivals |
//! | [`phase_id`] | Associate picks with theoretical arrivals |
//! | [`restimator`] | Rank-sum dispersion, median/spread, steepest descent |
//! | [`linear_step`] | Bisection line search on linearized residuals |
//! | [`stepper`] | One iteration: re-ID, direction, step, damping |
//! | [`decorr`] | Projection into an uncorrelated virtual-pick basis |
//! | [`close_out`] | Normal matrix, error ellipsoid, data importances |
//! | [`quality`] | GT5 rule and the three-character quality flags |
//! | [`locator`] | The five-stage driver |
//!
//! ## Architecture
//!
//! The engine never owns data: one [`rayloc_core::Event`] owns all mutable
//! state, the travel-time model is an external collaborator behind
//! [`traveltime::TravelTimeModel`], and everything that looks like a global
//! toggle (tectonic flag, damping oscillator, decorrelation switch) lives in
//! a per-event [`context::LocatorContext`] so concurrent events can never
//! interfere.
//!
//! ## Example
//!
//! ```ignore
//! use rayloc_algo::{Locator, LocateOptions};
//!
//! let locator = Locator::new(&tt_model, &cratons, &zones);
//! let outcome = locator.locate(&mut event, &LocateOptions::default())?;
//! println!("exit {} quality {}", outcome.exit.code(), outcome.quality);
//! ```

pub mod close_out;
pub mod context;
pub mod decorr;
pub mod initial_id;
pub mod linear_step;
pub mod locator;
pub mod phase_id;
pub mod quality;
pub mod restimator;
pub mod stepper;
pub mod test_utils;
pub mod traveltime;

pub use close_out::{close_out, EllipAxis, LocationStats, PERPT1D, PERPT2D, PERPT3D};
pub use context::LocatorContext;
pub use decorr::DeCorr;
pub use initial_id::{initial_id, survey};
pub use linear_step::{line_search, RestResult, SearchBounds};
pub use locator::{LocateOptions, LocateOutcome, Locator};
pub use phase_id::{do_id, tt_res_model, PhaseIdOptions};
pub use quality::{is_gt5, quality_flags, Coverage};
pub use restimator::Restimator;
pub use stepper::{RefData, SetDirOutcome, Stepper, CONV_LIM, INIT_STEP, ITER_LIM, STAGE_LIM,
    STEP_LIM};
pub use traveltime::{
    arrival_type, phase_group, uniform_tt, SourceSpec, TravelTimeModel, TtArrival, TtFacade,
    TtRequest, TtSession, UniformVelocityModel, WaveType, UNIFORM_VP, UNIFORM_VPVS,
};

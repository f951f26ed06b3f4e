//! Iteration and run status values.
//!
//! The refinement loop communicates through status codes rather than errors:
//! a stage that fails damping is not an exceptional condition, it simply ends
//! the stage. Only the final [`ExitCode`] is user visible.

use serde::{Deserialize, Serialize};

/// Outcome of a single `set_dir`/`make_step` call inside one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepStatus {
    /// The step reduced the dispersion and was accepted.
    Success,
    /// Phase re-identification moved at least one pick; the driver restarts
    /// the stage's iteration counter.
    PhaseIdChanged,
    /// Fewer than three stations remain used. Fatal for iteration.
    InsufficientData,
    /// Damping bottomed out close to the convergence limit.
    NearlyConverged,
    /// Damping bottomed out well short of the convergence limit.
    DidNotConverge,
    /// The hypocenter stopped moving while the dispersion kept rising.
    UnstableSolution,
}

impl StepStatus {
    /// True for the statuses that terminate the current stage without
    /// terminating the whole run.
    pub fn ends_stage(self) -> bool {
        matches!(
            self,
            StepStatus::NearlyConverged | StepStatus::DidNotConverge | StepStatus::UnstableSolution
        )
    }
}

/// Final disposition of a location run, before exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocStatus {
    /// Iteration finished (converged or damping gave up on the last stage).
    Converged,
    /// Iteration finished close to, but not at, convergence.
    NearlyConverged,
    /// Iteration limits exhausted without convergence.
    DidNotConverge,
    /// The solution oscillated without reducing the dispersion.
    UnstableSolution,
    /// Close-out could not invert the normal matrix.
    SingularMatrix,
    /// Close-out eigen-decomposition failed.
    EllipsoidFailed,
    /// Fewer than three stations used.
    InsufficientData,
    /// The travel-time model rejected the source depth.
    BadDepth,
    /// Anything else.
    Unknown,
}

/// User-visible exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum ExitCode {
    /// Success with hypocenter movement.
    SuccessfulLocation = 0,
    /// Success, but the hypocenter did not move appreciably.
    DidNotMove = 2,
    /// Located, but error statistics could not be computed.
    ErrorsNotComputed = 3,
    /// Status could not be classified.
    UnknownStatus = 4,
    /// The location failed outright.
    LocationFailed = 101,
    /// The event payload was unusable.
    BadEventInput = 110,
    /// The travel-time data was unusable.
    BadTravelTimeData = 113,
    /// The auxiliary reference data was unusable.
    BadAuxData = 114,
}

impl ExitCode {
    /// Numeric process exit status.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Epicenter movement below this is "did not move" (km).
pub const DELTA_TOL: f64 = 0.5;
/// Depth movement below this is "did not move" (km).
pub const DEPTH_TOL: f64 = 2.0;

/// Map a final status plus the total movement onto an exit code.
///
/// The mapping is explicit per branch: convergence statuses split on whether
/// the hypocenter actually moved, close-out failures report that errors were
/// not computed, and data starvation fails the location.
pub fn exit_code(status: LocStatus, del_h: f64, del_z: f64) -> ExitCode {
    match status {
        LocStatus::Converged
        | LocStatus::NearlyConverged
        | LocStatus::DidNotConverge
        | LocStatus::UnstableSolution => {
            if del_h > DELTA_TOL || del_z > DEPTH_TOL {
                ExitCode::SuccessfulLocation
            } else {
                ExitCode::DidNotMove
            }
        }
        LocStatus::SingularMatrix | LocStatus::EllipsoidFailed => ExitCode::ErrorsNotComputed,
        LocStatus::InsufficientData | LocStatus::BadDepth => ExitCode::LocationFailed,
        LocStatus::Unknown => ExitCode::UnknownStatus,
    }
}

//! Line search along the steepest-descent direction.
//!
//! The dispersion is only evaluated on *linearized* residuals: a trial step
//! never re-runs the travel-time model, it projects each residual through
//! the demedianed design row. The search itself is a messy bisection that
//! first finds a bracket (doubling when the start step was too short,
//! halving when it was too long) and then homes in on the minimum.

use rayloc_core::{WeightedResidual, DEPTH_MAX, DEPTH_MIN};

use crate::restimator::Restimator;

/// Result of a dispersion evaluation at one trial step.
#[derive(Debug, Clone, Copy)]
pub struct RestResult {
    /// Step length the trial was evaluated at (km).
    pub step_len: f64,
    /// Median of the linearized pick residuals (s).
    pub median: f64,
    /// Spread of the linearized pick residuals (s).
    pub spread: f64,
    /// Rank-sum dispersion of the linearized residuals.
    pub chi_sq: f64,
}

/// Relative bracket width at which the search stops homing in.
const HOME_IN_TOL: f64 = 0.15;

/// Search parameters for one call.
#[derive(Debug, Clone, Copy)]
pub struct SearchBounds {
    /// Convergence limit for the current stage (km).
    pub step_min: f64,
    /// Step cap for the current stage (km).
    pub step_max: f64,
}

/// Evaluate the linearized dispersion at `step_len` along `dir`.
///
/// When all three degrees of freedom are live the vertical component of the
/// trial is clamped so the trial depth stays inside the model range.
pub fn test_step(
    wres: &mut [WeightedResidual],
    rest: &mut Restimator,
    dir: &[f64; 3],
    step_len: f64,
    dof: usize,
    depth: f64,
) -> RestResult {
    let mut trial = [
        step_len * dir[0],
        step_len * dir[1],
        if dof > 2 { step_len * dir[2] } else { 0.0 },
    ];
    if dof > 2 {
        trial[2] = (depth + trial[2]).clamp(DEPTH_MIN, DEPTH_MAX) - depth;
    }

    for w in wres.iter_mut() {
        w.est_residual = w.linearized_residual(&trial);
    }
    let median = rest.median_est(wres);
    let spread = rest.spread_est(wres);
    rest.de_median_est(wres);
    let chi_sq = rest.penalty_est(wres);
    RestResult {
        step_len,
        median,
        spread,
        chi_sq,
    }
}

/// Find the step length along `dir` that minimizes the linearized
/// dispersion.
pub fn line_search(
    wres: &mut [WeightedResidual],
    rest: &mut Restimator,
    dir: &[f64; 3],
    start_len: f64,
    bounds: SearchBounds,
    dof: usize,
    depth: f64,
) -> RestResult {
    let eval = |wres: &mut [WeightedResidual], rest: &mut Restimator, s: f64| {
        test_step(wres, rest, dir, s, dof, depth)
    };

    let mut r0 = eval(wres, rest, 0.0);
    let mut r1 = eval(wres, rest, start_len.clamp(bounds.step_min, bounds.step_max));
    let mut r2;

    if r0.chi_sq >= r1.chi_sq {
        // Too short: double outward until the dispersion turns back up.
        loop {
            let probe_len = (2.0 * r1.step_len).min(bounds.step_max);
            let probe = eval(wres, rest, probe_len);
            if probe.chi_sq >= r1.chi_sq {
                r2 = probe;
                break;
            }
            if probe_len >= bounds.step_max {
                // Ran into the stage's step cap; take it.
                return probe;
            }
            r0 = r1;
            r1 = probe;
        }
    } else {
        // Too long: halve toward zero until a minimum is bracketed.
        r2 = r1;
        loop {
            let mid_len = 0.5 * (r0.step_len + r2.step_len);
            let mid = eval(wres, rest, mid_len);
            if mid_len <= bounds.step_min {
                // Converged inside the line search
                if mid.chi_sq >= r0.chi_sq {
                    return eval(wres, rest, 0.0);
                }
                return mid;
            }
            if r0.chi_sq < mid.chi_sq {
                // Still heading uphill toward r2; tighten the outer brace.
                r2 = mid;
            } else {
                r1 = mid;
                break;
            }
        }
    }

    // Bracketed: chi_sq(r1) <= min(chi_sq(r0), chi_sq(r2)). Home in.
    while r1.step_len > 0.0
        && (r2.step_len - r0.step_len) / r1.step_len > HOME_IN_TOL
        && r2.step_len - r0.step_len > bounds.step_min
    {
        let lower = eval(wres, rest, 0.5 * (r0.step_len + r1.step_len));
        if lower.chi_sq < r1.chi_sq {
            r2 = r1;
            r1 = lower;
            continue;
        }
        let upper = eval(wres, rest, 0.5 * (r1.step_len + r2.step_len));
        if upper.chi_sq < r1.chi_sq {
            r0 = r1;
            r1 = upper;
        } else {
            r0 = lower;
            r2 = upper;
        }
    }

    // Leave the estimated residuals evaluated at the accepted step.
    eval(wres, rest, r1.step_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayloc_core::PickIdx;

    /// Residuals consistent with a source displaced `offset` km along the
    /// derivative direction, plus a little asymmetric clutter.
    fn displaced_rows(offset: f64) -> Vec<WeightedResidual> {
        let derivs = [
            [0.08, 0.00, 0.01],
            [0.05, 0.05, 0.01],
            [0.00, 0.08, 0.02],
            [-0.05, 0.05, 0.01],
            [-0.08, 0.00, 0.02],
            [-0.05, -0.05, 0.01],
            [0.00, -0.08, 0.02],
            [0.05, -0.05, 0.01],
        ];
        derivs
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let clutter = 0.02 * ((i * 7) as f64).sin();
                let residual = offset * d[0] + clutter;
                let mut w = WeightedResidual::from_pick(PickIdx(i), residual, 1.0, *d);
                w.de_deriv = *d;
                w
            })
            .collect()
    }

    fn bounds() -> SearchBounds {
        SearchBounds {
            step_min: 0.1,
            step_max: 200.0,
        }
    }

    #[test]
    fn finds_the_displacement() {
        let mut wres = displaced_rows(30.0);
        let mut rest = Restimator::new();
        // Direction along +colat, where the displacement actually is
        let dir = [1.0, 0.0, 0.0];
        let result = line_search(&mut wres, &mut rest, &dir, 50.0, bounds(), 3, 10.0);
        assert!(
            (result.step_len - 30.0).abs() < 8.0,
            "step {}",
            result.step_len
        );
        // The dispersion at the found step beats the no-step dispersion
        let at_zero = test_step(&mut wres, &mut rest, &dir, 0.0, 3, 10.0);
        let at_found = test_step(&mut wres, &mut rest, &dir, result.step_len, 3, 10.0);
        assert!(at_found.chi_sq < at_zero.chi_sq);
    }

    #[test]
    fn doubles_out_when_start_is_short() {
        let mut wres = displaced_rows(120.0);
        let mut rest = Restimator::new();
        let dir = [1.0, 0.0, 0.0];
        let result = line_search(&mut wres, &mut rest, &dir, 10.0, bounds(), 3, 10.0);
        assert!(result.step_len > 50.0, "step {}", result.step_len);
    }

    #[test]
    fn caps_at_step_max() {
        let mut wres = displaced_rows(500.0);
        let mut rest = Restimator::new();
        let dir = [1.0, 0.0, 0.0];
        let bounds = SearchBounds {
            step_min: 0.1,
            step_max: 50.0,
        };
        let result = line_search(&mut wres, &mut rest, &dir, 10.0, bounds, 3, 10.0);
        assert!(result.step_len <= 50.0 + 1e-9);
    }

    #[test]
    fn zero_offset_collapses_to_tiny_step() {
        let mut wres = displaced_rows(0.0);
        let mut rest = Restimator::new();
        let dir = [1.0, 0.0, 0.0];
        let result = line_search(&mut wres, &mut rest, &dir, 50.0, bounds(), 3, 10.0);
        assert!(result.step_len < 2.0, "step {}", result.step_len);
    }

    #[test]
    fn depth_component_respects_model_floor() {
        let mut wres = displaced_rows(10.0);
        let mut rest = Restimator::new();
        // Straight up from 5 km depth: any step of 4 km or more clamps to
        // the 1 km floor, so the linearized dispersion stops changing there.
        let dir = [0.0, 0.0, -1.0];
        let r100 = test_step(&mut wres, &mut rest, &dir, 100.0, 3, 5.0);
        let r4 = test_step(&mut wres, &mut rest, &dir, 4.0, 3, 5.0);
        assert!(r100.chi_sq.is_finite());
        assert!((r100.chi_sq - r4.chi_sq).abs() < 1e-12);
    }

    #[test]
    fn held_depth_ignores_vertical_direction() {
        let mut wres = displaced_rows(10.0);
        let mut rest = Restimator::new();
        let r3 = test_step(&mut wres, &mut rest, &[0.0, 0.0, 1.0], 50.0, 2, 10.0);
        let r0 = test_step(&mut wres, &mut rest, &[0.0, 0.0, 1.0], 0.0, 2, 10.0);
        assert!((r3.chi_sq - r0.chi_sq).abs() < 1e-12);
    }
}

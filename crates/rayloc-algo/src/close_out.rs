//! Close-out statistics: normal matrix, confidence intervals, error
//! ellipsoid, and data importances.

use faer::prelude::SpSolver;
use faer::{FaerMat, Mat, Side};
use rayloc_core::{Event, LocStatus, WeightedResidual};
use tracing::debug;

use crate::restimator::Restimator;

/// 90th-percentile scaling of a standard error in one dimension.
pub const PERPT1D: f64 = 2.0285161;
/// 90th-percentile scaling in two dimensions.
pub const PERPT2D: f64 = 2.6465147;
/// 90th-percentile scaling in three dimensions.
pub const PERPT3D: f64 = 3.0834703;

/// One axis of the 90% error ellipsoid.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EllipAxis {
    /// Semi-axis length (km).
    pub semi_len: f64,
    /// Azimuth of the axis (degrees clockwise from north).
    pub azimuth: f64,
    /// Plunge below horizontal (degrees).
    pub plunge: f64,
}

/// The statistical quality report for one located event.
#[derive(Debug, Clone, Default)]
pub struct LocationStats {
    /// 90% confidence interval of the origin time (s).
    pub se_time: f64,
    /// 90% confidence interval in latitude (km).
    pub se_lat: f64,
    /// 90% confidence interval in longitude (km).
    pub se_lon: f64,
    /// 90% confidence interval in depth (km).
    pub se_depth: f64,
    /// Robust spread of the raw residuals (s).
    pub se_resid: f64,
    /// Maximum horizontal projection of the error ellipsoid (km).
    pub err_h: f64,
    /// Maximum vertical projection of the error ellipsoid (km).
    pub err_z: f64,
    /// Equivalent circular radius of the epicentral error ellipse (km).
    pub ave_h: f64,
    /// Data importance of the Bayesian depth constraint.
    pub bayes_import: f64,
    /// Sum of the pick data importances.
    pub import_sum: f64,
    /// Error ellipsoid axes, sorted by semi-length descending.
    pub ellipsoid: [EllipAxis; 3],
    /// Set when the statistics could not be computed.
    pub failure: Option<LocStatus>,
}

/// Compute the close-out statistics, writing per-pick importances back into
/// the event.
pub fn close_out(ev: &mut Event, rest: &mut Restimator, decorrelated: bool) -> LocationStats {
    let mut stats = LocationStats::default();

    rest.median(&mut ev.wres);
    stats.se_resid = rest.spread(&mut ev.wres);

    let n = if ev.hypo.held_depth { 2 } else { 3 };
    let ph_used = ev.phases_used();
    let comp = if decorrelated {
        1.0
    } else {
        (1.22 - 0.309 * ((ph_used + 1) as f64).log10()).max(0.04).sqrt()
    };

    // Normal matrix from the demedianed, weighted design
    let mut rows = if decorrelated {
        ev.wres_proj.clone()
    } else {
        ev.wres.clone()
    };
    rest.median(&mut rows);
    rest.de_median_design(&mut rows);
    let normal = normal_matrix(&rows, n);

    let Some(inverse) = invert(&normal) else {
        debug!("normal matrix is singular; zeroing statistics");
        stats.failure = Some(LocStatus::SingularMatrix);
        for pick in &mut ev.picks {
            pick.weight = 0.0;
        }
        return stats;
    };

    stats.se_time = PERPT1D / comp * stats.se_resid;
    stats.se_lat = PERPT1D / comp * inverse[0][0].max(0.0).sqrt();
    stats.se_lon = PERPT1D / comp * inverse[1][1].max(0.0).sqrt();
    if n > 2 {
        stats.se_depth = PERPT1D / comp * inverse[2][2].max(0.0).sqrt();
    }

    match ellipsoid(&inverse, n, comp) {
        Some((axes, ave_h)) => {
            stats.ellipsoid = axes;
            stats.ave_h = ave_h;
            stats.err_h = axes
                .iter()
                .map(|a| a.semi_len * a.plunge.to_radians().cos())
                .fold(0.0, f64::max);
            stats.err_z = axes
                .iter()
                .map(|a| a.semi_len * a.plunge.to_radians().sin().abs())
                .fold(0.0, f64::max);
        }
        None => {
            debug!("error ellipsoid eigen-decomposition failed");
            stats.failure = Some(LocStatus::EllipsoidFailed);
        }
    }

    importances(ev, rest, n, &mut stats);
    stats
}

/// `A = sum c c^T` over the weighted, demedianed design rows.
fn normal_matrix(rows: &[WeightedResidual], n: usize) -> Vec<Vec<f64>> {
    let mut a = vec![vec![0.0; n]; n];
    for w in rows {
        for i in 0..n {
            for j in 0..n {
                a[i][j] += w.weight * w.de_deriv[i] * w.weight * w.de_deriv[j];
            }
        }
    }
    a
}

/// Dense inverse via LU; `None` when the matrix is singular.
fn invert(a: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let n = a.len();
    if n == 0 {
        return None;
    }
    let mat = Mat::from_fn(n, n, |i, j| a[i][j]);
    let rhs = Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 });
    let lu = mat.partial_piv_lu();
    let sol = lu.solve(&rhs);
    let mut out = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let v = sol.read(i, j);
            if !v.is_finite() {
                return None;
            }
            out[i][j] = v;
        }
    }
    Some(out)
}

/// Closed-form eigen-decomposition of a symmetric 2x2 matrix; eigenpairs
/// ascending.
fn eigen2(a: f64, b: f64, c: f64) -> [(f64, [f64; 2]); 2] {
    let disc = ((a - c) * (a - c) + 4.0 * b * b).sqrt();
    let lo = 0.5 * (a + c - disc);
    let hi = 0.5 * (a + c + disc);
    let vec_for = |lambda: f64| -> [f64; 2] {
        let v = if b.abs() > f64::EPSILON {
            [b, lambda - a]
        } else if (lambda - a).abs() < (lambda - c).abs() {
            [1.0, 0.0]
        } else {
            [0.0, 1.0]
        };
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt().max(f64::EPSILON);
        [v[0] / norm, v[1] / norm]
    };
    [(lo, vec_for(lo)), (hi, vec_for(hi))]
}

/// Azimuth/plunge of an axis direction in the (south, east, down) frame,
/// oriented downward.
fn axis_orientation(u: [f64; 3]) -> (f64, f64) {
    let sign = if u[2] < 0.0 { -1.0 } else { 1.0 };
    let mut azimuth = (sign * u[1]).atan2(-sign * u[0]).to_degrees();
    if azimuth < 0.0 {
        azimuth += 360.0;
    }
    let plunge = (sign * u[2]).min(1.0).asin().to_degrees();
    (azimuth, plunge)
}

/// Error ellipsoid axes and the equivalent epicentral radius.
fn ellipsoid(inverse: &[Vec<f64>], n: usize, comp: f64) -> Option<([EllipAxis; 3], f64)> {
    let mut axes = [EllipAxis::default(); 3];

    if n == 2 {
        let pairs = eigen2(inverse[0][0], inverse[0][1], inverse[1][1]);
        for (k, (lambda, v)) in pairs.iter().enumerate() {
            if !lambda.is_finite() {
                return None;
            }
            let semi = PERPT2D / comp * lambda.max(0.0).sqrt();
            let (azimuth, _) = axis_orientation([v[0], v[1], 0.0]);
            axes[k] = EllipAxis {
                semi_len: semi,
                azimuth,
                plunge: 0.0,
            };
        }
        axes.sort_by(|a, b| {
            b.semi_len
                .partial_cmp(&a.semi_len)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let ave_h = PERPT1D * (axes[0].semi_len * axes[1].semi_len).sqrt() / PERPT2D;
        return Some((axes, ave_h));
    }

    let mat = Mat::from_fn(n, n, |i, j| inverse[i][j]);
    let evd = mat.selfadjoint_eigendecomposition(Side::Lower);
    let s = evd.s_diagonal().col(0);
    let u = evd.u();
    for k in 0..3 {
        let lambda = s.read(k);
        let vec = [u.read(0, k), u.read(1, k), u.read(2, k)];
        if !lambda.is_finite() || vec.iter().any(|x| !x.is_finite()) {
            return None;
        }
        let semi = PERPT3D / comp * lambda.max(0.0).sqrt();
        let (azimuth, plunge) = axis_orientation(vec);
        axes[k] = EllipAxis {
            semi_len: semi,
            azimuth,
            plunge,
        };
    }
    axes.sort_by(|a, b| {
        b.semi_len
            .partial_cmp(&a.semi_len)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Equivalent circular radius from the epicentral 2x2 sub-matrix
    let pairs = eigen2(inverse[0][0], inverse[0][1], inverse[1][1]);
    let a = PERPT2D / comp * pairs[0].0.max(0.0).sqrt();
    let b = PERPT2D / comp * pairs[1].0.max(0.0).sqrt();
    let ave_h = PERPT1D * (a * b).sqrt() / PERPT2D;
    Some((axes, ave_h))
}

/// Data importances against the raw (never projected) design.
fn importances(ev: &mut Event, rest: &mut Restimator, n: usize, stats: &mut LocationStats) {
    let mut rows = ev.wres.clone();
    rest.median(&mut rows);
    rest.de_median_design(&mut rows);
    let normal = normal_matrix(&rows, n);
    let Some(inverse) = invert(&normal) else {
        return;
    };

    let mut total = 0.0;
    for w in &rows {
        let Some(pick_idx) = w.pick else {
            continue;
        };
        let mut c = [0.0; 3];
        for i in 0..n {
            c[i] = w.weight * w.de_deriv[i];
        }
        let mut importance = 0.0;
        for i in 0..n {
            for j in 0..n {
                importance += c[i] * inverse[i][j] * c[j];
            }
        }
        ev.pick_mut(pick_idx).importance = importance;
        total += importance;
    }
    stats.import_sum = total;
    if n > 2 && ev.hypo.has_bayes_prior() {
        stats.bayes_import = inverse[2][2] * ev.hypo.bayes_weight * ev.hypo.bayes_weight;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LocatorContext;
    use crate::phase_id::{do_id, PhaseIdOptions};
    use crate::test_utils::{uniform_model, SyntheticNet};
    use crate::traveltime::TtFacade;

    fn identified(n: usize, noise: f64) -> Event {
        let model = uniform_model();
        let net = SyntheticNet::ring(n, 4.0, 10.0).with_noise(noise);
        let mut ev = net.event();
        let ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        tt.refresh(&ev.hypo, &ctx).unwrap();
        do_id(
            &mut ev,
            &tt,
            &PhaseIdOptions {
                other_weight: 0.01,
                sticky_weight: 5.0,
                re_id: true,
                re_weight: true,
            },
        )
        .unwrap();
        ev
    }

    #[test]
    fn eigen2_recovers_diagonal() {
        let [(lo, _), (hi, _)] = eigen2(2.0, 0.0, 5.0);
        assert!((lo - 2.0).abs() < 1e-12);
        assert!((hi - 5.0).abs() < 1e-12);
    }

    #[test]
    fn eigen2_symmetric_off_diagonal() {
        let [(lo, vlo), (hi, vhi)] = eigen2(3.0, 1.0, 3.0);
        assert!((lo - 2.0).abs() < 1e-12);
        assert!((hi - 4.0).abs() < 1e-12);
        // Orthogonal eigenvectors
        let dot = vlo[0] * vhi[0] + vlo[1] * vhi[1];
        assert!(dot.abs() < 1e-12);
    }

    #[test]
    fn axis_orientation_is_downward_and_wrapped() {
        // Straight-down axis
        let (_, plunge) = axis_orientation([0.0, 0.0, 1.0]);
        assert!((plunge - 90.0).abs() < 1e-9);
        // Up-pointing axis flips to the downward representative
        let (_, plunge_up) = axis_orientation([0.0, 0.0, -1.0]);
        assert!((plunge_up - 90.0).abs() < 1e-9);
        // Horizontal north-pointing axis: u = (south=-1, 0, 0)
        let (azimuth, plunge_h) = axis_orientation([-1.0, 0.0, 0.0]);
        assert!(plunge_h.abs() < 1e-9);
        assert!(azimuth.abs() < 1e-9 || (azimuth - 360.0).abs() < 1e-9);
    }

    #[test]
    fn well_observed_event_gets_finite_errors() {
        let mut ev = identified(20, 0.8);
        let mut rest = Restimator::new();
        let stats = close_out(&mut ev, &mut rest, false);
        assert!(stats.failure.is_none());
        assert!(stats.se_time > 0.0);
        assert!(stats.se_lat > 0.0 && stats.se_lat < 100.0);
        assert!(stats.se_lon > 0.0 && stats.se_lon < 100.0);
        assert!(stats.se_depth > 0.0);
        assert!(stats.ave_h > 0.0);
        // Axes sorted descending
        assert!(stats.ellipsoid[0].semi_len >= stats.ellipsoid[1].semi_len);
        assert!(stats.ellipsoid[1].semi_len >= stats.ellipsoid[2].semi_len);
        // Projections never exceed the longest semi-axis
        assert!(stats.err_h <= stats.ellipsoid[0].semi_len + 1e-9);
        assert!(stats.err_z <= stats.ellipsoid[0].semi_len + 1e-9);
    }

    #[test]
    fn se_time_tracks_the_spread() {
        let mut ev = identified(30, 0.8);
        let mut rest = Restimator::new();
        let stats = close_out(&mut ev, &mut rest, false);
        let comp = (1.22 - 0.309 * ((ev.phases_used() + 1) as f64).log10())
            .max(0.04)
            .sqrt();
        assert!((stats.se_time - PERPT1D / comp * stats.se_resid).abs() < 1e-9);
    }

    #[test]
    fn importances_are_positive_and_written_back() {
        let mut ev = identified(15, 0.5);
        let mut rest = Restimator::new();
        let stats = close_out(&mut ev, &mut rest, false);
        assert!(stats.import_sum > 0.0);
        let mut wrote = 0;
        for pick in &ev.picks {
            if pick.used {
                assert!(pick.importance >= 0.0);
                if pick.importance > 0.0 {
                    wrote += 1;
                }
            }
        }
        assert!(wrote > 0);
    }

    #[test]
    fn singular_normal_matrix_zeroes_everything() {
        // One station cannot constrain three parameters
        let mut ev = identified(1, 0.0);
        let mut rest = Restimator::new();
        let stats = close_out(&mut ev, &mut rest, false);
        assert_eq!(stats.failure, Some(LocStatus::SingularMatrix));
        assert_eq!(stats.se_lat, 0.0);
        assert_eq!(stats.se_depth, 0.0);
        for pick in &ev.picks {
            assert_eq!(pick.weight, 0.0);
        }
    }

    #[test]
    fn held_depth_uses_two_dof() {
        let mut ev = identified(20, 0.5);
        ev.hypo.held_depth = true;
        let mut rest = Restimator::new();
        let stats = close_out(&mut ev, &mut rest, false);
        assert!(stats.failure.is_none());
        assert_eq!(stats.se_depth, 0.0);
        assert_eq!(stats.ellipsoid[2].semi_len, 0.0);
        for axis in &stats.ellipsoid {
            assert_eq!(axis.plunge, 0.0);
        }
    }
}

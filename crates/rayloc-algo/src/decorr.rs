//! Decorrelation of correlated picks.
//!
//! Nearby stations recording the same phase see correlated path anomalies,
//! which makes the rank-sum estimator overconfident. The cure is to project
//! the weighted residuals into the eigenbasis of the pick correlation
//! matrix: each retained eigenpair becomes one virtual, uncorrelated "pick"
//! whose weight is the inverse square root of its eigenvalue.

use faer::{FaerMat, Mat, Side};
use rayloc_core::{Event, LocError, LocResult, WeightedResidual};

use crate::traveltime::arrival_type;

/// Largest correlation matrix we are willing to eigen-solve.
pub const MAX_CORR: usize = 450;
/// Fraction of the trace the retained eigenvalues must cover.
pub const EV_LIM: f64 = 0.95;
/// An eigenvalue may only be discarded when it is this small relative to the
/// largest one.
pub const EV_THRESH: f64 = 0.01;
/// Correlation half-width over inter-station separation (degrees).
pub const COV_SEP: f64 = 5.0;

/// Decorrelation state: the eigenbasis of the current pick correlation
/// matrix. Rebuilt whenever identifications change, re-applied cheaply
/// otherwise.
#[derive(Debug, Clone, Default)]
pub struct DeCorr {
    /// Indices of the pick rows of the raw weighted residuals that survived
    /// the size cap.
    kept_rows: Vec<usize>,
    /// Retained eigenvectors, one inner vector per virtual pick.
    eigvecs: Vec<Vec<f64>>,
    /// Matching eigenvalues, ascending.
    eigvals: Vec<f64>,
    pick_count: usize,
}

impl DeCorr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pick rows the basis was built for.
    pub fn pick_count(&self) -> usize {
        self.pick_count
    }

    /// Correlation between two pick rows: a Gaussian taper over the
    /// inter-station separation, zero across wave types.
    fn correlation(ev: &Event, a: &WeightedResidual, b: &WeightedResidual) -> f64 {
        let (Some(pa), Some(pb)) = (a.pick, b.pick) else {
            return 0.0;
        };
        let pick_a = ev.pick(pa);
        let pick_b = ev.pick(pb);
        if arrival_type(&pick_a.phase) != arrival_type(&pick_b.phase) {
            return 0.0;
        }
        let sta_a = ev.station(pick_a.station);
        let sta_b = ev.station(pick_b.station);
        let (sep, _) = rayloc_core::delta_azimuth(&sta_a.trig, &sta_b.trig);
        (-0.5 * (sep / COV_SEP) * (sep / COV_SEP)).exp()
    }

    /// Rebuild the correlation matrix and its eigen-decomposition from the
    /// raw weighted residuals.
    pub fn update(&mut self, ev: &Event) -> LocResult<()> {
        let pick_rows: Vec<usize> = (0..ev.wres.len())
            .filter(|&i| !ev.wres[i].is_depth)
            .collect();
        self.pick_count = pick_rows.len();
        self.eigvecs.clear();
        self.eigvals.clear();
        self.kept_rows = pick_rows.clone();
        if self.kept_rows.len() < 2 {
            return Ok(());
        }

        // Full correlation matrix over pick rows
        let n = self.kept_rows.len();
        let mut corr = vec![vec![0.0; n]; n];
        for i in 0..n {
            corr[i][i] = 1.0;
            for j in (i + 1)..n {
                let c = Self::correlation(ev, &ev.wres[self.kept_rows[i]], &ev.wres[self.kept_rows[j]]);
                corr[i][j] = c;
                corr[j][i] = c;
            }
        }

        // Too many picks: greedily remove the most-correlated rows until the
        // eigenproblem is tractable.
        if n > MAX_CORR {
            let mut alive: Vec<bool> = vec![true; n];
            let mut sums: Vec<f64> = (0..n)
                .map(|i| corr[i].iter().map(|c| c.abs()).sum::<f64>())
                .collect();
            let mut remaining = n;
            while remaining > MAX_CORR {
                let Some(worst) = (0..n).filter(|&i| alive[i]).max_by(|&a, &b| {
                    sums[a].partial_cmp(&sums[b]).unwrap_or(std::cmp::Ordering::Equal)
                }) else {
                    break;
                };
                alive[worst] = false;
                remaining -= 1;
                for i in 0..n {
                    if alive[i] {
                        sums[i] -= corr[i][worst].abs();
                    }
                }
            }
            let filtered: Vec<usize> = (0..n).filter(|&i| alive[i]).collect();
            let reduced: Vec<Vec<f64>> = filtered
                .iter()
                .map(|&i| filtered.iter().map(|&j| corr[i][j]).collect())
                .collect();
            self.kept_rows = filtered.iter().map(|&i| self.kept_rows[i]).collect();
            corr = reduced;
        }

        let m = self.kept_rows.len();
        let mat = Mat::from_fn(m, m, |i, j| corr[i][j]);
        let evd = mat.selfadjoint_eigendecomposition(Side::Lower);
        let s = evd.s_diagonal().col(0);
        let u = evd.u();

        let mut pairs: Vec<(f64, Vec<f64>)> = (0..m)
            .map(|k| {
                let lambda = s.read(k);
                let vec: Vec<f64> = (0..m).map(|i| u.read(i, k)).collect();
                (lambda, vec)
            })
            .collect();
        if pairs.iter().any(|(l, v)| !l.is_finite() || v.iter().any(|x| !x.is_finite())) {
            return Err(LocError::Numerical(
                "pick covariance eigen-decomposition failed".into(),
            ));
        }
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        // Discard the smallest eigenvalues while the discarded mass stays
        // under (1 - EV_LIM) of the trace and each discarded eigenvalue is
        // negligible next to the largest.
        let trace: f64 = pairs.iter().map(|(l, _)| l.max(0.0)).sum();
        let max_ev = pairs.last().map(|(l, _)| *l).unwrap_or(0.0);
        let budget = (1.0 - EV_LIM) * trace;
        let mut dropped = 0.0;
        let mut first_kept = 0;
        for (k, (lambda, _)) in pairs.iter().enumerate() {
            if k + 1 == pairs.len() {
                break;
            }
            let l = lambda.max(0.0);
            if dropped + l <= budget && l <= EV_THRESH * max_ev {
                dropped += l;
                first_kept = k + 1;
            } else {
                break;
            }
        }

        for (lambda, vec) in pairs.into_iter().skip(first_kept) {
            if lambda > f64::EPSILON {
                self.eigvals.push(lambda);
                self.eigvecs.push(vec);
            }
        }
        Ok(())
    }

    /// Project the raw weighted residuals into the retained eigenbasis,
    /// rebuilding `ev.wres_proj`. The Bayesian depth row does not correlate
    /// with picks and passes through unchanged.
    pub fn project(&self, ev: &mut Event) {
        let mut projected: Vec<WeightedResidual> = Vec::with_capacity(self.eigvals.len() + 1);

        // Weighted reference sums resolve the eigenvector sign ambiguity:
        // depth derivative first, then the colatitude derivative, then the
        // residual itself.
        let mut ref_sums = [0.0; 3];
        for &row in &self.kept_rows {
            let w = &ev.wres[row];
            ref_sums[0] += w.weight * w.deriv[2];
            ref_sums[1] += w.weight * w.deriv[0];
            ref_sums[2] += w.weight * w.residual;
        }

        for (k, vec) in self.eigvecs.iter().enumerate() {
            let lambda = self.eigvals[k];
            let mut residual = 0.0;
            let mut deriv = [0.0; 3];
            for (i, &row) in self.kept_rows.iter().enumerate() {
                let w = &ev.wres[row];
                let u = vec[i];
                residual += u * w.weight * w.residual;
                for c in 0..3 {
                    deriv[c] += u * w.weight * w.deriv[c];
                }
            }

            let orient = [deriv[2], deriv[0], residual];
            let mut flip = false;
            for (component, reference) in orient.iter().zip(ref_sums.iter()) {
                if component.abs() > f64::EPSILON && reference.abs() > f64::EPSILON {
                    flip = component * reference < 0.0;
                    break;
                }
            }
            if flip {
                residual = -residual;
                for c in deriv.iter_mut() {
                    *c = -*c;
                }
            }

            projected.push(WeightedResidual::projected(
                residual,
                1.0 / lambda.sqrt(),
                deriv,
            ));
        }

        if let Some(depth_row) = ev.wres.iter().find(|w| w.is_depth) {
            projected.push(depth_row.clone());
        }
        ev.wres_proj = projected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase_id::{do_id, PhaseIdOptions};
    use crate::test_utils::{uniform_model, SyntheticNet};
    use crate::traveltime::TtFacade;
    use crate::context::LocatorContext;

    fn identified_event() -> Event {
        let model = uniform_model();
        let net = SyntheticNet::ring(10, 4.0, 10.0).with_noise(0.5);
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
        do_id(&mut ev, &tt, &opts).unwrap();
        ev
    }

    #[test]
    fn projection_produces_virtual_picks() {
        let mut ev = identified_event();
        let mut decorr = DeCorr::new();
        decorr.update(&ev).unwrap();
        assert!(decorr.pick_count() >= 10);
        decorr.project(&mut ev);
        assert!(!ev.wres_proj.is_empty());
        assert!(ev.wres_proj.len() <= ev.wres.len());
        for w in &ev.wres_proj {
            assert!(w.pick.is_none());
            assert!(w.weight.is_finite() && w.weight > 0.0);
        }
    }

    #[test]
    fn depth_row_passes_through_unprojected() {
        let mut ev = identified_event();
        ev.hypo.set_bayes_prior(12.0, 10.0, false);
        let residual = ev.hypo.bayes_depth - ev.hypo.depth;
        ev.wres
            .push(WeightedResidual::bayes_depth(residual, ev.hypo.bayes_weight));

        let mut decorr = DeCorr::new();
        decorr.update(&ev).unwrap();
        decorr.project(&mut ev);
        let depth_rows: Vec<_> = ev.wres_proj.iter().filter(|w| w.is_depth).collect();
        assert_eq!(depth_rows.len(), 1);
        assert_eq!(depth_rows[0].residual, residual);
        assert_eq!(depth_rows[0].deriv, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn retained_mass_covers_the_trace_budget() {
        let ev = identified_event();
        let mut decorr = DeCorr::new();
        decorr.update(&ev).unwrap();
        let kept: f64 = decorr.eigvals.iter().sum();
        // Correlation matrix trace equals the pick count
        let trace = decorr.pick_count() as f64;
        assert!(kept >= EV_LIM * trace - 1e-9, "kept {kept} of {trace}");
    }

    #[test]
    fn identical_stations_collapse_to_fewer_virtual_picks() {
        // Two tight sub-arrays: picks within each are heavily correlated, so
        // at least one eigenvalue should be discardable.
        let model = uniform_model();
        let mut net = SyntheticNet::ring(12, 4.0, 10.0).with_noise(0.2);
        // Shrink the ring into two clumps by reusing two bearings
        let mut ev = {
            for i in 0..12 {
                let clump = if i < 6 { 0.0 } else { std::f64::consts::PI };
                let lat = 45.0 + 4.0 * f64::cos(clump) + 0.01 * i as f64;
                let lon = 4.0 * f64::sin(clump) / 45.0f64.to_radians().cos() + 0.01 * i as f64;
                net.stations_mut()[i] = (format!("S{i:03}"), lat, lon);
            }
            net.event()
        };
        let ctx = LocatorContext::new();
        let mut tt = TtFacade::new(&model);
        tt.refresh(&ev.hypo, &ctx).unwrap();
        let opts = PhaseIdOptions {
            other_weight: 0.01,
            sticky_weight: 5.0,
            re_id: true,
            re_weight: true,
        };
        do_id(&mut ev, &tt, &opts).unwrap();

        let mut decorr = DeCorr::new();
        decorr.update(&ev).unwrap();
        assert!(decorr.eigvals.len() < decorr.pick_count());
    }
}

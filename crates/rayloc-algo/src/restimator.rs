//! Rank-sum (R-estimator) statistics.
//!
//! The locator minimizes a rank-sum dispersion rather than a sum of squares:
//! each sorted, weighted residual is multiplied by a score drawn from a
//! fixed, antisymmetric, non-decreasing score function, which makes the
//! penalty robust against the heavy-tailed residuals phase misidentification
//! produces. The same machinery yields the steepest-descent direction.

use rayloc_core::WeightedResidual;

/// Normalization making the median absolute deviation a consistent estimate
/// of a Gaussian sigma.
pub const MAD_NORM: f64 = 1.482580;

/// Breakpoint abscissas of the optimal score generating function, on (0, 1).
const SCORE_GEN_P: [f64; 29] = [
    0.0, 0.1375, 0.1625, 0.1875, 0.2125, 0.2375, 0.2625, 0.2875, 0.3125, 0.3375, 0.3625, 0.3875,
    0.4125, 0.4375, 0.4625, 0.4875, 0.5125, 0.5375, 0.5625, 0.5875, 0.6125, 0.6375, 0.6625,
    0.6875, 0.7125, 0.7375, 0.7625, 0.7875, 1.0,
];

/// Breakpoint ordinates of the score generating function.
const SCORE_GEN_F: [f64; 29] = [
    0.0775, 0.0775, 0.1546, 0.5328, 0.8679, 1.1714, 1.4542, 1.7266, 1.9987, 2.2802, 2.5803,
    2.9068, 3.2657, 3.6603, 4.0912, 4.5554, 5.0470, 5.5572, 6.0754, 6.5906, 7.0919, 7.5702,
    8.0194, 8.4365, 8.8223, 9.1812, 9.5207, 9.8515, 10.1714,
];

/// Piecewise-linear interpolation of the score generating function.
fn score_gen(p: f64) -> f64 {
    if p <= SCORE_GEN_P[0] {
        return SCORE_GEN_F[0];
    }
    for k in 1..SCORE_GEN_P.len() {
        if p <= SCORE_GEN_P[k] {
            let frac = (p - SCORE_GEN_P[k - 1]) / (SCORE_GEN_P[k] - SCORE_GEN_P[k - 1]);
            return SCORE_GEN_F[k - 1] + frac * (SCORE_GEN_F[k] - SCORE_GEN_F[k - 1]);
        }
    }
    SCORE_GEN_F[SCORE_GEN_F.len() - 1]
}

/// Rank-sum estimator over a list of weighted residuals.
///
/// Holds the score cache (rebuilt only when the data count changes) and the
/// medians of the raw and linearized residuals between calls.
#[derive(Debug, Clone, Default)]
pub struct Restimator {
    scores: Vec<f64>,
    /// Median of the raw pick residuals from the last `median()` call.
    pub median: f64,
    /// Median of the linearized pick residuals from the last `median_est()`.
    pub est_median: f64,
}

impl Restimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Median of the pick residuals (the depth row is excluded). Returns 0
    /// with fewer than two picks.
    pub fn median(&mut self, wres: &mut [WeightedResidual]) -> f64 {
        self.median = Self::median_by(wres, |w| w.residual);
        self.median
    }

    /// Median of the linearized residuals.
    pub fn median_est(&mut self, wres: &mut [WeightedResidual]) -> f64 {
        self.est_median = Self::median_by(wres, |w| w.est_residual);
        self.est_median
    }

    /// Normalized median absolute deviation of the pick residuals about the
    /// last median.
    pub fn spread(&mut self, wres: &mut [WeightedResidual]) -> f64 {
        let median = self.median;
        MAD_NORM * Self::median_by(wres, |w| (w.residual - median).abs())
    }

    /// Normalized MAD of the linearized residuals.
    pub fn spread_est(&mut self, wres: &mut [WeightedResidual]) -> f64 {
        let median = self.est_median;
        MAD_NORM * Self::median_by(wres, |w| (w.est_residual - median).abs())
    }

    /// Subtract the median from each pick residual; the depth row is left
    /// alone. Idempotent: afterwards the stored median is zero.
    pub fn de_median_res(&mut self, wres: &mut [WeightedResidual]) {
        for w in wres.iter_mut() {
            if !w.is_depth {
                w.residual -= self.median;
            }
        }
        self.median = 0.0;
    }

    /// Subtract the estimated-residual median from each pick's estimated
    /// residual.
    pub fn de_median_est(&mut self, wres: &mut [WeightedResidual]) {
        for w in wres.iter_mut() {
            if !w.is_depth {
                w.est_residual -= self.est_median;
            }
        }
        self.est_median = 0.0;
    }

    /// Subtract the derivative vector of the median row(s) from every pick
    /// row, producing the demedianed design matrix. For an even pick count
    /// the two middle rows (in residual order) are averaged.
    pub fn de_median_design(&mut self, wres: &mut [WeightedResidual]) {
        let mut order: Vec<usize> = (0..wres.len()).filter(|&i| !wres[i].is_depth).collect();
        if order.len() < 2 {
            for i in 0..wres.len() {
                if !wres[i].is_depth {
                    wres[i].de_deriv = wres[i].deriv;
                }
            }
            return;
        }
        order.sort_by(|&a, &b| {
            wres[a]
                .residual
                .partial_cmp(&wres[b].residual)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let n = order.len();
        let mut dmed = [0.0; 3];
        if n % 2 == 0 {
            let lo = order[n / 2 - 1];
            let hi = order[n / 2];
            for i in 0..3 {
                dmed[i] = 0.5 * (wres[lo].deriv[i] + wres[hi].deriv[i]);
            }
        } else {
            let mid = order[n / 2];
            dmed = wres[mid].deriv;
        }

        for w in wres.iter_mut() {
            if !w.is_depth {
                for i in 0..3 {
                    w.de_deriv[i] = w.deriv[i] - dmed[i];
                }
            }
        }
    }

    /// Rank-sum dispersion. Sorts the rows in place by their weighted,
    /// demedianed residual and sums score-weighted sorted values; `steepest`
    /// must be called on the same ordering.
    pub fn penalty(&mut self, wres: &mut [WeightedResidual]) -> f64 {
        let median = self.median;
        for w in wres.iter_mut() {
            w.sort_key = if w.is_depth {
                w.residual * w.weight
            } else {
                (w.residual - median) * w.weight
            };
        }
        self.dispersion(wres)
    }

    /// Rank-sum dispersion of the linearized residuals.
    pub fn penalty_est(&mut self, wres: &mut [WeightedResidual]) -> f64 {
        let median = self.est_median;
        for w in wres.iter_mut() {
            w.sort_key = if w.is_depth {
                w.est_residual * w.weight
            } else {
                (w.est_residual - median) * w.weight
            };
        }
        self.dispersion(wres)
    }

    /// Steepest-descent direction in the ordering left by the most recent
    /// penalty pass. Unit 2-norm, or zero if the gradient vanishes.
    pub fn steepest(&self, wres: &[WeightedResidual], n: usize) -> [f64; 3] {
        let mut s = [0.0; 3];
        for (j, w) in wres.iter().enumerate() {
            let score = self.scores.get(j).copied().unwrap_or(0.0);
            for i in 0..n {
                s[i] += score * w.weight * w.de_deriv[i];
            }
        }
        let norm = (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt();
        if norm > 0.0 {
            for v in &mut s {
                *v /= norm;
            }
        }
        s
    }

    /// Scores for `n` data: the generating function sampled at j/(n+1),
    /// zero-meaned, then antisymmetrized about the middle rank.
    pub fn scores(&mut self, n: usize) -> &[f64] {
        self.ensure_scores(n);
        &self.scores
    }

    fn ensure_scores(&mut self, n: usize) {
        if self.scores.len() == n {
            return;
        }
        let mut scores: Vec<f64> = (1..=n).map(|j| score_gen(j as f64 / (n + 1) as f64)).collect();
        let mean = scores.iter().sum::<f64>() / n.max(1) as f64;
        for s in &mut scores {
            *s -= mean;
        }
        for j in 0..n / 2 {
            let s = 0.5 * (scores[j] - scores[n - 1 - j]);
            scores[j] = s;
            scores[n - 1 - j] = -s;
        }
        if n % 2 == 1 && n > 0 {
            scores[n / 2] = 0.0;
        }
        self.scores = scores;
    }

    fn dispersion(&mut self, wres: &mut [WeightedResidual]) -> f64 {
        wres.sort_by(|a, b| {
            a.sort_key
                .partial_cmp(&b.sort_key)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        self.ensure_scores(wres.len());
        wres.iter()
            .enumerate()
            .map(|(j, w)| self.scores[j] * w.sort_key)
            .sum()
    }

    fn median_by<F: Fn(&WeightedResidual) -> f64>(wres: &mut [WeightedResidual], f: F) -> f64 {
        let mut values = Vec::with_capacity(wres.len());
        for w in wres.iter_mut() {
            if !w.is_depth {
                w.sort_key = f(w);
                values.push(w.sort_key);
            }
        }
        if values.len() < 2 {
            return 0.0;
        }
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let n = values.len();
        if n % 2 == 0 {
            0.5 * (values[n / 2 - 1] + values[n / 2])
        } else {
            values[n / 2]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayloc_core::PickIdx;

    fn rows(residuals: &[f64]) -> Vec<WeightedResidual> {
        residuals
            .iter()
            .enumerate()
            .map(|(i, &r)| WeightedResidual::from_pick(PickIdx(i), r, 1.0, [0.1, 0.2, 0.3]))
            .collect()
    }

    #[test]
    fn median_even_and_odd() {
        let mut rest = Restimator::new();
        let mut odd = rows(&[3.0, -1.0, 7.0]);
        assert_eq!(rest.median(&mut odd), 3.0);

        let mut even = rows(&[3.0, -1.0, 7.0, 5.0]);
        assert_eq!(rest.median(&mut even), 4.0);
    }

    #[test]
    fn median_needs_two_picks() {
        let mut rest = Restimator::new();
        let mut one = rows(&[42.0]);
        assert_eq!(rest.median(&mut one), 0.0);
    }

    #[test]
    fn median_skips_depth_row() {
        let mut rest = Restimator::new();
        let mut wres = rows(&[1.0, 3.0]);
        wres.push(WeightedResidual::bayes_depth(500.0, 1.0));
        assert_eq!(rest.median(&mut wres), 2.0);
    }

    #[test]
    fn demedian_centers_and_is_idempotent() {
        let mut rest = Restimator::new();
        let mut wres = rows(&[3.0, -1.0, 7.0, 5.0]);
        rest.median(&mut wres);
        rest.de_median_res(&mut wres);
        assert_eq!(rest.median(&mut wres), 0.0);

        let snapshot: Vec<f64> = wres.iter().map(|w| w.residual).collect();
        rest.de_median_res(&mut wres);
        let again: Vec<f64> = wres.iter().map(|w| w.residual).collect();
        assert_eq!(snapshot, again);
    }

    #[test]
    fn spread_is_normalized_mad() {
        let mut rest = Restimator::new();
        let mut wres = rows(&[-2.0, -1.0, 0.0, 1.0, 2.0]);
        rest.median(&mut wres);
        let spread = rest.spread(&mut wres);
        assert!((spread - MAD_NORM).abs() < 1e-12);
    }

    #[test]
    fn scores_are_zero_mean_and_antisymmetric() {
        let mut rest = Restimator::new();
        for n in [4usize, 5, 12, 29, 30] {
            let scores = rest.scores(n).to_vec();
            let sum: f64 = scores.iter().sum();
            assert!(sum.abs() < 1e-9, "n={n} sum={sum}");
            for j in 0..n {
                assert!(
                    (scores[j] + scores[n - 1 - j]).abs() < 1e-12,
                    "n={n} j={j}"
                );
            }
            // Non-decreasing
            for pair in scores.windows(2) {
                assert!(pair[1] >= pair[0] - 1e-12);
            }
        }
    }

    #[test]
    fn penalty_prefers_tight_residuals() {
        let mut rest = Restimator::new();
        let mut tight = rows(&[-0.5, -0.2, 0.0, 0.2, 0.5]);
        rest.median(&mut tight);
        rest.de_median_res(&mut tight);
        let p_tight = rest.penalty(&mut tight);

        let mut loose = rows(&[-5.0, -2.0, 0.0, 2.0, 5.0]);
        rest.median(&mut loose);
        rest.de_median_res(&mut loose);
        let p_loose = rest.penalty(&mut loose);
        assert!(p_tight < p_loose);
        assert!(p_tight > 0.0);
    }

    #[test]
    fn steepest_is_unit_or_zero() {
        let mut rest = Restimator::new();
        let mut wres = rows(&[0.4, -1.4, 2.2, 0.9, -0.6]);
        // Give the rows distinct derivative structure
        for (i, w) in wres.iter_mut().enumerate() {
            w.deriv = [0.05 * i as f64, 0.1 - 0.02 * i as f64, 0.03];
            w.de_deriv = w.deriv;
        }
        rest.median(&mut wres);
        rest.de_median_res(&mut wres);
        rest.de_median_design(&mut wres);
        rest.penalty(&mut wres);
        let dir = rest.steepest(&wres, 3);
        let norm = (dir[0] * dir[0] + dir[1] * dir[1] + dir[2] * dir[2]).sqrt();
        assert!((norm - 1.0).abs() < 1e-9);

        // All-identical design rows demedian to zero and the gradient vanishes
        let mut flat = rows(&[0.4, -1.4, 2.2]);
        rest.median(&mut flat);
        rest.de_median_res(&mut flat);
        rest.de_median_design(&mut flat);
        rest.penalty(&mut flat);
        let dir = rest.steepest(&flat, 3);
        assert_eq!(dir, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn demedian_design_even_uses_middle_pair() {
        let mut rest = Restimator::new();
        let mut wres = rows(&[1.0, 2.0, 3.0, 4.0]);
        for (i, w) in wres.iter_mut().enumerate() {
            w.deriv = [i as f64, 2.0 * i as f64, 0.0];
        }
        rest.median(&mut wres);
        rest.de_median_design(&mut wres);
        // Middle rows by residual are indices 1 and 2: dmed = [1.5, 3.0, 0]
        assert!((wres[0].de_deriv[0] + 1.5).abs() < 1e-12);
        assert!((wres[3].de_deriv[1] - 3.0).abs() < 1e-12);
    }
}

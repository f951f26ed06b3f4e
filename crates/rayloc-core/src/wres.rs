//! Weighted residuals: the rows the R-estimator works on.

use crate::pick::PickIdx;

/// One row of the robust estimation problem: either a pick's travel-time
/// residual or the Bayesian depth constraint.
///
/// The transient `sort_key` carries whichever derived quantity the current
/// rank-sum pass sorts on, so repeated re-sorts never allocate index arrays.
#[derive(Debug, Clone)]
pub struct WeightedResidual {
    /// True for the single Bayesian depth row; its residual is in km rather
    /// than seconds and it is exempt from demedianing.
    pub is_depth: bool,
    /// Residual: seconds for picks, km for the depth constraint.
    pub residual: f64,
    /// Weight applied to the residual.
    pub weight: f64,
    /// Derivatives of travel time with respect to (latitude, longitude,
    /// depth), all in s/km.
    pub deriv: [f64; 3],
    /// Demedianed derivatives (design matrix rows after the median row is
    /// subtracted).
    pub de_deriv: [f64; 3],
    /// Estimated residual after a linearized trial step.
    pub est_residual: f64,
    /// Transient sort key for the current rank-sum pass.
    pub sort_key: f64,
    /// Originating pick, for data-importance write-back. `None` for the
    /// depth row and for decorrelated virtual picks.
    pub pick: Option<PickIdx>,
}

impl WeightedResidual {
    /// A pick row.
    pub fn from_pick(pick: PickIdx, residual: f64, weight: f64, deriv: [f64; 3]) -> Self {
        Self {
            is_depth: false,
            residual,
            weight,
            deriv,
            de_deriv: deriv,
            est_residual: residual,
            sort_key: 0.0,
            pick: Some(pick),
        }
    }

    /// The Bayesian depth constraint row. The residual is the prior depth
    /// minus the current depth (km) and the only nonzero derivative is with
    /// respect to depth.
    pub fn bayes_depth(residual_km: f64, weight: f64) -> Self {
        let deriv = [0.0, 0.0, 1.0];
        Self {
            is_depth: true,
            residual: residual_km,
            weight,
            deriv,
            de_deriv: deriv,
            est_residual: residual_km,
            sort_key: 0.0,
            pick: None,
        }
    }

    /// A virtual row produced by the decorrelation projection.
    pub fn projected(residual: f64, weight: f64, deriv: [f64; 3]) -> Self {
        Self {
            is_depth: false,
            residual,
            weight,
            deriv,
            de_deriv: deriv,
            est_residual: residual,
            sort_key: 0.0,
            pick: None,
        }
    }

    /// Residual after a linearized step `trial` (km in each coordinate),
    /// using the demedianed design row.
    pub fn linearized_residual(&self, trial: &[f64; 3]) -> f64 {
        self.residual
            - trial[0] * self.de_deriv[0]
            - trial[1] * self.de_deriv[1]
            - trial[2] * self.de_deriv[2]
    }
}

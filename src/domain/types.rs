//! Shared domain types for the GMDH model search.
//!
//! These types are intentionally kept lightweight and serializable so they can
//! be:
//!
//! - used in-memory during the layered search
//! - embedded in the saved model document
//! - reloaded later for prediction

use serde::{Deserialize, Serialize};

/// Least-squares solver used to fit candidate coefficients.
///
/// All three minimize `‖A·w − b‖²`; they trade speed against robustness to
/// ill-conditioned candidate systems. A singular system never fails the fit:
/// every solver falls back to a finite (possibly minimum-norm) solution and
/// the candidate simply scores badly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Solver {
    /// Normal equations via Cholesky. Fastest, weakest on collinear inputs.
    Fast,
    /// SVD pseudoinverse. Robust to rank deficiency, minimum-norm solution.
    Accurate,
    /// Column-pivoted Householder QR.
    Balanced,
}

/// Feature expansion used by the pair-based algorithms (Mia, Ria).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolynomialType {
    /// `[1, u, v]`
    Linear,
    /// `[1, u, v, u·v]`
    LinearCov,
    /// `[1, u, v, u·v, u², v²]`
    Quadratic,
}

impl PolynomialType {
    /// Number of coefficients for a two-input combination.
    pub fn arity(self) -> usize {
        match self {
            PolynomialType::Linear => 3,
            PolynomialType::LinearCov => 4,
            PolynomialType::Quadratic => 6,
        }
    }
}

/// External selection criterion.
///
/// All values are non-negative; lower is better. Scores are comparable only
/// within a single criterion configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionType {
    Regularity,
    SymRegularity,
    Stability,
    SymStability,
    UnbiasedOutputs,
    SymUnbiasedOutputs,
    UnbiasedCoeffs,
    AbsoluteNoiseImmunity,
    SymAbsoluteNoiseImmunity,
}

/// Which layered search strategy a model runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Combi,
    Multi,
    Mia,
    Ria,
}

impl Algorithm {
    /// Human-readable label for progress output and error messages.
    pub fn display_name(self) -> &'static str {
        match self {
            Algorithm::Combi => "COMBI",
            Algorithm::Multi => "MULTI",
            Algorithm::Mia => "MIA",
            Algorithm::Ria => "RIA",
        }
    }

    /// Pair algorithms expand candidates with a `PolynomialType` basis;
    /// the others use the multilinear basis over their chosen inputs.
    pub fn is_pairwise(self) -> bool {
        matches!(self, Algorithm::Mia | Algorithm::Ria)
    }
}

/// One evaluated polynomial combination.
///
/// `inputs` index the variable pool of the layer the combination belongs to:
/// original features for Combi/Multi, the previous layer's survivor outputs
/// (Mia), or survivor outputs followed by the originals (Ria). Coefficients
/// are immutable once the layer is fitted; `error` is the external criterion
/// value used for ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Combination {
    pub inputs: Vec<usize>,
    pub coeffs: Vec<f64>,
    #[serde(skip)]
    pub error: f64,
}

/// One generation of surviving combinations.
#[derive(Debug, Clone)]
pub struct Layer {
    pub combinations: Vec<Combination>,
    /// Mean of the smallest `p_average` candidate errors of this generation.
    pub error: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polynomial_arity_matches_basis() {
        assert_eq!(PolynomialType::Linear.arity(), 3);
        assert_eq!(PolynomialType::LinearCov.arity(), 4);
        assert_eq!(PolynomialType::Quadratic.arity(), 6);
    }

    #[test]
    fn algorithm_tags_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Algorithm::Combi).unwrap(), "\"combi\"");
        assert_eq!(serde_json::to_string(&Algorithm::Ria).unwrap(), "\"ria\"");
        assert_eq!(
            serde_json::to_string(&PolynomialType::LinearCov).unwrap(),
            "\"linear_cov\""
        );
    }
}

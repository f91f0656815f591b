//! External selection criteria.
//!
//! A criterion scores one fitted candidate using data that did not determine
//! its coefficients: the internal train/test split made inside `fit`. With
//!
//! - `w_tr` = coefficients fitted on the training part,
//! - `w_te` = coefficients fitted on the test part,
//! - `w_all` = coefficients fitted on both parts together,
//!
//! the nine single criteria are fixed formulas over the predictions these
//! coefficient sets produce (see `CriterionType`). Only the pieces a formula
//! actually references are computed.
//!
//! Compound forms:
//! - `parallel` blends two criteria as `alpha·e1 + (1−alpha)·e2`.
//! - `sequential` ranks every candidate by the first criterion, then
//!   re-scores the leading `top` candidates with the second; candidates
//!   outside the leaders keep their first-stage order below them.
//!
//! Scores are non-negative and lower is better; a non-finite score is mapped
//! to infinity so a degenerate candidate loses without aborting the search.

use nalgebra::{DMatrix, DVector};

use crate::domain::{CriterionType, Solver};
use crate::error::GmdhError;
use crate::math::solve_least_squares;

/// Criterion configuration: a single type or a compound of two.
#[derive(Debug, Clone)]
pub struct Criterion {
    form: Form,
    solver: Solver,
}

#[derive(Debug, Clone)]
enum Form {
    Single {
        kind: CriterionType,
    },
    Parallel {
        first: CriterionType,
        second: CriterionType,
        alpha: f64,
    },
    Sequential {
        first: CriterionType,
        second: CriterionType,
        top: usize,
    },
}

impl Default for Criterion {
    fn default() -> Self {
        Criterion::single(CriterionType::Regularity, Solver::Fast)
    }
}

impl Criterion {
    pub fn single(kind: CriterionType, solver: Solver) -> Self {
        Self {
            form: Form::Single { kind },
            solver,
        }
    }

    /// Weighted blend of two criteria; `alpha` must lie strictly in (0, 1).
    pub fn parallel(
        first: CriterionType,
        second: CriterionType,
        alpha: f64,
        solver: Solver,
    ) -> Result<Self, GmdhError> {
        if !(alpha.is_finite() && alpha > 0.0 && alpha < 1.0) {
            return Err(GmdhError::invalid_argument(format!(
                "Parallel criterion alpha must be in (0, 1), got {alpha}."
            )));
        }
        Ok(Self {
            form: Form::Parallel {
                first,
                second,
                alpha,
            },
            solver,
        })
    }

    /// Two-stage ranking; `top = 0` re-scores roughly half the candidates.
    pub fn sequential(
        first: CriterionType,
        second: CriterionType,
        top: usize,
        solver: Solver,
    ) -> Self {
        Self {
            form: Form::Sequential { first, second, top },
            solver,
        }
    }

    pub fn solver(&self) -> Solver {
        self.solver
    }

    /// First-stage score plus the training-part coefficients the candidate
    /// will carry if it survives.
    pub(crate) fn evaluate(&self, sys: &CandidateSystem<'_>) -> (f64, DVector<f64>) {
        let w_tr = solve_least_squares(self.solver, &sys.a_tr, sys.y_tr);
        let mut ctx = ScoreContext::new(self.solver, sys, &w_tr);
        let error = match &self.form {
            Form::Single { kind } => ctx.score(*kind),
            Form::Parallel {
                first,
                second,
                alpha,
            } => alpha * ctx.score(*first) + (1.0 - alpha) * ctx.score(*second),
            Form::Sequential { first, .. } => ctx.score(*first),
        };
        (sanitize(error), w_tr)
    }

    /// Number of leaders the second sequential stage re-scores, if any.
    pub(crate) fn sequential_top(&self, n_candidates: usize) -> Option<usize> {
        match &self.form {
            Form::Sequential { top, .. } => {
                let t = if *top == 0 {
                    (n_candidates / 2).max(1)
                } else {
                    *top
                };
                Some(t.min(n_candidates))
            }
            _ => None,
        }
    }

    /// Second-stage score for a sequential leader.
    pub(crate) fn rescore(&self, sys: &CandidateSystem<'_>) -> f64 {
        let Form::Sequential { second, .. } = &self.form else {
            unreachable!("rescore is only called for sequential criteria");
        };
        let w_tr = solve_least_squares(self.solver, &sys.a_tr, sys.y_tr);
        let mut ctx = ScoreContext::new(self.solver, sys, &w_tr);
        sanitize(ctx.score(*second))
    }
}

/// One candidate's design matrices over the internal split.
pub(crate) struct CandidateSystem<'a> {
    pub a_tr: DMatrix<f64>,
    pub a_te: DMatrix<f64>,
    pub y_tr: &'a DVector<f64>,
    pub y_te: &'a DVector<f64>,
}

/// Lazily materializes `w_te`, `w_all` and the stacked system.
struct ScoreContext<'a> {
    solver: Solver,
    sys: &'a CandidateSystem<'a>,
    w_tr: &'a DVector<f64>,
    w_te: Option<DVector<f64>>,
    w_all: Option<DVector<f64>>,
    stacked: Option<(DMatrix<f64>, DVector<f64>)>,
}

impl<'a> ScoreContext<'a> {
    fn new(solver: Solver, sys: &'a CandidateSystem<'a>, w_tr: &'a DVector<f64>) -> Self {
        Self {
            solver,
            sys,
            w_tr,
            w_te: None,
            w_all: None,
            stacked: None,
        }
    }

    fn w_te(&mut self) -> DVector<f64> {
        if self.w_te.is_none() {
            self.w_te = Some(solve_least_squares(
                self.solver,
                &self.sys.a_te,
                self.sys.y_te,
            ));
        }
        self.w_te.clone().unwrap()
    }

    fn stacked(&mut self) -> (DMatrix<f64>, DVector<f64>) {
        if self.stacked.is_none() {
            let n_tr = self.sys.a_tr.nrows();
            let n_te = self.sys.a_te.nrows();
            let k = self.sys.a_tr.ncols();
            let mut a = DMatrix::zeros(n_tr + n_te, k);
            a.view_mut((0, 0), (n_tr, k)).copy_from(&self.sys.a_tr);
            a.view_mut((n_tr, 0), (n_te, k)).copy_from(&self.sys.a_te);
            let mut y = DVector::zeros(n_tr + n_te);
            y.rows_mut(0, n_tr).copy_from(self.sys.y_tr);
            y.rows_mut(n_tr, n_te).copy_from(self.sys.y_te);
            self.stacked = Some((a, y));
        }
        self.stacked.clone().unwrap()
    }

    fn w_all(&mut self) -> DVector<f64> {
        if self.w_all.is_none() {
            let (a, y) = self.stacked();
            self.w_all = Some(solve_least_squares(self.solver, &a, &y));
        }
        self.w_all.clone().unwrap()
    }

    fn score(&mut self, kind: CriterionType) -> f64 {
        let sys = self.sys;
        match kind {
            CriterionType::Regularity => mse(&(&sys.a_te * self.w_tr), sys.y_te),
            CriterionType::SymRegularity => {
                let w_te = self.w_te();
                mse(&(&sys.a_te * self.w_tr), sys.y_te) + mse(&(&sys.a_tr * &w_te), sys.y_tr)
            }
            CriterionType::Stability => {
                let (a, y) = self.stacked();
                mse(&(&a * self.w_tr), &y)
            }
            CriterionType::SymStability => {
                let w_te = self.w_te();
                let (a, y) = self.stacked();
                mse(&(&a * self.w_tr), &y) + mse(&(&a * &w_te), &y)
            }
            CriterionType::UnbiasedOutputs => {
                let w_te = self.w_te();
                mse(&(&sys.a_te * self.w_tr), &(&sys.a_te * &w_te))
            }
            CriterionType::SymUnbiasedOutputs => {
                let w_te = self.w_te();
                mse(&(&sys.a_te * self.w_tr), &(&sys.a_te * &w_te))
                    + mse(&(&sys.a_tr * self.w_tr), &(&sys.a_tr * &w_te))
            }
            CriterionType::UnbiasedCoeffs => {
                let w_te = self.w_te();
                (self.w_tr - &w_te).norm_squared()
            }
            CriterionType::AbsoluteNoiseImmunity => {
                let w_te = self.w_te();
                let w_all = self.w_all();
                noise_immunity(&sys.a_te, self.w_tr, &w_te, &w_all)
            }
            CriterionType::SymAbsoluteNoiseImmunity => {
                let w_te = self.w_te();
                let w_all = self.w_all();
                noise_immunity(&sys.a_te, self.w_tr, &w_te, &w_all)
                    + noise_immunity(&sys.a_tr, &w_te, self.w_tr, &w_all)
            }
        }
    }
}

fn mse(a: &DVector<f64>, b: &DVector<f64>) -> f64 {
    (a - b).norm_squared() / a.len() as f64
}

/// `|Σ (ŷ(w_fit) − ŷ(w_other))·(ŷ(w_all) − ŷ(w_fit))| / n` on one split side.
fn noise_immunity(
    a: &DMatrix<f64>,
    w_fit: &DVector<f64>,
    w_other: &DVector<f64>,
    w_all: &DVector<f64>,
) -> f64 {
    let p_fit = a * w_fit;
    let p_other = a * w_other;
    let p_all = a * w_all;
    ((&p_fit - &p_other).dot(&(&p_all - &p_fit)) / a.nrows() as f64).abs()
}

fn sanitize(error: f64) -> f64 {
    if error.is_finite() { error } else { f64::INFINITY }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Split where `y = 2*x` holds exactly on both sides.
    fn exact_system() -> (DMatrix<f64>, DMatrix<f64>, DVector<f64>, DVector<f64>) {
        let a_tr = DMatrix::from_row_slice(3, 2, &[1.0, 1.0, 1.0, 2.0, 1.0, 3.0]);
        let a_te = DMatrix::from_row_slice(2, 2, &[1.0, 4.0, 1.0, 5.0]);
        let y_tr = DVector::from_row_slice(&[2.0, 4.0, 6.0]);
        let y_te = DVector::from_row_slice(&[8.0, 10.0]);
        (a_tr, a_te, y_tr, y_te)
    }

    #[test]
    fn exact_model_scores_zero_under_every_single_criterion() {
        let (a_tr, a_te, y_tr, y_te) = exact_system();
        let sys = CandidateSystem {
            a_tr,
            a_te,
            y_tr: &y_tr,
            y_te: &y_te,
        };
        for kind in [
            CriterionType::Regularity,
            CriterionType::SymRegularity,
            CriterionType::Stability,
            CriterionType::SymStability,
            CriterionType::UnbiasedOutputs,
            CriterionType::SymUnbiasedOutputs,
            CriterionType::UnbiasedCoeffs,
            CriterionType::AbsoluteNoiseImmunity,
            CriterionType::SymAbsoluteNoiseImmunity,
        ] {
            let criterion = Criterion::single(kind, Solver::Accurate);
            let (error, w_tr) = criterion.evaluate(&sys);
            assert!(error < 1e-18, "{kind:?} scored {error}");
            assert!((w_tr[0] - 0.0).abs() < 1e-9);
            assert!((w_tr[1] - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn regularity_measures_test_side_mse() {
        // Train side fits y = x exactly; the test side is shifted by 3, so the
        // regularity error is 9 on both test rows.
        let a_tr = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 2.0]);
        let a_te = DMatrix::from_row_slice(2, 2, &[1.0, 3.0, 1.0, 4.0]);
        let y_tr = DVector::from_row_slice(&[1.0, 2.0]);
        let y_te = DVector::from_row_slice(&[6.0, 7.0]);
        let sys = CandidateSystem {
            a_tr,
            a_te,
            y_tr: &y_tr,
            y_te: &y_te,
        };
        let (error, _) = Criterion::single(CriterionType::Regularity, Solver::Accurate).evaluate(&sys);
        assert!((error - 9.0).abs() < 1e-9, "got {error}");
    }

    #[test]
    fn parallel_alpha_blends_toward_each_component() {
        let (a_tr, a_te, y_tr, y_te) = exact_system();
        // Perturb the test targets so regularity and unbiased-coeffs differ.
        let y_te = DVector::from_row_slice(&[y_te[0] + 1.0, y_te[1] - 1.0]);
        let sys = CandidateSystem {
            a_tr,
            a_te,
            y_tr: &y_tr,
            y_te: &y_te,
        };

        let (e1, _) = Criterion::single(CriterionType::Regularity, Solver::Accurate).evaluate(&sys);
        let (e2, _) =
            Criterion::single(CriterionType::UnbiasedCoeffs, Solver::Accurate).evaluate(&sys);
        let (near_first, _) = Criterion::parallel(
            CriterionType::Regularity,
            CriterionType::UnbiasedCoeffs,
            0.999,
            Solver::Accurate,
        )
        .unwrap()
        .evaluate(&sys);
        let (near_second, _) = Criterion::parallel(
            CriterionType::Regularity,
            CriterionType::UnbiasedCoeffs,
            0.001,
            Solver::Accurate,
        )
        .unwrap()
        .evaluate(&sys);

        assert!((near_first - e1).abs() < (e1 - e2).abs() * 0.01 + 1e-9);
        assert!((near_second - e2).abs() < (e1 - e2).abs() * 0.01 + 1e-9);
    }

    #[test]
    fn parallel_rejects_alpha_outside_unit_interval() {
        for alpha in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            let result = Criterion::parallel(
                CriterionType::Regularity,
                CriterionType::Stability,
                alpha,
                Solver::Fast,
            );
            assert!(result.is_err(), "alpha {alpha} accepted");
        }
    }

    #[test]
    fn sequential_top_defaults_to_half() {
        let c = Criterion::sequential(
            CriterionType::Regularity,
            CriterionType::Stability,
            0,
            Solver::Fast,
        );
        assert_eq!(c.sequential_top(10), Some(5));
        assert_eq!(c.sequential_top(1), Some(1));
        let c = Criterion::sequential(
            CriterionType::Regularity,
            CriterionType::Stability,
            3,
            Solver::Fast,
        );
        assert_eq!(c.sequential_top(10), Some(3));
        assert_eq!(c.sequential_top(2), Some(2));
    }
}

//! Least squares solvers.
//!
//! Every candidate combination produces a small regression problem
//!
//! ```text
//! minimize ‖A·w − b‖²
//! ```
//!
//! where A has one row per internal training sample and one column per basis
//! term. The search solves thousands of these, so the solver is selectable:
//!
//! - `Fast`: normal equations `AᵀA·w = Aᵀb` by Cholesky. Cheapest; weakest
//!   when AᵀA is ill-conditioned.
//! - `Balanced`: column-pivoted Householder QR on A itself.
//! - `Accurate`: SVD with a small tolerance; yields the minimum-norm solution
//!   for rank-deficient systems.
//!
//! Failure semantics: a singular or rank-deficient system never aborts the
//! search. `Fast` retries with a tiny ridge on the diagonal and then falls
//! back to SVD; `Balanced` falls back to SVD when R has a negligible pivot.
//! The returned vector is always finite; a degenerate candidate just ends up
//! with a large external error.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::domain::Solver;

/// Relative pivot threshold below which the QR path treats R as singular.
const QR_PIVOT_RTOL: f64 = 1e-10;

/// Singular-value cutoff for the SVD solve.
const SVD_EPS: f64 = 1e-12;

/// Solve a least squares problem with the requested solver.
pub fn solve_least_squares(solver: Solver, a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    match solver {
        Solver::Fast => solve_fast(a, b),
        Solver::Balanced => solve_balanced(a, b),
        Solver::Accurate => solve_accurate(a, b),
    }
}

fn solve_fast(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    let ata = a.transpose() * a;
    let atb = a.transpose() * b;

    if let Some(w) = cholesky_solve(&ata, &atb) {
        return w;
    }

    // Ridge retry: a tiny diagonal shift keeps AᵀA positive definite without
    // visibly perturbing well-scaled problems.
    let k = ata.nrows();
    let eps = 1e-12 * (ata.trace() / k as f64).max(1.0);
    let mut ridged = ata.clone();
    for i in 0..k {
        ridged[(i, i)] += eps;
    }
    if let Some(w) = cholesky_solve(&ridged, &atb) {
        return w;
    }

    solve_accurate(a, b)
}

/// Cholesky solve with a backward check on the normal equations.
///
/// Cholesky on a numerically singular AᵀA can "succeed" and hand back a wildly
/// inaccurate vector; verifying `AᵀA·w ≈ Aᵀb` catches that case so the caller
/// can move on to the stabilized paths.
fn cholesky_solve(ata: &DMatrix<f64>, atb: &DVector<f64>) -> Option<DVector<f64>> {
    let chol = Cholesky::new(ata.clone())?;
    let w = chol.solve(atb);
    if !w.iter().all(|v| v.is_finite()) {
        return None;
    }

    let residual = (ata * &w - atb).norm();
    let scale = ata.norm() * w.norm() + atb.norm();
    if residual <= 1e-8 * scale.max(1.0) {
        Some(w)
    } else {
        None
    }
}

fn solve_balanced(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    // Pivoted QR handles the tall case; an underdetermined system has no
    // square R to back-substitute, so it takes the pseudoinverse path.
    if a.nrows() < a.ncols() {
        return solve_accurate(a, b);
    }

    let qr = a.clone().col_piv_qr();
    let r = qr.r();

    // R's diagonal is ordered by the column pivoting; a collapsed trailing
    // pivot means the candidate columns are linearly dependent.
    let mut max_diag = 0.0_f64;
    let mut min_diag = f64::INFINITY;
    for i in 0..r.nrows().min(r.ncols()) {
        let d = r[(i, i)].abs();
        max_diag = max_diag.max(d);
        min_diag = min_diag.min(d);
    }
    if !(max_diag.is_finite()) || min_diag <= QR_PIVOT_RTOL * max_diag {
        return solve_accurate(a, b);
    }

    let mut z = qr.q().transpose() * b;
    if !r.solve_upper_triangular_mut(&mut z) {
        return solve_accurate(a, b);
    }
    qr.p().inv_permute_rows(&mut z);

    if z.iter().all(|v| v.is_finite()) {
        z
    } else {
        solve_accurate(a, b)
    }
}

fn solve_accurate(a: &DMatrix<f64>, b: &DVector<f64>) -> DVector<f64> {
    let svd = a.clone().svd(true, true);
    match svd.solve(b, SVD_EPS) {
        Ok(w) if w.iter().all(|v| v.is_finite()) => w,
        _ => DVector::zeros(a.ncols()),
    }
}

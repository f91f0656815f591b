//! Fitted-model core: basis expansion and polynomial evaluation.
//!
//! The search and the predictor rely on two primitive operations:
//! - build a design row for a combination over the current variable pool
//!   (for least squares)
//! - evaluate a fitted combination on one pool row (for layer outputs,
//!   predictions and forecasts)
//!
//! Pair algorithms (Mia, Ria) expand two inputs with the configured
//! `PolynomialType`; Combi and Multi use the multilinear basis
//! `[1, x_i1, …, x_ik]` over their chosen inputs. A one-input combination is
//! always multilinear `[1, u]`; that is the shape of the single-feature
//! fallback layer.

use nalgebra::{DMatrix, DVector};

use crate::domain::{Algorithm, Combination, Layer, PolynomialType};
use crate::error::GmdhError;

/// A fitted model: the kept layers plus the terminal best combination.
///
/// Combination inputs are pool indices: original features for Combi/Multi at
/// every layer, the previous layer's survivor outputs for Mia, and survivor
/// outputs followed by the originals for Ria.
#[derive(Debug, Clone)]
pub(crate) struct ModelCore {
    pub algorithm: Algorithm,
    pub polynomial_type: PolynomialType,
    pub n_features: usize,
    pub layers: Vec<Layer>,
    /// Index of the best combination within the last layer.
    pub best_index: usize,
}

/// Coefficient count for a combination with `n_inputs` inputs.
pub(crate) fn combination_arity(
    algorithm: Algorithm,
    polynomial_type: PolynomialType,
    n_inputs: usize,
) -> usize {
    if algorithm.is_pairwise() && n_inputs == 2 {
        polynomial_type.arity()
    } else {
        n_inputs + 1
    }
}

/// Fill `out` with the pair basis `φ(u, v)`.
pub(crate) fn fill_pair_row(polynomial_type: PolynomialType, u: f64, v: f64, out: &mut [f64]) {
    out[0] = 1.0;
    out[1] = u;
    out[2] = v;
    match polynomial_type {
        PolynomialType::Linear => {}
        PolynomialType::LinearCov => {
            out[3] = u * v;
        }
        PolynomialType::Quadratic => {
            out[3] = u * v;
            out[4] = u * u;
            out[5] = v * v;
        }
    }
}

/// Build the design matrix for one candidate over `row_count` pool rows
/// starting at `row_start`.
pub(crate) fn design_matrix(
    algorithm: Algorithm,
    polynomial_type: PolynomialType,
    pool: &DMatrix<f64>,
    inputs: &[usize],
    row_start: usize,
    row_count: usize,
) -> DMatrix<f64> {
    let arity = combination_arity(algorithm, polynomial_type, inputs.len());
    let mut a = DMatrix::zeros(row_count, arity);

    if algorithm.is_pairwise() && inputs.len() == 2 {
        let mut row = vec![0.0; arity];
        for r in 0..row_count {
            let u = pool[(row_start + r, inputs[0])];
            let v = pool[(row_start + r, inputs[1])];
            fill_pair_row(polynomial_type, u, v, &mut row);
            for (c, value) in row.iter().enumerate() {
                a[(r, c)] = *value;
            }
        }
    } else {
        for r in 0..row_count {
            a[(r, 0)] = 1.0;
            for (c, &ix) in inputs.iter().enumerate() {
                a[(r, c + 1)] = pool[(row_start + r, ix)];
            }
        }
    }

    a
}

/// Evaluate a fitted combination on one pool row.
pub(crate) fn eval_combination(
    algorithm: Algorithm,
    polynomial_type: PolynomialType,
    comb: &Combination,
    values: &[f64],
) -> f64 {
    if algorithm.is_pairwise() && comb.inputs.len() == 2 {
        let mut row = vec![0.0; comb.coeffs.len()];
        fill_pair_row(polynomial_type, values[comb.inputs[0]], values[comb.inputs[1]], &mut row);
        row.iter().zip(comb.coeffs.iter()).map(|(a, b)| a * b).sum()
    } else {
        let mut acc = comb.coeffs[0];
        for (c, &ix) in comb.inputs.iter().enumerate() {
            acc += comb.coeffs[c + 1] * values[ix];
        }
        acc
    }
}

/// Evaluate a fitted combination over every row of a pool matrix.
pub(crate) fn combination_outputs(
    algorithm: Algorithm,
    polynomial_type: PolynomialType,
    comb: &Combination,
    pool: &DMatrix<f64>,
) -> DVector<f64> {
    let a = design_matrix(algorithm, polynomial_type, pool, &comb.inputs, 0, pool.nrows());
    a * DVector::from_column_slice(&comb.coeffs)
}

impl ModelCore {
    pub fn best_combination(&self) -> &Combination {
        let last = self.layers.last().expect("fitted model has at least one layer");
        &last.combinations[self.best_index]
    }

    /// Evaluate the model on one sample of original features.
    ///
    /// Combi/Multi combinations reference originals directly; Mia and Ria
    /// walk the layer chain bottom-up, rebuilding each layer's variable pool
    /// from the previous one.
    pub fn evaluate_row(&self, x: &[f64]) -> f64 {
        match self.algorithm {
            Algorithm::Combi | Algorithm::Multi => {
                eval_combination(self.algorithm, self.polynomial_type, self.best_combination(), x)
            }
            Algorithm::Mia | Algorithm::Ria => {
                let mut pool: Vec<f64> = x.to_vec();
                let last = self.layers.len() - 1;
                for (li, layer) in self.layers.iter().enumerate() {
                    if li == last {
                        return eval_combination(
                            self.algorithm,
                            self.polynomial_type,
                            &layer.combinations[self.best_index],
                            &pool,
                        );
                    }
                    let mut next: Vec<f64> = layer
                        .combinations
                        .iter()
                        .map(|c| eval_combination(self.algorithm, self.polynomial_type, c, &pool))
                        .collect();
                    if self.algorithm == Algorithm::Ria {
                        next.extend_from_slice(x);
                    }
                    pool = next;
                }
                unreachable!("layer walk always returns at the last layer")
            }
        }
    }

    /// Predict one value per row of `x`.
    pub fn predict_rows(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, GmdhError> {
        validate_prediction_rows(x, self.n_features)?;
        Ok(x.iter().map(|row| self.evaluate_row(row)).collect())
    }

    /// Recursive time-series forecast.
    ///
    /// The last row of `x` seeds the lag window; each prediction is appended
    /// to the window (shifting it left by one) and fed back in.
    pub fn forecast(&self, x: &[Vec<f64>], steps: usize) -> Result<Vec<f64>, GmdhError> {
        if steps == 0 {
            return Err(GmdhError::invalid_argument(
                "Forecast length must be at least 1.",
            ));
        }
        validate_prediction_rows(x, self.n_features)?;

        let mut window = x[x.len() - 1].clone();
        let mut out = Vec::with_capacity(steps);
        for _ in 0..steps {
            let next = self.evaluate_row(&window);
            out.push(next);
            window.rotate_left(1);
            let w = window.len();
            window[w - 1] = next;
        }
        Ok(out)
    }
}

fn validate_prediction_rows(x: &[Vec<f64>], n_features: usize) -> Result<(), GmdhError> {
    if x.is_empty() {
        return Err(GmdhError::invalid_argument("Prediction input is empty."));
    }
    for (i, row) in x.iter().enumerate() {
        if row.len() != n_features {
            return Err(GmdhError::shape_mismatch(format!(
                "Prediction row {i} has {} values; the model was trained on {n_features} features.",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(GmdhError::invalid_argument(format!(
                "Prediction row {i} contains a non-finite value."
            )));
        }
    }
    Ok(())
}

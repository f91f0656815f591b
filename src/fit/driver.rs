//! Layered model search.
//!
//! One layer iteration:
//! 1. enumerate the candidate input tuples for the current variable pool
//! 2. fit and score every candidate (parallel across candidates)
//! 3. sort by (error ascending, generation index ascending)
//! 4. keep the algorithm's survivor count
//! 5. compute the layer error (mean of the smallest `p_average` candidate
//!    errors) and test termination
//!
//! A layer is retained while the layer error stays non-increasing beyond
//! `limit`; the first layer that worsens the criterion by more than `limit`
//! is discarded and the previous layer's best combination becomes the model
//! output. Workers only read the shared matrices and produce their own
//! candidate record, so results are deterministic regardless of `n_jobs`.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::domain::{Algorithm, Combination, Layer, PolynomialType};
use crate::error::GmdhError;
use crate::fit::candidates::{all_pairs, combi_subsets, multi_extensions, ria_pairs, single_features};
use crate::fit::criteria::{CandidateSystem, Criterion};
use crate::math::solve_least_squares;
use crate::models::model::{combination_outputs, design_matrix, ModelCore};

/// Safety bound on the number of layers a fit may build.
const MAX_LAYERS: usize = 64;

/// Hyperparameters shared by the four algorithms.
///
/// `FitParams::default_for` produces the per-algorithm defaults; individual
/// fields can then be adjusted with struct-update syntax.
#[derive(Debug, Clone)]
pub struct FitParams {
    /// External selection criterion (with its solver).
    pub criterion: Criterion,
    /// Survivors kept per layer (Multi/Mia/Ria; Combi always keeps one).
    pub k_best: usize,
    /// Pair basis for Mia/Ria; ignored by Combi/Multi.
    pub polynomial_type: PolynomialType,
    /// Fraction of the training data held out as the internal test part.
    pub test_size: f64,
    /// How many of the smallest candidate errors form the layer error.
    pub p_average: usize,
    /// Worker threads for candidate evaluation; 1 = sequential, -1 = all.
    pub n_jobs: i32,
    /// 0 = silent, 1 = one progress line per trained layer.
    pub verbose: u8,
    /// Minimum layer-error improvement required to keep extending.
    pub limit: f64,
}

impl FitParams {
    pub fn default_for(algorithm: Algorithm) -> Self {
        Self {
            criterion: Criterion::default(),
            k_best: match algorithm {
                Algorithm::Mia => 3,
                _ => 1,
            },
            polynomial_type: PolynomialType::Quadratic,
            test_size: 0.5,
            p_average: 1,
            n_jobs: 1,
            verbose: 0,
            limit: 0.0,
        }
    }
}

/// One scored candidate, in generation order.
struct CandidateFit {
    index: usize,
    inputs: Vec<usize>,
    coeffs: Vec<f64>,
    error: f64,
}

/// Run the layered search and return the fitted model core.
pub(crate) fn fit_core(
    algorithm: Algorithm,
    x: &[Vec<f64>],
    y: &[f64],
    params: &FitParams,
) -> Result<ModelCore, GmdhError> {
    validate_training_inputs(algorithm, x, y)?;
    validate_params(algorithm, params)?;

    let n = x.len();
    let f = x[0].len();
    let n_test = split_test_count(n, params.test_size);
    let n_train = n - n_test;

    let x_all = DMatrix::from_fn(n, f, |i, j| x[i][j]);
    let y_all = DVector::from_fn(n, |i, _| y[i]);
    let y_tr = y_all.rows(0, n_train).into_owned();
    let y_te = y_all.rows(n_train, n_test).into_owned();

    // Built once per fit; `None` means sequential evaluation. A pool that
    // fails to build degrades to sequential rather than failing the fit.
    let thread_pool = match params.n_jobs {
        1 => None,
        -1 => rayon::ThreadPoolBuilder::new().build().ok(),
        n => rayon::ThreadPoolBuilder::new()
            .num_threads(n as usize)
            .build()
            .ok(),
    };

    let mut layers: Vec<Layer> = Vec::new();
    let mut pool = x_all.clone();
    // Pool the last *kept* layer was fitted against; the terminal refit and
    // Combi/Multi evaluation read combination inputs against this matrix.
    let mut kept_pool = x_all.clone();
    let mut prev_error = f64::INFINITY;
    let mut multi_tuples: Vec<Vec<usize>> = Vec::new();

    for layer_index in 1..=MAX_LAYERS {
        let candidates = match algorithm {
            Algorithm::Combi => combi_subsets(f, layer_index),
            Algorithm::Multi => {
                if layer_index == 1 {
                    single_features(f)
                } else {
                    multi_extensions(&multi_tuples, f)
                }
            }
            Algorithm::Mia => all_pairs(pool.ncols()),
            Algorithm::Ria => {
                if layer_index == 1 {
                    all_pairs(f)
                } else {
                    ria_pairs(pool.ncols() - f, f)
                }
            }
        };
        if candidates.is_empty() {
            break;
        }

        let mut fits = evaluate_candidates(
            algorithm,
            params,
            &pool,
            &candidates,
            &y_tr,
            &y_te,
            n_train,
            thread_pool.as_ref(),
        );
        fits.sort_by(|a, b| a.error.total_cmp(&b.error).then(a.index.cmp(&b.index)));

        // Second sequential stage: re-score the leaders with the second
        // criterion and re-rank them above the rest.
        if let Some(top) = params.criterion.sequential_top(fits.len()) {
            for fit in fits.iter_mut().take(top) {
                let sys = candidate_system(
                    algorithm,
                    params.polynomial_type,
                    &pool,
                    &fit.inputs,
                    &y_tr,
                    &y_te,
                    n_train,
                );
                fit.error = params.criterion.rescore(&sys);
            }
            fits[..top].sort_by(|a, b| a.error.total_cmp(&b.error).then(a.index.cmp(&b.index)));
        }

        let n_candidates = fits.len();
        let n_survivors = match algorithm {
            Algorithm::Combi => 1,
            _ => params.k_best.min(n_candidates),
        };
        let p = params.p_average.min(n_candidates);
        let layer_error = fits[..p].iter().map(|c| c.error).sum::<f64>() / p as f64;

        if !(layer_error <= prev_error - params.limit) {
            break;
        }

        if params.verbose >= 1 {
            println!(
                "{} layer {layer_index}: {n_candidates} candidates, best = {:.6e}, mean top-{p} = {:.6e}",
                algorithm.display_name(),
                fits[0].error,
                layer_error,
            );
        }

        let survivors: Vec<Combination> = fits
            .into_iter()
            .take(n_survivors)
            .map(|c| Combination {
                inputs: c.inputs,
                coeffs: c.coeffs,
                error: c.error,
            })
            .collect();

        kept_pool = pool.clone();
        prev_error = layer_error;

        // Prepare the next layer's variable pool and apply the structural
        // stop conditions.
        match algorithm {
            Algorithm::Combi => {
                layers.push(Layer {
                    combinations: survivors,
                    error: layer_error,
                });
                if layer_index == f {
                    break;
                }
            }
            Algorithm::Multi => {
                multi_tuples = survivors.iter().map(|c| c.inputs.clone()).collect();
                let tuple_len = survivors[0].inputs.len();
                layers.push(Layer {
                    combinations: survivors,
                    error: layer_error,
                });
                if tuple_len == f {
                    break;
                }
            }
            Algorithm::Mia => {
                pool = survivor_outputs(algorithm, params.polynomial_type, &survivors, &kept_pool);
                let width = pool.ncols();
                layers.push(Layer {
                    combinations: survivors,
                    error: layer_error,
                });
                if width < 2 {
                    break;
                }
            }
            Algorithm::Ria => {
                let outs =
                    survivor_outputs(algorithm, params.polynomial_type, &survivors, &kept_pool);
                let k = outs.ncols();
                let mut next = DMatrix::zeros(n, k + f);
                next.view_mut((0, 0), (n, k)).copy_from(&outs);
                next.view_mut((0, k), (n, f)).copy_from(&x_all);
                pool = next;
                layers.push(Layer {
                    combinations: survivors,
                    error: layer_error,
                });
            }
        }
    }

    // A fit that produced no usable layer still returns a model: the best
    // single original feature under the criterion.
    if layers.is_empty() {
        layers.push(fallback_layer(
            algorithm, params, &x_all, &y_tr, &y_te, n_train,
        ));
        kept_pool = x_all.clone();
    }

    let mut core = ModelCore {
        algorithm,
        polynomial_type: params.polynomial_type,
        n_features: f,
        layers,
        best_index: 0,
    };

    // Final re-estimation: the terminal combination's coefficients are refit
    // on the whole internal sample (train and test together).
    refit_terminal(&mut core, params, &kept_pool, &y_all);

    Ok(core)
}

fn evaluate_candidates(
    algorithm: Algorithm,
    params: &FitParams,
    pool: &DMatrix<f64>,
    candidates: &[Vec<usize>],
    y_tr: &DVector<f64>,
    y_te: &DVector<f64>,
    n_train: usize,
    thread_pool: Option<&rayon::ThreadPool>,
) -> Vec<CandidateFit> {
    let eval_one = |(index, inputs): (usize, &Vec<usize>)| -> CandidateFit {
        let sys = candidate_system(
            algorithm,
            params.polynomial_type,
            pool,
            inputs,
            y_tr,
            y_te,
            n_train,
        );
        let (error, w_tr) = params.criterion.evaluate(&sys);
        CandidateFit {
            index,
            inputs: inputs.clone(),
            coeffs: w_tr.iter().copied().collect(),
            error,
        }
    };

    match thread_pool {
        None => candidates.iter().enumerate().map(eval_one).collect(),
        Some(tp) => tp.install(|| candidates.par_iter().enumerate().map(eval_one).collect()),
    }
}

fn candidate_system<'a>(
    algorithm: Algorithm,
    polynomial_type: PolynomialType,
    pool: &DMatrix<f64>,
    inputs: &[usize],
    y_tr: &'a DVector<f64>,
    y_te: &'a DVector<f64>,
    n_train: usize,
) -> CandidateSystem<'a> {
    let n_test = pool.nrows() - n_train;
    CandidateSystem {
        a_tr: design_matrix(algorithm, polynomial_type, pool, inputs, 0, n_train),
        a_te: design_matrix(algorithm, polynomial_type, pool, inputs, n_train, n_test),
        y_tr,
        y_te,
    }
}

/// Survivor outputs over every sample, forming the next layer's variables.
fn survivor_outputs(
    algorithm: Algorithm,
    polynomial_type: PolynomialType,
    survivors: &[Combination],
    pool: &DMatrix<f64>,
) -> DMatrix<f64> {
    let n = pool.nrows();
    let mut out = DMatrix::zeros(n, survivors.len());
    for (c, comb) in survivors.iter().enumerate() {
        let values = combination_outputs(algorithm, polynomial_type, comb, pool);
        out.set_column(c, &values);
    }
    out
}

/// Best single-feature layer, used when the search retains nothing.
fn fallback_layer(
    algorithm: Algorithm,
    params: &FitParams,
    x_all: &DMatrix<f64>,
    y_tr: &DVector<f64>,
    y_te: &DVector<f64>,
    n_train: usize,
) -> Layer {
    let candidates = single_features(x_all.ncols());
    let mut fits = evaluate_candidates(
        algorithm, params, x_all, &candidates, y_tr, y_te, n_train, None,
    );
    fits.sort_by(|a, b| a.error.total_cmp(&b.error).then(a.index.cmp(&b.index)));
    let best = &fits[0];
    Layer {
        combinations: vec![Combination {
            inputs: best.inputs.clone(),
            coeffs: best.coeffs.clone(),
            error: best.error,
        }],
        error: best.error,
    }
}

fn refit_terminal(
    core: &mut ModelCore,
    params: &FitParams,
    kept_pool: &DMatrix<f64>,
    y_all: &DVector<f64>,
) {
    let best_index = core.best_index;
    let last = core.layers.last_mut().expect("at least one layer");
    let best = &mut last.combinations[best_index];
    let a = design_matrix(
        core.algorithm,
        params.polynomial_type,
        kept_pool,
        &best.inputs,
        0,
        kept_pool.nrows(),
    );
    let w = solve_least_squares(params.criterion.solver(), &a, y_all);
    best.coeffs = w.iter().copied().collect();
}

/// Internal held-out size: `round(n · test_size)`, clamped so both sides
/// stay non-empty.
fn split_test_count(n: usize, test_size: f64) -> usize {
    ((n as f64 * test_size).round() as usize).clamp(1, n - 1)
}

fn validate_training_inputs(
    algorithm: Algorithm,
    x: &[Vec<f64>],
    y: &[f64],
) -> Result<(), GmdhError> {
    if x.is_empty() || y.is_empty() {
        return Err(GmdhError::invalid_argument(
            "Training data must not be empty.",
        ));
    }
    if x.len() != y.len() {
        return Err(GmdhError::shape_mismatch(format!(
            "X has {} rows but y has {} values.",
            x.len(),
            y.len()
        )));
    }
    if x.len() < 2 {
        return Err(GmdhError::invalid_argument(
            "Training requires at least 2 samples to form an internal split.",
        ));
    }

    let f = x[0].len();
    if f == 0 {
        return Err(GmdhError::invalid_argument(
            "Training rows must have at least one feature.",
        ));
    }
    if algorithm.is_pairwise() && f < 2 {
        return Err(GmdhError::invalid_argument(format!(
            "{} needs at least 2 features to form input pairs.",
            algorithm.display_name()
        )));
    }
    for (i, row) in x.iter().enumerate() {
        if row.len() != f {
            return Err(GmdhError::shape_mismatch(format!(
                "Row {i} has {} values; expected {f}.",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(GmdhError::invalid_argument(format!(
                "Row {i} contains a non-finite value."
            )));
        }
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(GmdhError::invalid_argument(
            "Target vector contains a non-finite value.",
        ));
    }
    Ok(())
}

fn validate_params(algorithm: Algorithm, params: &FitParams) -> Result<(), GmdhError> {
    if !(params.test_size.is_finite() && params.test_size > 0.0 && params.test_size < 1.0) {
        return Err(GmdhError::invalid_argument(format!(
            "test_size must be in (0, 1), got {}.",
            params.test_size
        )));
    }
    if params.p_average == 0 {
        return Err(GmdhError::invalid_argument("p_average must be at least 1."));
    }
    if !(params.limit.is_finite() && params.limit >= 0.0) {
        return Err(GmdhError::invalid_argument(format!(
            "limit must be finite and non-negative, got {}.",
            params.limit
        )));
    }
    if params.n_jobs != -1 && params.n_jobs < 1 {
        return Err(GmdhError::invalid_argument(format!(
            "n_jobs must be -1 or a positive thread count, got {}.",
            params.n_jobs
        )));
    }
    match algorithm {
        Algorithm::Combi => {}
        Algorithm::Mia => {
            if params.k_best < 3 {
                return Err(GmdhError::invalid_argument(format!(
                    "MIA requires k_best >= 3, got {}.",
                    params.k_best
                )));
            }
        }
        Algorithm::Multi | Algorithm::Ria => {
            if params.k_best < 1 {
                return Err(GmdhError::invalid_argument(format!(
                    "{} requires k_best >= 1, got {}.",
                    algorithm.display_name(),
                    params.k_best
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combi_params() -> FitParams {
        FitParams::default_for(Algorithm::Combi)
    }

    #[test]
    fn split_counts_round_half_up_and_clamp() {
        assert_eq!(split_test_count(6, 0.33), 2);
        assert_eq!(split_test_count(6, 0.25), 2); // 1.5 rounds away from zero
        assert_eq!(split_test_count(7, 0.2), 1);
        assert_eq!(split_test_count(2, 0.01), 1);
        assert_eq!(split_test_count(2, 0.99), 1);
    }

    #[test]
    fn combi_recovers_exact_linear_sum() {
        let x = vec![
            vec![1.0, 2.0],
            vec![3.0, 2.0],
            vec![7.0, 0.0],
            vec![5.0, 5.0],
        ];
        let y = vec![3.0, 5.0, 7.0, 10.0];
        let core = fit_core(Algorithm::Combi, &x, &y, &combi_params()).unwrap();

        let best = core.best_combination();
        assert_eq!(best.inputs, vec![0, 1]);
        assert!((best.coeffs[0]).abs() < 1e-8);
        assert!((best.coeffs[1] - 1.0).abs() < 1e-8);
        assert!((best.coeffs[2] - 1.0).abs() < 1e-8);

        let preds = core.predict_rows(&[vec![1.0, 4.0], vec![2.0, 6.0]]).unwrap();
        assert!((preds[0] - 5.0).abs() < 1e-6);
        assert!((preds[1] - 8.0).abs() < 1e-6);
    }

    #[test]
    fn multi_grows_tuples_one_feature_at_a_time() {
        // y depends on all three features, so the search must extend its
        // survivor tuple twice before the fit becomes exact.
        let x: Vec<Vec<f64>> = (0..12)
            .map(|i| {
                let a = i as f64;
                vec![a, ((i * 7) % 5) as f64, ((i * i) % 13) as f64]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] + 2.0 * r[1] + 3.0 * r[2]).collect();
        let core = fit_core(Algorithm::Multi, &x, &y, &FitParams::default_for(Algorithm::Multi))
            .unwrap();

        let preds = core.predict_rows(&[vec![3.0, 1.0, 4.0]]).unwrap();
        assert!((preds[0] - 17.0).abs() < 1e-6, "got {}", preds[0]);
        for layer in &core.layers {
            for comb in &layer.combinations {
                let mut sorted = comb.inputs.clone();
                sorted.sort_unstable();
                sorted.dedup();
                assert_eq!(sorted.len(), comb.inputs.len(), "repeated index in tuple");
            }
        }
    }

    #[test]
    fn layer_errors_are_monotone_non_increasing() {
        let x: Vec<Vec<f64>> = (0..16)
            .map(|i| {
                let a = i as f64;
                vec![a, a * a * 0.1, (a * 3.0) % 7.0]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 2.0 * r[0] + r[1] - 0.5 * r[2]).collect();
        let core = fit_core(Algorithm::Combi, &x, &y, &combi_params()).unwrap();
        for pair in core.layers.windows(2) {
            assert!(
                pair[1].error <= pair[0].error,
                "layer errors increased: {} -> {}",
                pair[0].error,
                pair[1].error
            );
        }
    }

    #[test]
    fn n_jobs_does_not_change_the_result() {
        let x: Vec<Vec<f64>> = (0..20)
            .map(|i| {
                let a = i as f64;
                vec![a, (a * 13.0) % 11.0, a * 0.5 + 1.0, (a * 5.0) % 3.0]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] + 3.0 * r[1] - r[3]).collect();

        let sequential = fit_core(Algorithm::Combi, &x, &y, &combi_params()).unwrap();
        let parallel = fit_core(
            Algorithm::Combi,
            &x,
            &y,
            &FitParams {
                n_jobs: -1,
                ..combi_params()
            },
        )
        .unwrap();

        let probe = vec![vec![2.0, 4.0, 2.0, 1.0]];
        assert_eq!(
            sequential.predict_rows(&probe).unwrap(),
            parallel.predict_rows(&probe).unwrap()
        );
        assert_eq!(
            sequential.best_combination().inputs,
            parallel.best_combination().inputs
        );
    }

    #[test]
    fn rejects_invalid_hyperparameters() {
        let x = vec![vec![1.0, 2.0], vec![2.0, 3.0], vec![3.0, 4.0]];
        let y = vec![1.0, 2.0, 3.0];

        let bad_test_size = FitParams {
            test_size: 1.0,
            ..combi_params()
        };
        assert!(fit_core(Algorithm::Combi, &x, &y, &bad_test_size).is_err());

        let bad_k_best = FitParams {
            k_best: 2,
            ..FitParams::default_for(Algorithm::Mia)
        };
        assert!(fit_core(Algorithm::Mia, &x, &y, &bad_k_best).is_err());

        let bad_jobs = FitParams {
            n_jobs: 0,
            ..combi_params()
        };
        assert!(fit_core(Algorithm::Combi, &x, &y, &bad_jobs).is_err());
    }

    #[test]
    fn rejects_shape_and_content_violations() {
        let params = combi_params();
        let y = vec![1.0, 2.0];

        let ragged = vec![vec![1.0, 2.0], vec![3.0]];
        let err = fit_core(Algorithm::Combi, &ragged, &y, &params).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatch);

        let nan = vec![vec![1.0, f64::NAN], vec![3.0, 4.0]];
        let err = fit_core(Algorithm::Combi, &nan, &y, &params).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);

        let short_y = vec![1.0];
        let x = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let err = fit_core(Algorithm::Combi, &x, &short_y, &params).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatch);
    }
}

//! The four public model types.
//!
//! Combi, Multi, Mia and Ria share the layered search in `fit::driver`; they
//! differ only in candidate generation, survivor semantics and how layer
//! outputs feed the next layer. Each type carries its hyperparameters and,
//! once fitted, the model core.

use std::path::Path;

use crate::domain::Algorithm;
use crate::error::GmdhError;
use crate::fit::driver::{fit_core, FitParams};
use crate::io::{load_model, save_model};
use crate::models::model::ModelCore;
use crate::report::render_best_polynomial;

fn fitted(core: &Option<ModelCore>, algorithm: Algorithm) -> Result<&ModelCore, GmdhError> {
    core.as_ref().ok_or_else(|| {
        GmdhError::invalid_argument(format!(
            "{} model is not fitted yet.",
            algorithm.display_name()
        ))
    })
}

macro_rules! gmdh_model {
    ($(#[$doc:meta])* $name:ident, $algorithm:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            params: FitParams,
            core: Option<ModelCore>,
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Model with the algorithm's default hyperparameters.
            pub fn new() -> Self {
                Self::with_params(FitParams::default_for($algorithm))
            }

            /// Model with explicit hyperparameters; ranges are validated when
            /// `fit` runs.
            pub fn with_params(params: FitParams) -> Self {
                Self { params, core: None }
            }

            pub fn params(&self) -> &FitParams {
                &self.params
            }

            /// Run the layered search on `(x, y)`.
            pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<&mut Self, GmdhError> {
                self.core = Some(fit_core($algorithm, x, y, &self.params)?);
                Ok(self)
            }

            /// Predict one value per row of `x`.
            pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, GmdhError> {
                fitted(&self.core, $algorithm)?.predict_rows(x)
            }

            /// Recursive forecast: the last row of `x` seeds the lag window
            /// and each prediction is fed back in, `steps` times.
            pub fn predict_series(
                &self,
                x: &[Vec<f64>],
                steps: usize,
            ) -> Result<Vec<f64>, GmdhError> {
                fitted(&self.core, $algorithm)?.forecast(x, steps)
            }

            /// Human-readable form of the selected polynomial; empty before
            /// the first fit.
            pub fn get_best_polynomial(&self) -> String {
                match &self.core {
                    Some(core) => render_best_polynomial(core),
                    None => String::new(),
                }
            }

            /// Write the fitted model to a JSON document.
            pub fn save(&self, path: impl AsRef<Path>) -> Result<&Self, GmdhError> {
                save_model(path.as_ref(), fitted(&self.core, $algorithm)?)?;
                Ok(self)
            }

            /// Replace this model with one loaded from `path`. The file's
            /// algorithm tag must match this type.
            pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&mut Self, GmdhError> {
                self.core = Some(load_model(path.as_ref(), $algorithm)?);
                Ok(self)
            }
        }
    };
}

gmdh_model!(
    /// Combinatorial search: layer L evaluates every L-subset of the original
    /// features with a multilinear basis and keeps the single best.
    Combi,
    Algorithm::Combi
);

gmdh_model!(
    /// Incremental combinatorial search: survivors grow by one as-yet-unused
    /// original feature per layer.
    Multi,
    Algorithm::Multi
);

gmdh_model!(
    /// Multilayer iterative algorithm: layers pair the previous generation's
    /// survivor outputs under the configured polynomial basis.
    Mia,
    Algorithm::Mia
);

gmdh_model!(
    /// Relaxation iterative algorithm: like Mia, but every pair combines a
    /// survivor output with an original feature.
    Ria,
    Algorithm::Ria
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{split_data, time_series_transformation};
    use crate::domain::{CriterionType, PolynomialType, Solver};
    use crate::fit::Criterion;

    fn tmp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("gmdh-model-test-{}-{name}.json", std::process::id()));
        p
    }

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < tol, "expected {expected:?}, got {actual:?}");
        }
    }

    #[test]
    fn combi_learns_a_simple_sum() {
        let x = vec![
            vec![1.0, 2.0],
            vec![3.0, 2.0],
            vec![7.0, 0.0],
            vec![5.0, 5.0],
            vec![1.0, 4.0],
            vec![2.0, 6.0],
        ];
        let y = vec![3.0, 5.0, 7.0, 10.0, 5.0, 8.0];
        let (x_train, x_test, y_train, y_test) = split_data(&x, &y, 0.33, false, 0).unwrap();
        assert_eq!(y_test, vec![5.0, 8.0]);

        let mut model = Combi::new();
        model.fit(&x_train, &y_train).unwrap();
        let predicted = model.predict(&x_test).unwrap();
        assert_close(&predicted, &[5.0, 8.0], 1e-6);
        assert_eq!(model.get_best_polynomial(), "y = x1 + x2");
    }

    #[test]
    fn combi_learns_the_fibonacci_recurrence() {
        let series = [1.0, 1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0];
        let (x, y) = time_series_transformation(&series, 2).unwrap();
        let (x_train, x_test, y_train, y_test) = split_data(&x, &y, 0.25, false, 0).unwrap();
        assert_eq!(x_test, vec![vec![5.0, 8.0], vec![8.0, 13.0]]);

        let mut model = Combi::new();
        model.fit(&x_train, &y_train).unwrap();
        let predicted = model.predict(&x_test).unwrap();
        assert_close(&predicted, &y_test, 1e-6);
        assert_close(&predicted, &[13.0, 21.0], 1e-6);
        assert_eq!(model.get_best_polynomial(), "y = x1 + x2");
    }

    #[test]
    fn mia_recovers_a_quadratic_in_two_of_four_features() {
        // y = x1^2 + 2*x1*x4 + x4^2, with x2 and x3 as irregular distractors.
        let x: Vec<Vec<f64>> = (0..25)
            .map(|i| {
                let i = i as usize;
                vec![
                    ((i * 7) % 13) as f64 * 0.5,
                    ((i * 5) % 11) as f64 - 3.0,
                    ((i * i) % 17) as f64 * 0.25,
                    ((i * 3) % 7) as f64 + 0.5,
                ]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| (r[0] + r[3]) * (r[0] + r[3])).collect();
        let (x_train, _, y_train, _) = split_data(&x, &y, 0.2, false, 0).unwrap();

        let mut model = Mia::with_params(FitParams {
            limit: 1e-6,
            ..FitParams::default_for(Algorithm::Mia)
        });
        model.fit(&x_train, &y_train).unwrap();

        let predicted = model.predict(&[vec![3.0, 1.0, 2.0, 5.0]]).unwrap();
        assert_close(&predicted, &[64.0], 1e-4);
        assert_eq!(model.get_best_polynomial(), "y = 2*x1*x4 + x1^2 + x4^2");
    }

    #[test]
    fn ria_recovers_a_shifted_quadratic() {
        // y = x1^2 + 10*x2^2 + 80
        let x: Vec<Vec<f64>> = (0..24)
            .map(|i| {
                let i = i as usize;
                vec![((i * 5) % 9) as f64 - 2.0, ((i * 7) % 11) as f64 * 0.5]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] * r[0] + 10.0 * r[1] * r[1] + 80.0).collect();

        let mut model = Ria::with_params(FitParams {
            limit: 1e-6,
            ..FitParams::default_for(Algorithm::Ria)
        });
        model.fit(&x, &y).unwrap();

        let predicted = model.predict(&[vec![3.0, 3.0]]).unwrap();
        assert_close(&predicted, &[179.0], 1e-4);
        assert_eq!(model.get_best_polynomial(), "y = x1^2 + 10*x2^2 + 80");
    }

    #[test]
    fn mia_forecasts_a_linear_series_recursively() {
        let series: Vec<f64> = (1..11).map(f64::from).collect();
        let (x, y) = time_series_transformation(&series, 3).unwrap();
        let (x_train, x_test, y_train, _) = split_data(&x, &y, 0.2, false, 0).unwrap();
        assert_eq!(x_test, vec![vec![7.0, 8.0, 9.0]]);

        let mut model = Mia::with_params(FitParams {
            limit: 1e-6,
            ..FitParams::default_for(Algorithm::Mia)
        });
        model.fit(&x_train, &y_train).unwrap();

        let forecast = model.predict_series(&x_test, 5).unwrap();
        assert_close(&forecast, &[10.0, 11.0, 12.0, 13.0, 14.0], 1e-3);
    }

    #[test]
    fn save_load_round_trip_reproduces_predictions_exactly() {
        let x = vec![
            vec![0.0, 2.0],
            vec![7.0, 4.0],
            vec![5.0, 5.0],
            vec![9.0, 12.0],
        ];
        let y = vec![2.0, 11.0, 10.0, 21.0];
        let probe = vec![vec![4.0, 3.0], vec![1.0, 11.0]];

        let mut model = Combi::new();
        model.fit(&x, &y).unwrap();
        let before = model.predict(&probe).unwrap();
        assert_close(&before, &[7.0, 12.0], 1e-6);

        let path = tmp_path("combi-round-trip");
        model.save(&path).unwrap();

        let mut fresh = Combi::new();
        fresh.load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let after = fresh.predict(&probe).unwrap();
        assert_eq!(before, after, "round trip must be bitwise identical");
    }

    #[test]
    fn loading_a_mismatched_algorithm_fails() {
        let x = vec![vec![1.0, 2.0], vec![2.0, 3.0], vec![3.0, 5.0], vec![4.0, 6.0]];
        let y = vec![3.0, 5.0, 8.0, 10.0];
        let mut model = Combi::new();
        model.fit(&x, &y).unwrap();

        let path = tmp_path("combi-for-multi");
        model.save(&path).unwrap();

        let mut other = Multi::new();
        let err = other.load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert_eq!(err.kind(), crate::error::ErrorKind::File);
    }

    #[test]
    fn unfitted_models_refuse_to_predict() {
        let model = Mia::new();
        let err = model.predict(&[vec![1.0, 2.0]]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
        assert_eq!(model.get_best_polynomial(), "");
    }

    #[test]
    fn permuting_feature_columns_permutes_the_polynomial() {
        let x: Vec<Vec<f64>> = (0..14)
            .map(|i| {
                let a = i as f64;
                vec![a, ((i * 3) % 5) as f64 * 2.0]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| 2.0 * r[0] + 5.0 * r[1]).collect();
        let x_swapped: Vec<Vec<f64>> = x.iter().map(|r| vec![r[1], r[0]]).collect();

        let mut a = Combi::new();
        a.fit(&x, &y).unwrap();
        let mut b = Combi::new();
        b.fit(&x_swapped, &y).unwrap();

        assert_eq!(a.get_best_polynomial(), "y = 2*x1 + 5*x2");
        assert_eq!(b.get_best_polynomial(), "y = 5*x1 + 2*x2");

        let pa = a.predict(&[vec![1.0, 3.0]]).unwrap();
        let pb = b.predict(&[vec![3.0, 1.0]]).unwrap();
        assert_close(&pa, &pb, 1e-9);
    }

    #[test]
    fn solver_and_criterion_variants_agree_on_noise_free_data() {
        let x: Vec<Vec<f64>> = (0..16)
            .map(|i| {
                let a = i as f64;
                vec![a, ((i * 7) % 9) as f64 - 4.0, ((i * 11) % 6) as f64]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] - 2.0 * r[1] + 0.5 * r[2]).collect();
        let probe = vec![vec![2.0, 1.0, 3.0]];
        let expected = vec![1.5];

        for solver in [Solver::Fast, Solver::Accurate, Solver::Balanced] {
            for criterion in [
                Criterion::single(CriterionType::Regularity, solver),
                Criterion::single(CriterionType::SymRegularity, solver),
                Criterion::single(CriterionType::Stability, solver),
                Criterion::parallel(
                    CriterionType::Regularity,
                    CriterionType::Stability,
                    0.5,
                    solver,
                )
                .unwrap(),
                Criterion::sequential(
                    CriterionType::Regularity,
                    CriterionType::Stability,
                    0,
                    solver,
                ),
            ] {
                let mut model = Combi::with_params(FitParams {
                    criterion,
                    ..FitParams::default_for(Algorithm::Combi)
                });
                model.fit(&x, &y).unwrap();
                let predicted = model.predict(&probe).unwrap();
                assert_close(&predicted, &expected, 1e-5);
            }
        }
    }

    #[test]
    fn mia_with_two_features_trains_a_single_layer() {
        let x: Vec<Vec<f64>> = (0..12)
            .map(|i| {
                let a = i as f64;
                vec![a, ((i * 5) % 7) as f64 + 1.0]
            })
            .collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] * r[1]).collect();

        let mut model = Mia::new();
        model.fit(&x, &y).unwrap();
        let core = model.core.as_ref().unwrap();
        assert_eq!(core.layers.len(), 1, "a single pair cannot stack layers");
        assert_eq!(core.layers[0].combinations[0].inputs, vec![0, 1]);

        let predicted = model.predict(&[vec![3.0, 4.0]]).unwrap();
        assert_close(&predicted, &[12.0], 1e-5);
    }

    #[test]
    fn quadratic_polynomial_type_is_the_pair_default() {
        let params = FitParams::default_for(Algorithm::Mia);
        assert_eq!(params.polynomial_type, PolynomialType::Quadratic);
        assert_eq!(params.k_best, 3);
        let params = FitParams::default_for(Algorithm::Ria);
        assert_eq!(params.k_best, 1);
    }
}

//! Dataset construction helpers.
//!
//! These two functions define the data contracts at the crate boundary:
//! windowing a univariate series into a lagged regression problem, and
//! splitting a dataset into train/test parts (optionally with a seeded
//! shuffle). Everything else in the crate consumes their output shapes.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::GmdhError;

/// Window a series into `(X, y)` with `lags` columns.
///
/// Row `i` of X is `series[i..i + lags]` and `y[i] = series[i + lags]`.
/// Valid for `1 <= lags <= len - 1`.
pub fn time_series_transformation(
    series: &[f64],
    lags: usize,
) -> Result<(Vec<Vec<f64>>, Vec<f64>), GmdhError> {
    if series.is_empty() {
        return Err(GmdhError::invalid_argument("Series must not be empty."));
    }
    if series.iter().any(|v| !v.is_finite()) {
        return Err(GmdhError::invalid_argument(
            "Series contains a non-finite value.",
        ));
    }
    if lags < 1 || lags >= series.len() {
        return Err(GmdhError::invalid_argument(format!(
            "lags must be in [1, {}] for a series of length {}, got {lags}.",
            series.len() - 1,
            series.len()
        )));
    }

    let n = series.len() - lags;
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    for i in 0..n {
        x.push(series[i..i + lags].to_vec());
        y.push(series[i + lags]);
    }
    Ok((x, y))
}

/// Split `(X, y)` into `(x_train, x_test, y_train, y_test)`.
///
/// `test_size` must lie in (0, 1); the test side holds `round(n · test_size)`
/// rows, clamped so neither side is empty. Without shuffling the split is the
/// contiguous prefix/suffix. With `shuffle = true` the rows are permuted
/// first; `random_state > 0` seeds the permutation deterministically, while
/// `random_state = 0` draws a fresh seed from the OS.
pub fn split_data(
    x: &[Vec<f64>],
    y: &[f64],
    test_size: f64,
    shuffle: bool,
    random_state: u64,
) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>, Vec<f64>, Vec<f64>), GmdhError> {
    if x.is_empty() || y.is_empty() {
        return Err(GmdhError::invalid_argument("Input data must not be empty."));
    }
    if x.len() != y.len() {
        return Err(GmdhError::shape_mismatch(format!(
            "X has {} rows but y has {} values.",
            x.len(),
            y.len()
        )));
    }
    if !(test_size.is_finite() && test_size > 0.0 && test_size < 1.0) {
        return Err(GmdhError::invalid_argument(format!(
            "test_size must be in (0, 1), got {test_size}."
        )));
    }
    let n = x.len();
    if n < 2 {
        return Err(GmdhError::invalid_argument(
            "Splitting requires at least 2 samples.",
        ));
    }
    let n_test = ((n as f64 * test_size).round() as usize).clamp(1, n - 1);
    let n_train = n - n_test;

    let mut order: Vec<usize> = (0..n).collect();
    if shuffle {
        let mut rng = if random_state == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(random_state)
        };
        order.shuffle(&mut rng);
    }

    let mut x_train = Vec::with_capacity(n_train);
    let mut y_train = Vec::with_capacity(n_train);
    let mut x_test = Vec::with_capacity(n_test);
    let mut y_test = Vec::with_capacity(n_test);
    for (pos, &i) in order.iter().enumerate() {
        if pos < n_train {
            x_train.push(x[i].clone());
            y_train.push(y[i]);
        } else {
            x_test.push(x[i].clone());
            y_test.push(y[i]);
        }
    }
    Ok((x_train, x_test, y_train, y_test))
}

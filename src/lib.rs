//! Self-organizing polynomial regression (Group Method of Data Handling).
//!
//! Given a numeric training matrix and a target vector, the engine searches
//! layer by layer for a polynomial
//! combination of inputs that minimizes an external criterion evaluated on a
//! held-out part of the training data. The result is a composable polynomial
//! model usable for scalar regression or recursive time-series forecasting.
//!
//! Four search strategies are provided ([`Combi`], [`Multi`], [`Mia`],
//! [`Ria`]), sharing one layered driver and one criterion library.
//!
//! ```no_run
//! use gmdh::{split_data, Combi};
//!
//! let x = vec![vec![1.0, 2.0], vec![3.0, 2.0], vec![7.0, 0.0], vec![5.0, 5.0]];
//! let y = vec![3.0, 5.0, 7.0, 10.0];
//! let (x_train, x_test, y_train, _) = split_data(&x, &y, 0.25, false, 0)?;
//!
//! let mut model = Combi::new();
//! model.fit(&x_train, &y_train)?;
//! let predictions = model.predict(&x_test)?;
//! println!("{}", model.get_best_polynomial());
//! # Ok::<(), gmdh::GmdhError>(())
//! ```

pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;

pub use data::{split_data, time_series_transformation};
pub use domain::{Algorithm, CriterionType, PolynomialType, Solver};
pub use error::{ErrorKind, GmdhError};
pub use fit::{Criterion, FitParams};
pub use models::{Combi, Mia, Multi, Ria};

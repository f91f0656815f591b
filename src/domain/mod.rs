//! Shared domain types.

mod types;

pub use types::{Algorithm, Combination, CriterionType, Layer, PolynomialType, Solver};

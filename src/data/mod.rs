//! Data-preparation utilities at the crate boundary.

mod prepare;

pub use prepare::{split_data, time_series_transformation};

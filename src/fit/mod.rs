//! The layered model search: criteria, candidate enumeration, and the
//! layer driver.

pub(crate) mod candidates;
pub(crate) mod criteria;
pub(crate) mod driver;

pub use criteria::Criterion;
pub use driver::FitParams;

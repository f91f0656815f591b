//! Fitted-model representation and the four public model types.

pub(crate) mod model;
mod variants;

pub use variants::{Combi, Mia, Multi, Ria};

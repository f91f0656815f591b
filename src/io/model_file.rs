//! Read/write model JSON files.
//!
//! The saved document is the portable representation of a fitted model:
//! - algorithm tag (validated against the loading model type)
//! - pair basis (for Mia/Ria), feature count
//! - per-layer combinations, each with its pool-index tuple and coefficients
//! - the index of the terminal best combination
//!
//! Coefficients round-trip at full double precision, so save → load →
//! predict reproduces predictions exactly.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::{Algorithm, Combination, Layer, PolynomialType};
use crate::error::GmdhError;
use crate::models::model::{combination_arity, ModelCore};

#[derive(Debug, Serialize, Deserialize)]
struct ModelDocument {
    algorithm: Algorithm,
    #[serde(skip_serializing_if = "Option::is_none")]
    polynomial_type: Option<PolynomialType>,
    n_features: usize,
    layers: Vec<Vec<Combination>>,
    best_index: usize,
}

/// Write a fitted model to `path`.
pub(crate) fn save_model(path: &Path, core: &ModelCore) -> Result<(), GmdhError> {
    let document = ModelDocument {
        algorithm: core.algorithm,
        polynomial_type: core
            .algorithm
            .is_pairwise()
            .then_some(core.polynomial_type),
        n_features: core.n_features,
        layers: core
            .layers
            .iter()
            .map(|layer| layer.combinations.clone())
            .collect(),
        best_index: core.best_index,
    };

    let file = File::create(path).map_err(|e| {
        GmdhError::file(format!(
            "Failed to create model file '{}': {e}",
            path.display()
        ))
    })?;
    serde_json::to_writer_pretty(file, &document)
        .map_err(|e| GmdhError::file(format!("Failed to write model file: {e}")))?;
    Ok(())
}

/// Read a model from `path`, validating the tag against the receiving type.
pub(crate) fn load_model(path: &Path, expected: Algorithm) -> Result<ModelCore, GmdhError> {
    let file = File::open(path).map_err(|e| {
        GmdhError::file(format!(
            "Failed to open model file '{}': {e}",
            path.display()
        ))
    })?;
    let document: ModelDocument = serde_json::from_reader(file)
        .map_err(|e| GmdhError::file(format!("Invalid model file: {e}")))?;

    if document.algorithm != expected {
        return Err(GmdhError::file(format!(
            "Model file contains a {} model; expected {}.",
            document.algorithm.display_name(),
            expected.display_name()
        )));
    }

    validate_document(&document)?;

    let polynomial_type = document
        .polynomial_type
        .unwrap_or(PolynomialType::Quadratic);
    Ok(ModelCore {
        algorithm: document.algorithm,
        polynomial_type,
        n_features: document.n_features,
        layers: document
            .layers
            .into_iter()
            .map(|combinations| Layer {
                combinations,
                error: 0.0,
            })
            .collect(),
        best_index: document.best_index,
    })
}

fn validate_document(document: &ModelDocument) -> Result<(), GmdhError> {
    let algorithm = document.algorithm;
    let f = document.n_features;
    if f == 0 {
        return Err(GmdhError::file("Model file declares zero features."));
    }
    if document.layers.is_empty() {
        return Err(GmdhError::file("Model file contains no layers."));
    }
    let polynomial_type = match (algorithm.is_pairwise(), document.polynomial_type) {
        (true, None) => {
            return Err(GmdhError::file(format!(
                "{} model file is missing its polynomial_type.",
                algorithm.display_name()
            )));
        }
        (_, pt) => pt.unwrap_or(PolynomialType::Quadratic),
    };

    let mut prev_survivors = 0usize;
    for (li, layer) in document.layers.iter().enumerate() {
        if layer.is_empty() {
            return Err(GmdhError::file(format!("Layer {li} is empty.")));
        }
        let pool_width = match algorithm {
            Algorithm::Combi | Algorithm::Multi => f,
            Algorithm::Mia => {
                if li == 0 {
                    f
                } else {
                    prev_survivors
                }
            }
            Algorithm::Ria => {
                if li == 0 {
                    f
                } else {
                    prev_survivors + f
                }
            }
        };

        for comb in layer {
            if comb.inputs.is_empty() || comb.inputs.iter().any(|&ix| ix >= pool_width) {
                return Err(GmdhError::file(format!(
                    "Layer {li} references an input outside its variable pool."
                )));
            }
            if algorithm.is_pairwise() && comb.inputs.len() > 2 {
                return Err(GmdhError::file(format!(
                    "Layer {li} has a pair combination with {} inputs.",
                    comb.inputs.len()
                )));
            }
            let arity = combination_arity(algorithm, polynomial_type, comb.inputs.len());
            if comb.coeffs.len() != arity {
                return Err(GmdhError::file(format!(
                    "Layer {li} has a combination with {} coefficients; expected {arity}.",
                    comb.coeffs.len()
                )));
            }
            if comb.coeffs.iter().any(|c| !c.is_finite()) {
                return Err(GmdhError::file(format!(
                    "Layer {li} contains a non-finite coefficient."
                )));
            }
        }
        prev_survivors = layer.len();
    }

    let last = document.layers.len() - 1;
    if document.best_index >= document.layers[last].len() {
        return Err(GmdhError::file(
            "best_index points outside the final layer.",
        ));
    }
    Ok(())
}


use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classifier::boosting::TreeEnsemble;
use crate::classifier::hyperparameters::Hyperparameters;
use crate::data_types::feature_table::FeatureTable;
use crate::data_types::site::{SequencingMode, VariantClass};
use crate::util::json_io::{load_json, save_json};

/// Version of the model file layout; bumped whenever the JSON changes incompatibly
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Scoring backends
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize, clap::ValueEnum, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Algorithm {
    /// In-process gradient boosted trees
    #[default]
    Boosted,
    /// External train and predict programs
    Delegate
}

/// The trained part of a model
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum ModelBody {
    Boosted(TreeEnsemble),
    /// Artifact produced by the delegate train program
    Delegate { artifact: PathBuf }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("model format version {found} is not supported, expected {expected}")]
    FormatVersion { found: u32, expected: u32 },
    #[error("model was trained with the {model} algorithm, but {configured} is configured")]
    AlgorithmMismatch { model: Algorithm, configured: Algorithm },
    #[error("model was trained on {model_mode} {model_class} data, but the table is {table_mode} {table_class}")]
    DataKindMismatch {
        model_class: VariantClass, model_mode: SequencingMode,
        table_class: VariantClass, table_mode: SequencingMode
    },
    #[error("feature columns do not match the model: missing {missing:?}, unexpected {unexpected:?}")]
    FeatureMismatch { missing: Vec<String>, unexpected: Vec<String> },
    #[error("feature column {index} is {found:?}, but the model expects {expected:?}")]
    FeatureOrder { index: usize, expected: String, found: String }
}

/// A persisted model with everything needed to check that a table matches it
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ModelArtifact {
    format_version: u32,
    quorum_version: String,
    algorithm: Algorithm,
    variant_class: VariantClass,
    sequencing_mode: SequencingMode,
    /// Feature columns the model consumes, in order, after exclusions
    feature_names: Vec<String>,
    /// Table columns that were left out of training
    excluded_features: Vec<String>,
    hyperparameters: Hyperparameters,
    trained_rounds: usize,
    training_rows: usize,
    body: ModelBody
}

impl ModelArtifact {
    /// Constructor for freshly trained models
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        algorithm: Algorithm, variant_class: VariantClass, sequencing_mode: SequencingMode,
        feature_names: Vec<String>, excluded_features: Vec<String>,
        hyperparameters: Hyperparameters, trained_rounds: usize, training_rows: usize,
        body: ModelBody
    ) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            quorum_version: crate::cli::core::FULL_VERSION.clone(),
            algorithm,
            variant_class,
            sequencing_mode,
            feature_names,
            excluded_features,
            hyperparameters,
            trained_rounds,
            training_rows,
            body
        }
    }

    /// Writes the model as JSON, gzipped if the path ends with `.gz`
    pub fn save(&self, model_fn: &Path) -> anyhow::Result<()> {
        save_json(self, model_fn)
            .with_context(|| format!("Error while saving model to {model_fn:?}:"))
    }

    /// Loads a model and checks its format version
    /// # Errors
    /// * if the file cannot be read or parsed
    /// * if the format version is not the current one
    pub fn load(model_fn: &Path) -> anyhow::Result<Self> {
        let model: ModelArtifact = load_json(model_fn)
            .with_context(|| format!("Error while loading model from {model_fn:?}:"))?;
        if model.format_version != MODEL_FORMAT_VERSION {
            return Err(SchemaError::FormatVersion { found: model.format_version, expected: MODEL_FORMAT_VERSION })
                .with_context(|| format!("Error while loading model from {model_fn:?}:"));
        }
        debug!("Loaded {} {} model with {} features and {} rounds from {model_fn:?}",
            model.sequencing_mode, model.variant_class, model.feature_names.len(), model.trained_rounds);
        Ok(model)
    }

    /// Verifies a table against the model and returns the table column for each model feature.
    /// The table's feature names minus the model's exclusions must equal the model's feature names, in order.
    /// # Arguments
    /// * `table` - the feature table to score
    /// * `configured` - the algorithm this run is configured to use
    /// # Errors
    /// * if the algorithm, class, or mode differ
    /// * if any column is missing, unexpected, or out of order
    pub fn check_table(&self, table: &FeatureTable, configured: Algorithm) -> Result<Vec<usize>, SchemaError> {
        if self.algorithm != configured {
            return Err(SchemaError::AlgorithmMismatch { model: self.algorithm, configured });
        }
        if self.variant_class != table.class() || self.sequencing_mode != table.mode() {
            return Err(SchemaError::DataKindMismatch {
                model_class: self.variant_class, model_mode: self.sequencing_mode,
                table_class: table.class(), table_mode: table.mode()
            });
        }

        let kept = select_features(table.feature_names(), &self.excluded_features);
        let kept_names: Vec<&str> = kept.iter().map(|&i| table.feature_names()[i].as_str()).collect();

        let missing: Vec<String> = self.feature_names.iter()
            .filter(|n| !kept_names.contains(&n.as_str()))
            .cloned()
            .collect();
        let unexpected: Vec<String> = kept_names.iter()
            .filter(|&&n| !self.feature_names.iter().any(|m| m.as_str() == n))
            .map(|n| n.to_string())
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(SchemaError::FeatureMismatch { missing, unexpected });
        }

        for (index, (expected, found)) in self.feature_names.iter().zip(kept_names.iter()).enumerate() {
            if expected != found {
                return Err(SchemaError::FeatureOrder { index, expected: expected.clone(), found: found.to_string() });
            }
        }
        Ok(kept)
    }

    /// Number of rounds to use for a requested count
    pub fn effective_rounds(&self, requested: usize) -> usize {
        requested.min(self.trained_rounds)
    }

    /// Points a delegate model at the location its artifact will be moved to; boosted models are unchanged
    pub fn relocate_artifact(&mut self, artifact_fn: &Path) {
        if let ModelBody::Delegate { artifact } = &mut self.body {
            *artifact = artifact_fn.to_path_buf();
        }
    }

    // getters
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn variant_class(&self) -> VariantClass {
        self.variant_class
    }

    pub fn sequencing_mode(&self) -> SequencingMode {
        self.sequencing_mode
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn excluded_features(&self) -> &[String] {
        &self.excluded_features
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn trained_rounds(&self) -> usize {
        self.trained_rounds
    }

    pub fn training_rows(&self) -> usize {
        self.training_rows
    }

    pub fn quorum_version(&self) -> &str {
        &self.quorum_version
    }

    pub fn body(&self) -> &ModelBody {
        &self.body
    }
}

/// Indices of the columns that are not excluded, in table order
pub fn select_features(feature_names: &[String], excluded: &[String]) -> Vec<usize> {
    feature_names.iter()
        .enumerate()
        .filter(|(_i, n)| !excluded.contains(n))
        .map(|(i, _n)| i)
        .collect()
}

/// Gathers the selected columns of every row into owned vectors
pub fn gather_rows(table: &FeatureTable, columns: &[usize]) -> Vec<Vec<f64>> {
    table.rows().iter()
        .map(|r| columns.iter().map(|&c| r.values()[c]).collect())
        .collect()
}

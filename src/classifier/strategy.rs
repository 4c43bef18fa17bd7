
use derive_builder::Builder;
use log::info;

use crate::classifier::boosting::train_ensemble;
use crate::classifier::hyperparameters::Hyperparameters;
use crate::classifier::model::{gather_rows, select_features, Algorithm, ModelArtifact, ModelBody};
use crate::data_types::feature_table::FeatureTable;
use crate::features::schema::DEFAULT_EXCLUDED;

/// Default boosting rounds when training
pub const DEFAULT_TRAIN_ROUNDS: usize = 500;
/// Default boosting rounds used when predicting, regardless of how many were trained
pub const DEFAULT_PREDICT_ROUNDS: usize = 100;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TrainingError {
    #[error("no labeled rows to train on; a truth set is required for training")]
    NoLabels,
    #[error("all {rows} training rows are labeled {label}; both classes are required to learn a boundary")]
    SingleClass { label: bool, rows: usize },
    #[error("every feature column was excluded")]
    NoFeatures
}

/// Feature columns selected for a model, with optional labels
#[derive(Clone, Debug)]
pub struct FeatureMatrix<'a> {
    pub names: Vec<&'a str>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Option<Vec<bool>>
}

impl FeatureMatrix<'_> {
    /// Borrowed row views, the form the tree code consumes
    pub fn row_slices(&self) -> Vec<&[f64]> {
        self.rows.iter().map(|r| r.as_slice()).collect()
    }
}

/// A scoring backend: fits a model body on a matrix, then scores matrices with that body
pub trait ScoringStrategy {
    /// The algorithm recorded in models from this backend
    fn algorithm(&self) -> Algorithm;

    /// Fits a model body on labeled rows
    /// # Arguments
    /// * `matrix` - selected feature columns with labels
    /// * `hyperparameters` - boosting hyperparameters
    /// * `rounds` - requested boosting rounds
    /// # Returns
    /// The model body and the number of rounds actually trained
    fn fit(&self, matrix: &FeatureMatrix, hyperparameters: &Hyperparameters, rounds: usize) -> anyhow::Result<(ModelBody, usize)>;

    /// Returns one probability in [0, 1] per row
    fn score(&self, body: &ModelBody, matrix: &FeatureMatrix, rounds: usize) -> anyhow::Result<Vec<f64>>;
}

/// Gradient boosted trees trained and applied in-process
#[derive(Clone, Copy, Debug, Default)]
pub struct BoostedStrategy;

impl ScoringStrategy for BoostedStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Boosted
    }

    fn fit(&self, matrix: &FeatureMatrix, hyperparameters: &Hyperparameters, rounds: usize) -> anyhow::Result<(ModelBody, usize)> {
        let labels = matrix.labels.as_ref().ok_or(TrainingError::NoLabels)?;
        let ensemble = train_ensemble(&matrix.row_slices(), labels, hyperparameters, rounds)?;
        let trained = ensemble.num_rounds();
        Ok((ModelBody::Boosted(ensemble), trained))
    }

    fn score(&self, body: &ModelBody, matrix: &FeatureMatrix, rounds: usize) -> anyhow::Result<Vec<f64>> {
        match body {
            ModelBody::Boosted(ensemble) => Ok(ensemble.predict(&matrix.row_slices(), rounds)),
            ModelBody::Delegate { .. } => anyhow::bail!("Boosted scoring cannot use a delegate model body")
        }
    }
}

/// Settings for one training call
#[derive(Builder, Clone, Debug)]
#[builder(default)]
pub struct TrainConfig {
    hyperparameters: Hyperparameters,
    /// Boosting rounds to train
    rounds: usize,
    /// Table columns left out of the model
    excluded_features: Vec<String>
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            hyperparameters: Hyperparameters::default(),
            rounds: DEFAULT_TRAIN_ROUNDS,
            excluded_features: DEFAULT_EXCLUDED.iter().map(|s| s.to_string()).collect()
        }
    }
}

impl TrainConfig {
    // getters
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn excluded_features(&self) -> &[String] {
        &self.excluded_features
    }
}

/// Settings for one prediction call
#[derive(Builder, Clone, Copy, Debug)]
#[builder(default)]
pub struct PredictConfig {
    /// The backend this run is configured to use; must match the model
    algorithm: Algorithm,
    /// Requested rounds, capped at the trained rounds
    rounds: usize
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Boosted,
            rounds: DEFAULT_PREDICT_ROUNDS
        }
    }
}

impl PredictConfig {
    // getters
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

/// Checks that every row is labeled and both classes are present
/// # Errors
/// * `NoLabels` if the table is empty or any row lacks a label
/// * `SingleClass` if all labels agree
pub fn training_labels(table: &FeatureTable) -> Result<Vec<bool>, TrainingError> {
    if !table.is_labeled() {
        return Err(TrainingError::NoLabels);
    }
    let labels: Vec<bool> = table.rows().iter().filter_map(|r| r.label()).collect();
    let positives = labels.iter().filter(|&&l| l).count();
    if positives == 0 || positives == labels.len() {
        return Err(TrainingError::SingleClass { label: positives > 0, rows: labels.len() });
    }
    Ok(labels)
}

/// Trains a model on a labeled feature table.
/// The exclusions and hyperparameters are stored in the model so prediction can check its input.
/// # Arguments
/// * `strategy` - the scoring backend
/// * `table` - labeled feature table
/// * `config` - hyperparameters, rounds, and exclusions
/// # Errors
/// * `TrainingError` for unlabeled or single-class tables, or if every column is excluded
/// * any backend failure
pub fn train(strategy: &dyn ScoringStrategy, table: &FeatureTable, config: &TrainConfig) -> anyhow::Result<ModelArtifact> {
    let labels = training_labels(table)?;
    let columns = select_features(table.feature_names(), config.excluded_features());
    if columns.is_empty() {
        return Err(TrainingError::NoFeatures.into());
    }
    let names: Vec<&str> = columns.iter().map(|&c| table.feature_names()[c].as_str()).collect();
    let positives = labels.iter().filter(|&&l| l).count();
    info!("Training {} {} model on {} rows ({positives} true) with {} features...",
        table.mode(), table.class(), labels.len(), names.len());

    let matrix = FeatureMatrix {
        names,
        rows: gather_rows(table, &columns),
        labels: Some(labels)
    };
    let (body, trained_rounds) = strategy.fit(&matrix, config.hyperparameters(), config.rounds())?;

    Ok(ModelArtifact::new(
        strategy.algorithm(), table.class(), table.mode(),
        matrix.names.iter().map(|s| s.to_string()).collect(), config.excluded_features().to_vec(),
        config.hyperparameters().clone(), trained_rounds, matrix.rows.len(),
        body
    ))
}

/// Scores every row of a feature table with a trained model
/// # Arguments
/// * `strategy` - the scoring backend
/// * `table` - feature table to score
/// * `model` - trained model
/// * `config` - configured algorithm and requested rounds
/// # Errors
/// * `SchemaError` if the table does not match the model
/// * if the backend fails or returns the wrong number of scores
pub fn predict(strategy: &dyn ScoringStrategy, table: &FeatureTable, model: &ModelArtifact, config: &PredictConfig) -> anyhow::Result<Vec<f64>> {
    let columns = model.check_table(table, config.algorithm())?;
    let rounds = model.effective_rounds(config.rounds());
    info!("Scoring {} {} rows with {rounds} of {} rounds...", table.len(), table.class(), model.trained_rounds());

    let matrix = FeatureMatrix {
        names: columns.iter().map(|&c| table.feature_names()[c].as_str()).collect(),
        rows: gather_rows(table, &columns),
        labels: None
    };
    let scores = strategy.score(model.body(), &matrix, rounds)?;
    anyhow::ensure!(
        scores.len() == table.len(),
        "Scoring returned {} values for {} rows", scores.len(), table.len()
    );
    if let Some(bad) = scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
        anyhow::bail!("Scoring returned a probability outside [0, 1]: {bad}");
    }
    Ok(scores)
}

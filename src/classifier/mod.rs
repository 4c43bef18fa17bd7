
/// In-process gradient boosted trees
pub mod boosting;
/// External train and predict programs
pub mod delegate;
/// Boosting hyperparameters and their overrides
pub mod hyperparameters;
/// Persisted models and schema checks
pub mod model;
/// Quantile binning of feature values
pub mod quantize;
/// The scoring strategy interface plus train/predict entry points
pub mod strategy;

use std::path::Path;

use crate::classifier::delegate::{DelegatePrograms, DelegateStrategy};
use crate::classifier::model::Algorithm;
use crate::classifier::strategy::{BoostedStrategy, ScoringStrategy};

/// Builds the scoring backend selected by the run configuration
/// # Arguments
/// * `algorithm` - the configured backend
/// * `programs` - delegate programs, ignored for the boosted backend
/// * `work_dir` - folder for delegate exchange tables
/// * `label` - prefix for delegate exchange tables
/// * `artifact_fn` - where a delegate writes its trained artifact
pub fn build_strategy(algorithm: Algorithm, programs: &DelegatePrograms, work_dir: &Path, label: &str, artifact_fn: &Path) -> Box<dyn ScoringStrategy> {
    match algorithm {
        Algorithm::Boosted => Box::new(BoostedStrategy),
        Algorithm::Delegate => Box::new(DelegateStrategy::new(programs.clone(), work_dir, label, artifact_fn))
    }
}


use anyhow::Context;
use log::{debug, info};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::classifier::hyperparameters::Hyperparameters;
use crate::classifier::model::{Algorithm, ModelBody};
use crate::classifier::strategy::{FeatureMatrix, ScoringStrategy, TrainingError};
use crate::writers::feature_tsv::{read_score_column, write_feature_matrix};

#[derive(thiserror::Error, Debug)]
pub enum DelegateError {
    #[error("no delegate {stage} program was configured")]
    MissingProgram { stage: &'static str },
    #[error("failed to launch {program:?}: {source}")]
    Launch { program: PathBuf, source: std::io::Error },
    #[error("{program:?} exited with status {code:?}: {stderr}")]
    ExitStatus { program: PathBuf, code: Option<i32>, stderr: String },
    #[error("{program:?} did not produce {expected:?}")]
    MissingOutput { program: PathBuf, expected: PathBuf },
    #[error("delegate scores are invalid: {reason}")]
    BadScores { reason: String }
}

/// External programs that train and apply a model
#[derive(Clone, Debug, Default)]
pub struct DelegatePrograms {
    /// Invoked as `<train> <table.tsv> <artifact>`
    pub train: Option<PathBuf>,
    /// Invoked as `<predict> <artifact> <table.tsv> <scored.tsv>`
    pub predict: Option<PathBuf>
}

/// Scores through external programs, exchanging feature matrices as TSV files
#[derive(Clone, Debug)]
pub struct DelegateStrategy {
    programs: DelegatePrograms,
    /// Folder for the exchanged tables
    work_dir: PathBuf,
    /// Prefix for exchanged table names, usually the variant type designator
    label: String,
    /// Where a trained artifact is written
    artifact_fn: PathBuf
}

impl DelegateStrategy {
    /// Constructor
    /// # Arguments
    /// * `programs` - the train and predict programs
    /// * `work_dir` - folder for exchanged tables
    /// * `label` - prefix for exchanged table names
    /// * `artifact_fn` - output path for artifacts produced by training
    pub fn new(programs: DelegatePrograms, work_dir: &Path, label: &str, artifact_fn: &Path) -> Self {
        Self {
            programs,
            work_dir: work_dir.to_path_buf(),
            label: label.to_string(),
            artifact_fn: artifact_fn.to_path_buf()
        }
    }
}

/// Deletes an output left by an earlier run so that only a fresh file counts as produced
fn remove_stale_output(output_fn: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(output_fn) {
        Ok(()) => {
            debug!("Removed stale {output_fn:?}");
            Ok(())
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("Error while removing stale {output_fn:?}:"))
    }
}

/// Runs a program to completion, capturing stderr for error reporting
fn run_program(program: &Path, args: &[&Path]) -> Result<(), DelegateError> {
    debug!("Running {program:?} {args:?}");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| DelegateError::Launch { program: program.to_path_buf(), source })?;
    if output.status.success() {
        Ok(())
    } else {
        Err(DelegateError::ExitStatus {
            program: program.to_path_buf(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string()
        })
    }
}

impl ScoringStrategy for DelegateStrategy {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Delegate
    }

    fn fit(&self, matrix: &FeatureMatrix, _hyperparameters: &Hyperparameters, rounds: usize) -> anyhow::Result<(ModelBody, usize)> {
        let program = self.programs.train.as_deref()
            .ok_or(DelegateError::MissingProgram { stage: "train" })?;
        let labels = matrix.labels.as_deref().ok_or(TrainingError::NoLabels)?;

        let table_fn = self.work_dir.join(format!("{}.train.tsv", self.label));
        write_feature_matrix(&table_fn, &matrix.names, &matrix.rows, Some(labels))
            .with_context(|| format!("Error while writing delegate training table {table_fn:?}:"))?;

        remove_stale_output(&self.artifact_fn)?;
        info!("Training with delegate {program:?}...");
        run_program(program, &[&table_fn, &self.artifact_fn])?;
        if !self.artifact_fn.exists() {
            return Err(DelegateError::MissingOutput { program: program.to_path_buf(), expected: self.artifact_fn.clone() }.into());
        }
        Ok((ModelBody::Delegate { artifact: self.artifact_fn.clone() }, rounds))
    }

    fn score(&self, body: &ModelBody, matrix: &FeatureMatrix, _rounds: usize) -> anyhow::Result<Vec<f64>> {
        let artifact = match body {
            ModelBody::Delegate { artifact } => artifact,
            ModelBody::Boosted(_) => anyhow::bail!("Delegate scoring cannot use a boosted model body")
        };
        let program = self.programs.predict.as_deref()
            .ok_or(DelegateError::MissingProgram { stage: "predict" })?;

        let table_fn = self.work_dir.join(format!("{}.predict.tsv", self.label));
        let scored_fn = self.work_dir.join(format!("{}.scored.tsv", self.label));
        write_feature_matrix(&table_fn, &matrix.names, &matrix.rows, None)
            .with_context(|| format!("Error while writing delegate scoring table {table_fn:?}:"))?;

        remove_stale_output(&scored_fn)?;
        info!("Scoring with delegate {program:?}...");
        run_program(program, &[artifact, &table_fn, &scored_fn])?;
        if !scored_fn.exists() {
            return Err(DelegateError::MissingOutput { program: program.to_path_buf(), expected: scored_fn }.into());
        }

        let scores = read_score_column(&scored_fn)
            .map_err(|e| DelegateError::BadScores { reason: format!("{e:#}") })?;
        if scores.len() != matrix.rows.len() {
            return Err(DelegateError::BadScores {
                reason: format!("expected {} scores, found {}", matrix.rows.len(), scores.len())
            }.into());
        }
        if let Some(bad) = scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
            return Err(DelegateError::BadScores { reason: format!("score {bad} is outside [0, 1]") }.into());
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(labels: Option<Vec<bool>>) -> FeatureMatrix<'static> {
        FeatureMatrix {
            names: vec!["NUM_TOOLS", "T_VAF"],
            rows: vec![vec![3.0, 0.4], vec![1.0, f64::NAN]],
            labels
        }
    }

    #[test]
    fn test_missing_programs() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = DelegateStrategy::new(DelegatePrograms::default(), dir.path(), "sSNV", &dir.path().join("model.bin"));
        let err = strategy.fit(&matrix(Some(vec![true, false])), &Hyperparameters::default(), 10).unwrap_err();
        assert!(matches!(err.downcast_ref::<DelegateError>(), Some(DelegateError::MissingProgram { stage: "train" })));

        let body = ModelBody::Delegate { artifact: dir.path().join("model.bin") };
        let err = strategy.score(&body, &matrix(None), 10).unwrap_err();
        assert!(matches!(err.downcast_ref::<DelegateError>(), Some(DelegateError::MissingProgram { stage: "predict" })));
    }

    #[cfg(unix)]
    #[test]
    fn test_delegate_programs() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        // scores every row 0.75, skipping the header line of the input table
        let predict_fn = dir.path().join("predict.sh");
        std::fs::write(&predict_fn, "#!/bin/sh\n{ echo SCORE; tail -n +2 \"$2\" | sed 's/.*/0.75/'; } > \"$3\"\n").unwrap();
        std::fs::set_permissions(&predict_fn, std::fs::Permissions::from_mode(0o755)).unwrap();
        let bad_fn = dir.path().join("bad.sh");
        std::fs::write(&bad_fn, "#!/bin/sh\n{ echo SCORE; echo 1.5; echo 0.2; } > \"$3\"\n").unwrap();
        std::fs::set_permissions(&bad_fn, std::fs::Permissions::from_mode(0o755)).unwrap();

        let artifact_fn = dir.path().join("model.bin");
        let programs = DelegatePrograms { train: Some(PathBuf::from("cp")), predict: Some(predict_fn) };
        let strategy = DelegateStrategy::new(programs, dir.path(), "sSNV", &artifact_fn);

        // training copies the table into the artifact
        let (body, rounds) = strategy.fit(&matrix(Some(vec![true, false])), &Hyperparameters::default(), 10).unwrap();
        assert_eq!(body, ModelBody::Delegate { artifact: artifact_fn.clone() });
        assert_eq!(rounds, 10);
        let artifact = std::fs::read_to_string(&artifact_fn).unwrap();
        assert_eq!(artifact, "NUM_TOOLS\tT_VAF\tTrueVariant_or_False\n3\t0.4\t1\n1\tnan\t0\n");

        let scores = strategy.score(&body, &matrix(None), 10).unwrap();
        assert_eq!(scores, vec![0.75, 0.75]);

        // out of range scores are rejected
        let programs = DelegatePrograms { train: None, predict: Some(bad_fn) };
        let strategy = DelegateStrategy::new(programs, dir.path(), "sSNV", &artifact_fn);
        let err = strategy.score(&body, &matrix(None), 10).unwrap_err();
        assert!(matches!(err.downcast_ref::<DelegateError>(), Some(DelegateError::BadScores { .. })));

        // non-zero exit
        let programs = DelegatePrograms { train: Some(PathBuf::from("false")), predict: None };
        let strategy = DelegateStrategy::new(programs, dir.path(), "sSNV", &artifact_fn);
        let err = strategy.fit(&matrix(Some(vec![true, false])), &Hyperparameters::default(), 10).unwrap_err();
        assert!(matches!(err.downcast_ref::<DelegateError>(), Some(DelegateError::ExitStatus { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_stale_outputs_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let artifact_fn = dir.path().join("model.bin");
        std::fs::write(&artifact_fn, "from an earlier run").unwrap();
        std::fs::write(dir.path().join("sSNV.scored.tsv"), "SCORE\n0.5\n0.5\n").unwrap();

        // succeeds without writing anything
        let programs = DelegatePrograms { train: Some(PathBuf::from("true")), predict: Some(PathBuf::from("true")) };
        let strategy = DelegateStrategy::new(programs, dir.path(), "sSNV", &artifact_fn);
        let err = strategy.fit(&matrix(Some(vec![true, false])), &Hyperparameters::default(), 10).unwrap_err();
        assert!(matches!(err.downcast_ref::<DelegateError>(), Some(DelegateError::MissingOutput { .. })));
        assert!(!artifact_fn.exists());

        let body = ModelBody::Delegate { artifact: artifact_fn.clone() };
        let err = strategy.score(&body, &matrix(None), 10).unwrap_err();
        assert!(matches!(err.downcast_ref::<DelegateError>(), Some(DelegateError::MissingOutput { .. })));
    }
}

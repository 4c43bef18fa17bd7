
use anyhow::{bail, ensure};
use clap::Args;
use indexmap::IndexSet;
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::call_emitter::{EmitConfig, EmitConfigBuilder};
use crate::classifier::delegate::DelegatePrograms;
use crate::classifier::hyperparameters::Hyperparameters;
use crate::classifier::model::Algorithm;
use crate::cli::core::{check_optional_filename, check_required_filename, FULL_VERSION};
use crate::features::extractor::{ExtractConfig, ExtractConfigBuilder};
use crate::features::schema::DEFAULT_EXCLUDED;
use crate::parsing::contig_index::fai_path;
use crate::pipeline::ClassInputs;

/// Options common to the paired and single-sample subcommands
#[derive(Args, Clone, Default, Serialize)]
pub struct SharedSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    pub quorum_version: String,

    /// Reference FASTA file, a `.fai` index must be next to it
    #[clap(required = true)]
    #[clap(short = 'r')]
    #[clap(long = "reference")]
    #[clap(value_name = "FASTA")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reference_fn: PathBuf,

    /// Output folder
    #[clap(short = 'o')]
    #[clap(long = "output-directory")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    #[clap(default_value = ".")]
    pub output_folder: PathBuf,

    /// Optional output debug folder, keeps all intermediate files
    #[clap(long = "output-debug")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub debug_folder: Option<PathBuf>,

    /// Known SNV calls (VCF), enables model training for substitutions
    #[clap(long = "truth-snv")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Classifier"))]
    pub truth_snv: Option<PathBuf>,

    /// Known indel calls (VCF), enables model training for indels
    #[clap(long = "truth-indel")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Classifier"))]
    pub truth_indel: Option<PathBuf>,

    /// Trained substitution model (JSON)
    #[clap(long = "classifier-snv")]
    #[clap(value_name = "MODEL")]
    #[clap(help_heading = Some("Classifier"))]
    pub classifier_snv: Option<PathBuf>,

    /// Trained indel model (JSON)
    #[clap(long = "classifier-indel")]
    #[clap(value_name = "MODEL")]
    #[clap(help_heading = Some("Classifier"))]
    pub classifier_indel: Option<PathBuf>,

    /// dbSNP annotations (VCF)
    #[clap(long = "dbsnp")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Annotations"))]
    pub dbsnp: Option<PathBuf>,

    /// COSMIC annotations (VCF)
    #[clap(long = "cosmic")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Annotations"))]
    pub cosmic: Option<PathBuf>,

    /// Only sites overlapping these regions are considered (BED)
    #[clap(long = "inclusion-region")]
    #[clap(value_name = "BED")]
    #[clap(help_heading = Some("Annotations"))]
    pub inclusion_region: Option<PathBuf>,

    /// Sites overlapping these regions are dropped (BED)
    #[clap(long = "exclusion-region")]
    #[clap(value_name = "BED")]
    #[clap(help_heading = Some("Annotations"))]
    pub exclusion_region: Option<PathBuf>,

    /// Minimum classifier probability for a PASS call
    #[clap(long = "pass-threshold")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Thresholds"))]
    #[clap(default_value = "0.5")]
    pub pass_threshold: f64,

    /// Minimum classifier probability for a LowQual call
    #[clap(long = "lowqual-threshold")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Thresholds"))]
    #[clap(default_value = "0.1")]
    pub lowqual_threshold: f64,

    /// Minimum VAF for a homozygous ALT genotype
    #[clap(long = "homozygous-threshold")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Thresholds"))]
    #[clap(default_value = "0.85")]
    pub hom_threshold: f64,

    /// Minimum VAF for a heterozygous genotype
    #[clap(long = "heterozygous-threshold")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Thresholds"))]
    #[clap(default_value = "0.01")]
    pub het_threshold: f64,

    /// Minimum mapping quality for a read to count as evidence
    #[clap(long = "minimum-mapping-quality")]
    #[clap(value_name = "MAPQ")]
    #[clap(help_heading = Some("Thresholds"))]
    #[clap(default_value = "1")]
    pub min_mapping_quality: u8,

    /// Minimum base quality for a read to count as evidence
    #[clap(long = "minimum-base-quality")]
    #[clap(value_name = "BQ")]
    #[clap(help_heading = Some("Thresholds"))]
    #[clap(default_value = "5")]
    pub min_base_quality: u8,

    /// Consensus vote requirement; a fraction of the callers run when <= 1, otherwise a caller count
    #[clap(long = "minimum-num-callers")]
    #[clap(value_name = "FLOAT")]
    #[clap(help_heading = Some("Thresholds"))]
    #[clap(default_value = "0.5")]
    pub min_callers: f64,

    /// Scoring backend
    #[clap(value_enum)]
    #[clap(long = "algorithm")]
    #[clap(help_heading = Some("Classifier"))]
    #[clap(default_value_t = Algorithm::Boosted)]
    pub algorithm: Algorithm,

    /// Seed for row and feature sampling
    #[clap(long = "seed")]
    #[clap(value_name = "INT")]
    #[clap(help_heading = Some("Classifier"))]
    #[clap(default_value = "0")]
    pub seed: u64,

    /// Maximum tree depth
    #[clap(long = "tree-depth")]
    #[clap(value_name = "INT")]
    #[clap(help_heading = Some("Classifier"))]
    #[clap(default_value = "12")]
    pub tree_depth: usize,

    /// Boosting rounds [default: 500 when training, 100 when predicting]
    #[clap(long = "iterations")]
    #[clap(value_name = "INT")]
    #[clap(help_heading = Some("Classifier"))]
    pub iterations: Option<usize>,

    /// Extra feature columns left out of training, added to Strelka_QSS Strelka_TQSS if_COSMIC COSMIC_CNT
    #[clap(long = "features-excluded")]
    #[clap(value_name = "NAME")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Classifier"))]
    pub features_excluded: Vec<String>,

    /// Hyperparameter overrides, e.g. "eta:0.1"
    #[clap(long = "extra-hyperparameters")]
    #[clap(value_name = "PARAM:VALUE")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Classifier"))]
    pub extra_hyperparameters: Vec<String>,

    /// External training program, called as `<program> <table.tsv> <artifact>`
    #[clap(long = "delegate-train")]
    #[clap(value_name = "PROGRAM")]
    #[clap(help_heading = Some("Classifier"))]
    pub delegate_train: Option<PathBuf>,

    /// External scoring program, called as `<program> <artifact> <table.tsv> <scored.tsv>`
    #[clap(long = "delegate-predict")]
    #[clap(value_name = "PROGRAM")]
    #[clap(help_heading = Some("Classifier"))]
    pub delegate_predict: Option<PathBuf>,

    /// Number of threads used for tree training
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Keeps the intermediate folder after a successful run
    #[clap(long = "keep-intermediates")]
    pub keep_intermediates: bool,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8
}

impl SharedSettings {
    /// Truth set and model for the substitution class
    pub fn snv_inputs(&self) -> ClassInputs {
        ClassInputs {
            truth: self.truth_snv.clone(),
            classifier: self.classifier_snv.clone()
        }
    }

    /// Truth set and model for the indel class
    pub fn indel_inputs(&self) -> ClassInputs {
        ClassInputs {
            truth: self.truth_indel.clone(),
            classifier: self.classifier_indel.clone()
        }
    }

    /// Boosting hyperparameters from the named options, then the overrides
    pub fn hyperparameters(&self) -> anyhow::Result<Hyperparameters> {
        let named = vec![
            format!("max_depth:{}", self.tree_depth),
            format!("seed:{}", self.seed),
            format!("nthread:{}", self.threads)
        ];
        let ret = Hyperparameters::default()
            .with_overrides(&named)?
            .with_overrides(&self.extra_hyperparameters)?;
        Ok(ret)
    }

    pub fn extract_config(&self) -> anyhow::Result<ExtractConfig> {
        let ret = ExtractConfigBuilder::default()
            .min_mapping_quality(self.min_mapping_quality)
            .min_base_quality(self.min_base_quality)
            .build()?;
        Ok(ret)
    }

    pub fn emit_config(&self) -> anyhow::Result<EmitConfig> {
        let ret = EmitConfigBuilder::default()
            .pass_threshold(self.pass_threshold)
            .lowqual_threshold(self.lowqual_threshold)
            .hom_threshold(self.hom_threshold)
            .het_threshold(self.het_threshold)
            .min_callers(self.min_callers)
            .build()?;
        Ok(ret)
    }

    pub fn delegate_programs(&self) -> DelegatePrograms {
        DelegatePrograms {
            train: self.delegate_train.clone(),
            predict: self.delegate_predict.clone()
        }
    }

    /// True when any class will train a model
    pub fn is_training(&self) -> bool {
        (self.truth_snv.is_some() && self.classifier_snv.is_none()) ||
            (self.truth_indel.is_some() && self.classifier_indel.is_none())
    }

    /// True when any class will be scored by a model
    pub fn is_predicting(&self) -> bool {
        self.classifier_snv.is_some() || self.classifier_indel.is_some()
    }
}

/// Checks the shared options, logs them, and fills in defaults
/// # Arguments
/// * `settings` - the parsed shared options
/// # Errors
/// * if a supplied file does not exist, including the reference `.fai`
/// * if a threshold is out of range or the thresholds are out of order
/// * if a hyperparameter override is invalid
/// * if the delegate backend is missing a program it needs
pub fn check_shared_settings(mut settings: SharedSettings) -> anyhow::Result<SharedSettings> {
    // hard code the version in
    settings.quorum_version = FULL_VERSION.clone();
    info!("Quorum version: {:?}", &settings.quorum_version);
    info!("Inputs:");

    check_required_filename(&settings.reference_fn, "Reference FASTA")?;
    info!("\tReference: {:?}", &settings.reference_fn);
    let fai_fn = fai_path(&settings.reference_fn);
    check_required_filename(&fai_fn, "Reference FASTA index")?;

    let optional_files: [(Option<&Path>, &str); 8] = [
        (settings.truth_snv.as_deref(), "SNV truth set"),
        (settings.truth_indel.as_deref(), "Indel truth set"),
        (settings.classifier_snv.as_deref(), "SNV classifier"),
        (settings.classifier_indel.as_deref(), "Indel classifier"),
        (settings.dbsnp.as_deref(), "dbSNP"),
        (settings.cosmic.as_deref(), "COSMIC"),
        (settings.inclusion_region.as_deref(), "Inclusion region"),
        (settings.exclusion_region.as_deref(), "Exclusion region")
    ];
    for (opt_filename, label) in optional_files.into_iter() {
        check_optional_filename(opt_filename, label)?;
        if let Some(filename) = opt_filename {
            info!("\t{label}: {filename:?}");
        }
    }

    info!("Outputs:");
    info!("\tOutput folder: {:?}", settings.output_folder);
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("\tDebug folder: {debug_folder:?}");
    }
    if settings.keep_intermediates {
        info!("\tKeeping intermediates");
    }

    info!("Thresholds:");
    ensure!(
        (0.0..=1.0).contains(&settings.lowqual_threshold) && (0.0..=1.0).contains(&settings.pass_threshold),
        "--pass-threshold and --lowqual-threshold must be in [0, 1]"
    );
    ensure!(settings.lowqual_threshold <= settings.pass_threshold, "--lowqual-threshold must be <= --pass-threshold");
    ensure!(
        (0.0..=1.0).contains(&settings.het_threshold) && (0.0..=1.0).contains(&settings.hom_threshold),
        "--heterozygous-threshold and --homozygous-threshold must be in [0, 1]"
    );
    ensure!(settings.het_threshold <= settings.hom_threshold, "--heterozygous-threshold must be <= --homozygous-threshold");
    ensure!(settings.min_callers > 0.0, "--minimum-num-callers must be > 0");
    info!("\tPASS / LowQual: {} / {}", settings.pass_threshold, settings.lowqual_threshold);
    info!("\tHomozygous / heterozygous VAF: {} / {}", settings.hom_threshold, settings.het_threshold);
    info!("\tMinimum MAPQ / BQ: {} / {}", settings.min_mapping_quality, settings.min_base_quality);
    info!("\tMinimum callers: {}", settings.min_callers);

    info!("Classifier:");
    info!("\tAlgorithm: {}", settings.algorithm);
    let excluded: IndexSet<String> = DEFAULT_EXCLUDED.iter()
        .map(|s| s.to_string())
        .chain(settings.features_excluded.drain(..))
        .collect();
    settings.features_excluded = excluded.into_iter().collect();
    info!("\tExcluded features: {:?}", settings.features_excluded);
    ensure!(settings.threads > 0, "--threads must be at least 1");
    let hyperparameters = settings.hyperparameters()?;
    info!("\tHyperparameters: {hyperparameters:?}");
    if let Some(iterations) = settings.iterations {
        ensure!(iterations > 0, "--iterations must be at least 1");
        info!("\tIterations: {iterations}");
    }

    if settings.algorithm == Algorithm::Delegate {
        if settings.is_training() && settings.delegate_train.is_none() {
            bail!("--algorithm delegate requires --delegate-train when training");
        }
        if settings.is_predicting() && settings.delegate_predict.is_none() {
            bail!("--algorithm delegate requires --delegate-predict when a classifier is supplied");
        }
        check_optional_filename(settings.delegate_train.as_deref(), "Delegate train program")?;
        check_optional_filename(settings.delegate_predict.as_deref(), "Delegate predict program")?;
        info!("\tDelegate programs: {:?} / {:?}", settings.delegate_train, settings.delegate_predict);
    }

    Ok(settings)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_shared() -> SharedSettings {
        SharedSettings {
            reference_fn: PathBuf::from("test_data/reference/mini.fa"),
            output_folder: PathBuf::from("."),
            pass_threshold: 0.5,
            lowqual_threshold: 0.1,
            hom_threshold: 0.85,
            het_threshold: 0.01,
            min_mapping_quality: 1,
            min_base_quality: 5,
            min_callers: 0.5,
            algorithm: Algorithm::Boosted,
            tree_depth: 12,
            threads: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_filled() {
        let settings = check_shared_settings(test_shared()).unwrap();
        assert_eq!(settings.quorum_version, *FULL_VERSION);
        assert_eq!(settings.features_excluded, DEFAULT_EXCLUDED.to_vec());
        assert_eq!(settings.emit_config().unwrap(), EmitConfig::default());
    }

    #[test]
    fn test_user_exclusions_extend_defaults() {
        let mut settings = test_shared();
        settings.features_excluded = vec!["T_VAF".to_string(), "if_COSMIC".to_string(), "T_VAF".to_string()];
        let settings = check_shared_settings(settings).unwrap();
        assert_eq!(settings.features_excluded, vec!["Strelka_QSS", "Strelka_TQSS", "if_COSMIC", "COSMIC_CNT", "T_VAF"]);
    }

    #[test]
    fn test_threshold_order() {
        let mut settings = test_shared();
        settings.lowqual_threshold = 0.6;
        assert!(check_shared_settings(settings).is_err());

        let mut settings = test_shared();
        settings.het_threshold = 0.9;
        assert!(check_shared_settings(settings).is_err());

        let mut settings = test_shared();
        settings.min_callers = 0.0;
        assert!(check_shared_settings(settings).is_err());
    }

    #[test]
    fn test_missing_files() {
        let mut settings = test_shared();
        settings.dbsnp = Some(PathBuf::from("test_data/annotations/missing.vcf"));
        assert!(check_shared_settings(settings).is_err());

        let mut settings = test_shared();
        settings.reference_fn = PathBuf::from("test_data/reference/missing.fa");
        assert!(check_shared_settings(settings).is_err());
    }

    #[test]
    fn test_hyperparameters() {
        let mut settings = test_shared();
        settings.tree_depth = 4;
        settings.seed = 7;
        settings.extra_hyperparameters = vec!["eta:0.1".to_string(), "max_depth:6".to_string()];
        let hyperparameters = settings.hyperparameters().unwrap();
        // overrides win over the named options
        assert_eq!(hyperparameters.max_depth(), 6);
        assert_eq!(hyperparameters.eta(), 0.1);
        assert_eq!(hyperparameters.seed(), 7);

        settings.extra_hyperparameters = vec!["learning_rate:0.1".to_string()];
        assert!(check_shared_settings(settings).is_err());
    }

    #[test]
    fn test_delegate_programs_required() {
        let mut settings = test_shared();
        settings.algorithm = Algorithm::Delegate;
        // consensus only, nothing to delegate
        assert!(check_shared_settings(settings.clone()).is_ok());

        settings.truth_snv = Some(PathBuf::from("test_data/truth/truth.snv.vcf"));
        assert!(check_shared_settings(settings.clone()).is_err());
        settings.delegate_train = Some(PathBuf::from("test_data/truth/truth.snv.vcf"));
        assert!(check_shared_settings(settings).is_ok());
    }
}


use anyhow::Context;
use log::{debug, info, warn};
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use std::path::{Path, PathBuf};

use crate::aggregator::aggregate;
use crate::call_emitter::{emit_calls, EmitConfig};
use crate::classifier::build_strategy;
use crate::classifier::delegate::{DelegateError, DelegatePrograms};
use crate::classifier::hyperparameters::{HyperparameterError, Hyperparameters};
use crate::classifier::model::{Algorithm, ModelArtifact, SchemaError};
use crate::classifier::strategy::{predict, train, PredictConfigBuilder, TrainConfigBuilder, TrainingError, DEFAULT_PREDICT_ROUNDS, DEFAULT_TRAIN_ROUNDS};
use crate::data_types::call_record::CallFilter;
use crate::data_types::callers::{CallerInputs, CallerRoster};
use crate::data_types::site::{SequencingMode, SiteError, VariantClass};
use crate::features::extractor::{extract_features, ExtractConfig, ExtractInputs};
use crate::features::schema::FeatureSchema;
use crate::parsing::caller_vcf::SampleNames;
use crate::parsing::contig_index::ContigIndex;
use crate::parsing::regions::RegionFilter;
use crate::writers::aggregate_vcf::write_aggregate_vcf;
use crate::writers::call_vcf::{write_call_vcf, CallVcfMetadata};
use crate::writers::feature_tsv::write_feature_table;
use crate::writers::normalized_calls::{normalized_path, write_normalized_calls};

/// Name of the intermediate folder inside the output folder
pub const INTERMEDIATES_FOLDER: &str = "intermediates";

/// Name of the folder inside the output folder that holds a run's files until it succeeds
pub const STAGING_FOLDER: &str = ".quorum_staging";

/// Truth set and model supplied for one variant class; their presence selects the run mode
#[derive(Clone, Debug, Default)]
pub struct ClassInputs {
    pub truth: Option<PathBuf>,
    pub classifier: Option<PathBuf>
}

/// What a class is doing in this run
#[derive(Clone, Debug, PartialEq)]
pub enum RunMode {
    /// A model was supplied, score with it
    Predict { model_fn: PathBuf },
    /// A truth set without a model, train a model and emit consensus calls
    Train { truth_fn: PathBuf },
    /// Neither, emit consensus calls
    Consensus
}

impl RunMode {
    /// A model always wins over a truth set
    pub fn select(inputs: &ClassInputs) -> Self {
        match (inputs.classifier.as_ref(), inputs.truth.as_ref()) {
            (Some(model_fn), _) => RunMode::Predict { model_fn: model_fn.clone() },
            (None, Some(truth_fn)) => RunMode::Train { truth_fn: truth_fn.clone() },
            (None, None) => RunMode::Consensus
        }
    }
}

/// Everything needed to run both variant classes, built once from the command line
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub mode: SequencingMode,
    pub output_folder: PathBuf,
    pub callers: CallerInputs,
    pub samples: SampleNames,
    pub tumor_evidence: Option<PathBuf>,
    pub normal_evidence: Option<PathBuf>,
    pub dbsnp: Option<PathBuf>,
    pub cosmic: Option<PathBuf>,
    pub inclusion_region: Option<PathBuf>,
    pub exclusion_region: Option<PathBuf>,
    pub snv: ClassInputs,
    pub indel: ClassInputs,
    pub extract_config: ExtractConfig,
    pub emit_config: EmitConfig,
    pub algorithm: Algorithm,
    pub hyperparameters: Hyperparameters,
    /// Boosting rounds; None uses the train or predict default
    pub iterations: Option<usize>,
    pub excluded_features: Vec<String>,
    pub delegate: DelegatePrograms,
    pub keep_intermediates: bool,
    /// Debug runs always keep intermediates
    pub debug_run: bool
}

impl RunConfig {
    fn class_inputs(&self, class: VariantClass) -> &ClassInputs {
        match class {
            VariantClass::Snv => &self.snv,
            VariantClass::Indel => &self.indel
        }
    }

    /// Sample columns of the call files: normal then tumor for paired runs
    fn output_samples(&self) -> Vec<String> {
        match (self.mode, self.samples.normal.as_ref()) {
            (SequencingMode::Paired, Some(normal)) => vec![normal.clone(), self.samples.tumor.clone()],
            _ => vec![self.samples.tumor.clone()]
        }
    }
}

/// Summary of one class after the run
#[derive(Clone, Debug, PartialEq)]
pub struct ClassOutcome {
    pub class: VariantClass,
    pub run_mode: RunMode,
    /// The final call file
    pub calls_fn: PathBuf,
    pub num_calls: usize,
    pub num_pass: usize,
    /// Model written by training, if any
    pub model_fn: Option<PathBuf>
}

/// `<outdir>/<stem>.<type><ext>`
fn output_path(folder: &Path, stem: &str, class: VariantClass, extension: &str) -> PathBuf {
    folder.join(format!("{stem}.{}{extension}", class.designator()))
}

/// Path a trained model is saved to
pub fn model_path(folder: &Path, class: VariantClass) -> PathBuf {
    output_path(folder, "Ensemble", class, ".tsv.classifier.json")
}

/// Runs substitutions and then indels through aggregate, extract, score or train, and emit.
/// Every file is written to a staging folder first and moved into the output folder only after both classes succeed,
/// so a failed run leaves nothing behind. Intermediates are moved too for training, debug, or keep runs.
/// # Arguments
/// * `config` - the run configuration
/// * `reference` - loaded reference genome
/// * `contigs` - contig index from the reference `.fai`
/// # Errors
/// * any input, schema, training, or delegate error; the staging folder is removed in that case
pub fn run_pipeline(config: &RunConfig, reference: &ReferenceGenome, contigs: &ContigIndex) -> anyhow::Result<Vec<ClassOutcome>> {
    let staging = config.output_folder.join(STAGING_FOLDER);
    if staging.exists() {
        warn!("Removing leftover staging folder {staging:?}");
        std::fs::remove_dir_all(&staging)
            .with_context(|| format!("Error while removing {staging:?}:"))?;
    }
    let intermediates = staging.join(INTERMEDIATES_FOLDER);
    std::fs::create_dir_all(&intermediates)
        .with_context(|| format!("Error while creating {intermediates:?}:"))?;

    match run_classes(config, reference, contigs, &staging) {
        Ok(outcomes) => {
            let trained = outcomes.iter().any(|o| matches!(o.run_mode, RunMode::Train { .. }));
            let keep_intermediates = trained || config.debug_run || config.keep_intermediates;
            promote_outputs(&staging, &config.output_folder, keep_intermediates)?;
            Ok(outcomes)
        },
        Err(e) => {
            debug!("Removing {staging:?} after a failed run...");
            if let Err(cleanup_error) = std::fs::remove_dir_all(&staging) {
                warn!("Error while removing {staging:?}: {cleanup_error}");
            }
            Err(e)
        }
    }
}

/// Runs every class into the staging folder
fn run_classes(config: &RunConfig, reference: &ReferenceGenome, contigs: &ContigIndex, staging: &Path) -> anyhow::Result<Vec<ClassOutcome>> {
    let regions = RegionFilter::load(config.inclusion_region.as_deref(), config.exclusion_region.as_deref())?;
    if !regions.is_unbounded() {
        info!("Region filters loaded.");
    }

    let mut outcomes = vec![];
    for class in VariantClass::ALL {
        let outcome = run_class(config, class, reference, contigs, &regions, staging)?;
        info!("{class}: {} calls, {} PASS", outcome.num_calls, outcome.num_pass);
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

/// Moves everything in the staging folder into the output folder, replacing files from earlier runs
/// # Arguments
/// * `staging` - the populated staging folder, removed afterwards
/// * `output_folder` - the final destination
/// * `keep_intermediates` - if false, the staged intermediates are deleted instead of moved
fn promote_outputs(staging: &Path, output_folder: &Path, keep_intermediates: bool) -> anyhow::Result<()> {
    let intermediates = staging.join(INTERMEDIATES_FOLDER);
    if keep_intermediates {
        info!("Keeping intermediate files in {:?}", output_folder.join(INTERMEDIATES_FOLDER));
    } else {
        debug!("Removing {intermediates:?}...");
        std::fs::remove_dir_all(&intermediates)
            .with_context(|| format!("Error while removing {intermediates:?}:"))?;
    }

    let entries = std::fs::read_dir(staging)
        .with_context(|| format!("Error while listing {staging:?}:"))?;
    for entry in entries {
        let staged_fn = entry.with_context(|| format!("Error while listing {staging:?}:"))?.path();
        let Some(file_name) = staged_fn.file_name() else {
            continue;
        };
        let final_fn = output_folder.join(file_name);
        if final_fn.is_dir() {
            std::fs::remove_dir_all(&final_fn)
                .with_context(|| format!("Error while replacing {final_fn:?}:"))?;
        }
        std::fs::rename(&staged_fn, &final_fn)
            .with_context(|| format!("Error while moving {staged_fn:?} to {final_fn:?}:"))?;
    }
    std::fs::remove_dir(staging)
        .with_context(|| format!("Error while removing {staging:?}:"))
}

/// Runs one variant class end to end, writing into `staging`; returned paths point at the output folder
fn run_class(
    config: &RunConfig, class: VariantClass,
    reference: &ReferenceGenome, contigs: &ContigIndex, regions: &RegionFilter,
    staging: &Path
) -> anyhow::Result<ClassOutcome> {
    let output_folder = &config.output_folder;
    let intermediates = staging.join(INTERMEDIATES_FOLDER);
    let class_inputs = config.class_inputs(class);
    let run_mode = RunMode::select(class_inputs);
    info!("Processing {class} variants ({run_mode:?})...");

    // aggregate
    let roster = CallerRoster::resolve(class, config.mode, &config.callers);
    if roster.num_active() == 0 {
        warn!("No {class} callers were supplied");
    }
    let (aggregated, all_calls) = aggregate(&roster, &config.samples, contigs, regions)?;
    for calls in all_calls.iter() {
        write_normalized_calls(&normalized_path(&intermediates, calls, class), calls)?;
    }
    write_aggregate_vcf(&output_path(&intermediates, "Aggregated", class, ".vcf"), &aggregated, contigs)?;

    // extract
    let schema = FeatureSchema::from_roster(&roster);
    let extract_inputs = ExtractInputs {
        tumor_evidence: config.tumor_evidence.as_deref(),
        normal_evidence: config.normal_evidence.as_deref(),
        dbsnp: config.dbsnp.as_deref(),
        cosmic: config.cosmic.as_deref(),
        truth: class_inputs.truth.as_deref()
    };
    let features = extract_features(&aggregated, &schema, &extract_inputs, reference, config.extract_config)?;
    write_feature_table(&output_path(staging, "Ensemble", class, ".tsv"), &features, None)?;

    let artifact_ext = ".tsv.classifier.artifact";
    let strategy = build_strategy(
        config.algorithm, &config.delegate, &intermediates, class.designator(),
        &output_path(staging, "Ensemble", class, artifact_ext)
    );

    // score or train
    let (scores, classifier, trained_fn) = match &run_mode {
        RunMode::Predict { model_fn: supplied_fn } => {
            let model = ModelArtifact::load(supplied_fn)?;
            let predict_config = PredictConfigBuilder::default()
                .algorithm(config.algorithm)
                .rounds(config.iterations.unwrap_or(DEFAULT_PREDICT_ROUNDS))
                .build()?;
            let scores = predict(strategy.as_ref(), &features, &model, &predict_config)
                .with_context(|| format!("Error while scoring {class} sites with {supplied_fn:?}:"))?;
            write_feature_table(&output_path(staging, "SSeq.Classified", class, ".tsv"), &features, Some(scores.as_slice()))?;
            (Some(scores), Some(supplied_fn.as_path()), None)
        },
        RunMode::Train { truth_fn } => {
            let train_config = TrainConfigBuilder::default()
                .hyperparameters(config.hyperparameters.clone())
                .rounds(config.iterations.unwrap_or(DEFAULT_TRAIN_ROUNDS))
                .excluded_features(config.excluded_features.clone())
                .build()?;
            let mut model = train(strategy.as_ref(), &features, &train_config)
                .with_context(|| format!("Error while training a {class} model from {truth_fn:?}:"))?;
            // delegate artifacts are moved out of staging with everything else
            model.relocate_artifact(&output_path(output_folder, "Ensemble", class, artifact_ext));
            let model_fn = model_path(output_folder, class);
            info!("Saving {class} model to {model_fn:?}...");
            model.save(&model_path(staging, class))?;
            (None, None, Some(model_fn))
        },
        RunMode::Consensus => (None, None, None)
    };

    // emit
    let calls = emit_calls(&features, scores.as_deref(), &config.emit_config)?;
    let calls_stem = match classifier {
        Some(_) => "SSeq.Classified",
        None => "Consensus"
    };
    let active_callers = roster.active_callers();
    let metadata = CallVcfMetadata {
        callers: &active_callers,
        sample_names: config.output_samples(),
        emit_config: config.emit_config,
        classifier
    };
    write_call_vcf(&output_path(staging, calls_stem, class, ".vcf"), &calls, contigs, &metadata)?;

    Ok(ClassOutcome {
        class,
        run_mode,
        calls_fn: output_path(output_folder, calls_stem, class, ".vcf"),
        num_calls: calls.len(),
        num_pass: calls.iter().filter(|c| c.filter == CallFilter::Pass).count(),
        model_fn: trained_fn
    })
}

/// Process exit code for a failed run, chosen by the first typed error in the chain
pub fn failure_exit_code(error: &anyhow::Error) -> i32 {
    for cause in error.chain() {
        if cause.is::<HyperparameterError>() || cause.is::<TrainingError>() {
            return exitcode::CONFIG;
        }
        if cause.is::<SchemaError>() || cause.is::<SiteError>() {
            return exitcode::DATAERR;
        }
        if cause.is::<DelegateError>() {
            return exitcode::SOFTWARE;
        }
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            if io_error.kind() == std::io::ErrorKind::InvalidData {
                return exitcode::DATAERR;
            }
        }
    }
    exitcode::IOERR
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::callers::InputSlot;
    use crate::features::schema::DEFAULT_EXCLUDED;

    fn test_config(output_folder: &Path) -> RunConfig {
        let mut callers = CallerInputs::default();
        callers.set(InputSlot::Mutect2, Some(Path::new("test_data/callers/paired/mutect2.vcf")));
        callers.set(InputSlot::VarscanSnv, Some(Path::new("test_data/callers/paired/varscan.snv.vcf")));
        callers.set(InputSlot::Vardict, Some(Path::new("test_data/callers/paired/vardict.vcf")));
        RunConfig {
            mode: SequencingMode::Paired,
            output_folder: output_folder.to_path_buf(),
            callers,
            samples: SampleNames { tumor: "TUMOR".to_string(), normal: Some("NORMAL".to_string()) },
            tumor_evidence: Some(PathBuf::from("test_data/evidence/tumor.tsv")),
            normal_evidence: None,
            dbsnp: Some(PathBuf::from("test_data/annotations/dbsnp.vcf")),
            cosmic: Some(PathBuf::from("test_data/annotations/cosmic.vcf")),
            inclusion_region: None,
            exclusion_region: None,
            snv: ClassInputs::default(),
            indel: ClassInputs::default(),
            extract_config: ExtractConfig::default(),
            emit_config: EmitConfig::default(),
            algorithm: Algorithm::Boosted,
            hyperparameters: Hyperparameters::default(),
            iterations: Some(5),
            excluded_features: DEFAULT_EXCLUDED.iter().map(|s| s.to_string()).collect(),
            delegate: DelegatePrograms::default(),
            keep_intermediates: false,
            debug_run: false
        }
    }

    fn load_test_data() -> (ReferenceGenome, ContigIndex) {
        let reference = ReferenceGenome::from_fasta(Path::new("test_data/reference/mini.fa")).unwrap();
        let contigs = ContigIndex::from_fai(Path::new("test_data/reference/mini.fa.fai")).unwrap();
        (reference, contigs)
    }

    fn record_filters(vcf_fn: &Path) -> Vec<(String, String)> {
        std::fs::read_to_string(vcf_fn).unwrap()
            .lines()
            .filter(|l| !l.starts_with('#'))
            .map(|l| {
                let fields: Vec<&str> = l.split('\t').collect();
                (format!("{}:{} {}>{}", fields[0], fields[1], fields[3], fields[4]), fields[6].to_string())
            })
            .collect()
    }

    #[test]
    fn test_run_mode_selection() {
        let model = Some(PathBuf::from("model.json"));
        let truth = Some(PathBuf::from("truth.vcf"));
        assert_eq!(RunMode::select(&ClassInputs { truth: None, classifier: None }), RunMode::Consensus);
        assert_eq!(RunMode::select(&ClassInputs { truth: truth.clone(), classifier: None }), RunMode::Train { truth_fn: PathBuf::from("truth.vcf") });
        assert_eq!(RunMode::select(&ClassInputs { truth, classifier: model }), RunMode::Predict { model_fn: PathBuf::from("model.json") });
    }

    #[test]
    fn test_consensus_run() {
        let (reference, contigs) = load_test_data();
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let outcomes = run_pipeline(&config, &reference, &contigs).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.run_mode == RunMode::Consensus));

        // 3 SNV callers were run, so 2 votes are needed
        let snv_fn = dir.path().join("Consensus.sSNV.vcf");
        assert_eq!(outcomes[0].calls_fn, snv_fn);
        assert_eq!(record_filters(&snv_fn), vec![
            ("chr1:11 A>G".to_string(), "PASS".to_string()),
            ("chr1:15 T>A".to_string(), "REJECT".to_string()),
            ("chr1:15 T>C".to_string(), "PASS".to_string()),
            ("chr1:21 C>A".to_string(), "REJECT".to_string()),
            ("chr2:10 G>T".to_string(), "REJECT".to_string()),
        ]);
        assert_eq!(outcomes[0].num_pass, 2);

        // MuTect and VarDict were run for indels, one vote is enough
        let indel_fn = dir.path().join("Consensus.sINDEL.vcf");
        assert_eq!(record_filters(&indel_fn), vec![
            ("chr1:41 A>AT".to_string(), "PASS".to_string()),
            ("chr1:57 TCA>T".to_string(), "PASS".to_string()),
        ]);

        assert!(dir.path().join("Ensemble.sSNV.tsv").exists());
        assert!(dir.path().join("Ensemble.sINDEL.tsv").exists());
        assert!(!dir.path().join(INTERMEDIATES_FOLDER).exists());
        assert!(!dir.path().join(STAGING_FOLDER).exists());
    }

    #[test]
    fn test_train_then_classify() {
        let (reference, contigs) = load_test_data();
        let train_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(train_dir.path());
        config.snv.truth = Some(PathBuf::from("test_data/truth/truth.snv.vcf"));
        let outcomes = run_pipeline(&config, &reference, &contigs).unwrap();

        let model_fn = model_path(train_dir.path(), VariantClass::Snv);
        assert_eq!(outcomes[0].model_fn.as_ref(), Some(&model_fn));
        assert!(matches!(outcomes[0].run_mode, RunMode::Train { .. }));
        assert_eq!(outcomes[1].run_mode, RunMode::Consensus);
        // training emits consensus calls and keeps intermediates
        assert!(train_dir.path().join("Consensus.sSNV.vcf").exists());
        let intermediates = train_dir.path().join(INTERMEDIATES_FOLDER);
        assert!(intermediates.join("MuTect.sSNV.normalized.tsv").exists());
        assert!(intermediates.join("Aggregated.sINDEL.vcf").exists());

        let model = ModelArtifact::load(&model_fn).unwrap();
        assert_eq!(model.trained_rounds(), 5);
        assert_eq!(model.training_rows(), 5);
        assert!(!model.feature_names().iter().any(|n| n == "if_COSMIC"));

        // the same inputs scored by the model
        let classify_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(classify_dir.path());
        config.snv.classifier = Some(model_fn.clone());
        let outcomes = run_pipeline(&config, &reference, &contigs).unwrap();
        let classified_fn = classify_dir.path().join("SSeq.Classified.sSNV.vcf");
        assert_eq!(outcomes[0].calls_fn, classified_fn);
        assert_eq!(outcomes[0].num_calls, 5);
        assert!(classify_dir.path().join("SSeq.Classified.sSNV.tsv").exists());

        let text = std::fs::read_to_string(&classified_fn).unwrap();
        assert!(text.contains("##quorum_mode=classification"));
        assert!(text.contains("##quorum_classifier="));
        assert!(text.lines().filter(|l| !l.starts_with('#')).all(|l| l.contains("SCORE=")));

        // a model for the wrong class is a schema error
        let mismatch_dir = tempfile::tempdir().unwrap();
        let mut config = test_config(mismatch_dir.path());
        config.indel.classifier = Some(model_fn);
        let err = run_pipeline(&config, &reference, &contigs).unwrap_err();
        assert_eq!(failure_exit_code(&err), exitcode::DATAERR);
        // the substitution class finished first, but none of its files are kept
        assert_eq!(std::fs::read_dir(mismatch_dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_malformed_indel_input() {
        let (reference, contigs) = load_test_data();
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        // only read by the indel class, after all substitution outputs were produced
        config.callers.set(InputSlot::Scalpel, Some(Path::new("test_data/callers/malformed.vcf")));
        assert!(run_pipeline(&config, &reference, &contigs).is_err());
        let leftovers: Vec<PathBuf> = std::fs::read_dir(dir.path()).unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn test_rerun_replaces_outputs() {
        let (reference, contigs) = load_test_data();
        let dir = tempfile::tempdir().unwrap();
        let snv_fn = dir.path().join("Consensus.sSNV.vcf");
        std::fs::write(&snv_fn, "stale").unwrap();
        std::fs::create_dir_all(dir.path().join(STAGING_FOLDER)).unwrap();
        std::fs::write(dir.path().join(STAGING_FOLDER).join("Consensus.sINDEL.vcf"), "stale").unwrap();

        let mut config = test_config(dir.path());
        config.keep_intermediates = true;
        run_pipeline(&config, &reference, &contigs).unwrap();
        assert_eq!(record_filters(&snv_fn).len(), 5);
        assert_eq!(record_filters(&dir.path().join("Consensus.sINDEL.vcf")).len(), 2);
        assert!(dir.path().join(INTERMEDIATES_FOLDER).join("Aggregated.sSNV.vcf").exists());
        assert!(!dir.path().join(STAGING_FOLDER).exists());

        // kept intermediates of an earlier run are replaced, not merged
        let marker_fn = dir.path().join(INTERMEDIATES_FOLDER).join("marker.txt");
        std::fs::write(&marker_fn, "old").unwrap();
        config.keep_intermediates = false;
        config.debug_run = true;
        run_pipeline(&config, &reference, &contigs).unwrap();
        assert!(dir.path().join(INTERMEDIATES_FOLDER).join("Aggregated.sINDEL.vcf").exists());
        assert!(!marker_fn.exists());
    }

    #[test]
    fn test_failure_exit_code() {
        let err = anyhow::Error::new(TrainingError::NoLabels).context("Error while training:");
        assert_eq!(failure_exit_code(&err), exitcode::CONFIG);
        let err = anyhow::Error::new(SiteError::InvalidPosition).context("Invalid allele");
        assert_eq!(failure_exit_code(&err), exitcode::DATAERR);
        let err = anyhow::Error::new(DelegateError::MissingProgram { stage: "train" });
        assert_eq!(failure_exit_code(&err), exitcode::SOFTWARE);
        let err = anyhow::anyhow!("Error while creating \"out\":");
        assert_eq!(failure_exit_code(&err), exitcode::IOERR);

        let err = anyhow::Error::new(std::io::Error::new(std::io::ErrorKind::InvalidData, "invalid position"))
            .context("Error while parsing record #2:");
        assert_eq!(failure_exit_code(&err), exitcode::DATAERR);
    }
}

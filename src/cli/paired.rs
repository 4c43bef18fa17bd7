
use anyhow::bail;
use clap::Args;
use log::info;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::cli::core::{check_optional_filename, AFTER_HELP};
use crate::cli::shared::{check_shared_settings, SharedSettings};
use crate::data_types::callers::{CallerInputs, InputSlot};
use crate::data_types::site::{SequencingMode, VariantClass};
use crate::parsing::caller_vcf::SampleNames;
use crate::pipeline::RunConfig;

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
pub struct PairedSettings {
    #[clap(flatten)]
    pub shared: SharedSettings,

    /// Read evidence for the tumor sample (TSV)
    #[clap(long = "tumor-evidence")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Samples"))]
    pub tumor_evidence: Option<PathBuf>,

    /// Read evidence for the normal sample (TSV)
    #[clap(long = "normal-evidence")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Samples"))]
    pub normal_evidence: Option<PathBuf>,

    /// Tumor sample name in the caller VCFs and the output
    #[clap(long = "tumor-sample")]
    #[clap(value_name = "NAME")]
    #[clap(help_heading = Some("Samples"))]
    #[clap(default_value = "TUMOR")]
    pub tumor_sample: String,

    /// Normal sample name in the caller VCFs and the output
    #[clap(long = "normal-sample")]
    #[clap(value_name = "NAME")]
    #[clap(help_heading = Some("Samples"))]
    #[clap(default_value = "NORMAL")]
    pub normal_sample: String,

    /// MuTect SNV calls (VCF)
    #[clap(long = "mutect")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub mutect: Option<PathBuf>,

    /// Indelocator indel calls (VCF)
    #[clap(long = "indelocator")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub indelocator: Option<PathBuf>,

    /// MuTect2 calls (VCF), used for both classes ahead of --mutect and --indelocator
    #[clap(long = "mutect2")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub mutect2: Option<PathBuf>,

    /// VarScan2 SNV calls (VCF)
    #[clap(long = "varscan-snv")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub varscan_snv: Option<PathBuf>,

    /// VarScan2 indel calls (VCF)
    #[clap(long = "varscan-indel")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub varscan_indel: Option<PathBuf>,

    /// JointSNVMix2 SNV calls (VCF)
    #[clap(long = "jsm")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub jsm: Option<PathBuf>,

    /// SomaticSniper SNV calls (VCF)
    #[clap(long = "somaticsniper")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub sniper: Option<PathBuf>,

    /// VarDict calls (VCF)
    #[clap(long = "vardict")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub vardict: Option<PathBuf>,

    /// MuSE SNV calls (VCF)
    #[clap(long = "muse")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub muse: Option<PathBuf>,

    /// LoFreq SNV calls (VCF)
    #[clap(long = "lofreq-snv")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub lofreq_snv: Option<PathBuf>,

    /// LoFreq indel calls (VCF)
    #[clap(long = "lofreq-indel")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub lofreq_indel: Option<PathBuf>,

    /// Scalpel indel calls (VCF)
    #[clap(long = "scalpel")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub scalpel: Option<PathBuf>,

    /// Strelka SNV calls (VCF)
    #[clap(long = "strelka-snv")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub strelka_snv: Option<PathBuf>,

    /// Strelka indel calls (VCF)
    #[clap(long = "strelka-indel")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub strelka_indel: Option<PathBuf>,

    /// TNscope calls (VCF)
    #[clap(long = "tnscope")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub tnscope: Option<PathBuf>,

    /// Platypus calls (VCF)
    #[clap(long = "platypus")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub platypus: Option<PathBuf>,

    /// SNV calls from any other caller (VCF), one slot per file
    #[clap(long = "arbitrary-snvs")]
    #[clap(value_name = "VCF")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Callers"))]
    pub arbitrary_snvs: Vec<PathBuf>,

    /// Indel calls from any other caller (VCF), one slot per file
    #[clap(long = "arbitrary-indels")]
    #[clap(value_name = "VCF")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Callers"))]
    pub arbitrary_indels: Vec<PathBuf>
}

impl PairedSettings {
    /// Caller files keyed by input slot
    pub fn caller_inputs(&self) -> CallerInputs {
        let mut inputs = CallerInputs::default();
        let slots: [(InputSlot, Option<&Path>); 16] = [
            (InputSlot::Mutect, self.mutect.as_deref()),
            (InputSlot::Indelocator, self.indelocator.as_deref()),
            (InputSlot::Mutect2, self.mutect2.as_deref()),
            (InputSlot::VarscanSnv, self.varscan_snv.as_deref()),
            (InputSlot::VarscanIndel, self.varscan_indel.as_deref()),
            (InputSlot::Jsm, self.jsm.as_deref()),
            (InputSlot::Sniper, self.sniper.as_deref()),
            (InputSlot::Vardict, self.vardict.as_deref()),
            (InputSlot::Muse, self.muse.as_deref()),
            (InputSlot::LofreqSnv, self.lofreq_snv.as_deref()),
            (InputSlot::LofreqIndel, self.lofreq_indel.as_deref()),
            (InputSlot::Scalpel, self.scalpel.as_deref()),
            (InputSlot::StrelkaSnv, self.strelka_snv.as_deref()),
            (InputSlot::StrelkaIndel, self.strelka_indel.as_deref()),
            (InputSlot::Tnscope, self.tnscope.as_deref()),
            (InputSlot::Platypus, self.platypus.as_deref())
        ];
        for (slot, opt_filename) in slots.into_iter() {
            inputs.set(slot, opt_filename);
        }
        inputs.add_arbitrary(VariantClass::Snv, &self.arbitrary_snvs);
        inputs.add_arbitrary(VariantClass::Indel, &self.arbitrary_indels);
        inputs
    }

    /// Builds the run configuration from checked settings
    /// # Errors
    /// * if the hyperparameters or thresholds cannot be built
    pub fn run_config(&self) -> anyhow::Result<RunConfig> {
        let shared = &self.shared;
        Ok(RunConfig {
            mode: SequencingMode::Paired,
            output_folder: shared.output_folder.clone(),
            callers: self.caller_inputs(),
            samples: SampleNames {
                tumor: self.tumor_sample.clone(),
                normal: Some(self.normal_sample.clone())
            },
            tumor_evidence: self.tumor_evidence.clone(),
            normal_evidence: self.normal_evidence.clone(),
            dbsnp: shared.dbsnp.clone(),
            cosmic: shared.cosmic.clone(),
            inclusion_region: shared.inclusion_region.clone(),
            exclusion_region: shared.exclusion_region.clone(),
            snv: shared.snv_inputs(),
            indel: shared.indel_inputs(),
            extract_config: shared.extract_config()?,
            emit_config: shared.emit_config()?,
            algorithm: shared.algorithm,
            hyperparameters: shared.hyperparameters()?,
            iterations: shared.iterations,
            excluded_features: shared.features_excluded.clone(),
            delegate: shared.delegate_programs(),
            keep_intermediates: shared.keep_intermediates,
            debug_run: shared.debug_folder.is_some()
        })
    }
}

/// Checks the paired options and logs every resolved input
/// # Errors
/// * any shared option error
/// * if a caller or evidence file does not exist
pub fn check_paired_settings(mut settings: PairedSettings) -> anyhow::Result<PairedSettings> {
    info!("Sub-command: paired");
    settings.shared = check_shared_settings(settings.shared)?;

    info!("Samples:");
    info!("\tTumor: {:?}", settings.tumor_sample);
    info!("\tNormal: {:?}", settings.normal_sample);
    check_optional_filename(settings.tumor_evidence.as_deref(), "Tumor evidence")?;
    check_optional_filename(settings.normal_evidence.as_deref(), "Normal evidence")?;
    info!("\tTumor evidence: {:?}", settings.tumor_evidence);
    info!("\tNormal evidence: {:?}", settings.normal_evidence);

    info!("Callers:");
    let inputs = settings.caller_inputs();
    let all_files = inputs.all_files();
    for filename in all_files.iter() {
        check_optional_filename(Some(filename), "Caller VCF")?;
        info!("\t{filename:?}");
    }
    if all_files.is_empty() {
        bail!("At least one caller VCF is required");
    }

    Ok(settings)
}

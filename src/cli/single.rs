
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
pub struct SingleSettings {
    #[clap(flatten)]
    pub shared: SharedSettings,

    /// Read evidence for the sample (TSV)
    #[clap(long = "evidence")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Samples"))]
    pub evidence: Option<PathBuf>,

    /// Sample name in the caller VCFs and the output
    #[clap(long = "sample-name")]
    #[clap(value_name = "NAME")]
    #[clap(help_heading = Some("Samples"))]
    #[clap(default_value = "TUMOR")]
    pub sample_name: String,

    /// MuTect SNV calls (VCF)
    #[clap(long = "mutect")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub mutect: Option<PathBuf>,

    /// MuTect2 calls (VCF), used for both classes ahead of --mutect
    #[clap(long = "mutect2")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub mutect2: Option<PathBuf>,

    /// VarScan2 calls (VCF)
    #[clap(long = "varscan")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub varscan: Option<PathBuf>,

    /// VarDict calls (VCF)
    #[clap(long = "vardict")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub vardict: Option<PathBuf>,

    /// LoFreq calls (VCF)
    #[clap(long = "lofreq")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub lofreq: Option<PathBuf>,

    /// Scalpel indel calls (VCF)
    #[clap(long = "scalpel")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub scalpel: Option<PathBuf>,

    /// Strelka calls (VCF)
    #[clap(long = "strelka")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Callers"))]
    pub strelka: Option<PathBuf>,

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

impl SingleSettings {
    /// Caller files keyed by input slot; single-sample callers report both classes in one file
    pub fn caller_inputs(&self) -> CallerInputs {
        let mut inputs = CallerInputs::default();
        let slots: [(InputSlot, Option<&Path>); 10] = [
            (InputSlot::Mutect, self.mutect.as_deref()),
            (InputSlot::Mutect2, self.mutect2.as_deref()),
            (InputSlot::VarscanSnv, self.varscan.as_deref()),
            (InputSlot::VarscanIndel, self.varscan.as_deref()),
            (InputSlot::Vardict, self.vardict.as_deref()),
            (InputSlot::LofreqSnv, self.lofreq.as_deref()),
            (InputSlot::LofreqIndel, self.lofreq.as_deref()),
            (InputSlot::Scalpel, self.scalpel.as_deref()),
            (InputSlot::StrelkaSnv, self.strelka.as_deref()),
            (InputSlot::StrelkaIndel, self.strelka.as_deref())
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
            mode: SequencingMode::Single,
            output_folder: shared.output_folder.clone(),
            callers: self.caller_inputs(),
            samples: SampleNames {
                tumor: self.sample_name.clone(),
                normal: None
            },
            tumor_evidence: self.evidence.clone(),
            normal_evidence: None,
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

/// Checks the single-sample options and logs every resolved input
/// # Errors
/// * any shared option error
/// * if a caller or evidence file does not exist
pub fn check_single_settings(mut settings: SingleSettings) -> anyhow::Result<SingleSettings> {
    info!("Sub-command: single");
    settings.shared = check_shared_settings(settings.shared)?;

    info!("Sample: {:?}", settings.sample_name);
    check_optional_filename(settings.evidence.as_deref(), "Evidence")?;
    info!("\tEvidence: {:?}", settings.evidence);

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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::shared::tests::test_shared;

    #[test]
    fn test_shared_file_slots() {
        let settings = SingleSettings {
            shared: test_shared(),
            sample_name: "TUMOR".to_string(),
            varscan: Some(PathBuf::from("test_data/callers/paired/varscan.snv.vcf")),
            ..Default::default()
        };
        let settings = check_single_settings(settings).unwrap();
        let config = settings.run_config().unwrap();
        assert_eq!(config.mode, SequencingMode::Single);
        assert_eq!(config.samples.normal, None);
        // one file feeds both VarScan2 slots
        assert_eq!(config.callers.get(InputSlot::VarscanSnv), config.callers.get(InputSlot::VarscanIndel));
        assert_eq!(config.callers.all_files().len(), 1);
    }
}

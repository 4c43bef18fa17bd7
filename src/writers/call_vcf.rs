
use anyhow::Context;
use itertools::Itertools;
use log::debug;
use noodles::core::Position;
use noodles::vcf;
use noodles::vcf::header::record::value::{Map, map};
use noodles::vcf::variant::io::Write;
use noodles::vcf::variant::record::samples::keys::key as vcf_key;
use noodles::vcf::variant::record_buf;
use noodles::vcf::variant::record_buf::samples::sample::value::Array;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use crate::call_emitter::EmitConfig;
use crate::data_types::call_record::{CallRecord, SampleCall};
use crate::data_types::callers::CallerId;
use crate::data_types::site::SiteKey;
use crate::parsing::contig_index::ContigIndex;

/// INFO/SOURCES key label
pub const INFO_KEY_SOURCES: &str = "SOURCES";
/// INFO/NUM_TOOLS key label
pub const INFO_KEY_NUM_TOOLS: &str = "NUM_TOOLS";
/// INFO/SCORE key label
pub const INFO_KEY_SCORE: &str = "SCORE";
/// FORMAT/VAF key label
pub const FORMAT_KEY_VAF: &str = "VAF";

/// Plain-text VCF writer used for every output
pub type TextVcfWriter = vcf::io::Writer<BufWriter<File>>;

/// Starts a VCF 4.2 header with the version, command line, contigs, and sample names
/// # Arguments
/// * `contigs` - contig order and lengths
/// * `sample_names` - sample columns, in order
pub fn new_header(contigs: &ContigIndex, sample_names: &[String]) -> anyhow::Result<vcf::Header> {
    let mut builder = vcf::Header::builder()
        .set_file_format(vcf::header::FileFormat::new(4, 2));
    for (name, &length) in contigs.iter() {
        let mut contig = Map::<map::Contig>::new();
        *contig.length_mut() = Some(length as usize);
        builder = builder.add_contig(name.clone(), contig);
    }
    for name in sample_names.iter() {
        builder = builder.add_sample_name(name.clone());
    }
    let mut vcf_header = builder.build();

    let ver: &str = crate::cli::core::FULL_VERSION.as_str(); // clippy gets weird about direct access
    let cli_version = format!("\"{ver}\"");
    let cli_string = format!("\"{}\"", std::env::args().collect::<Vec<String>>().join(" "));
    vcf_header.insert("quorum_version".parse()?, vcf::header::record::Value::from(cli_version))?;
    vcf_header.insert("quorum_command".parse()?, vcf::header::record::Value::from(cli_string))?;

    let info_header = [
        (
            INFO_KEY_SOURCES.to_string(),
            Map::<map::Info>::new(map::info::Number::Unknown, map::info::Type::String, "List of callers that reported the variant")
        ),
        (
            INFO_KEY_NUM_TOOLS.to_string(),
            Map::<map::Info>::new(map::info::Number::Count(1), map::info::Type::Integer, "Number of callers that reported the variant")
        )
    ];
    for (header_key, header_value) in info_header.into_iter() {
        vcf_header.infos_mut().insert(header_key, header_value);
    }
    Ok(vcf_header)
}

/// Creates the output file and writes the header
pub fn open_vcf_writer(out_fn: &Path, vcf_header: &vcf::Header) -> anyhow::Result<TextVcfWriter> {
    debug!("Opening {out_fn:?} for writing...");
    let file = File::create(out_fn)
        .with_context(|| format!("Error while creating {out_fn:?}:"))?;
    let mut vcf_writer = vcf::io::Writer::new(BufWriter::new(file));
    vcf_writer.write_header(vcf_header)
        .with_context(|| format!("Error while writing header to {out_fn:?}:"))?;
    Ok(vcf_writer)
}

/// Shared INFO fields for a site
pub fn source_info(sources: &[String]) -> Vec<(String, Option<record_buf::info::field::Value>)> {
    let mut info = vec![];
    if !sources.is_empty() {
        let labels: Vec<Option<String>> = sources.iter().map(|s| Some(s.clone())).collect();
        info.push((INFO_KEY_SOURCES.to_string(), Some(record_buf::info::field::Value::from(labels))));
    }
    info.push((INFO_KEY_NUM_TOOLS.to_string(), Some(record_buf::info::field::Value::from(sources.len() as i32))));
    info
}

/// Record builder pre-filled with the site identity
pub fn site_record_builder(site: &SiteKey) -> anyhow::Result<record_buf::Builder> {
    let position = Position::new(site.position() as usize)
        .with_context(|| format!("Invalid position for {site}"))?;
    Ok(vcf::variant::RecordBuf::builder()
        .set_reference_sequence_name(site.chrom())
        .set_variant_start(position)
        .set_reference_bases(site.ref_allele())
        .set_alternate_bases(record_buf::AlternateBases::from(vec![site.alt_allele().to_string()])))
}

/// Everything recorded in a call file header besides contigs
#[derive(Clone, Debug)]
pub struct CallVcfMetadata<'a> {
    /// Callers that were run for this variant class
    pub callers: &'a [CallerId],
    /// Sample columns; normal then tumor for paired runs
    pub sample_names: Vec<String>,
    /// Thresholds the calls were made with
    pub emit_config: EmitConfig,
    /// The model used, classification mode only
    pub classifier: Option<&'a Path>
}

/// Writes final calls, one record per call in the given order.
/// Paired calls write the normal sample column before the tumor.
/// # Arguments
/// * `out_fn` - output VCF path
/// * `calls` - sorted calls
/// * `contigs` - contig order and lengths for the header
/// * `metadata` - callers, samples, thresholds, and classifier identity
/// # Errors
/// * if the header cannot be built or any write fails
pub fn write_call_vcf(out_fn: &Path, calls: &[CallRecord], contigs: &ContigIndex, metadata: &CallVcfMetadata) -> anyhow::Result<()> {
    let mut vcf_header = new_header(contigs, &metadata.sample_names)?;
    let config = &metadata.emit_config;

    let caller_list = metadata.callers.iter().join(",");
    let mut extra_lines: Vec<(&str, String)> = vec![("quorum_callers", caller_list)];
    match metadata.classifier {
        Some(model_fn) => {
            extra_lines.push(("quorum_mode", "classification".to_string()));
            extra_lines.push(("quorum_classifier", format!("\"{}\"", model_fn.display())));
            extra_lines.push(("quorum_pass_threshold", config.pass_threshold().to_string()));
            extra_lines.push(("quorum_lowqual_threshold", config.lowqual_threshold().to_string()));
        },
        None => {
            extra_lines.push(("quorum_mode", "consensus".to_string()));
            extra_lines.push(("quorum_min_callers", config.min_callers().to_string()));
        }
    };
    extra_lines.push(("quorum_hom_threshold", config.hom_threshold().to_string()));
    extra_lines.push(("quorum_het_threshold", config.het_threshold().to_string()));
    for (key, value) in extra_lines.into_iter() {
        vcf_header.insert(key.parse()?, vcf::header::record::Value::from(value))?;
    }

    vcf_header.filters_mut().insert("LowQual".to_string(), Map::<map::Filter>::new("Classifier probability below the PASS threshold"));
    vcf_header.filters_mut().insert("REJECT".to_string(), Map::<map::Filter>::new("Rejected by the classifier or by caller consensus"));
    vcf_header.infos_mut().insert(
        INFO_KEY_SCORE.to_string(),
        Map::<map::Info>::new(map::info::Number::Count(1), map::info::Type::Float, "Classifier probability that the variant is real")
    );
    let format_header = [
        (
            vcf_key::GENOTYPE.to_string(),
            Map::<map::Format>::new(map::format::Number::Count(1), map::format::Type::String, "Genotype")
        ),
        (
            vcf_key::READ_DEPTH.to_string(),
            Map::<map::Format>::new(map::format::Number::Count(1), map::format::Type::Integer, "Read depth passing quality filters")
        ),
        (
            vcf_key::READ_DEPTHS.to_string(),
            Map::<map::Format>::new(map::format::Number::ReferenceAlternateBases, map::format::Type::Integer, "Reference and alternate read counts")
        ),
        (
            FORMAT_KEY_VAF.to_string(),
            Map::<map::Format>::new(map::format::Number::Count(1), map::format::Type::Float, "Variant allele fraction used for the genotype")
        )
    ];
    for (header_key, header_value) in format_header.into_iter() {
        vcf_header.formats_mut().insert(header_key, header_value);
    }

    let mut vcf_writer = open_vcf_writer(out_fn, &vcf_header)?;
    let format_keys: record_buf::samples::Keys = [
        vcf_key::GENOTYPE.to_string(),
        vcf_key::READ_DEPTH.to_string(),
        vcf_key::READ_DEPTHS.to_string(),
        FORMAT_KEY_VAF.to_string()
    ].into_iter().collect();

    for call in calls.iter() {
        let mut info_fields = source_info(&call.sources);
        if let Some(score) = call.score {
            info_fields.push((INFO_KEY_SCORE.to_string(), Some(record_buf::info::field::Value::from(round_to(score, 4) as f32))));
        }
        let info: record_buf::Info = info_fields.into_iter().collect();

        let mut values = vec![];
        if let Some(normal) = call.normal.as_ref() {
            values.push(sample_values(normal));
        }
        values.push(sample_values(&call.tumor));

        let filters: record_buf::Filters = [call.filter.filter_str().to_string()].into_iter().collect();
        let mut builder = site_record_builder(&call.site)?
            .set_filters(filters)
            .set_info(info)
            .set_samples(record_buf::Samples::new(format_keys.clone(), values));
        if let Some(quality) = call.quality {
            builder = builder.set_quality_score(round_to(quality, 2) as f32);
        }
        let record = builder.build();
        vcf_writer.write_variant_record(&vcf_header, &record)
            .with_context(|| format!("Error while writing {} to {out_fn:?}:", call.site))?;
    }
    std::io::Write::flush(vcf_writer.get_mut())
        .with_context(|| format!("Error while flushing {out_fn:?}:"))?;
    Ok(())
}

/// Rounds for display so the text form stays short
fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

/// GT, DP, AD, VAF values for one sample
fn sample_values(sample: &SampleCall) -> Vec<Option<record_buf::samples::sample::Value>> {
    use record_buf::samples::sample::Value;
    vec![
        Some(Value::from(sample.genotype.gt_str())),
        sample.depth.map(|d| Value::from(d as i32)),
        sample.allele_depths.map(|(r, a)| Value::Array(Array::Integer(vec![Some(r as i32), Some(a as i32)]))),
        sample.vaf.map(|v| Value::from(round_to(v, 4) as f32))
    ]
}

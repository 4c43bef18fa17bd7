
use anyhow::Context;
use itertools::Itertools;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::data_types::site::VariantClass;
use crate::parsing::caller_vcf::CallerCalls;

/// One caller record after normalization
#[derive(Serialize)]
struct NormalizedRow<'a> {
    #[serde(rename = "CHROM")]
    chrom: &'a str,
    #[serde(rename = "POS")]
    position: u64,
    #[serde(rename = "REF")]
    ref_allele: &'a str,
    #[serde(rename = "ALT")]
    alt_allele: &'a str,
    #[serde(rename = "TUMOR_VAF")]
    tumor_vaf: Option<f64>,
    #[serde(rename = "NORMAL_VAF")]
    normal_vaf: Option<f64>,
    /// `NAME=value` pairs joined with `;`
    #[serde(rename = "SCORES")]
    scores: String
}

/// Path of a caller's normalized table, `<folder>/<Caller>.<type>.normalized.tsv`
pub fn normalized_path(folder: &Path, calls: &CallerCalls, class: VariantClass) -> PathBuf {
    folder.join(format!("{}.{}.normalized.tsv", calls.caller, class.designator()))
}

/// Writes one caller's normalized calls as a tab-delimited table
/// # Arguments
/// * `out_fn` - output path
/// * `calls` - the caller's normalized records
pub fn write_normalized_calls(out_fn: &Path, calls: &CallerCalls) -> anyhow::Result<()> {
    let mut csv_writer: csv::Writer<std::fs::File> = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(out_fn)
        .with_context(|| format!("Error while creating {out_fn:?}:"))?;

    // csv only writes the header on the first serialize, so empty files get it explicitly
    if calls.records.is_empty() {
        csv_writer.write_record(["CHROM", "POS", "REF", "ALT", "TUMOR_VAF", "NORMAL_VAF", "SCORES"])?;
    }
    for record in calls.records.iter() {
        let site = record.site();
        let scores = record.scores().iter()
            .map(|(field, value)| format!("{field}={value}"))
            .join(";");
        csv_writer.serialize(NormalizedRow {
            chrom: site.chrom(),
            position: site.position(),
            ref_allele: site.ref_allele(),
            alt_allele: site.alt_allele(),
            tumor_vaf: record.tumor_vaf(),
            normal_vaf: record.normal_vaf(),
            scores
        })?;
    }
    csv_writer.flush()
        .with_context(|| format!("Error while flushing {out_fn:?}:"))?;
    Ok(())
}

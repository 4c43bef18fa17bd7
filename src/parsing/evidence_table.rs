
use anyhow::{anyhow, Context};
use log::{debug, info};
use rustc_hash::FxHashMap as HashMap;
use std::path::Path;

use crate::data_types::evidence::{EvidenceThresholds, ReadObservation, SampleEvidence};
use crate::data_types::site::SiteKey;

/// Streams a per-sample read observation table and accumulates evidence for the requested sites only.
/// Rows for other sites are ignored; symbolic or multi-nucleotide keys can never match and are ignored too.
/// # Arguments
/// * `evidence_fn` - tab-delimited observation table with a header row
/// * `site_index` - lookup from site identity to its row index in the aggregated table
/// * `thresholds` - mapping and base quality floors
/// # Errors
/// * if the file cannot be opened or a row does not parse
/// * if a row has a malformed position or allele
pub fn load_sample_evidence(
    evidence_fn: &Path,
    site_index: &HashMap<SiteKey, usize>,
    thresholds: EvidenceThresholds
) -> anyhow::Result<Vec<SampleEvidence>> {
    debug!("Loading read evidence from {evidence_fn:?}...");
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .comment(Some(b'#'))
        .from_path(evidence_fn)
        .with_context(|| format!("Error while opening {evidence_fn:?}:"))?;

    let mut evidence: Vec<SampleEvidence> = vec![SampleEvidence::default(); site_index.len()];
    let mut used_rows: u64 = 0;
    let mut total_rows: u64 = 0;
    for (row_index, result) in csv_reader.deserialize().enumerate() {
        let observation: ReadObservation = result
            .with_context(|| format!("Error while parsing row #{} of {evidence_fn:?}:", row_index + 1))?;
        total_rows += 1;

        let site = match SiteKey::normalized(&observation.chrom, observation.position, &observation.ref_allele, &observation.alt_allele) {
            Ok(s) => s,
            Err(e) if e.is_unsupported() => continue,
            Err(e) => {
                return Err(anyhow!("Invalid site on row #{} of {evidence_fn:?}: {e}", row_index + 1));
            }
        };

        if let Some(&index) = site_index.get(&site) {
            evidence[index].add_observation(&observation, thresholds);
            used_rows += 1;
        }
    }
    info!("Used {used_rows} of {total_rows} read observations from {evidence_fn:?}");

    Ok(evidence)
}

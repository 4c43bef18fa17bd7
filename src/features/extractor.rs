
use derive_builder::Builder;
use log::{debug, info};
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::path::Path;

use crate::aggregator::{AggregatedSite, AggregatedTable};
use crate::data_types::evidence::{EvidenceThresholds, SampleEvidence};
use crate::data_types::feature_table::{FeatureRow, FeatureTable};
use crate::data_types::site::{SequencingMode, SiteKey, VariantClass};
use crate::features::schema::*;
use crate::features::statistics::{fisher_exact_two_sided, homopolymer_lengths, mann_whitney_z, mean};
use crate::parsing::annotations::{load_annotations, AnnotationHit};
use crate::parsing::evidence_table::load_sample_evidence;
use crate::util::progress_bar::styled_progress_bar;

/// Read quality floors applied while accumulating evidence
#[derive(Builder, Clone, Copy, Debug)]
#[builder(default)]
pub struct ExtractConfig {
    /// Reads below this mapping quality only count as poor reads
    min_mapping_quality: u8,
    /// Reads below this base quality only count as poor reads
    min_base_quality: u8
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_mapping_quality: 1,
            min_base_quality: 5
        }
    }
}

impl ExtractConfig {
    pub fn evidence_thresholds(&self) -> EvidenceThresholds {
        EvidenceThresholds {
            min_mapping_quality: self.min_mapping_quality,
            min_base_quality: self.min_base_quality
        }
    }

    // getters
    pub fn min_mapping_quality(&self) -> u8 {
        self.min_mapping_quality
    }

    pub fn min_base_quality(&self) -> u8 {
        self.min_base_quality
    }
}

/// Optional files feeding the extractor; every one may be absent
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractInputs<'a> {
    pub tumor_evidence: Option<&'a Path>,
    /// Ignored for single-sample runs
    pub normal_evidence: Option<&'a Path>,
    pub dbsnp: Option<&'a Path>,
    pub cosmic: Option<&'a Path>,
    /// Truth set, which turns on the label column
    pub truth: Option<&'a Path>
}

/// Builds the feature table for one class.
/// Evidence is loaded once per sample against the aggregated identities, so a site called by many callers is counted once.
/// # Arguments
/// * `table` - aggregated sites for the class
/// * `schema` - the column order to fill
/// * `inputs` - optional evidence, annotation, and truth files
/// * `reference` - reference genome for sequence context
/// * `config` - read quality floors
/// # Errors
/// * if any supplied file cannot be parsed
pub fn extract_features(
    table: &AggregatedTable, schema: &FeatureSchema, inputs: &ExtractInputs,
    reference: &ReferenceGenome, config: ExtractConfig
) -> anyhow::Result<FeatureTable> {
    let class = schema.class();
    let mode = schema.mode();
    let site_index = table.site_index();
    let thresholds = config.evidence_thresholds();

    let tumor_evidence = match inputs.tumor_evidence {
        Some(p) => Some(load_sample_evidence(p, &site_index, thresholds)?),
        None => None
    };
    let normal_evidence = match (mode, inputs.normal_evidence) {
        (SequencingMode::Paired, Some(p)) => Some(load_sample_evidence(p, &site_index, thresholds)?),
        _ => None
    };

    let wanted: HashSet<SiteKey> = site_index.keys().cloned().collect();
    let load_optional = |path: Option<&Path>| -> anyhow::Result<Option<HashMap<SiteKey, AnnotationHit>>> {
        match path {
            Some(p) if !wanted.is_empty() => Ok(Some(load_annotations(p, &wanted)?)),
            Some(_p) => Ok(Some(Default::default())),
            None => Ok(None)
        }
    };
    let dbsnp = load_optional(inputs.dbsnp)?;
    let cosmic = load_optional(inputs.cosmic)?;
    let truth = load_optional(inputs.truth)?;
    if let Some(t) = truth.as_ref() {
        info!("{} of {} {class} sites are in the truth set", t.len(), table.len());
    }

    // roster position -> index in the active caller list
    let active_lookup: Vec<Option<usize>> = schema.roster().iter()
        .map(|c| table.callers().iter().position(|a| a == c))
        .collect();
    let reference_contigs: HashSet<String> = reference.contig_keys().iter().cloned().collect();
    let empty_evidence = SampleEvidence::default();

    let pb = styled_progress_bar(table.len() as u64, &format!("Extracting {class} features..."));
    let mut rows: Vec<FeatureRow> = Vec::with_capacity(table.len());
    for (site_index, site) in table.sites().iter().enumerate() {
        let mut row = RowBuilder::new(schema);
        let key = site.key();

        // caller agreement
        for (roster_index, caller) in schema.roster().iter().enumerate() {
            let vote = active_lookup[roster_index]
                .map(|i| site.caller_records()[i].is_some())
                .unwrap_or(false);
            row.set(&vote_column(caller), bool_value(vote));
        }
        row.set(NUM_TOOLS_COLUMN, site.num_votes() as f64);
        for &field in schema.score_fields().iter() {
            if let Some(v) = site.voting_records().find_map(|r| r.score(field)) {
                row.set(&field.to_string(), v);
            }
        }

        // annotations
        if let Some(hits) = dbsnp.as_ref() {
            let hit = hits.get(key);
            row.set("if_dbsnp", bool_value(hit.is_some()));
            row.set("COMMON", bool_value(hit.is_some_and(|h| h.common)));
        }
        if let Some(hits) = cosmic.as_ref() {
            let hit = hits.get(key);
            row.set("if_COSMIC", bool_value(hit.is_some()));
            if let Some(count) = hit.and_then(|h| h.count) {
                row.set("COSMIC_CNT", count);
            }
        }

        // sequence context
        if reference_contigs.contains(key.chrom()) {
            let contig = reference.get_full_chromosome(key.chrom());
            let (site_length, max_length) = homopolymer_lengths(contig, key.position(), key.ref_allele().len());
            row.set(CONTEXT_COLUMNS[0], site_length as f64);
            row.set(CONTEXT_COLUMNS[1], max_length as f64);
        }
        if class == VariantClass::Indel {
            row.set(INDEL_LENGTH_COLUMN, key.indel_length() as f64);
        }

        // caller reported allele fractions
        let (tumor_vaf, normal_vaf) = caller_vafs(site);
        row.set(TUMOR_CALLER_VAF_COLUMN, tumor_vaf);
        if mode == SequencingMode::Paired {
            row.set(NORMAL_CALLER_VAF_COLUMN, normal_vaf);
        }

        // read evidence
        let tumor = tumor_evidence.as_ref().map(|e| &e[site_index]).unwrap_or(&empty_evidence);
        row.set_evidence(TUMOR_PREFIX, tumor);
        if mode == SequencingMode::Paired {
            let normal = normal_evidence.as_ref().map(|e| &e[site_index]).unwrap_or(&empty_evidence);
            row.set_evidence(NORMAL_PREFIX, normal);
        }

        let label = truth.as_ref().map(|t| t.contains_key(key));
        rows.push(FeatureRow::new(key.clone(), row.values, label));
        pb.inc(1);
    }
    pb.finish_with_message(format!("Extracted {class} features."));
    debug!("Built {} {class} feature rows with {} columns", rows.len(), schema.len());

    FeatureTable::new(
        class, mode,
        schema.feature_names(), schema.roster().to_vec(), table.callers().to_vec(),
        rows
    )
}

/// Mean tumor and normal allele fractions across the callers that voted; NaN when no caller reported one
fn caller_vafs(site: &AggregatedSite) -> (f64, f64) {
    let tumor: Vec<f64> = site.voting_records().filter_map(|r| r.tumor_vaf()).collect();
    let normal: Vec<f64> = site.voting_records().filter_map(|r| r.normal_vaf()).collect();
    (mean(&tumor), mean(&normal))
}

fn bool_value(b: bool) -> f64 {
    if b { 1.0 } else { 0.0 }
}

/// Fills one row by column name; anything never set stays NaN
struct RowBuilder<'a> {
    schema: &'a FeatureSchema,
    values: Vec<f64>
}

impl<'a> RowBuilder<'a> {
    fn new(schema: &'a FeatureSchema) -> Self {
        Self {
            schema,
            values: vec![f64::NAN; schema.len()]
        }
    }

    fn set(&mut self, name: &str, value: f64) {
        if let Some(i) = self.schema.index_of(name) {
            self.values[i] = value;
        }
    }

    fn set_evidence(&mut self, prefix: &str, evidence: &SampleEvidence) {
        for (name, value) in EVIDENCE_COLUMNS.iter().zip(evidence_values(evidence)) {
            self.set(&format!("{prefix}{name}"), value);
        }
    }
}

/// Derived statistics for one sample, in `EVIDENCE_COLUMNS` order
pub fn evidence_values(e: &SampleEvidence) -> [f64; EVIDENCE_COLUMNS.len()] {
    let r = &e.reference;
    let a = &e.alternate;
    let ref_nm = mean(&r.edit_distances);
    let alt_nm = mean(&a.edit_distances);
    [
        e.depth() as f64,
        r.forward as f64,
        r.reverse as f64,
        a.forward as f64,
        a.reverse as f64,
        e.vaf().unwrap_or(f64::NAN),
        mean(&r.mapping_qualities),
        mean(&a.mapping_qualities),
        mann_whitney_z(&a.mapping_qualities, &r.mapping_qualities),
        mean(&r.base_qualities),
        mean(&a.base_qualities),
        mann_whitney_z(&a.base_qualities, &r.base_qualities),
        ref_nm,
        alt_nm,
        alt_nm - ref_nm,
        mann_whitney_z(&a.end_distances, &r.end_distances),
        fisher_exact_two_sided(r.forward, r.reverse, a.forward, a.reverse),
        r.clipped as f64,
        a.clipped as f64,
        fisher_exact_two_sided(r.depth() - r.clipped, r.clipped, a.depth() - a.clipped, a.clipped),
        r.concordant as f64,
        r.discordant as f64,
        a.concordant as f64,
        a.discordant as f64,
        fisher_exact_two_sided(r.concordant, r.discordant, a.concordant, a.discordant),
        e.mq0_reads as f64,
        e.poor_reads as f64,
        e.other_reads as f64
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::merge_calls;
    use crate::data_types::caller_record::{CallerRecord, ScoreField};
    use crate::data_types::callers::{CallerId, CallerInputs, CallerRoster, CallerTag, InputSlot};
    use crate::parsing::caller_vcf::{CallerCalls, LoadStats};
    use crate::parsing::contig_index::ContigIndex;
    use crate::parsing::regions::RegionFilter;
    use approx_eq::assert_approx_eq;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn test_reference() -> ReferenceGenome {
        ReferenceGenome::from_fasta(&PathBuf::from("test_data/reference/mini.fa")).unwrap()
    }

    fn record(pos: u64, r: &str, a: &str, tumor_vaf: f64, normal_vaf: f64, scores: &[(ScoreField, f64)]) -> CallerRecord {
        let scores: BTreeMap<ScoreField, f64> = scores.iter().cloned().collect();
        CallerRecord::new(SiteKey::normalized("chr1", pos, r, a).unwrap(), Some(tumor_vaf), Some(normal_vaf), scores)
    }

    /// MuTect2 and VarScan2 both active for paired SNVs
    fn snv_fixture() -> (AggregatedTable, FeatureSchema) {
        let mut inputs = CallerInputs::default();
        inputs.set(InputSlot::Mutect2, Some(Path::new("m2.vcf")));
        inputs.set(InputSlot::VarscanSnv, Some(Path::new("vs.vcf")));
        let roster = CallerRoster::resolve(VariantClass::Snv, SequencingMode::Paired, &inputs);
        let all_calls = vec![
            CallerCalls {
                caller: CallerId::Known(CallerTag::MuTect),
                records: vec![
                    record(11, "A", "G", 0.45, 0.0, &[(ScoreField::M2Tlod, 25.5)]),
                    record(15, "T", "C", 0.2, 0.0, &[])
                ],
                stats: LoadStats::default()
            },
            CallerCalls {
                caller: CallerId::Known(CallerTag::VarScan2),
                records: vec![record(11, "A", "G", 0.5, 0.0, &[(ScoreField::VarScan2Score, 40.0)])],
                stats: LoadStats::default()
            },
        ];
        let contigs = ContigIndex::from_contigs(&[("chr1", 120), ("chr2", 60)]);
        let table = merge_calls(VariantClass::Snv, &all_calls, &contigs, &RegionFilter::default()).unwrap();
        (table, FeatureSchema::from_roster(&roster))
    }

    #[test]
    fn test_votes_scores_and_vafs() {
        let (table, schema) = snv_fixture();
        let features = extract_features(&table, &schema, &ExtractInputs::default(), &test_reference(), ExtractConfig::default()).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features.feature_names(), schema.feature_names().as_slice());
        assert!(!features.is_labeled());

        assert_eq!(features.value(0, "if_MuTect"), Some(1.0));
        assert_eq!(features.value(0, "if_VarScan2"), Some(1.0));
        // in the roster, but not run
        assert_eq!(features.value(0, "if_VarDict"), Some(0.0));
        assert_eq!(features.value(0, "NUM_TOOLS"), Some(2.0));
        assert_eq!(features.value(0, "M2_TLOD"), Some(25.5));
        assert_eq!(features.value(0, "VarScan2_Score"), Some(40.0));
        assert_eq!(features.value(0, "Strelka_Score"), None);
        assert_approx_eq!(features.value(0, "T_CALLER_VAF").unwrap(), 0.475);
        assert_eq!(features.value(1, "NUM_TOOLS"), Some(1.0));
        assert_eq!(features.value(1, "if_VarScan2"), Some(0.0));

        // no annotation files, no evidence files
        assert_eq!(features.value(0, "if_dbsnp"), None);
        assert_eq!(features.value(0, "T_DP"), Some(0.0));
        assert_eq!(features.value(0, "T_VAF"), None);
        assert_eq!(features.value(0, "N_Z_RANKSUM_MQ"), None);
        assert!(features.value(0, "SITE_HOMOPOLYMER_LENGTH").is_some());
    }

    #[test]
    fn test_evidence_annotations_and_labels() {
        let (table, schema) = snv_fixture();
        let inputs = ExtractInputs {
            tumor_evidence: Some(Path::new("test_data/evidence/tumor.tsv")),
            normal_evidence: None,
            dbsnp: Some(Path::new("test_data/annotations/dbsnp.vcf")),
            cosmic: None,
            truth: Some(Path::new("test_data/truth/truth.snv.vcf"))
        };
        let features = extract_features(&table, &schema, &inputs, &test_reference(), ExtractConfig::default()).unwrap();

        // chr1:11 A>G
        assert_eq!(features.value(0, "T_DP"), Some(8.0));
        assert_eq!(features.value(0, "T_ALT_FOR"), Some(3.0));
        assert_eq!(features.value(0, "T_VAF"), Some(0.5));
        assert_eq!(features.value(0, "T_POOR_READS"), Some(2.0));
        assert_eq!(features.value(0, "T_MQ0"), Some(1.0));
        assert!(features.value(0, "T_STRAND_BIAS_FET").is_some());
        assert_eq!(features.value(0, "if_dbsnp"), Some(1.0));
        assert_eq!(features.value(0, "COMMON"), Some(1.0));
        assert_eq!(features.value(1, "if_dbsnp"), Some(0.0));

        // truth labels are allele exact
        assert_eq!(features.rows()[0].label(), Some(true));
        assert_eq!(features.rows()[1].label(), Some(false));
        assert!(features.is_labeled());
    }

    #[test]
    fn test_evidence_values() {
        let mut e = SampleEvidence::default();
        e.reference.forward = 3;
        e.reference.reverse = 1;
        e.reference.mapping_qualities = vec![60.0; 4];
        e.reference.edit_distances = vec![1.0; 4];
        e.reference.concordant = 4;
        e.alternate.forward = 1;
        e.alternate.reverse = 3;
        e.alternate.mapping_qualities = vec![30.0; 4];
        e.alternate.edit_distances = vec![3.0; 4];
        e.alternate.clipped = 2;
        e.alternate.concordant = 4;
        let values = evidence_values(&e);
        let get = |name: &str| values[EVIDENCE_COLUMNS.iter().position(|c| *c == name).unwrap()];

        assert_eq!(get("DP"), 8.0);
        assert_eq!(get("VAF"), 0.5);
        assert_eq!(get("REF_MQ"), 60.0);
        assert_eq!(get("NM_DIFF"), 2.0);
        assert!(get("Z_RANKSUM_MQ") < 0.0);
        assert_approx_eq!(get("STRAND_BIAS_FET"), 0.4857142857142857);
        assert_eq!(get("ALT_CLIPPED"), 2.0);
        assert!(get("Z_RANKSUM_BQ").is_nan());
        assert_approx_eq!(get("CONCORDANCE_FET"), 1.0);
    }
}


use anyhow::anyhow;
use derive_builder::Builder;
use log::debug;
use serde::Serialize;

use crate::data_types::call_record::{CallFilter, CallRecord, Genotype, SampleCall};
use crate::data_types::feature_table::FeatureTable;
use crate::data_types::site::SequencingMode;
use crate::features::schema::{vote_column, NORMAL_CALLER_VAF_COLUMN, NORMAL_PREFIX, TUMOR_CALLER_VAF_COLUMN, TUMOR_PREFIX};

/// Cap on the phred-scaled quality, reached when the probability is (close to) 1
pub const MAX_QUALITY: f64 = 100.0;

/// Thresholds used to turn rows into calls
#[derive(Builder, Clone, Copy, Debug, PartialEq, Serialize)]
#[builder(default)]
pub struct EmitConfig {
    /// Probability at or above which a call is PASS
    pass_threshold: f64,
    /// Probability at or above which a non-PASS call is LowQual
    lowqual_threshold: f64,
    /// VAF at or above which a sample is homozygous
    hom_threshold: f64,
    /// VAF at or above which a sample is heterozygous
    het_threshold: f64,
    /// Fraction of callers run (<= 1) or absolute caller count (> 1) needed for a consensus PASS
    min_callers: f64
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 0.5,
            lowqual_threshold: 0.1,
            hom_threshold: 0.85,
            het_threshold: 0.01,
            min_callers: 0.5
        }
    }
}

impl EmitConfig {
    // getters
    pub fn pass_threshold(&self) -> f64 {
        self.pass_threshold
    }

    pub fn lowqual_threshold(&self) -> f64 {
        self.lowqual_threshold
    }

    pub fn hom_threshold(&self) -> f64 {
        self.hom_threshold
    }

    pub fn het_threshold(&self) -> f64 {
        self.het_threshold
    }

    pub fn min_callers(&self) -> f64 {
        self.min_callers
    }
}

/// Genotype from an allele fraction; a missing fraction is a no-call
pub fn assign_genotype(vaf: Option<f64>, config: &EmitConfig) -> Genotype {
    match vaf {
        Some(v) if v >= config.hom_threshold => Genotype::HomozygousAlternate,
        Some(v) if v >= config.het_threshold => Genotype::Heterozygous,
        _ => Genotype::NoCall
    }
}

/// Filter for a classifier probability
pub fn classify_score(probability: f64, config: &EmitConfig) -> CallFilter {
    if probability >= config.pass_threshold {
        CallFilter::Pass
    } else if probability >= config.lowqual_threshold {
        CallFilter::LowQual
    } else {
        CallFilter::Reject
    }
}

/// Filter from raw caller agreement; there is no LowQual tier in consensus mode
/// # Arguments
/// * `votes` - callers that reported the site
/// * `callers_run` - callers that were run for this variant class
/// * `min_callers` - a fraction of `callers_run` when <= 1, otherwise an absolute count
pub fn consensus_filter(votes: usize, callers_run: usize, min_callers: f64) -> CallFilter {
    let required = if min_callers <= 1.0 {
        min_callers * callers_run as f64
    } else {
        min_callers
    };
    if votes as f64 >= required {
        CallFilter::Pass
    } else {
        CallFilter::Reject
    }
}

/// Phred-scaled quality of a probability, capped at `MAX_QUALITY`
pub fn phred_quality(probability: f64) -> f64 {
    let error = 1.0 - probability;
    if error <= 0.0 {
        return MAX_QUALITY;
    }
    (-10.0 * error.log10()).clamp(0.0, MAX_QUALITY)
}

/// Column indices for one sample's call fields
struct SampleColumns {
    depth: Option<usize>,
    ref_reads: [Option<usize>; 2],
    alt_reads: [Option<usize>; 2],
    vaf: Option<usize>,
    caller_vaf: Option<usize>
}

impl SampleColumns {
    fn new(table: &FeatureTable, prefix: &str, caller_vaf_column: &str) -> Self {
        let column = |name: &str| table.column_index(&format!("{prefix}{name}"));
        Self {
            depth: column("DP"),
            ref_reads: [column("REF_FOR"), column("REF_REV")],
            alt_reads: [column("ALT_FOR"), column("ALT_REV")],
            vaf: column("VAF"),
            caller_vaf: table.column_index(caller_vaf_column)
        }
    }

    /// Evidence VAF when there is evidence depth, otherwise the callers' mean VAF
    fn sample_call(&self, values: &[f64], config: &EmitConfig) -> SampleCall {
        let get = |c: Option<usize>| c.map(|i| values[i]).filter(|v| !v.is_nan());
        let count = |cols: &[Option<usize>; 2]| -> Option<u64> {
            cols.iter().map(|&c| get(c).map(|v| v as u64)).sum()
        };

        let depth = get(self.depth).map(|d| d as u64);
        let has_evidence = depth.unwrap_or(0) > 0;
        let vaf = if has_evidence {
            get(self.vaf)
        } else {
            get(self.caller_vaf)
        };
        let allele_depths = if has_evidence {
            count(&self.ref_reads).zip(count(&self.alt_reads))
        } else {
            None
        };
        SampleCall {
            genotype: assign_genotype(vaf, config),
            depth,
            allele_depths,
            vaf
        }
    }
}

/// Builds one call per row, in table order.
/// With scores the filter comes from the probability, otherwise from the vote count against the callers that were run.
/// # Arguments
/// * `table` - the feature table, sorted by coordinate
/// * `scores` - classifier probabilities, one per row, for classification mode
/// * `config` - emission thresholds
/// # Errors
/// * if the score count does not match the rows
/// * if a vote column for an active caller is missing
pub fn emit_calls(table: &FeatureTable, scores: Option<&[f64]>, config: &EmitConfig) -> anyhow::Result<Vec<CallRecord>> {
    let active = table.active_callers();
    let mut vote_columns = Vec::with_capacity(active.len());
    for caller in active.iter() {
        let name = vote_column(caller);
        let column = table.column_index(&name)
            .ok_or_else(|| anyhow!("Feature table has no {name} column for an active caller"))?;
        vote_columns.push((caller.to_string(), column));
    }

    let tumor_columns = SampleColumns::new(table, TUMOR_PREFIX, TUMOR_CALLER_VAF_COLUMN);
    let normal_columns = match table.mode() {
        SequencingMode::Paired => Some(SampleColumns::new(table, NORMAL_PREFIX, NORMAL_CALLER_VAF_COLUMN)),
        SequencingMode::Single => None
    };

    let probabilities: Vec<Option<f64>> = match scores {
        Some(s) => table.scored_rows(s)?.iter().map(|sr| Some(sr.probability)).collect(),
        None => vec![None; table.len()]
    };

    let mut calls = Vec::with_capacity(table.len());
    for (row, probability) in table.rows().iter().zip(probabilities) {
        let values = row.values();
        let sources: Vec<String> = vote_columns.iter()
            .filter(|(_name, c)| values[*c] > 0.0)
            .map(|(name, _c)| name.clone())
            .collect();

        let (filter, quality) = match probability {
            Some(p) => (classify_score(p, config), Some(phred_quality(p))),
            None => (consensus_filter(sources.len(), active.len(), config.min_callers), None)
        };

        calls.push(CallRecord {
            site: row.site().clone(),
            filter,
            quality,
            score: probability,
            sources,
            tumor: tumor_columns.sample_call(values, config),
            normal: normal_columns.as_ref().map(|nc| nc.sample_call(values, config))
        });
    }

    let passing = calls.iter().filter(|c| c.filter == CallFilter::Pass).count();
    debug!("Emitted {} {} calls, {passing} PASS", calls.len(), table.class());
    Ok(calls)
}

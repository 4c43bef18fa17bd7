
use anyhow::{anyhow, Context};
use log::{debug, trace, warn};
use noodles::vcf;
use rustc_hash::FxHashMap as HashMap;
use std::collections::BTreeMap;
use std::path::Path;

use crate::data_types::caller_record::{caller_scores, CallerRecord, ScoreField, ScoreSource};
use crate::data_types::callers::{CallerId, CallerTag};
use crate::data_types::site::{SiteKey, VariantClass};
use crate::parsing::contig_index::ContigIndex;
use crate::parsing::noodles_helper::{filter_values, has_info, info_number, resolve_sample_columns, sample_numbers, widen, SampleColumns, VcfStream};

/// Sample names expected in caller VCFs
#[derive(Clone, Debug)]
pub struct SampleNames {
    pub tumor: String,
    /// None for single-sample runs
    pub normal: Option<String>
}

/// Counters for records that were read but did not become calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Records read from the file
    pub records: usize,
    /// ALT alleles that failed the caller's vote rule
    pub non_voting: usize,
    /// ALT alleles of the other variant class
    pub other_class: usize,
    /// Symbolic or multi-nucleotide alleles
    pub unsupported: usize,
    /// Same identity reported more than once
    pub duplicates: usize
}

/// Normalized calls from one caller for one variant class, sorted by identity
#[derive(Clone, Debug)]
pub struct CallerCalls {
    pub caller: CallerId,
    pub records: Vec<CallerRecord>,
    pub stats: LoadStats
}

/// Returns true if a record counts as a call for the given caller.
/// Missing or PASS filters vote; MuSE tiers also vote; VarScan2 records must be somatic (SS=2) when SS is present.
pub fn is_vote(caller: &CallerId, record: &vcf::variant::RecordBuf) -> bool {
    let filters = filter_values(record);
    let passing = filters.is_empty() || filters.iter().all(|&f| f == "PASS");

    match caller.tag() {
        Some(CallerTag::MuSE) => {
            passing || (filters.len() == 1 && parse_tier(filters[0]).is_some())
        },
        Some(CallerTag::VarScan2) => {
            let somatic = if has_info(record, "SS") {
                info_number(record, "SS") == Some(2.0)
            } else {
                true
            };
            passing && somatic
        },
        _ => passing
    }
}

/// `Tier3` -> 3
fn parse_tier(filter: &str) -> Option<f64> {
    filter.strip_prefix("Tier")
        .and_then(|t| t.parse::<u8>().ok())
        .filter(|t| (1..=5).contains(t))
        .map(|t| t as f64)
}

/// Loads one caller's VCF and returns its calls of one variant class.
/// Multi-allelic records are split, alleles are normalized, and duplicate identities are folded together.
/// # Arguments
/// * `vcf_fn` - the caller output
/// * `caller` - the caller identity; drives vote rules and score extraction
/// * `class` - only calls of this class are returned
/// * `samples` - expected sample names
/// * `contigs` - the reference contig index; any other contig is an error
/// # Errors
/// * if the file cannot be read or a record has an unparseable position or allele
/// * if a record is on a contig that is not in the reference index
pub fn load_caller_calls(
    vcf_fn: &Path, caller: &CallerId, class: VariantClass,
    samples: &SampleNames, contigs: &ContigIndex
) -> anyhow::Result<CallerCalls> {
    debug!("Loading {class} calls for {caller} from {vcf_fn:?}...");
    let mut stream = VcfStream::open(vcf_fn)?;
    let columns = resolve_sample_columns(stream.header(), &samples.tumor, samples.normal.as_deref());

    let mut stats = LoadStats::default();
    let mut by_site: HashMap<SiteKey, CallerRecord> = Default::default();

    stream.for_each_record(|_record_number, record| {
        stats.records += 1;
        let chrom = record.reference_sequence_name();
        if contigs.rank(chrom).is_none() {
            return Err(anyhow!("Contig {chrom:?} is not in the reference index"));
        }
        let position = record.variant_start()
            .ok_or(anyhow!("Missing POS"))?
            .get() as u64;

        let voting = is_vote(caller, record);
        for (alt_index, alt) in record.alternate_bases().as_ref().iter().enumerate() {
            let site = match SiteKey::normalized(chrom, position, record.reference_bases(), alt) {
                Ok(s) => s,
                Err(e) if e.is_unsupported() => {
                    trace!("Skipping {chrom}:{position} {alt}: {e}");
                    stats.unsupported += 1;
                    continue;
                },
                Err(e) => {
                    return Err(anyhow::Error::new(e).context(format!("Invalid allele {alt:?} at {chrom}:{position}")));
                }
            };

            if !voting {
                stats.non_voting += 1;
                continue;
            }
            if site.variant_class() != class {
                stats.other_class += 1;
                continue;
            }

            let caller_record = build_caller_record(caller, record, site, alt_index, columns);
            match by_site.get_mut(caller_record.site()) {
                Some(existing) => {
                    stats.duplicates += 1;
                    existing.absorb(caller_record);
                },
                None => {
                    by_site.insert(caller_record.site().clone(), caller_record);
                }
            }
        }
        Ok(())
    }).with_context(|| format!("Error while loading {caller} calls:"))?;

    if stats.unsupported > 0 {
        warn!("{caller}: skipped {} symbolic or multi-nucleotide alleles in {vcf_fn:?}", stats.unsupported);
    }
    debug!("{caller} {class}: {stats:?}");

    let mut records: Vec<CallerRecord> = by_site.into_values().collect();
    records.sort_by(|a, b| a.site().cmp(b.site()));

    Ok(CallerCalls {
        caller: caller.clone(),
        records,
        stats
    })
}

/// Pulls allele fractions and caller scores from a record for one ALT allele
fn build_caller_record(
    caller: &CallerId, record: &vcf::variant::RecordBuf,
    site: SiteKey, alt_index: usize, columns: SampleColumns
) -> CallerRecord {
    let tumor_vaf = columns.tumor.and_then(|i| sample_vaf(record, i, alt_index));
    let normal_vaf = columns.normal.and_then(|i| sample_vaf(record, i, alt_index));

    let mut scores: BTreeMap<ScoreField, f64> = Default::default();
    if let Some(tag) = caller.tag() {
        for &(field, source) in caller_scores(tag).iter() {
            let value = match source {
                ScoreSource::Info(keys) => keys.iter()
                    .find_map(|k| info_number(record, k)),
                ScoreSource::TumorFormat(key) => columns.tumor
                    .and_then(|i| sample_numbers(record, i, key))
                    .and_then(|v| v.into_iter().next().flatten()),
                ScoreSource::Quality => record.quality_score().map(widen),
                ScoreSource::FilterTier => {
                    let filters = filter_values(record);
                    if filters.is_empty() || filters.contains(&"PASS") {
                        Some(0.0)
                    } else {
                        filters.first().and_then(|f| parse_tier(f))
                    }
                }
            };
            if let Some(v) = value.filter(|v| v.is_finite()) {
                scores.insert(field, v);
            }
        }
    }

    CallerRecord::new(site, tumor_vaf, normal_vaf, scores)
}

/// Allele fraction for one ALT as reported by the caller: FORMAT/AF, then AD, then VarScan FREQ
fn sample_vaf(record: &vcf::variant::RecordBuf, sample_index: usize, alt_index: usize) -> Option<f64> {
    if let Some(af) = sample_numbers(record, sample_index, "AF") {
        // Number=A, but some callers report a single value for multi-allelic sites
        if let Some(v) = af.get(alt_index).copied().flatten().or_else(|| af.first().copied().flatten()) {
            return Some(v);
        }
    }

    if let Some(ad) = sample_numbers(record, sample_index, "AD") {
        let total: f64 = ad.iter().flatten().sum();
        if let Some(alt_count) = ad.get(alt_index + 1).copied().flatten() {
            if total > 0.0 {
                return Some(alt_count / total);
            }
        }
    }

    sample_numbers(record, sample_index, "FREQ")
        .and_then(|v| v.into_iter().next().flatten())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn samples() -> SampleNames {
        SampleNames { tumor: "TUMOR".to_string(), normal: Some("NORMAL".to_string()) }
    }

    fn contigs() -> ContigIndex {
        ContigIndex::from_contigs(&[("chr1", 120), ("chr2", 60)])
    }

    #[test]
    fn test_parse_tier() {
        assert_eq!(parse_tier("Tier1"), Some(1.0));
        assert_eq!(parse_tier("Tier5"), Some(5.0));
        assert_eq!(parse_tier("Tier6"), None);
        assert_eq!(parse_tier("PASS"), None);
    }

    #[test]
    fn test_load_mutect2() {
        let vcf_fn = PathBuf::from("test_data/callers/paired/mutect2.vcf");
        let caller = CallerId::Known(CallerTag::MuTect);
        let snvs = load_caller_calls(&vcf_fn, &caller, VariantClass::Snv, &samples(), &contigs()).unwrap();
        let keys: Vec<String> = snvs.records.iter().map(|r| r.site().to_string()).collect();
        // chr1:61 is filtered (germline_risk), chr2:10 is a substitution on the second contig
        assert_eq!(keys, vec!["chr1:11 A>G", "chr1:15 T>C", "chr2:10 G>T"]);
        assert_eq!(snvs.stats.non_voting, 1);
        assert_eq!(snvs.stats.other_class, 2);

        let first = &snvs.records[0];
        assert_eq!(first.tumor_vaf(), Some(0.45));
        assert_eq!(first.normal_vaf(), Some(0.0));
        assert_eq!(first.score(ScoreField::M2Tlod), Some(25.5));
        assert_eq!(first.score(ScoreField::M2Nlod), Some(8.0));

        let indels = load_caller_calls(&vcf_fn, &caller, VariantClass::Indel, &samples(), &contigs()).unwrap();
        let keys: Vec<String> = indels.records.iter().map(|r| r.site().to_string()).collect();
        assert_eq!(keys, vec!["chr1:41 A>AT", "chr1:57 TCA>T"]);
    }

    #[test]
    fn test_varscan_somatic_status() {
        let vcf_fn = PathBuf::from("test_data/callers/paired/varscan.snv.vcf");
        let caller = CallerId::Known(CallerTag::VarScan2);
        let snvs = load_caller_calls(&vcf_fn, &caller, VariantClass::Snv, &samples(), &contigs()).unwrap();
        let keys: Vec<String> = snvs.records.iter().map(|r| r.site().to_string()).collect();
        // the germline (SS=1) record at chr1:31 does not vote
        assert_eq!(keys, vec!["chr1:11 A>G", "chr1:21 C>A"]);
        assert_eq!(snvs.records[0].tumor_vaf(), Some(0.5));
        assert_eq!(snvs.records[0].score(ScoreField::VarScan2Score), Some(40.0));
    }

    #[test]
    fn test_multiallelic_split() {
        let vcf_fn = PathBuf::from("test_data/callers/paired/vardict.vcf");
        let caller = CallerId::Known(CallerTag::VarDict);
        let snvs = load_caller_calls(&vcf_fn, &caller, VariantClass::Snv, &samples(), &contigs()).unwrap();
        let keys: Vec<String> = snvs.records.iter().map(|r| r.site().to_string()).collect();
        assert_eq!(keys, vec!["chr1:15 T>A", "chr1:15 T>C"]);
        // AF is per ALT allele
        assert_eq!(snvs.records[0].tumor_vaf(), Some(0.1));
        assert_eq!(snvs.records[1].tumor_vaf(), Some(0.3));
        assert_eq!(snvs.records[1].score(ScoreField::Msi), Some(2.0));
    }

    #[test]
    fn test_unknown_contig() {
        let vcf_fn = PathBuf::from("test_data/callers/paired/mutect2.vcf");
        let caller = CallerId::Known(CallerTag::MuTect);
        let contigs = ContigIndex::from_contigs(&[("chr1", 120)]);
        let result = load_caller_calls(&vcf_fn, &caller, VariantClass::Snv, &samples(), &contigs);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_record() {
        let vcf_fn = PathBuf::from("test_data/callers/malformed.vcf");
        let caller = CallerId::Known(CallerTag::Strelka);
        let result = load_caller_calls(&vcf_fn, &caller, VariantClass::Snv, &samples(), &contigs());
        assert!(result.is_err());
    }
}


use anyhow::anyhow;
use log::{debug, info};
use rustc_hash::FxHashMap as HashMap;

use crate::data_types::caller_record::CallerRecord;
use crate::data_types::callers::{CallerId, CallerRoster};
use crate::data_types::site::{SiteKey, VariantClass};
use crate::parsing::caller_vcf::{load_caller_calls, CallerCalls, SampleNames};
use crate::parsing::contig_index::ContigIndex;
use crate::parsing::regions::RegionFilter;

/// One candidate site with the votes and per-caller views that produced it
#[derive(Clone, Debug)]
pub struct AggregatedSite {
    key: SiteKey,
    /// One entry per active caller, in vote order; Some if that caller called the site
    caller_records: Vec<Option<CallerRecord>>
}

impl AggregatedSite {
    /// Vote bits in active caller order
    pub fn votes(&self) -> Vec<bool> {
        self.caller_records.iter().map(|r| r.is_some()).collect()
    }

    /// Number of callers that called the site
    pub fn num_votes(&self) -> usize {
        self.caller_records.iter().filter(|r| r.is_some()).count()
    }

    /// Records from the callers that voted for the site
    pub fn voting_records(&self) -> impl Iterator<Item = &CallerRecord> {
        self.caller_records.iter().flatten()
    }

    // getters
    pub fn key(&self) -> &SiteKey {
        &self.key
    }

    pub fn caller_records(&self) -> &[Option<CallerRecord>] {
        &self.caller_records
    }
}

/// The deduplicated, sorted site table for one variant class
#[derive(Clone, Debug)]
pub struct AggregatedTable {
    class: VariantClass,
    /// Active callers in vote order
    callers: Vec<CallerId>,
    sites: Vec<AggregatedSite>
}

impl AggregatedTable {
    /// Lookup from site identity to row index
    pub fn site_index(&self) -> HashMap<SiteKey, usize> {
        self.sites.iter()
            .enumerate()
            .map(|(i, s)| (s.key.clone(), i))
            .collect()
    }

    // getters
    pub fn class(&self) -> VariantClass {
        self.class
    }

    pub fn callers(&self) -> &[CallerId] {
        &self.callers
    }

    pub fn sites(&self) -> &[AggregatedSite] {
        &self.sites
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

/// Reads every active caller's file for a class and merges the calls into one table.
/// Absent callers are simply not in the roster's active set.
/// # Arguments
/// * `roster` - resolved roster for the class
/// * `samples` - expected sample names in caller VCFs
/// * `contigs` - reference contig index, also the sort order
/// * `regions` - inclusion and exclusion filters
/// # Errors
/// * if any caller file has a malformed record or unknown contig
pub fn aggregate(
    roster: &CallerRoster, samples: &SampleNames,
    contigs: &ContigIndex, regions: &RegionFilter
) -> anyhow::Result<(AggregatedTable, Vec<CallerCalls>)> {
    let class = roster.class();
    let mut all_calls: Vec<CallerCalls> = vec![];
    for (caller, vcf_fn) in roster.active() {
        let calls = load_caller_calls(vcf_fn, caller, class, samples, contigs)?;
        info!("\t{caller}: {} {class} calls", calls.records.len());
        all_calls.push(calls);
    }

    let table = merge_calls(class, &all_calls, contigs, regions)?;
    Ok((table, all_calls))
}

/// Unions per-caller calls by identity.
/// A site appearing in several callers becomes one row with several vote bits; no identity is ever emitted twice.
/// # Arguments
/// * `class` - the variant class all calls belong to
/// * `all_calls` - one entry per active caller, in vote order
/// * `contigs` - contig order for sorting
/// * `regions` - inclusion and exclusion filters
/// # Errors
/// * if a call is on a contig that is not in the index
pub fn merge_calls(
    class: VariantClass, all_calls: &[CallerCalls],
    contigs: &ContigIndex, regions: &RegionFilter
) -> anyhow::Result<AggregatedTable> {
    let num_callers = all_calls.len();
    let mut site_lookup: HashMap<SiteKey, usize> = Default::default();
    let mut sites: Vec<AggregatedSite> = vec![];
    let mut region_filtered: usize = 0;

    for (caller_index, calls) in all_calls.iter().enumerate() {
        for record in calls.records.iter() {
            if !regions.keeps(record.site()) {
                region_filtered += 1;
                continue;
            }
            let site_index = *site_lookup.entry(record.site().clone())
                .or_insert_with(|| {
                    sites.push(AggregatedSite {
                        key: record.site().clone(),
                        caller_records: vec![None; num_callers]
                    });
                    sites.len() - 1
                });
            sites[site_index].caller_records[caller_index] = Some(record.clone());
        }
    }
    debug!("Removed {region_filtered} {class} calls outside the requested regions");

    // sort by contig order, then position and alleles
    let mut keyed: Vec<(usize, AggregatedSite)> = sites.into_iter()
        .map(|s| {
            let rank = contigs.rank(s.key.chrom())
                .ok_or(anyhow!("Contig {:?} is not in the reference index", s.key.chrom()))?;
            Ok((rank, s))
        })
        .collect::<anyhow::Result<_>>()?;
    keyed.sort_by(|(ra, a), (rb, b)| {
        ra.cmp(rb)
            .then(a.key.position().cmp(&b.key.position()))
            .then(a.key.ref_allele().cmp(b.key.ref_allele()))
            .then(a.key.alt_allele().cmp(b.key.alt_allele()))
    });

    let table = AggregatedTable {
        class,
        callers: all_calls.iter().map(|c| c.caller.clone()).collect(),
        sites: keyed.into_iter().map(|(_r, s)| s).collect()
    };
    info!("Aggregated {} unique {class} sites from {num_callers} callers", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::callers::{CallerInputs, CallerTag, InputSlot};
    use crate::data_types::site::SequencingMode;
    use crate::parsing::caller_vcf::LoadStats;
    use rustc_hash::FxHashSet as HashSet;
    use std::path::Path;

    fn record(chrom: &str, pos: u64, r: &str, a: &str, vaf: f64) -> CallerRecord {
        CallerRecord::new(SiteKey::normalized(chrom, pos, r, a).unwrap(), Some(vaf), None, Default::default())
    }

    fn calls(tag: CallerTag, records: Vec<CallerRecord>) -> CallerCalls {
        CallerCalls { caller: CallerId::Known(tag), records, stats: LoadStats::default() }
    }

    fn contigs() -> ContigIndex {
        // chr2 deliberately listed first to check contig ordering
        ContigIndex::from_contigs(&[("chr2", 60), ("chr1", 120)])
    }

    #[test]
    fn test_identity_uniqueness_and_votes() {
        let all_calls = vec![
            calls(CallerTag::MuTect, vec![
                record("chr1", 1000, "A", "G", 0.45),
                record("chr1", 20, "C", "T", 0.2),
            ]),
            calls(CallerTag::VarScan2, vec![
                record("chr1", 1000, "A", "G", 0.5),
                record("chr2", 5, "G", "A", 0.3),
            ]),
            calls(CallerTag::VarDict, vec![
                // same position, different ALT is a different site
                record("chr1", 1000, "A", "T", 0.1),
                record("chr1", 1000, "A", "G", 0.4),
            ]),
        ];
        let table = merge_calls(VariantClass::Snv, &all_calls, &contigs(), &RegionFilter::default()).unwrap();

        let keys: Vec<String> = table.sites().iter().map(|s| s.key().to_string()).collect();
        assert_eq!(keys, vec!["chr2:5 G>A", "chr1:20 C>T", "chr1:1000 A>G", "chr1:1000 A>T"]);

        // no identity twice
        let unique: HashSet<&SiteKey> = table.sites().iter().map(|s| s.key()).collect();
        assert_eq!(unique.len(), table.len());

        // vote conservation: set bits equal the callers containing that identity
        for site in table.sites() {
            let expected: Vec<bool> = all_calls.iter()
                .map(|c| c.records.iter().any(|r| r.site() == site.key()))
                .collect();
            assert_eq!(site.votes(), expected);
            assert!(site.num_votes() > 0);
        }
        assert_eq!(table.sites()[2].num_votes(), 3);
        assert_eq!(table.sites()[2].caller_records()[1].as_ref().unwrap().tumor_vaf(), Some(0.5));
    }

    #[test]
    fn test_region_filter_applies() {
        let all_calls = vec![
            calls(CallerTag::MuTect, vec![record("chr1", 11, "A", "G", 0.5), record("chr1", 30, "A", "G", 0.5)]),
        ];
        let regions = RegionFilter::load(Some(Path::new("test_data/regions/include.bed")), None).unwrap();
        let table = merge_calls(VariantClass::Snv, &all_calls, &contigs(), &regions).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.sites()[0].key().position(), 11);
    }

    #[test]
    fn test_aggregate_from_files() {
        let mut inputs = CallerInputs::default();
        inputs.set(InputSlot::Mutect2, Some(Path::new("test_data/callers/paired/mutect2.vcf")));
        inputs.set(InputSlot::VarscanSnv, Some(Path::new("test_data/callers/paired/varscan.snv.vcf")));
        inputs.set(InputSlot::Vardict, Some(Path::new("test_data/callers/paired/vardict.vcf")));
        let roster = CallerRoster::resolve(VariantClass::Snv, SequencingMode::Paired, &inputs);
        let samples = SampleNames { tumor: "TUMOR".to_string(), normal: Some("NORMAL".to_string()) };
        let contigs = ContigIndex::from_contigs(&[("chr1", 120), ("chr2", 60)]);

        let (table, all_calls) = aggregate(&roster, &samples, &contigs, &RegionFilter::default()).unwrap();
        assert_eq!(all_calls.len(), 3);
        let summary: Vec<(String, usize)> = table.sites().iter()
            .map(|s| (s.key().to_string(), s.num_votes()))
            .collect();
        assert_eq!(summary, vec![
            ("chr1:11 A>G".to_string(), 2),
            ("chr1:15 T>A".to_string(), 1),
            ("chr1:15 T>C".to_string(), 2),
            ("chr1:21 C>A".to_string(), 1),
            ("chr2:10 G>T".to_string(), 1),
        ]);
        assert_eq!(table.callers().len(), 3);
        assert_eq!(table.site_index()[&SiteKey::normalized("chr1", 21, "C", "A").unwrap()], 3);
    }
}

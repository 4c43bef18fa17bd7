
use anyhow::anyhow;
use coitrees::{COITree, Interval, IntervalTree};
use log::debug;
use std::collections::BTreeMap;
use std::path::Path;

use crate::data_types::site::SiteKey;
use crate::parsing::noodles_helper::LoadedBed;

/// Interval lookup built from a BED file
#[derive(Clone)]
pub struct IntervalSet {
    /// Lookup from a chromosome to a COITree, which has 0-based inclusive ranges
    lookup_trees: BTreeMap<String, COITree<(), usize>>
}

impl std::fmt::Debug for IntervalSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // COITree does not have Debug, report sizes instead
        let lookup_counts: BTreeMap<&String, usize> = self.lookup_trees.iter()
            .map(|(s, c)| (s, c.len()))
            .collect();
        f.debug_struct("IntervalSet").field("lookup_trees_len", &lookup_counts).finish()
    }
}

impl IntervalSet {
    /// Loads a BED file and converts all the entries to COI trees
    /// # Arguments
    /// * `bed_fn` - path to the .bed(.gz) file
    pub fn from_bed(bed_fn: &Path) -> anyhow::Result<Self> {
        let loaded_bed = LoadedBed::preload_bed_file(bed_fn)?;

        let mut lookup_trees: BTreeMap<String, COITree<(), usize>> = Default::default();
        for (chrom, intervals) in loaded_bed.chrom_lookup().iter() {
            let coi_intervals: Vec<Interval<()>> = intervals.iter()
                .map(|i| {
                    // noodles gives 1-based inclusive, the trees want 0-based inclusive
                    let start = i.start().ok_or(anyhow!("Missing start"))?.get() as i32 - 1;
                    let end = i.end().ok_or(anyhow!("Missing end"))?.get() as i32 - 1;
                    Ok(Interval::new(start, end, ()))
                })
                .collect::<anyhow::Result<_>>()?;
            lookup_trees.insert(chrom.clone(), COITree::new(&coi_intervals));
        }
        debug!("Loaded intervals on {} contigs from {bed_fn:?}", lookup_trees.len());

        Ok(Self { lookup_trees })
    }

    /// Returns true if the 0-based inclusive interval overlaps at least one interval in this set
    /// # Arguments
    /// * `chrom` - the chromosome
    /// * `first` - the first included base, 0-based
    /// * `last` - the last included base, 0-based
    pub fn is_overlapping(&self, chrom: &str, first: i32, last: i32) -> bool {
        match self.lookup_trees.get(chrom) {
            Some(coi_tree) => coi_tree.query_count(first, last) > 0,
            None => false
        }
    }
}

/// Inclusion and exclusion regions applied to every caller record
#[derive(Clone, Debug, Default)]
pub struct RegionFilter {
    include: Option<IntervalSet>,
    exclude: Option<IntervalSet>
}

impl RegionFilter {
    /// Loads the optional inclusion and exclusion BED files
    pub fn load(inclusion_fn: Option<&Path>, exclusion_fn: Option<&Path>) -> anyhow::Result<Self> {
        let include = inclusion_fn.map(IntervalSet::from_bed).transpose()?;
        let exclude = exclusion_fn.map(IntervalSet::from_bed).transpose()?;
        Ok(Self { include, exclude })
    }

    /// A site is kept when its REF span overlaps the inclusion regions (if any) and does not overlap the exclusion regions
    pub fn keeps(&self, site: &SiteKey) -> bool {
        let (first, last) = site.zero_based_span();
        let included = self.include.as_ref()
            .map(|set| set.is_overlapping(site.chrom(), first, last))
            .unwrap_or(true);
        let excluded = self.exclude.as_ref()
            .map(|set| set.is_overlapping(site.chrom(), first, last))
            .unwrap_or(false);
        included && !excluded
    }

    /// True if neither file was provided
    pub fn is_unbounded(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_interval_set() {
        // BED: chr1 10-20, chr1 50-60
        let bed_fn = PathBuf::from("test_data/regions/include.bed");
        let set = IntervalSet::from_bed(&bed_fn).unwrap();
        assert!(!set.is_overlapping("chr1", 9, 9));
        assert!(set.is_overlapping("chr1", 10, 10));
        assert!(set.is_overlapping("chr1", 19, 19));
        assert!(!set.is_overlapping("chr1", 20, 20));
        assert!(set.is_overlapping("chr1", 45, 50));
        assert!(!set.is_overlapping("chr2", 10, 10));
    }

    #[test]
    fn test_region_filter() {
        let filter = RegionFilter::load(
            Some(Path::new("test_data/regions/include.bed")),
            Some(Path::new("test_data/regions/exclude.bed"))
        ).unwrap();
        assert!(!filter.is_unbounded());

        // 1-based position 11 is 0-based 10, inside the first inclusion interval
        assert!(filter.keeps(&SiteKey::normalized("chr1", 11, "A", "C").unwrap()));
        // outside every inclusion interval
        assert!(!filter.keeps(&SiteKey::normalized("chr1", 30, "A", "C").unwrap()));
        // deletion starting before the interval but reaching into it
        assert!(filter.keeps(&SiteKey::normalized("chr1", 48, "AAAA", "A").unwrap()));
        // exclusion (chr1 55-56) wins over inclusion
        assert!(!filter.keeps(&SiteKey::normalized("chr1", 56, "A", "C").unwrap()));

        let unbounded = RegionFilter::default();
        assert!(unbounded.is_unbounded());
        assert!(unbounded.keeps(&SiteKey::normalized("chr9", 1, "A", "C").unwrap()));
    }
}

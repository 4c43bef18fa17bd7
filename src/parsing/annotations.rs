
use anyhow::{anyhow, Context};
use log::info;
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use std::path::Path;

use crate::data_types::site::SiteKey;
use crate::parsing::noodles_helper::{info_number, VcfStream};

/// What an annotation database says about one site
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AnnotationHit {
    /// dbSNP `COMMON=1`
    pub common: bool,
    /// COSMIC `CNT`, the number of samples carrying the mutation
    pub count: Option<f64>
}

/// Loads an annotation VCF, keeping only entries whose normalized identity is in `wanted`.
/// Contigs absent from the candidate set are skipped, not treated as errors.
/// # Arguments
/// * `vcf_fn` - dbSNP, COSMIC, or truth set VCF
/// * `wanted` - candidate site identities
/// # Errors
/// * if the file cannot be read or a record has a malformed position or allele
pub fn load_annotations(vcf_fn: &Path, wanted: &HashSet<SiteKey>) -> anyhow::Result<HashMap<SiteKey, AnnotationHit>> {
    let wanted_contigs: HashSet<&str> = wanted.iter().map(|s| s.chrom()).collect();
    let mut stream = VcfStream::open(vcf_fn)?;
    let mut hits: HashMap<SiteKey, AnnotationHit> = Default::default();

    stream.for_each_record(|_record_number, record| {
        let chrom = record.reference_sequence_name();
        if !wanted_contigs.contains(chrom) {
            return Ok(());
        }
        let position = record.variant_start()
            .ok_or(anyhow!("Missing POS"))?
            .get() as u64;

        for alt in record.alternate_bases().as_ref().iter() {
            let site = match SiteKey::normalized(chrom, position, record.reference_bases(), alt) {
                Ok(s) => s,
                Err(e) if e.is_unsupported() => continue,
                Err(e) => return Err(anyhow!("Invalid allele {alt:?} at {chrom}:{position}: {e}"))
            };
            if wanted.contains(&site) {
                let hit = AnnotationHit {
                    common: info_number(record, "COMMON") == Some(1.0),
                    count: info_number(record, "CNT")
                };
                hits.insert(site, hit);
            }
        }
        Ok(())
    }).with_context(|| format!("Error while loading annotations from {vcf_fn:?}:"))?;

    info!("Matched {} of {} candidate sites in {vcf_fn:?}", hits.len(), wanted.len());
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_dbsnp() {
        let vcf_fn = PathBuf::from("test_data/annotations/dbsnp.vcf");
        let wanted: HashSet<SiteKey> = [
            SiteKey::normalized("chr1", 11, "A", "G").unwrap(),
            SiteKey::normalized("chr1", 15, "T", "C").unwrap(),
            SiteKey::normalized("chr1", 21, "C", "A").unwrap(),
        ].into_iter().collect();
        let hits = load_annotations(&vcf_fn, &wanted).unwrap();

        // chr1:15 is listed with a different ALT, so it is not a match
        assert_eq!(hits.len(), 2);
        assert!(hits[&SiteKey::normalized("chr1", 11, "A", "G").unwrap()].common);
        assert!(!hits[&SiteKey::normalized("chr1", 21, "C", "A").unwrap()].common);
    }

    #[test]
    fn test_load_cosmic() {
        let vcf_fn = PathBuf::from("test_data/annotations/cosmic.vcf");
        let wanted: HashSet<SiteKey> = [
            SiteKey::normalized("chr1", 41, "A", "AT").unwrap(),
        ].into_iter().collect();
        let hits = load_annotations(&vcf_fn, &wanted).unwrap();
        assert_eq!(hits[&SiteKey::normalized("chr1", 41, "A", "AT").unwrap()].count, Some(3.0));
    }
}


use anyhow::Context;
use noodles::vcf::variant::io::Write;
use noodles::vcf::variant::record_buf;
use std::path::Path;

use crate::aggregator::AggregatedTable;
use crate::parsing::contig_index::ContigIndex;
use crate::writers::call_vcf::{new_header, open_vcf_writer, site_record_builder, source_info};

/// Writes the raw union of caller calls, `Aggregated.<type>.vcf`, with the callers behind each site
/// # Arguments
/// * `out_fn` - output VCF path
/// * `table` - aggregated sites, already sorted
/// * `contigs` - contig order and lengths for the header
pub fn write_aggregate_vcf(out_fn: &Path, table: &AggregatedTable, contigs: &ContigIndex) -> anyhow::Result<()> {
    let vcf_header = new_header(contigs, &[])?;
    let mut vcf_writer = open_vcf_writer(out_fn, &vcf_header)?;

    for site in table.sites().iter() {
        let sources: Vec<String> = table.callers().iter()
            .zip(site.votes())
            .filter(|(_c, vote)| *vote)
            .map(|(c, _vote)| c.to_string())
            .collect();
        let info: record_buf::Info = source_info(&sources).into_iter().collect();
        let record = site_record_builder(site.key())?
            .set_info(info)
            .build();
        vcf_writer.write_variant_record(&vcf_header, &record)
            .with_context(|| format!("Error while writing {} to {out_fn:?}:", site.key()))?;
    }
    std::io::Write::flush(vcf_writer.get_mut())
        .with_context(|| format!("Error while flushing {out_fn:?}:"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::merge_calls;
    use crate::data_types::caller_record::CallerRecord;
    use crate::data_types::callers::{CallerId, CallerTag};
    use crate::data_types::site::{SiteKey, VariantClass};
    use crate::parsing::caller_vcf::{CallerCalls, LoadStats};
    use crate::parsing::regions::RegionFilter;
    use std::collections::BTreeMap;

    fn calls(tag: CallerTag, sites: &[(u64, &str, &str)]) -> CallerCalls {
        CallerCalls {
            caller: CallerId::Known(tag),
            records: sites.iter()
                .map(|&(pos, r, a)| CallerRecord::new(SiteKey::normalized("chr1", pos, r, a).unwrap(), None, None, BTreeMap::new()))
                .collect(),
            stats: LoadStats::default()
        }
    }

    #[test]
    fn test_aggregate_vcf() {
        let contigs = ContigIndex::from_contigs(&[("chr1", 120)]);
        let inputs = vec![
            calls(CallerTag::MuTect, &[(11, "A", "G"), (15, "T", "C")]),
            calls(CallerTag::VarScan2, &[(11, "A", "G")]),
        ];
        let table = merge_calls(VariantClass::Snv, &inputs, &contigs, &RegionFilter::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let out_fn = dir.path().join("Aggregated.sSNV.vcf");
        write_aggregate_vcf(&out_fn, &table, &contigs).unwrap();
        let text = std::fs::read_to_string(&out_fn).unwrap();
        let records: Vec<&str> = text.lines().filter(|l| !l.starts_with('#')).collect();
        assert_eq!(records, vec![
            "chr1\t11\t.\tA\tG\t.\t.\tSOURCES=MuTect,VarScan2;NUM_TOOLS=2",
            "chr1\t15\t.\tT\tC\t.\t.\tSOURCES=MuTect;NUM_TOOLS=1",
        ]);
        assert!(text.contains("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n"));
    }
}


use crate::data_types::site::SiteKey;

/// Genotype call for one sample
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Genotype {
    /// Allele fraction missing or below the heterozygous threshold
    NoCall,
    /// Allele fraction at or above the heterozygous threshold
    Heterozygous,
    /// Allele fraction at or above the homozygous threshold
    HomozygousAlternate
}

impl Genotype {
    /// VCF GT string
    pub fn gt_str(&self) -> &'static str {
        match self {
            Genotype::NoCall => "./.",
            Genotype::Heterozygous => "0/1",
            Genotype::HomozygousAlternate => "1/1"
        }
    }
}

/// Filter assigned to a call.
/// Ordering follows confidence so monotonicity can be checked with comparisons.
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum CallFilter {
    Reject,
    LowQual,
    Pass
}

impl CallFilter {
    /// VCF FILTER value
    pub fn filter_str(&self) -> &'static str {
        match self {
            CallFilter::Reject => "REJECT",
            CallFilter::LowQual => "LowQual",
            CallFilter::Pass => "PASS"
        }
    }
}

/// Per-sample portion of a call
#[derive(Clone, Debug, PartialEq)]
pub struct SampleCall {
    pub genotype: Genotype,
    /// Passing read depth, None when no evidence was supplied
    pub depth: Option<u64>,
    /// Passing REF and ALT read counts
    pub allele_depths: Option<(u64, u64)>,
    /// The allele fraction the genotype was derived from
    pub vaf: Option<f64>
}

/// A final adjudicated variant
#[derive(Clone, Debug, PartialEq)]
pub struct CallRecord {
    pub site: SiteKey,
    pub filter: CallFilter,
    /// Phred-scaled quality, classification mode only
    pub quality: Option<f64>,
    /// Classifier probability, classification mode only
    pub score: Option<f64>,
    /// Callers that voted for the site
    pub sources: Vec<String>,
    pub tumor: SampleCall,
    /// Normal sample, paired runs only
    pub normal: Option<SampleCall>
}

impl CallRecord {
    /// Number of callers that voted for this site
    pub fn num_tools(&self) -> usize {
        self.sources.len()
    }
}

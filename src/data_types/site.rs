
use serde::{Deserialize, Serialize};
use strum_macros::EnumString;

/// The two variant classes that are adjudicated separately
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize, strum_macros::Display, EnumString)]
pub enum VariantClass {
    /// REF and ALT are both exactly 1 bp after normalization
    #[strum(serialize = "snv")]
    #[serde(rename = "snv")]
    Snv,
    /// REF and ALT lengths differ after normalization
    #[strum(serialize = "indel")]
    #[serde(rename = "indel")]
    Indel
}

impl VariantClass {
    /// All classes in the order they are processed
    pub const ALL: [VariantClass; 2] = [VariantClass::Snv, VariantClass::Indel];

    /// Designator used in every output file name, e.g. `Consensus.sSNV.vcf`
    pub fn designator(&self) -> &'static str {
        match self {
            VariantClass::Snv => "sSNV",
            VariantClass::Indel => "sINDEL"
        }
    }
}

/// Whether the run has a matched normal sample or only the tumor
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize, Serialize, strum_macros::Display, EnumString)]
pub enum SequencingMode {
    #[strum(serialize = "paired")]
    #[serde(rename = "paired")]
    Paired,
    #[strum(serialize = "single")]
    #[serde(rename = "single")]
    Single
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum SiteError {
    #[error("position must be >= 1")]
    InvalidPosition,
    #[error("{allele} allele is empty")]
    EmptyAllele { allele: &'static str },
    #[error("{allele} allele contains non-nucleotide characters: {sequence:?}")]
    InvalidBases { allele: &'static str, sequence: String },
    #[error("symbolic or breakend allele is not supported: {sequence:?}")]
    SymbolicAllele { sequence: String },
    #[error("REF and ALT alleles are identical")]
    IdenticalAlleles,
    #[error("multi-nucleotide substitution is neither a SNV nor an indel")]
    MultiNucleotide
}

impl SiteError {
    /// Returns true if the allele is well-formed but outside the SNV/indel classes.
    /// Records with these errors are skipped, everything else is malformed input.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, SiteError::SymbolicAllele { .. } | SiteError::MultiNucleotide)
    }
}

/// Allele-exact identity of a candidate site.
/// Two sites are the same entity if and only if all four fields match after normalization.
#[derive(Clone, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Deserialize, Serialize)]
pub struct SiteKey {
    /// Contig name
    chrom: String,
    /// 1-based position of the first REF base
    position: u64,
    /// Normalized reference allele
    ref_allele: String,
    /// Normalized alternate allele
    alt_allele: String
}

impl SiteKey {
    /// Builds a normalized site from raw VCF fields.
    /// Shared trailing bases are trimmed first and then shared leading bases, always leaving at least 1 base per allele.
    /// Each leading base trimmed advances the position by 1.
    /// # Arguments
    /// * `chrom` - contig name
    /// * `position` - 1-based position of the first REF base
    /// * `ref_allele` - raw REF allele
    /// * `alt_allele` - raw ALT allele
    /// # Errors
    /// * if the position is 0 or either allele is empty or non-nucleotide
    /// * if the ALT allele is symbolic, a breakend, or the `*` placeholder
    /// * if the alleles are identical or normalize to a multi-nucleotide substitution
    pub fn normalized(chrom: &str, position: u64, ref_allele: &str, alt_allele: &str) -> Result<Self, SiteError> {
        if position == 0 {
            return Err(SiteError::InvalidPosition);
        }
        if is_symbolic(alt_allele) {
            return Err(SiteError::SymbolicAllele { sequence: alt_allele.to_string() });
        }

        let ref_bases = validate_allele(ref_allele, "REF")?;
        let alt_bases = validate_allele(alt_allele, "ALT")?;
        if ref_bases == alt_bases {
            return Err(SiteError::IdenticalAlleles);
        }

        let (mut ref_start, mut ref_end) = (0, ref_bases.len());
        let (mut alt_start, mut alt_end) = (0, alt_bases.len());
        let mut position = position;

        // suffix first
        while ref_end - ref_start > 1 && alt_end - alt_start > 1 && ref_bases[ref_end - 1] == alt_bases[alt_end - 1] {
            ref_end -= 1;
            alt_end -= 1;
        }

        // then prefix
        while ref_end - ref_start > 1 && alt_end - alt_start > 1 && ref_bases[ref_start] == alt_bases[alt_start] {
            ref_start += 1;
            alt_start += 1;
            position += 1;
        }

        let ref_len = ref_end - ref_start;
        let alt_len = alt_end - alt_start;
        if ref_len == alt_len && ref_len > 1 {
            return Err(SiteError::MultiNucleotide);
        }

        Ok(Self {
            chrom: chrom.to_string(),
            position,
            ref_allele: String::from_utf8_lossy(&ref_bases[ref_start..ref_end]).into_owned(),
            alt_allele: String::from_utf8_lossy(&alt_bases[alt_start..alt_end]).into_owned()
        })
    }

    /// The class of this site; normalization guarantees it is one of the two.
    pub fn variant_class(&self) -> VariantClass {
        if self.ref_allele.len() == 1 && self.alt_allele.len() == 1 {
            VariantClass::Snv
        } else {
            VariantClass::Indel
        }
    }

    /// ALT length minus REF length, 0 for substitutions
    pub fn indel_length(&self) -> i64 {
        self.alt_allele.len() as i64 - self.ref_allele.len() as i64
    }

    /// The REF span as a 0-based inclusive interval, the convention used by the region trees
    pub fn zero_based_span(&self) -> (i32, i32) {
        let first = self.position as i32 - 1;
        let last = first + self.ref_allele.len() as i32 - 1;
        (first, last)
    }

    // getters
    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn ref_allele(&self) -> &str {
        &self.ref_allele
    }

    pub fn alt_allele(&self) -> &str {
        &self.alt_allele
    }
}

impl std::fmt::Display for SiteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} {}>{}", self.chrom, self.position, self.ref_allele, self.alt_allele)
    }
}

fn is_symbolic(allele: &str) -> bool {
    allele.starts_with('<') || allele.contains('[') || allele.contains(']') || allele == "*" || allele == "."
}

/// Upper-cases an allele and makes sure it only holds IUPAC nucleotide codes
fn validate_allele(allele: &str, label: &'static str) -> Result<Vec<u8>, SiteError> {
    if allele.is_empty() {
        return Err(SiteError::EmptyAllele { allele: label });
    }
    let upper: Vec<u8> = allele.bytes().map(|b| b.to_ascii_uppercase()).collect();
    if !upper.iter().all(|b| b"ACGTNRYSWKMBDHV".contains(b)) {
        return Err(SiteError::InvalidBases { allele: label, sequence: allele.to_string() });
    }
    Ok(upper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snv_passthrough() {
        let site = SiteKey::normalized("chr1", 1000, "A", "G").unwrap();
        assert_eq!(site.position(), 1000);
        assert_eq!(site.ref_allele(), "A");
        assert_eq!(site.alt_allele(), "G");
        assert_eq!(site.variant_class(), VariantClass::Snv);
        assert_eq!(site.zero_based_span(), (999, 999));
    }

    #[test]
    fn test_padded_snv() {
        // a caller reporting the SNV with shared context collapses to the minimal form
        let site = SiteKey::normalized("chr1", 999, "CAT", "CGT").unwrap();
        assert_eq!(site, SiteKey::normalized("chr1", 1000, "A", "G").unwrap());
    }

    #[test]
    fn test_indel_trimming() {
        // anchored deletion stays as is
        let site = SiteKey::normalized("chr1", 100, "ACG", "A").unwrap();
        assert_eq!((site.position(), site.ref_allele(), site.alt_allele()), (100, "ACG", "A"));
        assert_eq!(site.variant_class(), VariantClass::Indel);
        assert_eq!(site.indel_length(), -2);

        // suffix padding is removed before the prefix
        let site = SiteKey::normalized("chr1", 100, "ACGTT", "ATT").unwrap();
        assert_eq!((site.position(), site.ref_allele(), site.alt_allele()), (100, "ACG", "A"));

        // extra leading context moves the position
        let site = SiteKey::normalized("chr1", 98, "GGA", "GGATT").unwrap();
        assert_eq!((site.position(), site.ref_allele(), site.alt_allele()), (100, "A", "ATT"));
        assert_eq!(site.indel_length(), 2);
    }

    #[test]
    fn test_lowercase_alleles() {
        let site = SiteKey::normalized("chr1", 10, "a", "t").unwrap();
        assert_eq!(site.ref_allele(), "A");
        assert_eq!(site.alt_allele(), "T");
    }

    #[test]
    fn test_distinct_indels_are_distinct() {
        let a = SiteKey::normalized("chr1", 100, "ACG", "A").unwrap();
        let b = SiteKey::normalized("chr1", 100, "AC", "A").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_errors() {
        assert_eq!(SiteKey::normalized("chr1", 0, "A", "G"), Err(SiteError::InvalidPosition));
        assert_eq!(SiteKey::normalized("chr1", 5, "", "G"), Err(SiteError::EmptyAllele { allele: "REF" }));
        assert_eq!(SiteKey::normalized("chr1", 5, "A", "A"), Err(SiteError::IdenticalAlleles));
        assert_eq!(SiteKey::normalized("chr1", 5, "AC", "GT"), Err(SiteError::MultiNucleotide));
        assert!(matches!(SiteKey::normalized("chr1", 5, "A", "1"), Err(SiteError::InvalidBases { .. })));

        let symbolic = SiteKey::normalized("chr1", 5, "A", "<DEL>").unwrap_err();
        assert!(symbolic.is_unsupported());
        assert!(SiteKey::normalized("chr1", 5, "A", "*").unwrap_err().is_unsupported());
        assert!(!SiteError::IdenticalAlleles.is_unsupported());
    }

    #[test]
    fn test_designators() {
        assert_eq!(VariantClass::Snv.designator(), "sSNV");
        assert_eq!(VariantClass::Indel.designator(), "sINDEL");
        assert_eq!(VariantClass::Indel.to_string(), "indel");
    }
}

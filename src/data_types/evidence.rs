
use serde::Deserialize;

/// Which allele a read supports at a site
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum ObservedAllele {
    #[serde(rename = "REF")]
    Reference,
    #[serde(rename = "ALT")]
    Alternate,
    #[serde(rename = "OTHER")]
    Other
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq)]
pub enum Strand {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse
}

/// One read observation at a candidate site, as computed by an upstream pileup step
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ReadObservation {
    #[serde(rename = "CHROM")]
    pub chrom: String,
    #[serde(rename = "POS")]
    pub position: u64,
    #[serde(rename = "REF")]
    pub ref_allele: String,
    #[serde(rename = "ALT")]
    pub alt_allele: String,
    #[serde(rename = "ALLELE")]
    pub allele: ObservedAllele,
    #[serde(rename = "STRAND")]
    pub strand: Strand,
    /// Mapping quality
    #[serde(rename = "MQ")]
    pub mapping_quality: u8,
    /// Base quality of the first base supporting the allele
    #[serde(rename = "BQ")]
    pub base_quality: u8,
    /// Edit distance of the read
    #[serde(rename = "NM")]
    pub edit_distance: u32,
    /// 1 if the read is soft or hard clipped
    #[serde(rename = "CLIPPED")]
    pub clipped: u8,
    /// Distance from the site to the nearest read end
    #[serde(rename = "END_DIST")]
    pub end_distance: u32,
    /// 1 if the read is in a concordant pair
    #[serde(rename = "CONCORDANT")]
    pub concordant: u8
}

/// Quality floors for reads to count as evidence
#[derive(Clone, Copy, Debug)]
pub struct EvidenceThresholds {
    pub min_mapping_quality: u8,
    pub min_base_quality: u8
}

/// Read-level evidence for one allele (REF or ALT) of one sample at one site
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AlleleEvidence {
    pub forward: u64,
    pub reverse: u64,
    pub mapping_qualities: Vec<f64>,
    pub base_qualities: Vec<f64>,
    pub edit_distances: Vec<f64>,
    pub end_distances: Vec<f64>,
    pub clipped: u64,
    pub concordant: u64,
    pub discordant: u64
}

impl AlleleEvidence {
    fn add(&mut self, obs: &ReadObservation) {
        match obs.strand {
            Strand::Forward => self.forward += 1,
            Strand::Reverse => self.reverse += 1
        };
        self.mapping_qualities.push(obs.mapping_quality as f64);
        self.base_qualities.push(obs.base_quality as f64);
        self.edit_distances.push(obs.edit_distance as f64);
        self.end_distances.push(obs.end_distance as f64);
        if obs.clipped != 0 {
            self.clipped += 1;
        }
        if obs.concordant != 0 {
            self.concordant += 1;
        } else {
            self.discordant += 1;
        }
    }

    /// Total reads supporting this allele
    pub fn depth(&self) -> u64 {
        self.forward + self.reverse
    }
}

/// Accumulated read evidence for one sample at one site.
/// Only reads passing the quality floors contribute to the allele evidence.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleEvidence {
    pub reference: AlleleEvidence,
    pub alternate: AlleleEvidence,
    /// Passing reads supporting neither allele
    pub other_reads: u64,
    /// Reads below a quality floor
    pub poor_reads: u64,
    /// Reads with mapping quality 0, counted regardless of other floors
    pub mq0_reads: u64
}

impl SampleEvidence {
    /// Adds a single observation, routing low quality reads to `poor_reads`
    /// # Arguments
    /// * `obs` - the read observation
    /// * `thresholds` - the mapping and base quality floors
    pub fn add_observation(&mut self, obs: &ReadObservation, thresholds: EvidenceThresholds) {
        if obs.mapping_quality == 0 {
            self.mq0_reads += 1;
        }
        if obs.mapping_quality < thresholds.min_mapping_quality || obs.base_quality < thresholds.min_base_quality {
            self.poor_reads += 1;
            return;
        }
        match obs.allele {
            ObservedAllele::Reference => self.reference.add(obs),
            ObservedAllele::Alternate => self.alternate.add(obs),
            ObservedAllele::Other => self.other_reads += 1
        };
    }

    /// Passing depth across all alleles
    pub fn depth(&self) -> u64 {
        self.reference.depth() + self.alternate.depth() + self.other_reads
    }

    /// ALT / passing depth, None without coverage
    pub fn vaf(&self) -> Option<f64> {
        let dp = self.depth();
        if dp == 0 {
            None
        } else {
            Some(self.alternate.depth() as f64 / dp as f64)
        }
    }
}

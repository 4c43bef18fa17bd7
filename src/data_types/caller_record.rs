
use serde::Serialize;
use std::collections::BTreeMap;
use strum_macros::EnumString;

use crate::data_types::callers::CallerTag;
use crate::data_types::site::SiteKey;

/// Caller-specific scores that are carried into the feature table.
/// The string form is the feature column name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, Serialize, strum_macros::Display, EnumString)]
pub enum ScoreField {
    #[strum(serialize = "M2_TLOD")]
    M2Tlod,
    #[strum(serialize = "M2_NLOD")]
    M2Nlod,
    #[strum(serialize = "VarScan2_Score")]
    VarScan2Score,
    #[strum(serialize = "SNVMix2_Score")]
    SnvMix2Score,
    #[strum(serialize = "Sniper_Score")]
    SniperScore,
    #[strum(serialize = "VarDict_Score")]
    VarDictScore,
    #[strum(serialize = "MSI")]
    Msi,
    #[strum(serialize = "MSILEN")]
    MsiLength,
    #[strum(serialize = "SHIFT3")]
    Shift3,
    #[strum(serialize = "MuSE_Tier")]
    MuseTier,
    #[strum(serialize = "Strelka_Score")]
    StrelkaScore,
    #[strum(serialize = "Strelka_QSS")]
    StrelkaQss,
    #[strum(serialize = "Strelka_TQSS")]
    StrelkaTqss
}

/// Where a score lives in a caller's VCF record
#[derive(Clone, Copy, Debug)]
pub enum ScoreSource {
    /// First INFO key present among the options
    Info(&'static [&'static str]),
    /// FORMAT key of the tumor sample
    TumorFormat(&'static str),
    /// The QUAL column
    Quality,
    /// `PASS` is tier 0, `TierN` is N
    FilterTier
}

/// Score fields reported by each caller, in feature column order
pub fn caller_scores(tag: CallerTag) -> &'static [(ScoreField, ScoreSource)] {
    match tag {
        CallerTag::MuTect | CallerTag::MuTect2 => &[
            (ScoreField::M2Tlod, ScoreSource::Info(&["TLOD"])),
            (ScoreField::M2Nlod, ScoreSource::Info(&["NLOD"])),
        ],
        CallerTag::VarScan2 => &[
            (ScoreField::VarScan2Score, ScoreSource::Info(&["SSC"])),
        ],
        CallerTag::JointSNVMix2 => &[
            (ScoreField::SnvMix2Score, ScoreSource::Quality),
        ],
        CallerTag::SomaticSniper => &[
            (ScoreField::SniperScore, ScoreSource::TumorFormat("SSC")),
        ],
        CallerTag::VarDict => &[
            (ScoreField::VarDictScore, ScoreSource::Info(&["SSF"])),
            (ScoreField::Msi, ScoreSource::Info(&["MSI"])),
            (ScoreField::MsiLength, ScoreSource::Info(&["MSILEN"])),
            (ScoreField::Shift3, ScoreSource::Info(&["SHIFT3"])),
        ],
        CallerTag::MuSE => &[
            (ScoreField::MuseTier, ScoreSource::FilterTier),
        ],
        CallerTag::Strelka => &[
            (ScoreField::StrelkaScore, ScoreSource::Info(&["SomaticEVS"])),
            (ScoreField::StrelkaQss, ScoreSource::Info(&["QSS", "QSI"])),
            (ScoreField::StrelkaTqss, ScoreSource::Info(&["TQSS", "TQSI"])),
        ],
        CallerTag::LoFreq |
        CallerTag::Scalpel |
        CallerTag::TNscope |
        CallerTag::Platypus => &[]
    }
}

/// One caller's normalized view of a site.
/// Callers disagree on depth and allele fraction, so each view is retained next to the merged site.
#[derive(Clone, Debug, PartialEq)]
pub struct CallerRecord {
    /// The normalized identity
    site: SiteKey,
    /// Tumor allele fraction as reported by the caller
    tumor_vaf: Option<f64>,
    /// Normal allele fraction as reported by the caller, paired runs only
    normal_vaf: Option<f64>,
    /// Caller-specific scores that were present on the record
    scores: BTreeMap<ScoreField, f64>
}

impl CallerRecord {
    pub fn new(site: SiteKey, tumor_vaf: Option<f64>, normal_vaf: Option<f64>, scores: BTreeMap<ScoreField, f64>) -> Self {
        Self {
            site,
            tumor_vaf,
            normal_vaf,
            scores
        }
    }

    /// Returns a score if the caller reported it
    pub fn score(&self, field: ScoreField) -> Option<f64> {
        self.scores.get(&field).copied()
    }

    /// Folds a duplicate record from the same caller into this one.
    /// The first value seen for each field wins and gaps are filled from the duplicate.
    pub fn absorb(&mut self, other: CallerRecord) {
        debug_assert_eq!(self.site, other.site);
        self.tumor_vaf = self.tumor_vaf.or(other.tumor_vaf);
        self.normal_vaf = self.normal_vaf.or(other.normal_vaf);
        for (field, value) in other.scores.into_iter() {
            self.scores.entry(field).or_insert(value);
        }
    }

    // getters
    pub fn site(&self) -> &SiteKey {
        &self.site
    }

    pub fn tumor_vaf(&self) -> Option<f64> {
        self.tumor_vaf
    }

    pub fn normal_vaf(&self) -> Option<f64> {
        self.normal_vaf
    }

    pub fn scores(&self) -> &BTreeMap<ScoreField, f64> {
        &self.scores
    }
}

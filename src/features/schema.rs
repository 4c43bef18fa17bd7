
use indexmap::IndexSet;

use crate::data_types::caller_record::{caller_scores, ScoreField};
use crate::data_types::callers::{CallerId, CallerRoster};
use crate::data_types::site::{SequencingMode, VariantClass};

/// Identity columns written before the features in every table
pub const METADATA_COLUMNS: [&str; 4] = ["CHROM", "POS", "REF", "ALT"];
/// Truth label column, written when a truth set was supplied
pub const LABEL_COLUMN: &str = "TrueVariant_or_False";
/// Classifier probability column in scored tables
pub const SCORE_COLUMN: &str = "SCORE";
/// Columns that are never given to the classifier unless a run asks for them explicitly
pub const DEFAULT_EXCLUDED: [&str; 4] = ["Strelka_QSS", "Strelka_TQSS", "if_COSMIC", "COSMIC_CNT"];

/// Per-sample evidence columns, each prefixed by `T_` or `N_`
pub const EVIDENCE_COLUMNS: [&str; 28] = [
    "DP", "REF_FOR", "REF_REV", "ALT_FOR", "ALT_REV", "VAF",
    "REF_MQ", "ALT_MQ", "Z_RANKSUM_MQ",
    "REF_BQ", "ALT_BQ", "Z_RANKSUM_BQ",
    "REF_NM", "ALT_NM", "NM_DIFF", "Z_RANKSUM_ENDPOS",
    "STRAND_BIAS_FET",
    "REF_CLIPPED", "ALT_CLIPPED", "CLIPPING_FET",
    "REF_CONCORDANT", "REF_DISCORDANT", "ALT_CONCORDANT", "ALT_DISCORDANT", "CONCORDANCE_FET",
    "MQ0", "POOR_READS", "OTHER_READS"
];

/// Annotation and context columns shared by every schema
pub const ANNOTATION_COLUMNS: [&str; 4] = ["if_dbsnp", "COMMON", "if_COSMIC", "COSMIC_CNT"];
pub const CONTEXT_COLUMNS: [&str; 2] = ["SITE_HOMOPOLYMER_LENGTH", "MAX_HOMOPOLYMER_LENGTH"];
pub const INDEL_LENGTH_COLUMN: &str = "INDEL_LENGTH";
pub const NUM_TOOLS_COLUMN: &str = "NUM_TOOLS";
pub const TUMOR_CALLER_VAF_COLUMN: &str = "T_CALLER_VAF";
pub const NORMAL_CALLER_VAF_COLUMN: &str = "N_CALLER_VAF";

/// Prefix for tumor evidence columns
pub const TUMOR_PREFIX: &str = "T_";
/// Prefix for normal evidence columns
pub const NORMAL_PREFIX: &str = "N_";

/// Name of the vote column for a caller
pub fn vote_column(caller: &CallerId) -> String {
    format!("if_{caller}")
}

/// The fixed feature column order for one (class, mode, roster) combination.
/// Two runs produce the same schema iff they share class, mode, and the number of arbitrary callers.
#[derive(Clone, Debug)]
pub struct FeatureSchema {
    class: VariantClass,
    mode: SequencingMode,
    /// Every roster caller, present or not
    roster: Vec<CallerId>,
    /// Score columns for the roster, in roster order
    score_fields: Vec<ScoreField>,
    /// All feature column names in order
    columns: IndexSet<String>
}

impl FeatureSchema {
    /// Builds the schema for a resolved roster
    pub fn from_roster(roster: &CallerRoster) -> Self {
        let callers: Vec<CallerId> = roster.slots().iter().map(|s| s.caller().clone()).collect();
        Self::new(roster.class(), roster.mode(), callers)
    }

    /// Builds the schema from an explicit roster caller list
    /// # Arguments
    /// * `class` - substitutions or indels
    /// * `mode` - paired or single-sample
    /// * `roster` - every caller in the roster, in roster order
    pub fn new(class: VariantClass, mode: SequencingMode, roster: Vec<CallerId>) -> Self {
        let mut score_fields: IndexSet<ScoreField> = Default::default();
        for tag in roster.iter().filter_map(|c| c.tag()) {
            score_fields.extend(caller_scores(tag).iter().map(|(field, _source)| *field));
        }

        let mut columns: IndexSet<String> = Default::default();
        columns.extend(roster.iter().map(vote_column));
        columns.insert(NUM_TOOLS_COLUMN.to_string());
        columns.extend(score_fields.iter().map(|f| f.to_string()));
        columns.extend(ANNOTATION_COLUMNS.iter().map(|c| c.to_string()));
        columns.extend(CONTEXT_COLUMNS.iter().map(|c| c.to_string()));
        if class == VariantClass::Indel {
            columns.insert(INDEL_LENGTH_COLUMN.to_string());
        }
        columns.insert(TUMOR_CALLER_VAF_COLUMN.to_string());
        if mode == SequencingMode::Paired {
            columns.insert(NORMAL_CALLER_VAF_COLUMN.to_string());
        }
        columns.extend(EVIDENCE_COLUMNS.iter().map(|c| format!("{TUMOR_PREFIX}{c}")));
        if mode == SequencingMode::Paired {
            columns.extend(EVIDENCE_COLUMNS.iter().map(|c| format!("{NORMAL_PREFIX}{c}")));
        }

        Self {
            class,
            mode,
            roster,
            score_fields: score_fields.into_iter().collect(),
            columns
        }
    }

    /// Column index for a name
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.get_index_of(name)
    }

    /// Feature names as owned strings, in order
    pub fn feature_names(&self) -> Vec<String> {
        self.columns.iter().cloned().collect()
    }

    // getters
    pub fn class(&self) -> VariantClass {
        self.class
    }

    pub fn mode(&self) -> SequencingMode {
        self.mode
    }

    pub fn roster(&self) -> &[CallerId] {
        &self.roster
    }

    pub fn score_fields(&self) -> &[ScoreField] {
        &self.score_fields
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::callers::{roster_table, CallerInputs};

    fn schema(class: VariantClass, mode: SequencingMode) -> FeatureSchema {
        FeatureSchema::from_roster(&CallerRoster::resolve(class, mode, &CallerInputs::default()))
    }

    #[test]
    fn test_paired_snv_schema() {
        let s = schema(VariantClass::Snv, SequencingMode::Paired);
        let names = s.feature_names();
        assert_eq!(names[0], "if_MuTect");
        assert_eq!(names[roster_table(VariantClass::Snv, SequencingMode::Paired).len()], "NUM_TOOLS");
        assert!(s.index_of("M2_TLOD").unwrap() < s.index_of("VarScan2_Score").unwrap());
        assert!(s.index_of("Strelka_TQSS").unwrap() < s.index_of("if_dbsnp").unwrap());
        assert!(s.index_of(INDEL_LENGTH_COLUMN).is_none());
        assert!(s.index_of("N_CALLER_VAF").is_some());
        assert_eq!(names.last().unwrap(), "N_OTHER_READS");
        assert!(s.index_of("T_OTHER_READS").unwrap() < s.index_of("N_DP").unwrap());
    }

    #[test]
    fn test_single_indel_schema() {
        let s = schema(VariantClass::Indel, SequencingMode::Single);
        assert_eq!(s.feature_names()[0], "if_MuTect2");
        assert!(s.index_of(INDEL_LENGTH_COLUMN).is_some());
        assert!(s.index_of("N_CALLER_VAF").is_none());
        assert!(s.index_of("N_DP").is_none());
        assert!(s.index_of("MuSE_Tier").is_none());
        assert_eq!(s.feature_names().last().unwrap(), "T_OTHER_READS");
        // no duplicate names are possible
        assert_eq!(s.len(), s.feature_names().len());
    }

    #[test]
    fn test_arbitrary_callers_change_schema() {
        let mut inputs = CallerInputs::default();
        inputs.add_arbitrary(VariantClass::Snv, &[std::path::PathBuf::from("extra.vcf")]);
        let roster = CallerRoster::resolve(VariantClass::Snv, SequencingMode::Single, &inputs);
        let with_extra = FeatureSchema::from_roster(&roster);
        let plain = schema(VariantClass::Snv, SequencingMode::Single);
        assert_eq!(with_extra.len(), plain.len() + 1);
        assert!(with_extra.index_of("if_SnvCaller_0").is_some());
    }
}

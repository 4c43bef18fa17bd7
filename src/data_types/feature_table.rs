
use anyhow::anyhow;

use crate::data_types::callers::CallerId;
use crate::data_types::site::{SequencingMode, SiteKey, VariantClass};

/// One row of the feature table
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureRow {
    /// The site this row describes
    site: SiteKey,
    /// Values in schema order; missing values are NaN
    values: Vec<f64>,
    /// Truth label, only present when a truth set was supplied
    label: Option<bool>
}

impl FeatureRow {
    pub fn new(site: SiteKey, values: Vec<f64>, label: Option<bool>) -> Self {
        Self { site, values, label }
    }

    // getters
    pub fn site(&self) -> &SiteKey {
        &self.site
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn label(&self) -> Option<bool> {
        self.label
    }
}

/// A feature row with a classifier probability attached
#[derive(Clone, Copy, Debug)]
pub struct ScoredRow<'a> {
    pub row: &'a FeatureRow,
    pub probability: f64
}

/// The complete feature table for one variant class.
/// Rows are sorted by genomic coordinate and every row has one value per feature name.
#[derive(Clone, Debug)]
pub struct FeatureTable {
    class: VariantClass,
    mode: SequencingMode,
    /// Feature column names in schema order
    feature_names: Vec<String>,
    /// Every caller in the roster, used to read the `if_<Caller>` columns back
    roster: Vec<CallerId>,
    /// Callers that were run for this class, in vote order
    active_callers: Vec<CallerId>,
    rows: Vec<FeatureRow>
}

impl FeatureTable {
    /// Constructor
    /// # Errors
    /// * if any row does not have exactly one value per feature name
    pub fn new(
        class: VariantClass, mode: SequencingMode,
        feature_names: Vec<String>, roster: Vec<CallerId>, active_callers: Vec<CallerId>,
        rows: Vec<FeatureRow>
    ) -> anyhow::Result<Self> {
        if let Some(bad) = rows.iter().find(|r| r.values.len() != feature_names.len()) {
            return Err(anyhow!(
                "Row for {} has {} values, expected {}", bad.site, bad.values.len(), feature_names.len()
            ));
        }
        Ok(Self {
            class, mode, feature_names, roster, active_callers, rows
        })
    }

    /// Index of a feature column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|n| n == name)
    }

    /// Returns a single value by column name, None if the column does not exist or the value is missing
    #[cfg(test)]
    pub fn value(&self, row_index: usize, name: &str) -> Option<f64> {
        let column = self.column_index(name)?;
        let value = self.rows[row_index].values[column];
        if value.is_nan() { None } else { Some(value) }
    }

    /// Returns true if every row has a label
    pub fn is_labeled(&self) -> bool {
        !self.rows.is_empty() && self.rows.iter().all(|r| r.label.is_some())
    }

    /// Pairs each row with its probability
    /// # Errors
    /// * if the number of scores does not match the number of rows
    pub fn scored_rows<'a>(&'a self, scores: &[f64]) -> anyhow::Result<Vec<ScoredRow<'a>>> {
        if scores.len() != self.rows.len() {
            return Err(anyhow!("Received {} scores for {} rows", scores.len(), self.rows.len()));
        }
        Ok(self.rows.iter()
            .zip(scores.iter())
            .map(|(row, &probability)| ScoredRow { row, probability })
            .collect())
    }

    // getters
    pub fn class(&self) -> VariantClass {
        self.class
    }

    pub fn mode(&self) -> SequencingMode {
        self.mode
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn roster(&self) -> &[CallerId] {
        &self.roster
    }

    pub fn active_callers(&self) -> &[CallerId] {
        &self.active_callers
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_check() {
        let site = SiteKey::normalized("chr1", 5, "A", "C").unwrap();
        let rows = vec![FeatureRow::new(site, vec![1.0], None)];
        let result = FeatureTable::new(
            VariantClass::Snv, SequencingMode::Single,
            vec!["a".to_string(), "b".to_string()], vec![], vec![], rows
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_lookup() {
        let site = SiteKey::normalized("chr1", 5, "A", "C").unwrap();
        let rows = vec![FeatureRow::new(site, vec![1.0, f64::NAN], Some(true))];
        let table = FeatureTable::new(
            VariantClass::Snv, SequencingMode::Single,
            vec!["a".to_string(), "b".to_string()], vec![], vec![], rows
        ).unwrap();
        assert_eq!(table.value(0, "a"), Some(1.0));
        assert_eq!(table.value(0, "b"), None);
        assert_eq!(table.value(0, "c"), None);
        assert!(table.is_labeled());
        assert!(table.scored_rows(&[0.5, 0.5]).is_err());
        assert_eq!(table.scored_rows(&[0.25]).unwrap()[0].probability, 0.25);
    }
}


use anyhow::{bail, Context};
use std::fs::File;
use std::path::Path;

use crate::data_types::feature_table::FeatureTable;
use crate::features::schema::{LABEL_COLUMN, METADATA_COLUMNS, SCORE_COLUMN};

/// Text form of a feature value; missing values are `nan`
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}

fn tsv_writer(filename: &Path) -> anyhow::Result<csv::Writer<File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(filename)
        .with_context(|| format!("Error while creating {filename:?}:"))
}

/// Writes a feature table with identity columns first.
/// The label column is written when every row is labeled, and `SCORE` when scores are given.
/// # Arguments
/// * `filename` - output TSV path
/// * `table` - the feature table
/// * `scores` - optional classifier probabilities, one per row
/// # Errors
/// * if the score count does not match the rows
/// * if the file cannot be written
pub fn write_feature_table(filename: &Path, table: &FeatureTable, scores: Option<&[f64]>) -> anyhow::Result<()> {
    if let Some(s) = scores {
        if s.len() != table.len() {
            bail!("Received {} scores for {} rows", s.len(), table.len());
        }
    }
    let labeled = table.is_labeled();
    let mut csv_writer = tsv_writer(filename)?;

    let mut header: Vec<&str> = METADATA_COLUMNS.to_vec();
    header.extend(table.feature_names().iter().map(|n| n.as_str()));
    if labeled {
        header.push(LABEL_COLUMN);
    }
    if scores.is_some() {
        header.push(SCORE_COLUMN);
    }
    csv_writer.write_record(&header)?;

    for (i, row) in table.rows().iter().enumerate() {
        let site = row.site();
        let mut record: Vec<String> = vec![
            site.chrom().to_string(),
            site.position().to_string(),
            site.ref_allele().to_string(),
            site.alt_allele().to_string()
        ];
        record.extend(row.values().iter().map(|&v| format_value(v)));
        if labeled {
            let label = row.label().unwrap_or_default();
            record.push(if label { "1" } else { "0" }.to_string());
        }
        if let Some(s) = scores {
            record.push(format_value(s[i]));
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()
        .with_context(|| format!("Error while flushing {filename:?}:"))?;
    Ok(())
}

/// Writes a bare feature matrix, the exchange format for the delegate programs
/// # Arguments
/// * `filename` - output TSV path
/// * `names` - column names
/// * `rows` - values in column order
/// * `labels` - optional labels, written as a final 0/1 column
pub fn write_feature_matrix(filename: &Path, names: &[&str], rows: &[Vec<f64>], labels: Option<&[bool]>) -> anyhow::Result<()> {
    let mut csv_writer = tsv_writer(filename)?;
    let mut header: Vec<&str> = names.to_vec();
    if labels.is_some() {
        header.push(LABEL_COLUMN);
    }
    csv_writer.write_record(&header)?;

    for (i, row) in rows.iter().enumerate() {
        let mut record: Vec<String> = row.iter().map(|&v| format_value(v)).collect();
        if let Some(l) = labels {
            record.push(if l[i] { "1" } else { "0" }.to_string());
        }
        csv_writer.write_record(&record)?;
    }
    csv_writer.flush()
        .with_context(|| format!("Error while flushing {filename:?}:"))?;
    Ok(())
}

/// Reads the `SCORE` column of a tab-delimited table
/// # Errors
/// * if the file cannot be read, has no `SCORE` column, or a value is not a number
pub fn read_score_column(filename: &Path) -> anyhow::Result<Vec<f64>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_path(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    let column = match csv_reader.headers()?.iter().position(|h| h == SCORE_COLUMN) {
        Some(c) => c,
        None => bail!("{filename:?} has no {SCORE_COLUMN} column")
    };

    let mut scores = vec![];
    for (i, result) in csv_reader.records().enumerate() {
        let record = result
            .with_context(|| format!("Error while reading row #{} of {filename:?}:", i + 1))?;
        let value = record.get(column).unwrap_or_default();
        let score: f64 = value.trim().parse()
            .with_context(|| format!("Invalid {SCORE_COLUMN} {value:?} on row #{} of {filename:?}:", i + 1))?;
        scores.push(score);
    }
    Ok(scores)
}

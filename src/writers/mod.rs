/*!
# Writers module
Contains the logic for writing the feature tables, call files, and intermediates.
*/
/// Writes the raw union of caller sites as a sites-only VCF
pub mod aggregate_vcf;
/// Writes the final consensus and classified call VCFs
pub mod call_vcf;
/// Writes feature tables and reads scored tables back
pub mod feature_tsv;
/// Writes each caller's normalized records
pub mod normalized_calls;

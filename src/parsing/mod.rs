/*!
# Parsing module
Contains the logic for parsing input files into meaningful structs / data.
*/
/// Loads dbSNP, COSMIC, and truth set VCFs restricted to candidate sites
pub mod annotations;
/// Reads caller VCFs into normalized per-caller records
pub mod caller_vcf;
/// Reference contig order and lengths from a FASTA index
pub mod contig_index;
/// Streams per-sample read observation tables
pub mod evidence_table;
/// Helper functions for noodles
pub mod noodles_helper;
/// Inclusion and exclusion region lookups
pub mod regions;

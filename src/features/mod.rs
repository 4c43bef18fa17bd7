/*!
# Features module
Turns aggregated sites into fixed-order numeric feature rows.
*/
/// Builds one feature row per aggregated site
pub mod extractor;
/// Column order per variant class and sequencing mode
pub mod schema;
/// Fisher, rank-sum, and sequence context statistics
pub mod statistics;

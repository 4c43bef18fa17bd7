
/// Final adjudicated call types: genotype, filter, per-sample calls
pub mod call_record;
/// One caller's normalized view of a site plus caller-specific score definitions
pub mod caller_record;
/// Caller identities, input slots, and the declarative caller roster
pub mod callers;
/// Read-level evidence accumulated per sample and site
pub mod evidence;
/// Feature rows and the per-class feature table
pub mod feature_table;
/// Site identity, normalization, and variant classes
pub mod site;

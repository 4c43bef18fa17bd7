
/// Unions caller calls into one table of sites per variant class
pub mod aggregator;
/// Turns feature rows and scores into final calls
pub mod call_emitter;
/// Trains and applies the site classifier
pub mod classifier;
/// Command line interface functionality
pub mod cli;
/// Contains various shared data types
pub mod data_types;
/// Feature extraction for aggregated sites
pub mod features;
/// Tooling for parsing input files into meaningful structs / data
pub mod parsing;
/// Runs both variant classes from inputs to call files
pub mod pipeline;
/// Various utility functions that tend to be very generic
pub mod util;
/// All output writers
pub mod writers;

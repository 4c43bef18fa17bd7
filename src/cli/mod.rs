/*!
# CLI module
Command line interface functionality that is specific to Quorum.
*/

/// The main CLI module that contains the top-level CLI parser and help text
pub mod core;
/// The paired tumor/normal CLI subcommand
pub mod paired;
/// Options shared by both subcommands
pub mod shared;
/// The tumor-only CLI subcommand
pub mod single;

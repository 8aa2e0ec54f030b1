//! Command implementations for the marketplace CLI.
//!
//! Each module owns one subcommand: it runs the operation, prints the
//! result in the requested format, and returns the process exit code.

pub mod blockmap;
pub mod completions;
pub mod download;
pub mod plan;

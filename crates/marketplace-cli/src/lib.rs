//! Marketplace CLI library.
//!
//! Exposes the command implementations and output formatters used by the
//! `marketplace` binary so they can be tested without spawning a process.

#![allow(clippy::missing_errors_doc)]
#![allow(clippy::unused_async)]

pub mod commands;
pub mod formatters;

//! Core types, configuration, and errors for the Marketplace client.
//!
//! This crate provides the foundational types shared by every other crate
//! in the workspace.
//!
//! # Architecture
//!
//! The core consists of:
//! - Strong domain types (`PluginXmlId`, `UpdateId`, `Channel`)
//! - Error hierarchy with contextual information
//! - Client configuration with TOML loading and validation
//! - CLI output and exit code types

#![deny(unsafe_code)]
#![warn(missing_docs, missing_debug_implementations)]

mod config;
mod error;
mod types;

pub mod cli;

pub use config::{ClientConfig, ClientConfigBuilder, MAX_PARALLEL_CONNECTIONS_ENV};
pub use error::{Error, Result};
pub use types::{Channel, PluginXmlId, UpdateId};

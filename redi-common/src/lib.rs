//! # REDI Common Library
//!
//! Shared code for the REDI (Real Estate Data Ingest) services:
//! - Error and result types
//! - Configuration loading (TOML file + environment overrides)

pub mod config;
pub mod error;

pub use error::{Error, Result};

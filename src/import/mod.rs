//! Import functionality
//!
//! Provides parsers for ingestion batches:
//! - JSON (`.json`) arrays of publication records
//! - YAML (`.yaml`, `.yml`) sequences of publication records

pub mod seed;

pub use seed::{DatasetRecord, PublicationRecord, SeedBatch, SeedFormat, SeedImporter};

/// Error during import
#[derive(Debug, thiserror::Error, serde::Serialize, serde::Deserialize)]
pub enum ImportError {
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Unsupported seed format: {0}")]
    UnsupportedFormat(String),
}

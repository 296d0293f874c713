//! Validation functionality
//!
//! Field-level checks applied before any catalog write.

pub mod input;

pub use input::{
    ValidationError, ValidationResult, parse_publication_date, validate_lookup_name,
    validate_title,
};

//! Command line interface for the catalog
//!
//! Handlers are synchronous and drive the async store on their own tokio
//! runtime.

pub mod commands;
pub mod error;

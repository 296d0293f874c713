//! Publication catalog - research publications, their datasets, and the
//! species and brain regions those datasets cover
//!
//! Provides:
//! - A catalog store over DuckDB (embedded) or PostgreSQL
//! - Find-or-create lookups for species and brain regions
//! - Filtered publication listings (by species, by region, or both)
//! - Ingestion of JSON/YAML seed batches
//! - Input validation shared by the store and the loader
//!
//! ```no_run
//! # #[cfg(feature = "duckdb-backend")]
//! # async fn demo() -> publication_catalog::database::CatalogResult<()> {
//! use publication_catalog::database::{CatalogBackend, DuckDBBackend, PublicationFilter};
//!
//! let backend = DuckDBBackend::in_memory()?;
//! backend.initialize().await?;
//! let mouse = backend.find_or_create_species("Mus musculus").await?;
//! let studies = backend
//!     .list_publications(&PublicationFilter::species(mouse.sid))
//!     .await?;
//! # let _ = studies;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "cli")]
pub mod cli;
pub mod database;
pub mod import;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use database::{
    CatalogBackend, CatalogConfig, CatalogError, CatalogResult, CatalogStats, FailurePolicy,
    IngestLoader, LoadReport, PublicationFilter, StudiesView, browse_studies,
};
#[cfg(feature = "duckdb-backend")]
pub use database::DuckDBBackend;
#[cfg(feature = "postgres-backend")]
pub use database::PostgresBackend;
pub use import::{ImportError, PublicationRecord, SeedImporter};
pub use models::{Dataset, NewDataset, NewPublication, Publication, Region, Species};
pub use validation::{ValidationError, ValidationResult};

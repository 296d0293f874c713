//! Catalog store
//!
//! This module provides the storage layer for the publication catalog:
//! - DuckDB: Embedded database for the CLI, tests and single-node deployments
//! - PostgreSQL: For server deployments
//!
//! Both backends share one schema and one query builder. Lookup tables
//! (species, regions) are deduplicated by name at the store level; see
//! [`CatalogBackend::find_or_create_lookup`] for the concurrency contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod browse;
pub mod config;
pub mod ingest;
pub mod output;
pub mod query;
pub mod schema;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBBackend;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

pub use browse::{StudiesView, browse_studies};
pub use config::CatalogConfig;
pub use ingest::{FailurePolicy, IngestLoader, LoadReport, RecordFailure};
pub use output::{OutputFormat, format_lookups, format_publications};
pub use query::{PublicationFilter, PublicationQuery};
pub use schema::CatalogSchema;

use crate::import::ImportError;
use crate::models::{
    LookupEntry, LookupKind, NewDataset, NewPublication, Publication, Region, Species,
};
use crate::validation::input::ValidationError;

/// Number of attempts `find_or_create_lookup` makes before reporting a conflict
pub const MAX_LOOKUP_ATTEMPTS: usize = 3;

/// Error type for catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// A required field is missing or malformed
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A dataset references a publication, species or region that does not exist
    #[error("Reference error: {0}")]
    Reference(String),

    /// Lookup by id found nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Concurrent lookup insert could not be resolved after retrying
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An ingestion record was rejected
    #[error("Record {index} rejected: {source}")]
    RecordRejected {
        index: usize,
        #[source]
        source: Box<CatalogError>,
    },

    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),

    /// Seed batch could not be parsed
    #[error("Import error: {0}")]
    Import(#[from] ImportError),
}

impl CatalogError {
    /// The innermost error, looking through record rejections
    pub fn root(&self) -> &CatalogError {
        match self {
            CatalogError::RecordRejected { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error (or the error that rejected a record) is a validation failure
    pub fn is_validation(&self) -> bool {
        matches!(self.root(), CatalogError::Validation(_))
    }
}

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Row counts and bookkeeping for a catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogStats {
    pub publication_count: usize,
    pub dataset_count: usize,
    pub species_count: usize,
    pub region_count: usize,
    /// Number of dataset-region links
    pub region_link_count: usize,
    /// Applied schema version, `None` if the schema was never initialized
    pub schema_version: Option<i32>,
    /// Most recent ingestion run
    pub last_load: Option<LoadSummary>,
}

/// A row of the ingestion log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub id: i64,
    pub started_at: String,
    pub completed_at: String,
    pub source: Option<String>,
    pub source_hash: Option<String>,
    pub publications_created: usize,
    pub datasets_created: usize,
    pub failure_count: usize,
}

/// Catalog backend trait
///
/// This trait defines the interface for catalog stores (DuckDB, PostgreSQL).
/// All operations are async to match the server-side backends.
#[async_trait(?Send)]
pub trait CatalogBackend: Send + Sync {
    /// Create tables, sequences and indexes if they don't exist
    async fn initialize(&self) -> CatalogResult<()>;

    /// Drop every catalog table and recreate the schema
    async fn reset(&self) -> CatalogResult<()>;

    /// Return the lookup row with this name, creating it if absent.
    ///
    /// The name is trimmed and validated first. Repeated calls with the same
    /// name, including concurrent ones, converge on a single row: the unique
    /// constraint on the name column arbitrates, the insert is
    /// `ON CONFLICT DO NOTHING`, and the row is then re-read. A call that
    /// still cannot observe the row after [`MAX_LOOKUP_ATTEMPTS`] fails with
    /// [`CatalogError::Conflict`].
    async fn find_or_create_lookup(&self, kind: LookupKind, name: &str)
    -> CatalogResult<LookupEntry>;

    /// Typed wrapper over [`find_or_create_lookup`](Self::find_or_create_lookup)
    async fn find_or_create_species(&self, name: &str) -> CatalogResult<Species> {
        self.find_or_create_lookup(LookupKind::Species, name)
            .await
            .map(Species::from)
    }

    /// Typed wrapper over [`find_or_create_lookup`](Self::find_or_create_lookup)
    async fn find_or_create_region(&self, name: &str) -> CatalogResult<Region> {
        self.find_or_create_lookup(LookupKind::Region, name)
            .await
            .map(Region::from)
    }

    /// Insert a publication and return its `pid`
    ///
    /// Fails with [`CatalogError::Validation`] if the title is empty.
    async fn create_publication(&self, publication: &NewPublication) -> CatalogResult<i64>;

    /// Insert a dataset and its region links, returning its `did`
    ///
    /// Fails with [`CatalogError::Reference`] if the publication, the species
    /// or any region does not exist.
    async fn create_dataset(&self, dataset: &NewDataset) -> CatalogResult<i64>;

    /// Load one publication with all of its datasets
    async fn get_publication(&self, pid: i64) -> CatalogResult<Publication>;

    /// Delete a publication together with the datasets it owns.
    ///
    /// Species and regions are left untouched. Returns the number of
    /// datasets removed.
    async fn delete_publication(&self, pid: i64) -> CatalogResult<usize>;

    /// List publications matching the filter, newest first, undated last
    async fn list_publications(&self, filter: &PublicationFilter)
    -> CatalogResult<Vec<Publication>>;

    /// All species ordered by name
    async fn list_species(&self) -> CatalogResult<Vec<Species>>;

    /// All regions ordered by name
    async fn list_regions(&self) -> CatalogResult<Vec<Region>>;

    /// Row counts, schema version and last ingestion run
    async fn stats(&self) -> CatalogResult<CatalogStats>;

    /// Append an ingestion run to the load log and return its id
    async fn record_load(&self, report: &LoadReport) -> CatalogResult<i64>;

    /// Most recent ingestion run
    async fn latest_load(&self) -> CatalogResult<Option<LoadSummary>>;

    /// Check if database is healthy and accessible
    async fn health_check(&self) -> CatalogResult<bool>;

    /// Backend type string ("duckdb" or "postgres")
    fn backend_type(&self) -> &'static str;

    /// Close the database connection
    async fn close(&self) -> CatalogResult<()>;
}

/// Convert a stored count to `usize`
pub(crate) fn count(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_looks_through_rejections() {
        let err = CatalogError::RecordRejected {
            index: 3,
            source: Box::new(CatalogError::Validation(ValidationError::Empty("title"))),
        };
        assert!(err.is_validation());
        assert!(matches!(err.root(), CatalogError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Record 3 rejected: Validation failed: title cannot be empty"
        );
    }

    #[test]
    fn test_reference_is_not_validation() {
        let err = CatalogError::Reference("publication 9 does not exist".to_string());
        assert!(!err.is_validation());
    }

    #[test]
    fn test_stats_default() {
        let stats = CatalogStats::default();
        assert_eq!(stats.publication_count, 0);
        assert!(stats.schema_version.is_none());
        assert!(stats.last_load.is_none());
    }
}

//! DuckDB database backend implementation
//!
//! Provides an embedded catalog store using DuckDB. Supports both file-based
//! persistence and in-memory mode.
//!
//! All access goes through a single connection behind a mutex, so writes are
//! serialised: the check-then-insert in `find_or_create_lookup` runs as a
//! single-writer critical section on top of the unique name constraint.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::query::{
    BuiltQuery, DatasetRow, ParamStyle, PublicationQuery, PublicationRow, RegionLinkRow,
    assemble_publications,
};
use super::schema::{
    CatalogSchema, SCHEMA_VERSION, dataset_sql, load_log_sql, lookup_sql, publication_sql,
    stats_sql,
};
use super::{
    CatalogBackend, CatalogError, CatalogResult, CatalogStats, LoadReport, LoadSummary,
    MAX_LOOKUP_ATTEMPTS, PublicationFilter, count,
};
use crate::models::{
    LookupEntry, LookupKind, NewDataset, NewPublication, Publication, Region, Species,
};
use crate::validation::input::{PUBLICATION_DATE_FORMAT, validate_lookup_name};

/// DuckDB database backend
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDBBackend {
    /// Create a new DuckDB backend with a file-based database
    pub fn new(db_path: impl AsRef<Path>) -> CatalogResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            CatalogError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory DuckDB backend
    ///
    /// Useful for testing or throwaway catalogs where persistence is not needed.
    pub fn in_memory() -> CatalogResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            CatalogError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> CatalogResult<MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| CatalogError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    fn query_rows<T, F>(
        conn: &duckdb::Connection,
        built: &BuiltQuery,
        map: F,
    ) -> CatalogResult<Vec<T>>
    where
        F: FnMut(&duckdb::Row<'_>) -> duckdb::Result<T>,
    {
        let mut stmt = conn
            .prepare(&built.sql)
            .map_err(|e| CatalogError::QueryFailed(format!("Prepare failed: {}", e)))?;

        let rows = stmt
            .query_map(duckdb::params_from_iter(built.params.iter()), map)
            .map_err(|e| CatalogError::QueryFailed(format!("Query failed: {}", e)))?;

        let collected = rows.collect::<Result<Vec<T>, _>>();
        collected.map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))
    }

    fn count_rows(
        conn: &duckdb::Connection,
        sql: &str,
        params: impl duckdb::Params,
    ) -> CatalogResult<i64> {
        conn.query_row(sql, params, |row| row.get::<_, i64>(0))
            .map_err(|e| CatalogError::QueryFailed(format!("Count failed: {}", e)))
    }

    fn fetch_publications(&self, query: &PublicationQuery) -> CatalogResult<Vec<Publication>> {
        let conn = self.lock()?;

        let built = query.publications();
        debug!(sql = %built.sql, params = ?built.params, "Listing publications");
        let publications = Self::query_rows(&conn, &built, |row| {
            Ok(PublicationRow {
                pid: row.get(0)?,
                title: row.get(1)?,
                journal: row.get(2)?,
                publication_date: row.get(3)?,
            })
        })?;

        if publications.is_empty() {
            return Ok(Vec::new());
        }

        let datasets = Self::query_rows(&conn, &query.datasets(), |row| {
            Ok(DatasetRow {
                did: row.get(0)?,
                pid: row.get(1)?,
                url: row.get(2)?,
                sid: row.get(3)?,
                species_name: row.get(4)?,
            })
        })?;

        let links = Self::query_rows(&conn, &query.dataset_regions(), |row| {
            Ok(RegionLinkRow {
                did: row.get(0)?,
                rid: row.get(1)?,
                brain_region_name: row.get(2)?,
            })
        })?;

        assemble_publications(publications, datasets, links)
    }

    fn ensure_exists(
        conn: &duckdb::Connection,
        sql: &str,
        id: i64,
        what: &str,
    ) -> CatalogResult<()> {
        if Self::count_rows(conn, sql, duckdb::params![id])? == 0 {
            return Err(CatalogError::Reference(format!(
                "{} {} does not exist",
                what, id
            )));
        }
        Ok(())
    }

    fn latest_load_locked(conn: &duckdb::Connection) -> CatalogResult<Option<LoadSummary>> {
        let built = BuiltQuery {
            sql: load_log_sql::SELECT_LATEST.to_string(),
            params: Vec::new(),
        };
        let rows = Self::query_rows(conn, &built, |row| {
            Ok(LoadSummary {
                id: row.get(0)?,
                started_at: row.get(1)?,
                completed_at: row.get(2)?,
                source: row.get(3)?,
                source_hash: row.get(4)?,
                publications_created: count(row.get(5)?),
                datasets_created: count(row.get(6)?),
                failure_count: count(row.get(7)?),
            })
        })?;
        Ok(rows.into_iter().next())
    }

    fn list_lookup(&self, kind: LookupKind) -> CatalogResult<Vec<(i64, String)>> {
        let conn = self.lock()?;
        let built = BuiltQuery {
            sql: lookup_sql::select_all_ordered(kind),
            params: Vec::new(),
        };
        Self::query_rows(&conn, &built, |row| Ok((row.get(0)?, row.get(1)?)))
    }
}

/// Unique-constraint failures surface as constraint errors in DuckDB
fn is_constraint_violation(error: &duckdb::Error) -> bool {
    let message = error.to_string();
    message.contains("Constraint Error") || message.contains("Duplicate key")
}

#[async_trait(?Send)]
impl CatalogBackend for DuckDBBackend {
    async fn initialize(&self) -> CatalogResult<()> {
        let conn = self.lock()?;

        conn.execute_batch(CatalogSchema::create_tables_sql())
            .map_err(|e| CatalogError::MigrationFailed(format!("Failed to create tables: {}", e)))?;

        conn.execute_batch(CatalogSchema::create_indexes_sql())
            .map_err(|e| {
                CatalogError::MigrationFailed(format!("Failed to create indexes: {}", e))
            })?;

        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?) ON CONFLICT (version) DO NOTHING",
            [SCHEMA_VERSION],
        )
        .map_err(|e| {
            CatalogError::MigrationFailed(format!("Failed to record schema version: {}", e))
        })?;

        Ok(())
    }

    async fn reset(&self) -> CatalogResult<()> {
        {
            let conn = self.lock()?;
            conn.execute_batch(CatalogSchema::drop_all_tables_sql())
                .map_err(|e| {
                    CatalogError::MigrationFailed(format!("Failed to drop tables: {}", e))
                })?;
        }
        info!("Dropped all catalog tables");
        self.initialize().await
    }

    async fn find_or_create_lookup(
        &self,
        kind: LookupKind,
        name: &str,
    ) -> CatalogResult<LookupEntry> {
        let name = validate_lookup_name(kind.field(), name, kind.max_name_length())?;
        let conn = self.lock()?;

        let insert = lookup_sql::insert_ignore(kind, "?");
        let select = BuiltQuery {
            sql: lookup_sql::select_by_name(kind, "?"),
            params: Vec::new(),
        };

        for attempt in 1..=MAX_LOOKUP_ATTEMPTS {
            let inserted = match conn.execute(&insert, duckdb::params![name]) {
                Ok(n) => n,
                Err(e) if is_constraint_violation(&e) => 0,
                Err(e) => {
                    return Err(CatalogError::QueryFailed(format!(
                        "Failed to insert {} '{}': {}",
                        kind, name, e
                    )));
                }
            };

            let mut stmt = conn
                .prepare(&select.sql)
                .map_err(|e| CatalogError::QueryFailed(format!("Prepare failed: {}", e)))?;
            let ids = stmt
                .query_map(duckdb::params![name], |row| row.get::<_, i64>(0))
                .map_err(|e| CatalogError::QueryFailed(format!("Query failed: {}", e)))?
                .collect::<Result<Vec<i64>, _>>()
                .map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))?;

            if let Some(&id) = ids.first() {
                if inserted > 0 {
                    info!("Created {} '{}' ({})", kind, name, id);
                }
                return Ok(LookupEntry { kind, id, name });
            }

            warn!(attempt, "{} '{}' not visible after insert, retrying", kind, name);
        }

        Err(CatalogError::Conflict(format!(
            "Could not resolve {} '{}' after {} attempts",
            kind, name, MAX_LOOKUP_ATTEMPTS
        )))
    }

    async fn create_publication(&self, publication: &NewPublication) -> CatalogResult<i64> {
        let publication = publication.normalized()?;
        let conn = self.lock()?;

        let date = publication
            .publication_date
            .map(|d| d.format(PUBLICATION_DATE_FORMAT).to_string());

        let pid = conn
            .query_row(
                publication_sql::INSERT_DUCKDB,
                duckdb::params![publication.title, publication.journal, date],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| {
                CatalogError::QueryFailed(format!(
                    "Failed to insert publication '{}': {}",
                    publication.title, e
                ))
            })?;

        debug!(pid, "Created publication '{}'", publication.title);
        Ok(pid)
    }

    async fn create_dataset(&self, dataset: &NewDataset) -> CatalogResult<i64> {
        let dataset = dataset.normalized()?;
        let conn = self.lock()?;

        Self::ensure_exists(&conn, publication_sql::EXISTS_DUCKDB, dataset.pid, "publication")?;
        Self::ensure_exists(
            &conn,
            &lookup_sql::exists(LookupKind::Species, "?"),
            dataset.sid,
            "species",
        )?;
        let region_exists = lookup_sql::exists(LookupKind::Region, "?");
        for &rid in &dataset.region_ids {
            Self::ensure_exists(&conn, &region_exists, rid, "region")?;
        }

        let did = conn
            .query_row(
                dataset_sql::INSERT_DUCKDB,
                duckdb::params![dataset.url, dataset.pid, dataset.sid],
                |row| row.get::<_, i64>(0),
            )
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to insert dataset: {}", e)))?;

        for &rid in &dataset.region_ids {
            conn.execute(dataset_sql::LINK_REGION_DUCKDB, duckdb::params![did, rid])
                .map_err(|e| {
                    CatalogError::QueryFailed(format!(
                        "Failed to link dataset {} to region {}: {}",
                        did, rid, e
                    ))
                })?;
        }

        debug!(did, pid = dataset.pid, regions = dataset.region_ids.len(), "Created dataset");
        Ok(did)
    }

    async fn get_publication(&self, pid: i64) -> CatalogResult<Publication> {
        self.fetch_publications(&PublicationQuery::by_id(pid, ParamStyle::Positional))?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("publication {}", pid)))
    }

    async fn delete_publication(&self, pid: i64) -> CatalogResult<usize> {
        let conn = self.lock()?;

        if Self::count_rows(&conn, publication_sql::EXISTS_DUCKDB, duckdb::params![pid])? == 0 {
            return Err(CatalogError::NotFound(format!("publication {}", pid)));
        }

        // Each delete commits on its own: DuckDB checks foreign keys against
        // committed state, so children must be gone before the parent delete.
        conn.execute(publication_sql::DELETE_REGION_LINKS_DUCKDB, duckdb::params![pid])
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to unlink regions: {}", e)))?;

        let removed = conn
            .execute(publication_sql::DELETE_DATASETS_DUCKDB, duckdb::params![pid])
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to delete datasets: {}", e)))?;

        conn.execute(publication_sql::DELETE_DUCKDB, duckdb::params![pid])
            .map_err(|e| {
                CatalogError::QueryFailed(format!("Failed to delete publication: {}", e))
            })?;

        info!(pid, datasets = removed, "Deleted publication");
        Ok(removed)
    }

    async fn list_publications(
        &self,
        filter: &PublicationFilter,
    ) -> CatalogResult<Vec<Publication>> {
        self.fetch_publications(&PublicationQuery::build(filter, ParamStyle::Positional))
    }

    async fn list_species(&self) -> CatalogResult<Vec<Species>> {
        Ok(self
            .list_lookup(LookupKind::Species)?
            .into_iter()
            .map(|(sid, name)| Species::new(sid, name))
            .collect())
    }

    async fn list_regions(&self) -> CatalogResult<Vec<Region>> {
        Ok(self
            .list_lookup(LookupKind::Region)?
            .into_iter()
            .map(|(rid, name)| Region::new(rid, name))
            .collect())
    }

    async fn stats(&self) -> CatalogResult<CatalogStats> {
        let conn = self.lock()?;

        let schema_version = conn
            .query_row(CatalogSchema::check_schema_version_sql(), [], |row| {
                row.get::<_, Option<i32>>(0)
            })
            .map_err(|e| CatalogError::QueryFailed(format!("Schema version query failed: {}", e)))?;

        Ok(CatalogStats {
            publication_count: count(Self::count_rows(&conn, stats_sql::COUNT_PUBLICATIONS, [])?),
            dataset_count: count(Self::count_rows(&conn, stats_sql::COUNT_DATASETS, [])?),
            species_count: count(Self::count_rows(&conn, stats_sql::COUNT_SPECIES, [])?),
            region_count: count(Self::count_rows(&conn, stats_sql::COUNT_REGIONS, [])?),
            region_link_count: count(Self::count_rows(&conn, stats_sql::COUNT_REGION_LINKS, [])?),
            schema_version,
            last_load: Self::latest_load_locked(&conn)?,
        })
    }

    async fn record_load(&self, report: &LoadReport) -> CatalogResult<i64> {
        let failures = serde_json::to_string(&report.failures).map_err(|e| {
            CatalogError::SerializationError(format!("Failed to encode load failures: {}", e))
        })?;

        let conn = self.lock()?;
        conn.query_row(
            load_log_sql::INSERT_DUCKDB,
            duckdb::params![
                report.started_at.to_rfc3339(),
                report.completed_at.to_rfc3339(),
                report.source,
                report.source_hash,
                report.publications_created as i64,
                report.datasets_created as i64,
                report.species_created as i64,
                report.regions_created as i64,
                report.failures.len() as i64,
                failures,
            ],
            |row| row.get::<_, i64>(0),
        )
        .map_err(|e| CatalogError::QueryFailed(format!("Failed to record load: {}", e)))
    }

    async fn latest_load(&self) -> CatalogResult<Option<LoadSummary>> {
        let conn = self.lock()?;
        Self::latest_load_locked(&conn)
    }

    async fn health_check(&self) -> CatalogResult<bool> {
        let conn = self.lock()?;
        let healthy = conn
            .query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
            .map_err(|e| CatalogError::QueryFailed(format!("Health check failed: {}", e)))?;
        Ok(healthy == 1)
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> CatalogResult<()> {
        // DuckDB connection is closed when dropped
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn backend() -> DuckDBBackend {
        let backend = DuckDBBackend::in_memory().unwrap();
        backend.initialize().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_in_memory_database() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert!(backend.is_in_memory());
        assert!(backend.db_path().is_none());
    }

    #[tokio::test]
    async fn test_initialize_is_idempotent() {
        let backend = backend().await;
        backend.initialize().await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.schema_version, Some(SCHEMA_VERSION));
        assert_eq!(stats.publication_count, 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let backend = DuckDBBackend::in_memory().unwrap();
        assert!(backend.health_check().await.unwrap());
        assert_eq!(backend.backend_type(), "duckdb");
    }

    #[tokio::test]
    async fn test_find_or_create_lookup_returns_existing_row() {
        let backend = backend().await;

        let first = backend.find_or_create_species("Mus musculus").await.unwrap();
        let second = backend.find_or_create_species("  Mus musculus ").await.unwrap();
        assert_eq!(first, second);

        let species = backend.list_species().await.unwrap();
        assert_eq!(species, vec![first]);
    }

    #[tokio::test]
    async fn test_lookup_kinds_are_separate_tables() {
        let backend = backend().await;

        let species = backend.find_or_create_species("Hydra").await.unwrap();
        let region = backend.find_or_create_region("Hydra").await.unwrap();
        assert_eq!(species.species_name, region.brain_region_name);
        assert_eq!(backend.list_species().await.unwrap().len(), 1);
        assert_eq!(backend.list_regions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_or_create_rejects_blank_name() {
        let backend = backend().await;
        let err = backend.find_or_create_region("   ").await.unwrap_err();
        assert!(err.is_validation());
        assert!(backend.list_regions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_publication_and_get() {
        let backend = backend().await;

        let new = NewPublication::new("Theta sequences")
            .with_journal("Neuron")
            .with_date(NaiveDate::from_ymd_opt(2012, 6, 21).unwrap());
        let pid = backend.create_publication(&new).await.unwrap();

        let loaded = backend.get_publication(pid).await.unwrap();
        assert_eq!(loaded.title, "Theta sequences");
        assert_eq!(loaded.journal.as_deref(), Some("Neuron"));
        assert_eq!(loaded.publication_date, NaiveDate::from_ymd_opt(2012, 6, 21));
        assert!(loaded.datasets.is_empty());
    }

    #[tokio::test]
    async fn test_create_publication_empty_title() {
        let backend = backend().await;
        let err = backend
            .create_publication(&NewPublication::new(""))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
        assert_eq!(backend.stats().await.unwrap().publication_count, 0);
    }

    #[tokio::test]
    async fn test_create_dataset_reference_errors() {
        let backend = backend().await;
        let pid = backend
            .create_publication(&NewPublication::new("Orphan check"))
            .await
            .unwrap();
        let species = backend.find_or_create_species("Danio rerio").await.unwrap();

        let missing_pub = backend
            .create_dataset(&NewDataset::new(pid + 100, species.sid))
            .await
            .unwrap_err();
        assert!(matches!(missing_pub, CatalogError::Reference(_)));

        let missing_species = backend
            .create_dataset(&NewDataset::new(pid, species.sid + 100))
            .await
            .unwrap_err();
        assert!(matches!(missing_species, CatalogError::Reference(_)));

        let missing_region = backend
            .create_dataset(&NewDataset::new(pid, species.sid).with_regions([42]))
            .await
            .unwrap_err();
        assert!(matches!(missing_region, CatalogError::Reference(_)));

        assert_eq!(backend.stats().await.unwrap().dataset_count, 0);
    }

    #[tokio::test]
    async fn test_get_publication_not_found() {
        let backend = backend().await;
        let err = backend.get_publication(99).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let backend = backend().await;
        backend
            .create_publication(&NewPublication::new("Before reset"))
            .await
            .unwrap();
        backend.find_or_create_species("Mus musculus").await.unwrap();

        backend.reset().await.unwrap();

        let stats = backend.stats().await.unwrap();
        assert_eq!(stats.publication_count, 0);
        assert_eq!(stats.species_count, 0);
        assert_eq!(stats.schema_version, Some(SCHEMA_VERSION));

        // Identities restart with the sequences
        let pid = backend
            .create_publication(&NewPublication::new("After reset"))
            .await
            .unwrap();
        assert_eq!(pid, 1);
    }

    #[tokio::test]
    async fn test_file_backed_catalog_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.duckdb");

        {
            let backend = DuckDBBackend::new(&path).unwrap();
            backend.initialize().await.unwrap();
            backend
                .create_publication(&NewPublication::new("Persisted"))
                .await
                .unwrap();
        }

        let reopened = DuckDBBackend::new(&path).unwrap();
        assert_eq!(reopened.db_path(), Some(path.as_path()));
        let publications = reopened
            .list_publications(&PublicationFilter::all())
            .await
            .unwrap();
        assert_eq!(publications.len(), 1);
        assert_eq!(publications[0].title, "Persisted");
    }
}

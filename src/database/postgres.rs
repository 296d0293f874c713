//! PostgreSQL database backend implementation
//!
//! Provides a PostgreSQL backend for server deployments where several
//! writers share one catalog. Uses connection pooling via deadpool-postgres.
//!
//! Multi-statement writes (a dataset with its region links, a publication
//! delete with its datasets) run inside a transaction. Lookup inserts rely
//! on the unique name constraint plus `ON CONFLICT DO NOTHING`, so concurrent
//! loaders converge on one row per name.

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
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

/// Default number of pooled connections
pub const DEFAULT_POOL_SIZE: usize = 5;

/// PostgreSQL database backend
pub struct PostgresBackend {
    connection_string: String,
    pool: Pool,
}

impl PostgresBackend {
    /// Connect with the default pool size
    pub async fn new(connection_string: &str) -> CatalogResult<Self> {
        Self::with_pool_size(connection_string, DEFAULT_POOL_SIZE).await
    }

    /// Connect with an explicit pool size.
    ///
    /// One connection is checked out immediately so that a bad connection
    /// string fails here rather than on first use.
    pub async fn with_pool_size(connection_string: &str, pool_size: usize) -> CatalogResult<Self> {
        let mut config = Config::new();
        config.url = Some(connection_string.to_string());
        config.pool = Some(PoolConfig::new(pool_size.max(1)));

        let pool = config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| {
                CatalogError::ConnectionFailed(format!("Failed to create connection pool: {}", e))
            })?;

        let backend = Self {
            connection_string: connection_string.to_string(),
            pool,
        };
        backend.client().await?;

        info!(
            "Connected to PostgreSQL at {}",
            backend.connection_string_masked()
        );
        Ok(backend)
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        mask_connection_string(&self.connection_string)
    }

    async fn client(&self) -> CatalogResult<deadpool_postgres::Client> {
        self.pool.get().await.map_err(|e| {
            CatalogError::ConnectionFailed(format!("Failed to get PostgreSQL connection: {}", e))
        })
    }

    async fn count_rows(
        client: &tokio_postgres::Client,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> CatalogResult<i64> {
        let row = client
            .query_one(sql, params)
            .await
            .map_err(|e| CatalogError::QueryFailed(format!("Count failed: {}", e)))?;
        row.try_get::<_, i64>(0)
            .map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))
    }

    async fn query_rows<T, F>(
        client: &tokio_postgres::Client,
        built: &BuiltQuery,
        map: F,
    ) -> CatalogResult<Vec<T>>
    where
        F: Fn(&Row) -> Result<T, tokio_postgres::Error>,
    {
        let params: Vec<&(dyn ToSql + Sync)> = built
            .params
            .iter()
            .map(|p| p as &(dyn ToSql + Sync))
            .collect();

        let rows = client
            .query(built.sql.as_str(), &params)
            .await
            .map_err(|e| CatalogError::QueryFailed(format!("Query failed: {}", e)))?;

        rows.iter()
            .map(map)
            .collect::<Result<Vec<T>, _>>()
            .map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))
    }

    async fn fetch_publications(&self, query: &PublicationQuery) -> CatalogResult<Vec<Publication>> {
        let client = self.client().await?;

        let built = query.publications();
        debug!(sql = %built.sql, params = ?built.params, "Listing publications");
        let publications = Self::query_rows(&client, &built, |row| {
            Ok(PublicationRow {
                pid: row.try_get(0)?,
                title: row.try_get(1)?,
                journal: row.try_get(2)?,
                publication_date: row.try_get(3)?,
            })
        })
        .await?;

        if publications.is_empty() {
            return Ok(Vec::new());
        }

        let datasets = Self::query_rows(&client, &query.datasets(), |row| {
            Ok(DatasetRow {
                did: row.try_get(0)?,
                pid: row.try_get(1)?,
                url: row.try_get(2)?,
                sid: row.try_get(3)?,
                species_name: row.try_get(4)?,
            })
        })
        .await?;

        let links = Self::query_rows(&client, &query.dataset_regions(), |row| {
            Ok(RegionLinkRow {
                did: row.try_get(0)?,
                rid: row.try_get(1)?,
                brain_region_name: row.try_get(2)?,
            })
        })
        .await?;

        assemble_publications(publications, datasets, links)
    }

    async fn list_lookup(&self, kind: LookupKind) -> CatalogResult<Vec<(i64, String)>> {
        let client = self.client().await?;
        let built = BuiltQuery {
            sql: lookup_sql::select_all_ordered(kind),
            params: Vec::new(),
        };
        Self::query_rows(&client, &built, |row| Ok((row.try_get(0)?, row.try_get(1)?))).await
    }

    async fn latest_load_from(client: &tokio_postgres::Client) -> CatalogResult<Option<LoadSummary>> {
        let built = BuiltQuery {
            sql: load_log_sql::SELECT_LATEST.to_string(),
            params: Vec::new(),
        };
        let rows = Self::query_rows(client, &built, |row| {
            Ok(LoadSummary {
                id: row.try_get(0)?,
                started_at: row.try_get(1)?,
                completed_at: row.try_get(2)?,
                source: row.try_get(3)?,
                source_hash: row.try_get(4)?,
                publications_created: count(row.try_get(5)?),
                datasets_created: count(row.try_get(6)?),
                failure_count: count(row.try_get(7)?),
            })
        })
        .await?;
        Ok(rows.into_iter().next())
    }
}

/// Replace the password in a connection URL with `****`
pub fn mask_connection_string(connection_string: &str) -> String {
    if let Some(at_pos) = connection_string.find('@')
        && let Some(colon_pos) = connection_string[..at_pos].rfind(':')
        && connection_string[..colon_pos].contains("//")
    {
        let prefix = &connection_string[..colon_pos + 1];
        let suffix = &connection_string[at_pos..];
        return format!("{}****{}", prefix, suffix);
    }
    connection_string.to_string()
}

/// Map a write error, turning foreign key violations into reference errors
fn write_error(context: &str, e: tokio_postgres::Error) -> CatalogError {
    if e.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
        CatalogError::Reference(format!("{}: {}", context, e))
    } else {
        CatalogError::QueryFailed(format!("{}: {}", context, e))
    }
}

async fn ensure_exists(
    tx: &tokio_postgres::Transaction<'_>,
    sql: &str,
    id: i64,
    what: &str,
) -> CatalogResult<()> {
    let row = tx
        .query_one(sql, &[&id])
        .await
        .map_err(|e| CatalogError::QueryFailed(format!("Count failed: {}", e)))?;
    let found: i64 = row
        .try_get(0)
        .map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))?;
    if found == 0 {
        return Err(CatalogError::Reference(format!(
            "{} {} does not exist",
            what, id
        )));
    }
    Ok(())
}

#[async_trait(?Send)]
impl CatalogBackend for PostgresBackend {
    async fn initialize(&self) -> CatalogResult<()> {
        let client = self.client().await?;

        client
            .batch_execute(CatalogSchema::create_tables_sql())
            .await
            .map_err(|e| {
                CatalogError::MigrationFailed(format!("Failed to create tables: {}", e))
            })?;

        client
            .batch_execute(CatalogSchema::create_indexes_sql())
            .await
            .map_err(|e| {
                CatalogError::MigrationFailed(format!("Failed to create indexes: {}", e))
            })?;

        client
            .execute(
                "INSERT INTO schema_version (version) VALUES ($1) ON CONFLICT (version) DO NOTHING",
                &[&SCHEMA_VERSION],
            )
            .await
            .map_err(|e| {
                CatalogError::MigrationFailed(format!("Failed to record schema version: {}", e))
            })?;

        Ok(())
    }

    async fn reset(&self) -> CatalogResult<()> {
        {
            let client = self.client().await?;
            client
                .batch_execute(CatalogSchema::drop_all_tables_sql())
                .await
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
        let client = self.client().await?;

        let insert = format!(
            "{} RETURNING {}",
            lookup_sql::insert_ignore(kind, "$1"),
            kind.id_column()
        );
        let select = lookup_sql::select_by_name(kind, "$1");

        for attempt in 1..=MAX_LOOKUP_ATTEMPTS {
            match client.query(insert.as_str(), &[&name]).await {
                Ok(rows) => {
                    if let Some(row) = rows.first() {
                        let id: i64 = row.try_get(0).map_err(|e| {
                            CatalogError::QueryFailed(format!("Row fetch error: {}", e))
                        })?;
                        info!("Created {} '{}' ({})", kind, name, id);
                        return Ok(LookupEntry { kind, id, name });
                    }
                }
                Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {}
                Err(e) => {
                    return Err(CatalogError::QueryFailed(format!(
                        "Failed to insert {} '{}': {}",
                        kind, name, e
                    )));
                }
            }

            // Another writer holds the name; read its row
            let rows = client
                .query(select.as_str(), &[&name])
                .await
                .map_err(|e| CatalogError::QueryFailed(format!("Query failed: {}", e)))?;
            if let Some(row) = rows.first() {
                let id: i64 = row
                    .try_get(0)
                    .map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))?;
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
        let client = self.client().await?;

        let date = publication
            .publication_date
            .map(|d| d.format(PUBLICATION_DATE_FORMAT).to_string());

        let row = client
            .query_one(
                publication_sql::INSERT_POSTGRES,
                &[&publication.title, &publication.journal, &date],
            )
            .await
            .map_err(|e| {
                CatalogError::QueryFailed(format!(
                    "Failed to insert publication '{}': {}",
                    publication.title, e
                ))
            })?;

        let pid: i64 = row
            .try_get(0)
            .map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))?;
        debug!(pid, "Created publication '{}'", publication.title);
        Ok(pid)
    }

    async fn create_dataset(&self, dataset: &NewDataset) -> CatalogResult<i64> {
        let dataset = dataset.normalized()?;
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to begin transaction: {}", e)))?;

        ensure_exists(&tx, publication_sql::EXISTS_POSTGRES, dataset.pid, "publication").await?;
        ensure_exists(
            &tx,
            &lookup_sql::exists(LookupKind::Species, "$1"),
            dataset.sid,
            "species",
        )
        .await?;
        let region_exists = lookup_sql::exists(LookupKind::Region, "$1");
        for &rid in &dataset.region_ids {
            ensure_exists(&tx, &region_exists, rid, "region").await?;
        }

        let row = tx
            .query_one(
                dataset_sql::INSERT_POSTGRES,
                &[&dataset.url, &dataset.pid, &dataset.sid],
            )
            .await
            .map_err(|e| write_error("Failed to insert dataset", e))?;
        let did: i64 = row
            .try_get(0)
            .map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))?;

        for rid in &dataset.region_ids {
            tx.execute(dataset_sql::LINK_REGION_POSTGRES, &[&did, rid])
                .await
                .map_err(|e| {
                    write_error(&format!("Failed to link dataset {} to region {}", did, rid), e)
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| write_error("Failed to commit dataset", e))?;

        debug!(did, pid = dataset.pid, regions = dataset.region_ids.len(), "Created dataset");
        Ok(did)
    }

    async fn get_publication(&self, pid: i64) -> CatalogResult<Publication> {
        self.fetch_publications(&PublicationQuery::by_id(pid, ParamStyle::Numbered))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CatalogError::NotFound(format!("publication {}", pid)))
    }

    async fn delete_publication(&self, pid: i64) -> CatalogResult<usize> {
        let mut client = self.client().await?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to begin transaction: {}", e)))?;

        match ensure_exists(&tx, publication_sql::EXISTS_POSTGRES, pid, "publication").await {
            Ok(()) => {}
            Err(CatalogError::Reference(_)) => {
                return Err(CatalogError::NotFound(format!("publication {}", pid)));
            }
            Err(e) => return Err(e),
        }

        tx.execute(publication_sql::DELETE_REGION_LINKS_POSTGRES, &[&pid])
            .await
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to unlink regions: {}", e)))?;

        let removed = tx
            .execute(publication_sql::DELETE_DATASETS_POSTGRES, &[&pid])
            .await
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to delete datasets: {}", e)))?;

        tx.execute(publication_sql::DELETE_POSTGRES, &[&pid])
            .await
            .map_err(|e| {
                CatalogError::QueryFailed(format!("Failed to delete publication: {}", e))
            })?;

        tx.commit()
            .await
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to commit delete: {}", e)))?;

        info!(pid, datasets = removed, "Deleted publication");
        Ok(removed as usize)
    }

    async fn list_publications(
        &self,
        filter: &PublicationFilter,
    ) -> CatalogResult<Vec<Publication>> {
        self.fetch_publications(&PublicationQuery::build(filter, ParamStyle::Numbered))
            .await
    }

    async fn list_species(&self) -> CatalogResult<Vec<Species>> {
        Ok(self
            .list_lookup(LookupKind::Species)
            .await?
            .into_iter()
            .map(|(sid, name)| Species::new(sid, name))
            .collect())
    }

    async fn list_regions(&self) -> CatalogResult<Vec<Region>> {
        Ok(self
            .list_lookup(LookupKind::Region)
            .await?
            .into_iter()
            .map(|(rid, name)| Region::new(rid, name))
            .collect())
    }

    async fn stats(&self) -> CatalogResult<CatalogStats> {
        let client = self.client().await?;

        let schema_version: Option<i32> = client
            .query_one(CatalogSchema::check_schema_version_sql(), &[])
            .await
            .and_then(|row| row.try_get(0))
            .map_err(|e| CatalogError::QueryFailed(format!("Schema version query failed: {}", e)))?;

        Ok(CatalogStats {
            publication_count: count(
                Self::count_rows(&client, stats_sql::COUNT_PUBLICATIONS, &[]).await?,
            ),
            dataset_count: count(Self::count_rows(&client, stats_sql::COUNT_DATASETS, &[]).await?),
            species_count: count(Self::count_rows(&client, stats_sql::COUNT_SPECIES, &[]).await?),
            region_count: count(Self::count_rows(&client, stats_sql::COUNT_REGIONS, &[]).await?),
            region_link_count: count(
                Self::count_rows(&client, stats_sql::COUNT_REGION_LINKS, &[]).await?,
            ),
            schema_version,
            last_load: Self::latest_load_from(&client).await?,
        })
    }

    async fn record_load(&self, report: &LoadReport) -> CatalogResult<i64> {
        let failures = serde_json::to_string(&report.failures).map_err(|e| {
            CatalogError::SerializationError(format!("Failed to encode load failures: {}", e))
        })?;

        let client = self.client().await?;
        let row = client
            .query_one(
                load_log_sql::INSERT_POSTGRES,
                &[
                    &report.started_at.to_rfc3339(),
                    &report.completed_at.to_rfc3339(),
                    &report.source,
                    &report.source_hash,
                    &(report.publications_created as i64),
                    &(report.datasets_created as i64),
                    &(report.species_created as i64),
                    &(report.regions_created as i64),
                    &(report.failures.len() as i64),
                    &failures,
                ],
            )
            .await
            .map_err(|e| CatalogError::QueryFailed(format!("Failed to record load: {}", e)))?;

        row.try_get(0)
            .map_err(|e| CatalogError::QueryFailed(format!("Row fetch error: {}", e)))
    }

    async fn latest_load(&self) -> CatalogResult<Option<LoadSummary>> {
        let client = self.client().await?;
        Self::latest_load_from(&client).await
    }

    async fn health_check(&self) -> CatalogResult<bool> {
        let client = self.client().await?;
        let healthy: i32 = client
            .query_one("SELECT 1", &[])
            .await
            .and_then(|row| row.try_get(0))
            .map_err(|e| CatalogError::QueryFailed(format!("Health check failed: {}", e)))?;
        Ok(healthy == 1)
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> CatalogResult<()> {
        self.pool.close();
        Ok(())
    }
}

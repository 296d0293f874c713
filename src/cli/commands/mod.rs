//! CLI command implementations

pub mod db;
pub mod seed;
pub mod studies;

use std::path::Path;

use crate::cli::error::CliError;
use crate::database::config::BackendKind;
use crate::database::{CatalogBackend, CatalogConfig, DuckDBBackend};

/// Create the runtime a handler drives the store on
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}

/// Load the configuration of an initialized catalog directory
pub(crate) fn load_initialized(dir: &Path) -> Result<CatalogConfig, CliError> {
    if !CatalogConfig::is_initialized(dir) {
        return Err(CliError::NotInitialized(dir.to_path_buf()));
    }
    Ok(CatalogConfig::load(dir)?)
}

/// Open the backend named by a configuration
pub(crate) async fn open_backend(
    config: &CatalogConfig,
    dir: &Path,
) -> Result<Box<dyn CatalogBackend>, CliError> {
    match config.database.backend {
        BackendKind::DuckDB => {
            let db_path = config.get_duckdb_path(dir);
            Ok(Box::new(DuckDBBackend::new(&db_path)?))
        }
        BackendKind::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                use crate::database::PostgresBackend;

                let conn_str = config.get_postgres_connection_string().ok_or_else(|| {
                    CliError::InvalidArgument(
                        "PostgreSQL connection string not configured".to_string(),
                    )
                })?;

                Ok(Box::new(
                    PostgresBackend::with_pool_size(conn_str, config.postgres.pool_size).await?,
                ))
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                Err(CliError::InvalidArgument(
                    "PostgreSQL backend not enabled. Build with --features cli-full".to_string(),
                ))
            }
        }
    }
}

//! Catalog database CLI commands
//!
//! - `db init`: write `.catalog.toml` and create the schema
//! - `db status`: show backend, row counts and the last load
//! - `db reset`: drop and recreate every table

use std::path::PathBuf;

use super::{load_initialized, open_backend, runtime};
use crate::cli::error::CliError;
use crate::database::CatalogConfig;
use crate::database::config::{BackendKind, CONFIG_FILENAME, sample_config};

/// Arguments for `db init`
#[derive(Debug, Clone)]
pub struct DbInitArgs {
    /// Catalog directory
    pub dir: PathBuf,
    /// Backend name ("duckdb" or "postgres")
    pub backend: String,
    pub connection_string: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DbStatusArgs {
    pub dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DbResetArgs {
    pub dir: PathBuf,
}

pub fn handle_db_init(args: &DbInitArgs) -> Result<(), CliError> {
    let backend: BackendKind = args
        .backend
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let config = match backend {
        BackendKind::DuckDB => CatalogConfig::default(),
        BackendKind::Postgres => {
            let conn_str = args.connection_string.as_deref().ok_or_else(|| {
                CliError::InvalidArgument(
                    "--connection-string is required for the postgres backend".to_string(),
                )
            })?;
            CatalogConfig::postgres(conn_str)
        }
    };

    std::fs::create_dir_all(&args.dir)
        .map_err(|e| CliError::IoError(format!("Failed to create {}: {}", args.dir.display(), e)))?;

    if CatalogConfig::exists(&args.dir) {
        eprintln!(
            "Overwriting existing {} in {}",
            CONFIG_FILENAME,
            args.dir.display()
        );
    }

    let rt = runtime()?;
    rt.block_on(async {
        let store = open_backend(&config, &args.dir).await?;
        store.initialize().await?;
        store.close().await?;
        Ok::<_, CliError>(())
    })?;

    // Only a catalog whose schema exists gets a config file
    match config.database.backend {
        BackendKind::DuckDB => {
            let path = args.dir.join(CONFIG_FILENAME);
            std::fs::write(&path, sample_config()).map_err(|e| {
                CliError::IoError(format!("Failed to write {}: {}", path.display(), e))
            })?;
        }
        BackendKind::Postgres => config.save(&args.dir)?,
    }

    println!(
        "Initialized {} catalog in {}",
        config.database.backend,
        args.dir.display()
    );
    if config.database.backend == BackendKind::DuckDB {
        println!("Database: {}", config.get_duckdb_path(&args.dir).display());
    }

    Ok(())
}

pub fn handle_db_status(args: &DbStatusArgs) -> Result<(), CliError> {
    let config = load_initialized(&args.dir)?;

    let rt = runtime()?;
    let stats = rt.block_on(async {
        let store = open_backend(&config, &args.dir).await?;
        if !store.health_check().await? {
            return Err(CliError::IoError("Database health check failed".to_string()));
        }
        let stats = store.stats().await?;
        store.close().await?;
        Ok(stats)
    })?;

    println!("Backend:         {}", config.database.backend);
    match config.database.backend {
        BackendKind::DuckDB => {
            println!("Database:        {}", config.get_duckdb_path(&args.dir).display());
        }
        BackendKind::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                if let Some(conn_str) = config.get_postgres_connection_string() {
                    println!(
                        "Connection:      {}",
                        crate::database::postgres::mask_connection_string(conn_str)
                    );
                }
            }
        }
    }
    match stats.schema_version {
        Some(version) => println!("Schema version:  {}", version),
        None => println!("Schema version:  (none)"),
    }
    println!("Publications:    {}", stats.publication_count);
    println!("Datasets:        {}", stats.dataset_count);
    println!("Species:         {}", stats.species_count);
    println!("Regions:         {}", stats.region_count);
    println!("Region links:    {}", stats.region_link_count);

    if let Some(load) = stats.last_load {
        println!(
            "Last load:       {} ({} publications, {} datasets, {} failures)",
            load.completed_at, load.publications_created, load.datasets_created, load.failure_count
        );
        if let Some(source) = load.source {
            println!("Source:          {}", source);
        }
    }

    Ok(())
}

pub fn handle_db_reset(args: &DbResetArgs) -> Result<(), CliError> {
    let config = load_initialized(&args.dir)?;

    let rt = runtime()?;
    rt.block_on(async {
        let store = open_backend(&config, &args.dir).await?;
        store.reset().await?;
        store.close().await?;
        Ok::<_, CliError>(())
    })?;

    println!("Catalog reset");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_then_status() {
        let dir = tempdir().unwrap();
        let args = DbInitArgs {
            dir: dir.path().to_path_buf(),
            backend: "duckdb".to_string(),
            connection_string: None,
        };
        handle_db_init(&args).unwrap();
        let written = std::fs::read_to_string(dir.path().join(CONFIG_FILENAME)).unwrap();
        assert_eq!(written, sample_config());

        handle_db_status(&DbStatusArgs {
            dir: dir.path().to_path_buf(),
        })
        .unwrap();
        handle_db_reset(&DbResetArgs {
            dir: dir.path().to_path_buf(),
        })
        .unwrap();
    }

    #[test]
    fn test_status_requires_init() {
        let dir = tempdir().unwrap();
        let err = handle_db_status(&DbStatusArgs {
            dir: dir.path().to_path_buf(),
        })
        .unwrap_err();
        assert!(matches!(err, CliError::NotInitialized(_)));
    }

    #[test]
    fn test_init_postgres_requires_connection_string() {
        let dir = tempdir().unwrap();
        let err = handle_db_init(&DbInitArgs {
            dir: dir.path().to_path_buf(),
            backend: "postgres".to_string(),
            connection_string: None,
        })
        .unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
        assert!(!dir.path().join(CONFIG_FILENAME).exists());
    }

    #[test]
    fn test_failed_init_writes_no_config() {
        let dir = tempdir().unwrap();
        let err = handle_db_init(&DbInitArgs {
            dir: dir.path().to_path_buf(),
            backend: "postgres".to_string(),
            connection_string: Some("postgresql://catalog@127.0.0.1:1/catalog".to_string()),
        });
        assert!(err.is_err());
        assert!(!dir.path().join(CONFIG_FILENAME).exists());
        assert!(!CatalogConfig::exists(dir.path()));
    }
}

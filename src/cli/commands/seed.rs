//! `seed` command: load a JSON or YAML seed batch into the catalog

use std::path::PathBuf;

use super::{load_initialized, open_backend, runtime};
use crate::cli::error::CliError;
use crate::database::{FailurePolicy, IngestLoader};
use crate::import::SeedImporter;

#[derive(Debug, Clone)]
pub struct SeedArgs {
    /// Seed file (`.json`, `.yaml` or `.yml`)
    pub file: PathBuf,
    /// Catalog directory
    pub dir: PathBuf,
    /// Skip invalid records instead of aborting
    pub skip_invalid: bool,
    /// Keep existing rows instead of resetting first
    pub append: bool,
}

pub fn handle_seed(args: &SeedArgs) -> Result<(), CliError> {
    if !args.file.exists() {
        return Err(CliError::FileNotFound(args.file.clone()));
    }

    let config = load_initialized(&args.dir)?;
    let batch = SeedImporter::read_file(&args.file)
        .map_err(|e| CliError::FileReadError(args.file.clone(), format!("{:#}", e)))?;

    let policy = if args.skip_invalid {
        FailurePolicy::Skip
    } else {
        config.ingest.failure_policy
    };
    let reset = config.ingest.reset_before_load && !args.append;

    let rt = runtime()?;
    let report = rt.block_on(async {
        let store = open_backend(&config, &args.dir).await?;
        let report = IngestLoader::new(store.as_ref())
            .with_policy(policy)
            .with_reset(reset)
            .load_batch(&batch)
            .await?;
        store.close().await?;
        Ok::<_, CliError>(report)
    })?;

    println!(
        "Loaded {} publications and {} datasets from {} ({} new species, {} new regions) in {}ms",
        report.publications_created,
        report.datasets_created,
        args.file.display(),
        report.species_created,
        report.regions_created,
        report.duration_ms
    );

    if !report.failures.is_empty() {
        eprintln!("Skipped {} records:", report.failures.len());
        for failure in &report.failures {
            eprintln!(
                "  #{} '{}': {}",
                failure.index, failure.title, failure.message
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::db::{DbInitArgs, handle_db_init};
    use crate::database::CatalogError;
    use tempfile::tempdir;

    const SEED: &str = r#"[
        {"title": "Good", "datasets": [{"species": "Mus musculus", "regions": ["CA1"]}]},
        {"title": "  "}
    ]"#;

    fn init(dir: &std::path::Path) {
        handle_db_init(&DbInitArgs {
            dir: dir.to_path_buf(),
            backend: "duckdb".to_string(),
            connection_string: None,
        })
        .unwrap();
    }

    #[test]
    fn test_seed_missing_file() {
        let dir = tempdir().unwrap();
        let err = handle_seed(&SeedArgs {
            file: dir.path().join("missing.json"),
            dir: dir.path().to_path_buf(),
            skip_invalid: false,
            append: false,
        })
        .unwrap_err();
        assert!(matches!(err, CliError::FileNotFound(_)));
    }

    #[test]
    fn test_seed_abort_and_skip() {
        let dir = tempdir().unwrap();
        init(dir.path());
        let file = dir.path().join("seed.json");
        std::fs::write(&file, SEED).unwrap();

        let args = SeedArgs {
            file,
            dir: dir.path().to_path_buf(),
            skip_invalid: false,
            append: false,
        };
        let err = handle_seed(&args).unwrap_err();
        assert!(matches!(
            err,
            CliError::DatabaseError(CatalogError::RecordRejected { index: 1, .. })
        ));

        handle_seed(&SeedArgs {
            skip_invalid: true,
            ..args
        })
        .unwrap();
    }
}

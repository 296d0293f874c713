//! Seed batch ingestion
//!
//! Applies a batch of publication records to a catalog store. Species and
//! regions named by the records are resolved through the store's
//! find-or-create operations, so a batch never produces duplicate lookup rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

use super::{CatalogBackend, CatalogError, CatalogResult};
use crate::import::seed::ValidatedDataset;
use crate::import::{PublicationRecord, SeedBatch};
use crate::models::NewDataset;

/// What the loader does with a record that cannot be applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Stop at the first rejected record (default)
    #[default]
    Abort,
    /// Record the failure in the report and continue
    Skip,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(FailurePolicy::Abort),
            "skip" => Ok(FailurePolicy::Skip),
            _ => Err(format!(
                "Unknown failure policy: {}. Use 'abort' or 'skip'.",
                s
            )),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::Abort => write!(f, "abort"),
            FailurePolicy::Skip => write!(f, "skip"),
        }
    }
}

/// A record skipped under [`FailurePolicy::Skip`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFailure {
    /// Zero-based position of the record in the batch
    pub index: usize,
    pub title: String,
    pub message: String,
}

/// Result of a load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Seed file the batch came from, if any
    pub source: Option<String>,
    /// SHA256 of the seed file content
    pub source_hash: Option<String>,
    pub publications_created: usize,
    pub datasets_created: usize,
    pub species_created: usize,
    pub regions_created: usize,
    pub failures: Vec<RecordFailure>,
    /// Duration of the load in milliseconds
    pub duration_ms: u64,
}

impl LoadReport {
    pub fn new(source: Option<String>, source_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            completed_at: now,
            source,
            source_hash,
            publications_created: 0,
            datasets_created: 0,
            species_created: 0,
            regions_created: 0,
            failures: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Check if every record was applied
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Errors that reject a single record rather than the whole load
fn is_record_error(error: &CatalogError) -> bool {
    matches!(
        error,
        CatalogError::Validation(_) | CatalogError::Reference(_) | CatalogError::Conflict(_)
    )
}

/// Ingestion loader over a catalog backend
pub struct IngestLoader<'a, B: CatalogBackend + ?Sized> {
    backend: &'a B,
    policy: FailurePolicy,
    reset_before_load: bool,
}

impl<'a, B: CatalogBackend + ?Sized> IngestLoader<'a, B> {
    /// Create a loader with the abort policy that resets the store first
    pub fn new(backend: &'a B) -> Self {
        Self {
            backend,
            policy: FailurePolicy::default(),
            reset_before_load: true,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether to drop and recreate the schema before loading
    pub fn with_reset(mut self, reset_before_load: bool) -> Self {
        self.reset_before_load = reset_before_load;
        self
    }

    pub fn backend(&self) -> &B {
        self.backend
    }

    /// Load records that did not come from a file
    pub async fn load(&self, records: &[PublicationRecord]) -> CatalogResult<LoadReport> {
        self.run(records, LoadReport::new(None, None)).await
    }

    /// Load a parsed seed file, recording its path and hash in the load log
    pub async fn load_batch(&self, batch: &SeedBatch) -> CatalogResult<LoadReport> {
        let report = LoadReport::new(
            Some(batch.source.display().to_string()),
            Some(batch.source_hash.clone()),
        );
        self.run(&batch.records, report).await
    }

    async fn run(
        &self,
        records: &[PublicationRecord],
        mut report: LoadReport,
    ) -> CatalogResult<LoadReport> {
        let start = std::time::Instant::now();

        if self.reset_before_load {
            self.backend.reset().await?;
        } else {
            self.backend.initialize().await?;
        }

        let before = self.backend.stats().await?;

        for (index, record) in records.iter().enumerate() {
            let Err(error) = self.apply_record(record, &mut report).await else {
                continue;
            };

            if self.policy == FailurePolicy::Skip && is_record_error(&error) {
                warn!(index, "Skipping record '{}': {}", record.title, error);
                report.failures.push(RecordFailure {
                    index,
                    title: record.title.clone(),
                    message: error.to_string(),
                });
                continue;
            }

            warn!(index, "Aborting load at record '{}': {}", record.title, error);
            return Err(CatalogError::RecordRejected {
                index,
                source: Box::new(error),
            });
        }

        let after = self.backend.stats().await?;
        report.species_created = after.species_count.saturating_sub(before.species_count);
        report.regions_created = after.region_count.saturating_sub(before.region_count);
        report.completed_at = Utc::now();
        report.duration_ms = start.elapsed().as_millis() as u64;

        let load_id = self.backend.record_load(&report).await?;

        info!(
            load_id,
            publications = report.publications_created,
            datasets = report.datasets_created,
            species = report.species_created,
            regions = report.regions_created,
            failures = report.failures.len(),
            duration_ms = report.duration_ms,
            "Load complete"
        );

        Ok(report)
    }

    async fn apply_record(
        &self,
        record: &PublicationRecord,
        report: &mut LoadReport,
    ) -> CatalogResult<()> {
        // Nothing is written for a record unless all of it validates
        let validated = record.validate()?;

        let pid = self
            .backend
            .create_publication(&validated.publication)
            .await?;

        let mut datasets_created = 0;
        for dataset in &validated.datasets {
            if let Err(error) = self.apply_dataset(pid, dataset).await {
                // Lookup rows resolved before the failure are kept
                if let Err(cleanup) = self.backend.delete_publication(pid).await {
                    warn!(pid, "Failed to remove partial publication: {}", cleanup);
                }
                return Err(error);
            }
            datasets_created += 1;
        }

        report.publications_created += 1;
        report.datasets_created += datasets_created;
        debug!(
            pid,
            datasets = datasets_created,
            "Loaded '{}'",
            validated.publication.title
        );
        Ok(())
    }

    async fn apply_dataset(&self, pid: i64, dataset: &ValidatedDataset) -> CatalogResult<i64> {
        let species = self.backend.find_or_create_species(&dataset.species).await?;

        let mut region_ids = BTreeSet::new();
        for name in &dataset.regions {
            region_ids.insert(self.backend.find_or_create_region(name).await?.rid);
        }

        self.backend
            .create_dataset(&NewDataset {
                pid,
                sid: species.sid,
                url: dataset.url.clone(),
                region_ids,
            })
            .await
    }
}

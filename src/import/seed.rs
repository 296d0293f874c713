//! Seed batch parser
//!
//! A seed batch is an ordered list of publication records, each optionally
//! carrying nested dataset records:
//!
//! ```json
//! [
//!   {
//!     "title": "Grid cells in medial entorhinal cortex",
//!     "journal": "Nature",
//!     "publication_date": "2005-08-11",
//!     "datasets": [
//!       { "url": "https://example.org/ds/1", "species": "Rattus norvegicus", "regions": ["MEC"] }
//!     ]
//!   }
//! ]
//! ```
//!
//! Required fields are defaulted during parsing so that a record missing its
//! title is rejected by validation (and reported by index) instead of failing
//! the whole document.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

use super::ImportError;
use crate::models::{LookupKind, NewPublication};
use crate::validation::input::{
    ValidationResult, normalize_optional, parse_publication_date, validate_lookup_name,
    validate_url,
};

/// A publication record as supplied by the producer of a seed batch
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PublicationRecord {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    /// ISO `YYYY-MM-DD`
    #[serde(
        default,
        alias = "publicationDate",
        skip_serializing_if = "Option::is_none"
    )]
    pub publication_date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datasets: Vec<DatasetRecord>,
}

/// A dataset nested in a publication record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Species name, resolved through the species lookup table
    #[serde(default)]
    pub species: String,
    /// Region names, resolved through the region lookup table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
}

/// A publication record whose fields have all been checked
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub publication: NewPublication,
    pub datasets: Vec<ValidatedDataset>,
}

/// A dataset record with trimmed, validated names
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedDataset {
    pub url: Option<String>,
    pub species: String,
    /// Region names with duplicates removed, in input order
    pub regions: Vec<String>,
}

impl PublicationRecord {
    /// Check every field of the record, including nested datasets.
    ///
    /// Nothing is written for a record unless this succeeds.
    pub fn validate(&self) -> ValidationResult<ValidatedRecord> {
        let publication_date = match normalize_optional(self.publication_date.as_deref()) {
            Some(date) => Some(parse_publication_date(&date)?),
            None => None,
        };

        let publication = NewPublication {
            title: self.title.clone(),
            journal: self.journal.clone(),
            publication_date,
        }
        .normalized()?;

        let datasets = self
            .datasets
            .iter()
            .map(DatasetRecord::validate)
            .collect::<ValidationResult<Vec<_>>>()?;

        Ok(ValidatedRecord {
            publication,
            datasets,
        })
    }
}

impl DatasetRecord {
    pub fn validate(&self) -> ValidationResult<ValidatedDataset> {
        let species = validate_lookup_name(
            LookupKind::Species.field(),
            &self.species,
            LookupKind::Species.max_name_length(),
        )?;

        let url = normalize_optional(self.url.as_deref());
        if let Some(url) = url.as_deref() {
            validate_url(url)?;
        }

        let mut regions: Vec<String> = Vec::with_capacity(self.regions.len());
        for name in &self.regions {
            let name = validate_lookup_name(
                LookupKind::Region.field(),
                name,
                LookupKind::Region.max_name_length(),
            )?;
            if !regions.contains(&name) {
                regions.push(name);
            }
        }

        Ok(ValidatedDataset {
            url,
            species,
            regions,
        })
    }
}

/// Serialization format of a seed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedFormat {
    Json,
    Yaml,
}

impl SeedFormat {
    /// Infer the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("json") => Ok(SeedFormat::Json),
            Some("yaml") | Some("yml") => Ok(SeedFormat::Yaml),
            _ => Err(ImportError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// A parsed seed batch with the identity of its source
#[derive(Debug, Clone)]
pub struct SeedBatch {
    pub records: Vec<PublicationRecord>,
    pub source: PathBuf,
    /// SHA256 of the raw file content
    pub source_hash: String,
}

/// Parser for seed batches
pub struct SeedImporter;

impl SeedImporter {
    /// Parse a seed batch from a string
    pub fn parse(content: &str, format: SeedFormat) -> Result<Vec<PublicationRecord>, ImportError> {
        match format {
            SeedFormat::Json => serde_json::from_str(content)
                .map_err(|e| ImportError::ParseError(format!("Invalid JSON seed batch: {}", e))),
            SeedFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ImportError::ParseError(format!("Invalid YAML seed batch: {}", e))),
        }
    }

    /// Read and parse a seed file, inferring the format from its extension
    pub fn read_file(path: &Path) -> Result<SeedBatch> {
        let format = SeedFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;

        let records = Self::parse(&content, format)
            .with_context(|| format!("Failed to parse seed file {}", path.display()))?;

        info!(
            "Found {} publication records in {}",
            records.len(),
            path.display()
        );

        Ok(SeedBatch {
            records,
            source: path.to_path_buf(),
            source_hash: compute_hash(content.as_bytes()),
        })
    }
}

/// Compute SHA256 hash of content
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    format!("{:x}", result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::input::ValidationError;
    use chrono::NaiveDate;

    const JSON_BATCH: &str = r#"[
        {
            "title": "Place cells",
            "journal": "Brain Research",
            "publication_date": "1971-11-01",
            "datasets": [
                {"url": "https://example.org/1", "species": "Rattus norvegicus", "regions": ["CA1", "CA3", "CA1"]}
            ]
        },
        {"title": "Untitled preprint"}
    ]"#;

    #[test]
    fn test_parse_json_batch() {
        let records = SeedImporter::parse(JSON_BATCH, SeedFormat::Json).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].datasets[0].regions.len(), 3);
        assert!(records[1].datasets.is_empty());
        assert!(records[1].journal.is_none());
    }

    #[test]
    fn test_parse_yaml_batch_with_camel_case_date() {
        let yaml = r#"
- title: Head direction cells
  publicationDate: "1990-02-01"
  datasets:
    - species: Rattus norvegicus
"#;
        let records = SeedImporter::parse(yaml, SeedFormat::Yaml).unwrap();
        assert_eq!(records[0].publication_date.as_deref(), Some("1990-02-01"));
        assert_eq!(records[0].datasets[0].species, "Rattus norvegicus");
    }

    #[test]
    fn test_parse_rejects_malformed_document() {
        let err = SeedImporter::parse("{not json", SeedFormat::Json).unwrap_err();
        assert!(matches!(err, ImportError::ParseError(_)));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            SeedFormat::from_path(Path::new("seed_data.json")).unwrap(),
            SeedFormat::Json
        );
        assert_eq!(
            SeedFormat::from_path(Path::new("seed.YML")).unwrap(),
            SeedFormat::Yaml
        );
        assert!(SeedFormat::from_path(Path::new("seed.csv")).is_err());
    }

    #[test]
    fn test_validate_record_deduplicates_regions() {
        let records = SeedImporter::parse(JSON_BATCH, SeedFormat::Json).unwrap();
        let validated = records[0].validate().unwrap();
        assert_eq!(
            validated.publication.publication_date,
            NaiveDate::from_ymd_opt(1971, 11, 1)
        );
        assert_eq!(validated.datasets[0].regions, vec!["CA1", "CA3"]);
    }

    #[test]
    fn test_validate_record_missing_title() {
        let record = PublicationRecord::default();
        assert_eq!(record.validate().unwrap_err(), ValidationError::Empty("title"));
    }

    #[test]
    fn test_validate_record_bad_nested_dataset() {
        let record = PublicationRecord {
            title: "Valid title".to_string(),
            datasets: vec![DatasetRecord {
                species: "  ".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        assert_eq!(
            record.validate().unwrap_err(),
            ValidationError::Empty("species name")
        );
    }

    #[test]
    fn test_validate_record_bad_date() {
        let record = PublicationRecord {
            title: "Valid title".to_string(),
            publication_date: Some("March 2020".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            record.validate().unwrap_err(),
            ValidationError::InvalidFormat("publication date", _)
        ));
    }

    #[test]
    fn test_read_file_hashes_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed_data.json");
        std::fs::write(&path, JSON_BATCH).unwrap();

        let batch = SeedImporter::read_file(&path).unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.source_hash, compute_hash(JSON_BATCH.as_bytes()));
        assert_eq!(batch.source_hash.len(), 64);
    }
}

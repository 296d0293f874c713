//! Publication and dataset models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::lookup::{Region, Species};
use crate::validation::input::{
    ValidationResult, normalize_optional, validate_journal, validate_publication_date,
    validate_title, validate_url,
};

/// A scientific publication and the datasets it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    /// Identity, assigned by the store on creation
    pub pid: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub journal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_date: Option<NaiveDate>,
    /// Owned datasets, ordered by `did`
    #[serde(default)]
    pub datasets: Vec<Dataset>,
}

impl Publication {
    /// Distinct species across all owned datasets, in first-seen order
    pub fn species(&self) -> Vec<&Species> {
        let mut seen = Vec::new();
        for dataset in &self.datasets {
            if !seen.iter().any(|s: &&Species| s.sid == dataset.species.sid) {
                seen.push(&dataset.species);
            }
        }
        seen
    }

    /// Distinct regions across all owned datasets, in first-seen order
    pub fn regions(&self) -> Vec<&Region> {
        let mut seen = Vec::new();
        for region in self.datasets.iter().flat_map(|d| &d.regions) {
            if !seen.iter().any(|r: &&Region| r.rid == region.rid) {
                seen.push(region);
            }
        }
        seen
    }
}

/// A dataset produced by exactly one publication, about exactly one species
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Identity
    pub did: i64,
    /// Owning publication
    pub pid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub species: Species,
    /// Associated regions, ordered by name
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl Dataset {
    /// Whether this dataset is linked to the given region
    pub fn covers_region(&self, rid: i64) -> bool {
        self.regions.iter().any(|r| r.rid == rid)
    }
}

/// Insert payload for a publication
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewPublication {
    pub title: String,
    #[serde(default)]
    pub journal: Option<String>,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
}

impl NewPublication {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_journal(mut self, journal: impl Into<String>) -> Self {
        self.journal = Some(journal.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.publication_date = Some(date);
        self
    }

    /// Trim text fields and check them against the column limits.
    ///
    /// Blank journals collapse to `None`.
    pub fn normalized(&self) -> ValidationResult<Self> {
        let title = validate_title(&self.title)?;
        let journal = normalize_optional(self.journal.as_deref());
        if let Some(journal) = journal.as_deref() {
            validate_journal(journal)?;
        }
        if let Some(date) = self.publication_date {
            validate_publication_date(date)?;
        }
        Ok(Self {
            title,
            journal,
            publication_date: self.publication_date,
        })
    }
}

/// Insert payload for a dataset
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewDataset {
    /// Owning publication
    pub pid: i64,
    /// Studied species
    pub sid: i64,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub region_ids: BTreeSet<i64>,
}

impl NewDataset {
    pub fn new(pid: i64, sid: i64) -> Self {
        Self {
            pid,
            sid,
            ..Default::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_regions(mut self, region_ids: impl IntoIterator<Item = i64>) -> Self {
        self.region_ids.extend(region_ids);
        self
    }

    /// Trim the url and check it against the column limit
    pub fn normalized(&self) -> ValidationResult<Self> {
        let url = normalize_optional(self.url.as_deref());
        if let Some(url) = url.as_deref() {
            validate_url(url)?;
        }
        Ok(Self {
            url,
            ..self.clone()
        })
    }
}

//! Filtered publication queries
//!
//! A listing starts from every publication and is narrowed by up to two
//! optional criteria:
//!
//! - a species id: the publication has at least one dataset of that species
//! - a region id: the publication has at least one dataset linked to that region
//!
//! Each criterion is an independent `EXISTS` predicate. With both present a
//! publication qualifies even when the species match and the region match
//! come from two different datasets; the criteria are not a joint
//! single-dataset match.
//!
//! Results are ordered by `publication_date` descending with undated
//! publications last, ties broken by `pid` (insertion order).
//!
//! The same WHERE clause drives three statements (publications, their
//! datasets, and the datasets' region links) whose rows are assembled into
//! nested [`Publication`] values by [`assemble_publications`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{CatalogError, CatalogResult};
use crate::models::{Dataset, Publication, Region, Species};
use crate::validation::input::PUBLICATION_DATE_FORMAT;

/// Optional filter criteria for a publication listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<i64>,
}

impl PublicationFilter {
    /// No filtering, every publication
    pub fn all() -> Self {
        Self::default()
    }

    pub fn species(sid: i64) -> Self {
        Self {
            species_id: Some(sid),
            region_id: None,
        }
    }

    pub fn region(rid: i64) -> Self {
        Self {
            species_id: None,
            region_id: Some(rid),
        }
    }

    pub fn with_species(mut self, sid: i64) -> Self {
        self.species_id = Some(sid);
        self
    }

    pub fn with_region(mut self, rid: i64) -> Self {
        self.region_id = Some(rid);
        self
    }

    /// Build a filter from raw request parameters.
    ///
    /// Missing, blank or non-numeric values mean "no filter" for that criterion.
    ///
    /// ```
    /// use publication_catalog::database::PublicationFilter;
    ///
    /// let filter = PublicationFilter::from_params(Some(" 3 "), Some("hippocampus"));
    /// assert_eq!(filter.species_id, Some(3));
    /// assert_eq!(filter.region_id, None);
    /// ```
    pub fn from_params(species: Option<&str>, region: Option<&str>) -> Self {
        Self {
            species_id: parse_id(species),
            region_id: parse_id(region),
        }
    }

    /// True when neither criterion is set
    pub fn is_empty(&self) -> bool {
        self.species_id.is_none() && self.region_id.is_none()
    }
}

fn parse_id(value: Option<&str>) -> Option<i64> {
    value.and_then(|v| v.trim().parse::<i64>().ok())
}

/// Placeholder syntax of the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?` (DuckDB)
    Positional,
    /// `$1`, `$2`, ... (PostgreSQL)
    Numbered,
}

impl ParamStyle {
    /// Placeholder for the 1-based parameter `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            ParamStyle::Positional => "?".to_string(),
            ParamStyle::Numbered => format!("${}", index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Predicate {
    Publication(i64),
    Species(i64),
    Region(i64),
}

impl Predicate {
    fn render(&self, placeholder: &str) -> String {
        match self {
            Predicate::Publication(_) => format!("p.pid = {}", placeholder),
            Predicate::Species(_) => format!(
                "EXISTS (SELECT 1 FROM datasets fd WHERE fd.pid = p.pid AND fd.sid = {})",
                placeholder
            ),
            Predicate::Region(_) => format!(
                "EXISTS (SELECT 1 FROM datasets fd JOIN dataset_regions fdr ON fdr.did = fd.did \
                 WHERE fd.pid = p.pid AND fdr.rid = {})",
                placeholder
            ),
        }
    }

    fn value(&self) -> i64 {
        match self {
            Predicate::Publication(v) | Predicate::Species(v) | Predicate::Region(v) => *v,
        }
    }
}

/// A rendered statement with its bound parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<i64>,
}

/// Builder for the statements behind a publication listing
#[derive(Debug, Clone)]
pub struct PublicationQuery {
    predicates: Vec<Predicate>,
    style: ParamStyle,
}

impl PublicationQuery {
    /// Listing narrowed by `filter`
    pub fn build(filter: &PublicationFilter, style: ParamStyle) -> Self {
        let mut predicates = Vec::with_capacity(2);
        if let Some(sid) = filter.species_id {
            predicates.push(Predicate::Species(sid));
        }
        if let Some(rid) = filter.region_id {
            predicates.push(Predicate::Region(rid));
        }
        Self { predicates, style }
    }

    /// A single publication by id
    pub fn by_id(pid: i64, style: ParamStyle) -> Self {
        Self {
            predicates: vec![Predicate::Publication(pid)],
            style,
        }
    }

    fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = self
            .predicates
            .iter()
            .enumerate()
            .map(|(i, p)| p.render(&self.style.placeholder(i + 1)))
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }

    fn params(&self) -> Vec<i64> {
        self.predicates.iter().map(Predicate::value).collect()
    }

    fn matching_pids(&self) -> String {
        format!("SELECT p.pid FROM publications p{}", self.where_clause())
    }

    /// Matching publications, in listing order
    pub fn publications(&self) -> BuiltQuery {
        BuiltQuery {
            sql: format!(
                "SELECT p.pid, p.title, p.journal, CAST(p.publication_date AS VARCHAR) AS publication_date \
                 FROM publications p{} \
                 ORDER BY p.publication_date DESC NULLS LAST, p.pid ASC",
                self.where_clause()
            ),
            params: self.params(),
        }
    }

    /// Every dataset owned by a matching publication, with its species
    pub fn datasets(&self) -> BuiltQuery {
        BuiltQuery {
            sql: format!(
                "SELECT d.did, d.pid, d.url, s.sid, s.species_name \
                 FROM datasets d JOIN species s ON s.sid = d.sid \
                 WHERE d.pid IN ({}) \
                 ORDER BY d.did",
                self.matching_pids()
            ),
            params: self.params(),
        }
    }

    /// Region links of those datasets
    pub fn dataset_regions(&self) -> BuiltQuery {
        BuiltQuery {
            sql: format!(
                "SELECT dr.did, r.rid, r.brain_region_name \
                 FROM dataset_regions dr \
                 JOIN regions r ON r.rid = dr.rid \
                 JOIN datasets d ON d.did = dr.did \
                 WHERE d.pid IN ({}) \
                 ORDER BY dr.did, r.brain_region_name",
                self.matching_pids()
            ),
            params: self.params(),
        }
    }
}

/// Row of [`PublicationQuery::publications`]
#[derive(Debug, Clone, PartialEq)]
pub struct PublicationRow {
    pub pid: i64,
    pub title: String,
    pub journal: Option<String>,
    pub publication_date: Option<String>,
}

/// Row of [`PublicationQuery::datasets`]
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub did: i64,
    pub pid: i64,
    pub url: Option<String>,
    pub sid: i64,
    pub species_name: String,
}

/// Row of [`PublicationQuery::dataset_regions`]
#[derive(Debug, Clone, PartialEq)]
pub struct RegionLinkRow {
    pub did: i64,
    pub rid: i64,
    pub brain_region_name: String,
}

/// Nest datasets and regions under their publications.
///
/// Publication order is preserved; datasets keep the row order (by `did`).
pub fn assemble_publications(
    publications: Vec<PublicationRow>,
    datasets: Vec<DatasetRow>,
    links: Vec<RegionLinkRow>,
) -> CatalogResult<Vec<Publication>> {
    let mut regions_by_dataset: HashMap<i64, Vec<Region>> = HashMap::new();
    for link in links {
        regions_by_dataset
            .entry(link.did)
            .or_default()
            .push(Region::new(link.rid, link.brain_region_name));
    }

    let mut datasets_by_publication: HashMap<i64, Vec<Dataset>> = HashMap::new();
    for row in datasets {
        let regions = regions_by_dataset.remove(&row.did).unwrap_or_default();
        datasets_by_publication
            .entry(row.pid)
            .or_default()
            .push(Dataset {
                did: row.did,
                pid: row.pid,
                url: row.url,
                species: Species::new(row.sid, row.species_name),
                regions,
            });
    }

    publications
        .into_iter()
        .map(|row| {
            let publication_date = row
                .publication_date
                .as_deref()
                .map(parse_stored_date)
                .transpose()?;
            Ok(Publication {
                pid: row.pid,
                title: row.title,
                journal: row.journal,
                publication_date,
                datasets: datasets_by_publication.remove(&row.pid).unwrap_or_default(),
            })
        })
        .collect()
}

fn parse_stored_date(value: &str) -> CatalogResult<NaiveDate> {
    NaiveDate::parse_from_str(value, PUBLICATION_DATE_FORMAT).map_err(|e| {
        CatalogError::SerializationError(format!("Invalid stored date '{}': {}", value, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_params_ignores_malformed_ids() {
        assert_eq!(
            PublicationFilter::from_params(Some("abc"), Some("")),
            PublicationFilter::all()
        );
        assert_eq!(
            PublicationFilter::from_params(Some("2"), Some(" 5")),
            PublicationFilter::species(2).with_region(5)
        );
        assert!(PublicationFilter::from_params(None, Some("1.5")).is_empty());
    }

    #[test]
    fn test_unfiltered_query_has_no_where_clause() {
        let query = PublicationQuery::build(&PublicationFilter::all(), ParamStyle::Positional);
        let built = query.publications();
        assert!(!built.sql.contains("WHERE"));
        assert!(built.params.is_empty());
        assert!(
            built
                .sql
                .ends_with("ORDER BY p.publication_date DESC NULLS LAST, p.pid ASC")
        );
    }

    #[test]
    fn test_species_filter_is_exists_predicate() {
        let query = PublicationQuery::build(&PublicationFilter::species(4), ParamStyle::Positional);
        let built = query.publications();
        assert!(built.sql.contains("EXISTS (SELECT 1 FROM datasets fd"));
        assert!(built.sql.contains("fd.sid = ?"));
        assert_eq!(built.params, vec![4]);
    }

    #[test]
    fn test_both_filters_are_independent_predicates() {
        let filter = PublicationFilter::species(1).with_region(9);
        let built = PublicationQuery::build(&filter, ParamStyle::Numbered).publications();

        assert_eq!(built.sql.matches("EXISTS").count(), 2);
        assert!(built.sql.contains("fd.sid = $1"));
        assert!(built.sql.contains("fdr.rid = $2"));
        assert!(built.sql.contains(") AND EXISTS ("));
        assert_eq!(built.params, vec![1, 9]);
    }

    #[test]
    fn test_child_queries_share_parameters() {
        let filter = PublicationFilter::region(3);
        let query = PublicationQuery::build(&filter, ParamStyle::Numbered);

        let datasets = query.datasets();
        assert!(datasets.sql.contains("WHERE d.pid IN (SELECT p.pid FROM publications p WHERE"));
        assert_eq!(datasets.params, vec![3]);

        let links = query.dataset_regions();
        assert!(links.sql.contains("fdr.rid = $1"));
        assert_eq!(links.params, vec![3]);
    }

    #[test]
    fn test_by_id_query() {
        let built = PublicationQuery::by_id(12, ParamStyle::Positional).publications();
        assert!(built.sql.contains("WHERE p.pid = ?"));
        assert_eq!(built.params, vec![12]);
    }

    #[test]
    fn test_assemble_nests_datasets_and_regions() {
        let publications = vec![
            PublicationRow {
                pid: 2,
                title: "Newer".to_string(),
                journal: Some("eLife".to_string()),
                publication_date: Some("2020-01-01".to_string()),
            },
            PublicationRow {
                pid: 1,
                title: "Undated".to_string(),
                journal: None,
                publication_date: None,
            },
        ];
        let datasets = vec![
            DatasetRow {
                did: 10,
                pid: 2,
                url: None,
                sid: 1,
                species_name: "Mus musculus".to_string(),
            },
            DatasetRow {
                did: 11,
                pid: 2,
                url: Some("https://example.org/11".to_string()),
                sid: 2,
                species_name: "Macaca mulatta".to_string(),
            },
        ];
        let links = vec![
            RegionLinkRow {
                did: 11,
                rid: 5,
                brain_region_name: "V1".to_string(),
            },
            RegionLinkRow {
                did: 11,
                rid: 6,
                brain_region_name: "V4".to_string(),
            },
        ];

        let assembled = assemble_publications(publications, datasets, links).unwrap();
        assert_eq!(assembled.len(), 2);
        assert_eq!(assembled[0].pid, 2);
        assert_eq!(
            assembled[0].publication_date,
            NaiveDate::from_ymd_opt(2020, 1, 1)
        );
        assert_eq!(assembled[0].datasets.len(), 2);
        assert!(assembled[0].datasets[0].regions.is_empty());
        assert_eq!(assembled[0].datasets[1].regions.len(), 2);
        assert!(assembled[1].datasets.is_empty());
        assert!(assembled[1].publication_date.is_none());
    }

    #[test]
    fn test_assemble_rejects_corrupt_date() {
        let rows = vec![PublicationRow {
            pid: 1,
            title: "t".to_string(),
            journal: None,
            publication_date: Some("not-a-date".to_string()),
        }];
        let err = assemble_publications(rows, vec![], vec![]).unwrap_err();
        assert!(matches!(err, CatalogError::SerializationError(_)));
    }
}

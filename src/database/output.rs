//! Rendering of catalog listings for the command line

use serde_json::json;

use super::{CatalogError, CatalogResult};
use crate::models::{Publication, Region, Species};

/// Output format for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// ASCII table format (default)
    #[default]
    Table,
    Json,
    Csv,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Rows of display strings under a fixed header
struct Grid {
    columns: &'static [&'static str],
    rows: Vec<Vec<String>>,
}

const PUBLICATION_COLUMNS: &[&str] = &[
    "pid", "title", "journal", "date", "species", "regions", "datasets",
];

const LOOKUP_COLUMNS: &[&str] = &["kind", "id", "name"];

fn publication_grid(publications: &[Publication]) -> Grid {
    let rows = publications
        .iter()
        .map(|p| {
            vec![
                p.pid.to_string(),
                p.title.clone(),
                p.journal.clone().unwrap_or_default(),
                p.publication_date
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                join_names(p.species().iter().map(|s| s.species_name.as_str())),
                join_names(p.regions().iter().map(|r| r.brain_region_name.as_str())),
                p.datasets.len().to_string(),
            ]
        })
        .collect();

    Grid {
        columns: PUBLICATION_COLUMNS,
        rows,
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join("; ")
}

/// Format a publication listing
pub fn format_publications(
    publications: &[Publication],
    format: OutputFormat,
) -> CatalogResult<String> {
    Ok(match format {
        OutputFormat::Json => to_json(&publications)?,
        OutputFormat::Csv => format_as_csv(&publication_grid(publications)),
        OutputFormat::Table => format_as_table(&publication_grid(publications)),
    })
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> CatalogResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CatalogError::SerializationError(format!("Failed to render JSON: {}", e)))
}

/// Format the species and region lookup lists
pub fn format_lookups(
    species: &[Species],
    regions: &[Region],
    format: OutputFormat,
) -> CatalogResult<String> {
    if format == OutputFormat::Json {
        return to_json(&json!({ "species": species, "regions": regions }));
    }

    let rows = species
        .iter()
        .map(|s| vec!["species".to_string(), s.sid.to_string(), s.species_name.clone()])
        .chain(
            regions
                .iter()
                .map(|r| vec!["region".to_string(), r.rid.to_string(), r.brain_region_name.clone()]),
        )
        .collect();
    let grid = Grid {
        columns: LOOKUP_COLUMNS,
        rows,
    };

    Ok(match format {
        OutputFormat::Csv => format_as_csv(&grid),
        _ => format_as_table(&grid),
    })
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn format_as_csv(grid: &Grid) -> String {
    let mut output = String::new();

    output.push_str(&grid.columns.join(","));
    output.push('\n');

    for row in &grid.rows {
        let values: Vec<String> = row.iter().map(|v| csv_field(v)).collect();
        output.push_str(&values.join(","));
        output.push('\n');
    }

    output
}

fn format_as_table(grid: &Grid) -> String {
    if grid.rows.is_empty() {
        return "(0 rows)".to_string();
    }

    let mut widths: Vec<usize> = grid.columns.iter().map(|c| c.chars().count()).collect();
    for row in &grid.rows {
        for (i, value) in row.iter().enumerate() {
            widths[i] = widths[i].max(value.chars().count());
        }
    }

    let mut output = String::new();

    let header: Vec<String> = grid
        .columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{:width$}", c, width = widths[i]))
        .collect();
    output.push_str(header.join(" | ").trim_end());
    output.push('\n');

    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&separator.join("-+-"));
    output.push('\n');

    for row in &grid.rows {
        let values: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:width$}", v, width = widths[i]))
            .collect();
        output.push_str(values.join(" | ").trim_end());
        output.push('\n');
    }

    output.push_str(&format!("({} rows)", grid.rows.len()));

    output
}

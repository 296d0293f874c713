//! Database schema definitions
//!
//! Provides SQL schema definitions that work with both DuckDB and PostgreSQL.
//! Identities come from sequences so that `pid` order is insertion order.
//! Note: DuckDB doesn't support CASCADE in foreign keys, so we use simple
//! REFERENCES and the backends remove owned rows explicitly.

/// Schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Database schema helper
pub struct CatalogSchema;

impl CatalogSchema {
    /// Get the initial schema creation SQL
    pub fn create_tables_sql() -> &'static str {
        r#"
CREATE SEQUENCE IF NOT EXISTS publications_pid_seq START 1;
CREATE SEQUENCE IF NOT EXISTS datasets_did_seq START 1;
CREATE SEQUENCE IF NOT EXISTS species_sid_seq START 1;
CREATE SEQUENCE IF NOT EXISTS regions_rid_seq START 1;
CREATE SEQUENCE IF NOT EXISTS load_log_id_seq START 1;

CREATE TABLE IF NOT EXISTS publications (
    pid BIGINT PRIMARY KEY DEFAULT nextval('publications_pid_seq'),
    title VARCHAR(300) NOT NULL,
    publication_date DATE,
    journal VARCHAR(150)
);

CREATE TABLE IF NOT EXISTS species (
    sid BIGINT PRIMARY KEY DEFAULT nextval('species_sid_seq'),
    species_name VARCHAR(100) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS regions (
    rid BIGINT PRIMARY KEY DEFAULT nextval('regions_rid_seq'),
    brain_region_name VARCHAR(150) NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS datasets (
    did BIGINT PRIMARY KEY DEFAULT nextval('datasets_did_seq'),
    url VARCHAR(500),
    pid BIGINT NOT NULL REFERENCES publications(pid),
    sid BIGINT NOT NULL REFERENCES species(sid)
);

-- Dataset <-> Region association
CREATE TABLE IF NOT EXISTS dataset_regions (
    did BIGINT NOT NULL REFERENCES datasets(did),
    rid BIGINT NOT NULL REFERENCES regions(rid),
    PRIMARY KEY (did, rid)
);

-- Ingestion runs
CREATE TABLE IF NOT EXISTS load_log (
    id BIGINT PRIMARY KEY DEFAULT nextval('load_log_id_seq'),
    started_at TEXT NOT NULL,
    completed_at TEXT NOT NULL,
    source TEXT,
    source_hash TEXT,
    publications_created BIGINT NOT NULL DEFAULT 0,
    datasets_created BIGINT NOT NULL DEFAULT 0,
    species_created BIGINT NOT NULL DEFAULT 0,
    regions_created BIGINT NOT NULL DEFAULT 0,
    failure_count BIGINT NOT NULL DEFAULT 0,
    failures TEXT
);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#
    }

    /// Get index creation SQL for the filter and ownership lookups
    pub fn create_indexes_sql() -> &'static str {
        r#"
-- Publications by owner, species filter
CREATE INDEX IF NOT EXISTS idx_datasets_pid ON datasets(pid);
CREATE INDEX IF NOT EXISTS idx_datasets_sid ON datasets(sid);

-- Reverse lookup regions -> datasets
CREATE INDEX IF NOT EXISTS idx_dataset_regions_rid ON dataset_regions(rid);

-- Listing order
CREATE INDEX IF NOT EXISTS idx_publications_date ON publications(publication_date);
"#
    }

    /// Check current schema version
    pub fn check_schema_version_sql() -> &'static str {
        "SELECT MAX(version) AS version FROM schema_version"
    }

    /// Drop all tables and sequences
    pub fn drop_all_tables_sql() -> &'static str {
        r#"
DROP TABLE IF EXISTS dataset_regions;
DROP TABLE IF EXISTS datasets;
DROP TABLE IF EXISTS publications;
DROP TABLE IF EXISTS species;
DROP TABLE IF EXISTS regions;
DROP TABLE IF EXISTS load_log;
DROP TABLE IF EXISTS schema_version;
DROP SEQUENCE IF EXISTS publications_pid_seq;
DROP SEQUENCE IF EXISTS datasets_did_seq;
DROP SEQUENCE IF EXISTS species_sid_seq;
DROP SEQUENCE IF EXISTS regions_rid_seq;
DROP SEQUENCE IF EXISTS load_log_id_seq;
"#
    }
}

/// Statements for lookup tables, rendered per [`LookupKind`](crate::models::LookupKind)
pub mod lookup_sql {
    use crate::models::LookupKind;

    /// Insert a name, ignoring an existing row with the same name
    pub fn insert_ignore(kind: LookupKind, placeholder: &str) -> String {
        format!(
            "INSERT INTO {table} ({name}) VALUES ({p}) ON CONFLICT ({name}) DO NOTHING",
            table = kind.table(),
            name = kind.name_column(),
            p = placeholder,
        )
    }

    pub fn select_by_name(kind: LookupKind, placeholder: &str) -> String {
        format!(
            "SELECT {id} FROM {table} WHERE {name} = {p}",
            id = kind.id_column(),
            table = kind.table(),
            name = kind.name_column(),
            p = placeholder,
        )
    }

    pub fn select_all_ordered(kind: LookupKind) -> String {
        format!(
            "SELECT {id}, {name} FROM {table} ORDER BY {name}",
            id = kind.id_column(),
            table = kind.table(),
            name = kind.name_column(),
        )
    }

    pub fn exists(kind: LookupKind, placeholder: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM {table} WHERE {id} = {p}",
            table = kind.table(),
            id = kind.id_column(),
            p = placeholder,
        )
    }
}

/// Statement sets for writes, in DuckDB (`?`) and PostgreSQL (`$n`) placeholder styles
pub mod publication_sql {
    // Dates travel as text and are cast by the database.
    pub const INSERT_DUCKDB: &str = r#"
INSERT INTO publications (title, journal, publication_date)
VALUES (?, ?, CAST(CAST(? AS VARCHAR) AS DATE))
RETURNING pid
"#;
    pub const INSERT_POSTGRES: &str = r#"
INSERT INTO publications (title, journal, publication_date)
VALUES ($1, $2, CAST(CAST($3 AS VARCHAR) AS DATE))
RETURNING pid
"#;

    pub const EXISTS_DUCKDB: &str = "SELECT COUNT(*) FROM publications WHERE pid = ?";
    pub const EXISTS_POSTGRES: &str = "SELECT COUNT(*) FROM publications WHERE pid = $1";

    pub const DELETE_REGION_LINKS_DUCKDB: &str =
        "DELETE FROM dataset_regions WHERE did IN (SELECT did FROM datasets WHERE pid = ?)";
    pub const DELETE_REGION_LINKS_POSTGRES: &str =
        "DELETE FROM dataset_regions WHERE did IN (SELECT did FROM datasets WHERE pid = $1)";

    pub const DELETE_DATASETS_DUCKDB: &str = "DELETE FROM datasets WHERE pid = ?";
    pub const DELETE_DATASETS_POSTGRES: &str = "DELETE FROM datasets WHERE pid = $1";

    pub const DELETE_DUCKDB: &str = "DELETE FROM publications WHERE pid = ?";
    pub const DELETE_POSTGRES: &str = "DELETE FROM publications WHERE pid = $1";
}

pub mod dataset_sql {
    pub const INSERT_DUCKDB: &str = "INSERT INTO datasets (url, pid, sid) VALUES (?, ?, ?) RETURNING did";
    pub const INSERT_POSTGRES: &str =
        "INSERT INTO datasets (url, pid, sid) VALUES ($1, $2, $3) RETURNING did";

    pub const LINK_REGION_DUCKDB: &str =
        "INSERT INTO dataset_regions (did, rid) VALUES (?, ?) ON CONFLICT (did, rid) DO NOTHING";
    pub const LINK_REGION_POSTGRES: &str =
        "INSERT INTO dataset_regions (did, rid) VALUES ($1, $2) ON CONFLICT (did, rid) DO NOTHING";
}

/// SQL for catalog statistics
pub mod stats_sql {
    pub const COUNT_PUBLICATIONS: &str = "SELECT COUNT(*) FROM publications";
    pub const COUNT_DATASETS: &str = "SELECT COUNT(*) FROM datasets";
    pub const COUNT_SPECIES: &str = "SELECT COUNT(*) FROM species";
    pub const COUNT_REGIONS: &str = "SELECT COUNT(*) FROM regions";
    pub const COUNT_REGION_LINKS: &str = "SELECT COUNT(*) FROM dataset_regions";
}

/// SQL for load log operations
pub mod load_log_sql {
    pub const INSERT_DUCKDB: &str = r#"
INSERT INTO load_log (
    started_at, completed_at, source, source_hash, publications_created,
    datasets_created, species_created, regions_created, failure_count, failures
)
VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
RETURNING id
"#;
    pub const INSERT_POSTGRES: &str = r#"
INSERT INTO load_log (
    started_at, completed_at, source, source_hash, publications_created,
    datasets_created, species_created, regions_created, failure_count, failures
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
RETURNING id
"#;

    pub const SELECT_LATEST: &str = r#"
SELECT id, started_at, completed_at, source, source_hash,
       publications_created, datasets_created, failure_count
FROM load_log
ORDER BY id DESC
LIMIT 1
"#;
}

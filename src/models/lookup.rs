//! Lookup entities: species and brain regions
//!
//! Both are deduplicated by a unique natural key (their name) and shared
//! across every dataset that references them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::validation::input::{MAX_REGION_NAME_LENGTH, MAX_SPECIES_NAME_LENGTH};

/// Kind of lookup table addressed by `find_or_create_lookup`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    /// Studied species (`species` table)
    Species,
    /// Referenced brain region (`regions` table)
    Region,
}

impl LookupKind {
    /// Table holding this kind of lookup row
    pub fn table(&self) -> &'static str {
        match self {
            LookupKind::Species => "species",
            LookupKind::Region => "regions",
        }
    }

    /// Identity column
    pub fn id_column(&self) -> &'static str {
        match self {
            LookupKind::Species => "sid",
            LookupKind::Region => "rid",
        }
    }

    /// Unique name column
    pub fn name_column(&self) -> &'static str {
        match self {
            LookupKind::Species => "species_name",
            LookupKind::Region => "brain_region_name",
        }
    }

    /// Field label used in validation messages
    pub fn field(&self) -> &'static str {
        match self {
            LookupKind::Species => "species name",
            LookupKind::Region => "brain region name",
        }
    }

    /// Maximum accepted name length
    pub fn max_name_length(&self) -> usize {
        match self {
            LookupKind::Species => MAX_SPECIES_NAME_LENGTH,
            LookupKind::Region => MAX_REGION_NAME_LENGTH,
        }
    }
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupKind::Species => write!(f, "species"),
            LookupKind::Region => write!(f, "region"),
        }
    }
}

/// A lookup row independent of its kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub kind: LookupKind,
    pub id: i64,
    pub name: String,
}

/// Species studied by one or more datasets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Species {
    /// Identity
    pub sid: i64,
    /// Globally unique species name
    pub species_name: String,
}

impl Species {
    pub fn new(sid: i64, species_name: impl Into<String>) -> Self {
        Self {
            sid,
            species_name: species_name.into(),
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.species_name)
    }
}

impl From<LookupEntry> for Species {
    fn from(entry: LookupEntry) -> Self {
        Self::new(entry.id, entry.name)
    }
}

/// Brain region referenced by datasets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Identity
    pub rid: i64,
    /// Globally unique region name
    pub brain_region_name: String,
}

impl Region {
    pub fn new(rid: i64, brain_region_name: impl Into<String>) -> Self {
        Self {
            rid,
            brain_region_name: brain_region_name.into(),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.brain_region_name)
    }
}

impl From<LookupEntry> for Region {
    fn from(entry: LookupEntry) -> Self {
        Self::new(entry.id, entry.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_kind_columns() {
        assert_eq!(LookupKind::Species.table(), "species");
        assert_eq!(LookupKind::Species.id_column(), "sid");
        assert_eq!(LookupKind::Region.table(), "regions");
        assert_eq!(LookupKind::Region.name_column(), "brain_region_name");
    }

    #[test]
    fn test_display_uses_name() {
        assert_eq!(Species::new(1, "Mus musculus").to_string(), "Mus musculus");
        assert_eq!(Region::new(4, "Hippocampus").to_string(), "Hippocampus");
    }

    #[test]
    fn test_entry_conversion() {
        let entry = LookupEntry {
            kind: LookupKind::Region,
            id: 7,
            name: "V1".to_string(),
        };
        let region: Region = entry.into();
        assert_eq!(region, Region::new(7, "V1"));
    }
}

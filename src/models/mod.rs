//! Catalog models
//!
//! Entities stored by the catalog:
//! - [`Publication`] owns zero or more [`Dataset`]s (cascading ownership)
//! - [`Dataset`] references exactly one [`Species`] and any number of [`Region`]s
//! - [`Species`] and [`Region`] are lookup entities, unique by name

pub mod lookup;
pub mod publication;

pub use lookup::{LookupEntry, LookupKind, Region, Species};
pub use publication::{Dataset, NewDataset, NewPublication, Publication};

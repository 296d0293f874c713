//! Studies browser
//!
//! Everything a listing page needs in one call: the filtered publications
//! plus the species and region lists used to build the filter controls.

use serde::Serialize;

use super::{CatalogBackend, CatalogResult, PublicationFilter};
use crate::models::{Publication, Region, Species};

#[derive(Debug, Clone, Serialize)]
pub struct StudiesView {
    pub publications: Vec<Publication>,
    /// All species ordered by name
    pub species: Vec<Species>,
    /// All regions ordered by name
    pub regions: Vec<Region>,
    /// The filter that was applied after parsing the raw parameters
    pub filter: PublicationFilter,
}

/// Build the studies view from raw request parameters.
///
/// Parameters that are absent, empty or not integers do not filter.
pub async fn browse_studies<B: CatalogBackend + ?Sized>(
    backend: &B,
    species_param: Option<&str>,
    region_param: Option<&str>,
) -> CatalogResult<StudiesView> {
    let filter = PublicationFilter::from_params(species_param, region_param);

    Ok(StudiesView {
        publications: backend.list_publications(&filter).await?,
        species: backend.list_species().await?,
        regions: backend.list_regions().await?,
        filter,
    })
}

//! Listing commands: `studies` and `lookups`

use std::path::PathBuf;

use super::{load_initialized, open_backend, runtime};
use crate::cli::error::CliError;
use crate::database::{OutputFormat, browse_studies, format_lookups, format_publications};

#[derive(Debug, Clone)]
pub struct StudiesArgs {
    pub dir: PathBuf,
    /// Raw species id; non-numeric values do not filter
    pub species: Option<String>,
    /// Raw region id; non-numeric values do not filter
    pub region: Option<String>,
    pub format: String,
}

#[derive(Debug, Clone)]
pub struct LookupsArgs {
    pub dir: PathBuf,
    pub format: String,
}

fn parse_format(format: &str) -> Result<OutputFormat, CliError> {
    format.parse().map_err(|e: String| CliError::InvalidArgument(e))
}

pub fn handle_studies(args: &StudiesArgs) -> Result<(), CliError> {
    let config = load_initialized(&args.dir)?;
    let output_format = parse_format(&args.format)?;

    let rt = runtime()?;
    let view = rt.block_on(async {
        let store = open_backend(&config, &args.dir).await?;
        let view = browse_studies(
            store.as_ref(),
            args.species.as_deref(),
            args.region.as_deref(),
        )
        .await?;
        store.close().await?;
        Ok::<_, CliError>(view)
    })?;

    println!("{}", format_publications(&view.publications, output_format)?);

    if output_format == OutputFormat::Table {
        let species = view
            .filter
            .species_id
            .and_then(|sid| view.species.iter().find(|s| s.sid == sid));
        let region = view
            .filter
            .region_id
            .and_then(|rid| view.regions.iter().find(|r| r.rid == rid));
        if let Some(species) = species {
            eprintln!("Species: {}", species);
        }
        if let Some(region) = region {
            eprintln!("Region:  {}", region);
        }
    }

    Ok(())
}

pub fn handle_lookups(args: &LookupsArgs) -> Result<(), CliError> {
    let config = load_initialized(&args.dir)?;
    let output_format = parse_format(&args.format)?;

    let rt = runtime()?;
    let (species, regions) = rt.block_on(async {
        let store = open_backend(&config, &args.dir).await?;
        let species = store.list_species().await?;
        let regions = store.list_regions().await?;
        store.close().await?;
        Ok::<_, CliError>((species, regions))
    })?;

    println!("{}", format_lookups(&species, &regions, output_format)?);
    Ok(())
}

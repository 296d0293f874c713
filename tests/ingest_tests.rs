//! Seed ingestion tests

#![cfg(feature = "duckdb-backend")]

use publication_catalog::database::{
    CatalogBackend, CatalogError, DuckDBBackend, FailurePolicy, IngestLoader, PublicationFilter,
    browse_studies,
};
use publication_catalog::import::{PublicationRecord, SeedFormat, SeedImporter, seed::compute_hash};
use tempfile::tempdir;

const SEED_JSON: &str = r#"[
  {
    "title": "Grid cells in medial entorhinal cortex",
    "journal": "Nature",
    "publication_date": "2005-08-11",
    "datasets": [
      {"url": "https://example.org/grid/1", "species": "Rattus norvegicus", "regions": ["MEC"]},
      {"species": "Mus musculus", "regions": ["MEC", "CA1"]}
    ]
  },
  {
    "title": "Place cells revisited",
    "publicationDate": "2011-02-14",
    "datasets": [
      {"species": "Mus musculus", "regions": ["CA1"]}
    ]
  },
  {
    "title": "",
    "datasets": [{"species": "Danio rerio"}]
  },
  {
    "title": "Commentary without data"
  }
]"#;

#[tokio::test]
async fn test_load_seed_file_with_skip_policy() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seed_data.json");
    std::fs::write(&path, SEED_JSON).unwrap();

    let batch = SeedImporter::read_file(&path).unwrap();
    let backend = DuckDBBackend::in_memory().unwrap();

    let report = IngestLoader::new(&backend)
        .with_policy(FailurePolicy::Skip)
        .load_batch(&batch)
        .await
        .unwrap();

    assert_eq!(report.publications_created, 3);
    assert_eq!(report.datasets_created, 3);
    assert_eq!(report.species_created, 2);
    assert_eq!(report.regions_created, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 2);
    assert!(report.failures[0].message.contains("title"));

    // The rejected record's species never reached the lookup table
    let species: Vec<String> = backend
        .list_species()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.species_name)
        .collect();
    assert_eq!(species, vec!["Mus musculus", "Rattus norvegicus"]);

    let last = backend.latest_load().await.unwrap().unwrap();
    assert_eq!(last.publications_created, 3);
    assert_eq!(last.failure_count, 1);
    assert_eq!(last.source_hash.as_deref(), Some(compute_hash(SEED_JSON.as_bytes()).as_str()));
}

#[tokio::test]
async fn test_loaded_catalog_is_browsable() {
    let records = SeedImporter::parse(
        SEED_JSON,
        SeedFormat::Json,
    )
    .unwrap();
    let backend = DuckDBBackend::in_memory().unwrap();
    IngestLoader::new(&backend)
        .with_policy(FailurePolicy::Skip)
        .load(&records)
        .await
        .unwrap();

    let all = browse_studies(&backend, None, None).await.unwrap();
    let titles: Vec<&str> = all.publications.iter().map(|p| p.title.as_str()).collect();
    assert_eq!(
        titles,
        vec![
            "Place cells revisited",
            "Grid cells in medial entorhinal cortex",
            "Commentary without data"
        ]
    );

    let mouse = all
        .species
        .iter()
        .find(|s| s.species_name == "Mus musculus")
        .unwrap();
    let mec = all
        .regions
        .iter()
        .find(|r| r.brain_region_name == "MEC")
        .unwrap();

    let filtered = browse_studies(
        &backend,
        Some(&mouse.sid.to_string()),
        Some(&mec.rid.to_string()),
    )
    .await
    .unwrap();
    assert_eq!(filtered.publications.len(), 1);
    assert_eq!(filtered.publications[0].datasets.len(), 2);
    assert_eq!(
        filtered.publications[0]
            .regions()
            .iter()
            .map(|r| r.brain_region_name.as_str())
            .collect::<Vec<_>>(),
        vec!["MEC", "CA1"]
    );
}

#[tokio::test]
async fn test_abort_policy_reports_index() {
    let records = SeedImporter::parse(
        SEED_JSON,
        SeedFormat::Json,
    )
    .unwrap();
    let backend = DuckDBBackend::in_memory().unwrap();

    let err = IngestLoader::new(&backend).load(&records).await.unwrap_err();
    match &err {
        CatalogError::RecordRejected { index, .. } => assert_eq!(*index, 2),
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_validation());

    let loaded = backend
        .list_publications(&PublicationFilter::all())
        .await
        .unwrap();
    assert_eq!(loaded.len(), 2);
    assert!(backend.latest_load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_yaml_seed_with_invalid_date() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seed.yaml");
    std::fs::write(
        &path,
        r#"
- title: Valid
  publication_date: "2019-05-01"
- title: Bad date
  publication_date: "2019-13-01"
"#,
    )
    .unwrap();

    let batch = SeedImporter::read_file(&path).unwrap();
    let backend = DuckDBBackend::in_memory().unwrap();
    let report = IngestLoader::new(&backend)
        .with_policy(FailurePolicy::Skip)
        .load_batch(&batch)
        .await
        .unwrap();

    assert_eq!(report.publications_created, 1);
    assert_eq!(report.failures[0].title, "Bad date");
}

#[tokio::test]
async fn test_listing_matches_loaded_records() {
    let records = SeedImporter::parse(SEED_JSON, SeedFormat::Json).unwrap();
    let backend = DuckDBBackend::in_memory().unwrap();
    IngestLoader::new(&backend)
        .with_policy(FailurePolicy::Skip)
        .load(&records)
        .await
        .unwrap();

    // Accepted records, newest first with the undated one last
    let expected: Vec<&PublicationRecord> = [1, 0, 3].iter().map(|&i| &records[i]).collect();
    let listed = backend
        .list_publications(&PublicationFilter::all())
        .await
        .unwrap();
    assert_eq!(listed.len(), expected.len());

    for (publication, record) in listed.iter().zip(&expected) {
        assert_eq!(publication.title, record.title);
        assert_eq!(publication.journal, record.journal);
        assert_eq!(
            publication.publication_date.map(|d| d.to_string()),
            record.publication_date
        );
        assert_eq!(publication.datasets.len(), record.datasets.len());

        for (dataset, input) in publication.datasets.iter().zip(&record.datasets) {
            assert_eq!(dataset.url, input.url);
            assert_eq!(dataset.species.species_name, input.species);

            let mut names = input.regions.clone();
            names.sort();
            let stored: Vec<String> = dataset
                .regions
                .iter()
                .map(|r| r.brain_region_name.clone())
                .collect();
            assert_eq!(stored, names);
        }
    }
}

#[tokio::test]
async fn test_unstorable_dates_are_skipped() {
    let records = SeedImporter::parse(
        r#"[
          {"title": "Before the era", "publication_date": "-0001-01-01"},
          {"title": "Year zero", "publication_date": "0000-06-01"},
          {"title": "Far future", "publication_date": "+12345-01-01"},
          {"title": "Ordinary", "publication_date": "2020-01-01"}
        ]"#,
        SeedFormat::Json,
    )
    .unwrap();
    let backend = DuckDBBackend::in_memory().unwrap();

    let report = IngestLoader::new(&backend)
        .with_policy(FailurePolicy::Skip)
        .load(&records)
        .await
        .unwrap();
    assert_eq!(report.publications_created, 1);
    let skipped: Vec<usize> = report.failures.iter().map(|f| f.index).collect();
    assert_eq!(skipped, vec![0, 1, 2]);

    let listed = backend
        .list_publications(&PublicationFilter::all())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].title, "Ordinary");
}

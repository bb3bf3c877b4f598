#![allow(unused)]
mod support;

use fhirgraph::{
    graph::{GraphStore, NodeKey, RelType, ResourceKind},
    Error,
};
use serde_json::json;
use support::*;

#[tokio::test]
async fn bad_file_is_recorded_and_batch_continues() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    let dir = tempfile::tempdir()?;
    write_json(
        dir.path(),
        "a-good.json",
        &bundle(vec![
            patient("p1", "Abe", "Sipes"),
            encounter("e1", "p1", "2020-01-01T10:00:00Z"),
        ]),
    )?;
    std::fs::write(dir.path().join("b-broken.json"), "{ not json")?;

    let summary = app.ingestor().ingest_directory(dir.path()).await?;

    assert_eq!(summary.files_found, 2);
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].file.ends_with("b-broken.json"));
    assert_eq!(summary.created.get(&ResourceKind::Patient), Some(&1));
    assert_eq!(summary.relationships.get(&RelType::HasEncounter), Some(&1));
    Ok(())
}

#[tokio::test]
async fn wrong_top_level_shape_is_a_file_failure() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    let dir = tempfile::tempdir()?;
    write_json(dir.path(), "list.json", &json!([1, 2, 3]))?;
    write_json(
        dir.path(),
        "entries.json",
        &json!({ "resourceType": "Bundle", "entry": "nope" }),
    )?;

    let summary = app.ingestor().ingest_directory(dir.path()).await?;
    assert_eq!(summary.files_processed, 0);
    assert_eq!(summary.failures.len(), 2);
    Ok(())
}

#[tokio::test]
async fn only_matching_extensions_are_picked_up_in_name_order() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    let dir = tempfile::tempdir()?;
    write_json(dir.path(), "b.json", &bundle(vec![]))?;
    write_json(dir.path(), "a.JSON", &bundle(vec![]))?;
    std::fs::write(dir.path().join("notes.txt"), "ignore me")?;
    std::fs::create_dir(dir.path().join("nested.json"))?;

    let files = app.ingestor().discover(dir.path()).await?;
    let names: Vec<String> = files
        .iter()
        .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
        .collect();
    assert_eq!(names, ["a.JSON", "b.json"]);
    Ok(())
}

#[tokio::test]
async fn missing_directory_is_an_error() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    let dir = tempfile::tempdir()?;
    let missing = dir.path().join("does-not-exist");

    let result = app.ingestor().ingest_directory(&missing).await;
    assert!(matches!(result, Err(Error::Io { .. })));
    Ok(())
}

#[tokio::test]
async fn malformed_and_unsupported_resources_are_counted() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    let summary = app
        .ingest(&[bundle(vec![
            patient("p1", "Abe", "Sipes"),
            json!({ "resourceType": "Patient", "name": "not a list", "id": "p2" }),
            json!({ "resourceType": "Claim", "id": "x1" }),
            json!({ "resourceType": "Claim", "id": "x2" }),
        ])])
        .await?;

    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.created.get(&ResourceKind::Patient), Some(&1));
    assert_eq!(summary.skipped_resources, 1);
    assert_eq!(summary.unsupported.get("Claim"), Some(&2));
    Ok(())
}

#[tokio::test]
async fn reingestion_is_idempotent() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    let bundles = [bundle(vec![
        patient("p1", "Abe", "Sipes"),
        encounter("e1", "p1", "2020-01-01T10:00:00Z"),
        condition("c1", "p1", "e1", Some("2020-01-01T10:00:00Z")),
        condition("c2", "p1", "e1", Some("2021-01-01T10:00:00Z")),
    ])];

    let first = app.ingest(&bundles).await?;
    let second = app.ingest(&bundles).await?;

    assert_eq!(first.nodes_created(), 4);
    assert_eq!(second.nodes_created(), 0);
    assert_eq!(second.duplicates.get(&ResourceKind::Condition), Some(&2));
    assert_eq!(second.relationships_created(), 0);

    let patient = NodeKey::new(ResourceKind::Patient, "p1");
    assert_eq!(app.store.count_nodes(ResourceKind::Patient).await?, 1);
    assert_eq!(app.store.count_edges(&patient, RelType::HasCondition).await?, 2);
    assert_eq!(app.store.count_edges(&patient, RelType::FirstCondition).await?, 1);
    assert_eq!(
        app.store
            .count_edges(&NodeKey::new(ResourceKind::Condition, "c1"), RelType::NextCondition)
            .await?,
        1
    );
    Ok(())
}

#[tokio::test]
async fn clear_before_ingest_starts_from_empty() -> anyhow::Result<()> {
    let mut config = test_config();
    config.ingest.clear_before_ingest = true;
    let app = TestApp::new(config);

    app.ingest(&[bundle(vec![patient("old", "Old", "Patient")])])
        .await?;
    app.ingest(&[bundle(vec![patient("new", "New", "Patient")])])
        .await?;

    let summary = app.ingestor().graph_summary().await?;
    assert_eq!(summary.total, 1);
    assert_eq!(summary.nodes.get(&ResourceKind::Patient), Some(&1));
    Ok(())
}

#[tokio::test]
async fn graph_summary_counts_every_label() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    app.ingest(&[bundle(vec![
        patient("p1", "Abe", "Sipes"),
        encounter("e1", "p1", "2020-01-01T10:00:00Z"),
        observation("o1", "p1", "e1"),
    ])])
    .await?;

    let summary = app.ingestor().graph_summary().await?;
    assert_eq!(summary.nodes.len(), ResourceKind::ALL.len());
    assert_eq!(summary.nodes.get(&ResourceKind::Observation), Some(&1));
    assert_eq!(summary.nodes.get(&ResourceKind::Procedure), Some(&0));
    assert_eq!(summary.total, 3);
    Ok(())
}

#[tokio::test]
async fn temporal_chains_span_bundles() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    let summary = app
        .ingest(&[
            bundle(vec![
                patient("p1", "Abe", "Sipes"),
                encounter("e1", "p1", "2020-01-01T10:00:00Z"),
                condition("c1", "p1", "e1", Some("2020-01-01T10:00:00Z")),
            ]),
            bundle(vec![condition("c2", "p1", "e1", Some("2019-01-01T10:00:00Z"))]),
        ])
        .await?;

    assert_eq!(summary.temporal.patients, 1);
    assert_eq!(summary.temporal.next_edges, 1);
    assert_eq!(summary.temporal.first_edges, 1);
    assert_eq!(summary.temporal.latest_edges, 1);
    let c2 = NodeKey::new(ResourceKind::Condition, "c2");
    let c1 = NodeKey::new(ResourceKind::Condition, "c1");
    assert!(app.store.edge(&c2, RelType::NextCondition, &c1)?.is_some());
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn symlinked_bundles_are_discovered() -> anyhow::Result<()> {
    let app = TestApp::new(test_config());
    let source = tempfile::tempdir()?;
    let dir = tempfile::tempdir()?;
    write_json(source.path(), "real.json", &bundle(vec![patient("p1", "Abe", "Sipes")]))?;
    std::os::unix::fs::symlink(source.path().join("real.json"), dir.path().join("linked.json"))?;
    std::os::unix::fs::symlink(source.path().join("gone.json"), dir.path().join("broken.json"))?;

    let files = app.ingestor().discover(dir.path()).await?;
    assert_eq!(files, [dir.path().join("linked.json")]);

    let summary = app.ingestor().ingest_directory(dir.path()).await?;
    assert_eq!(summary.created.get(&ResourceKind::Patient), Some(&1));
    Ok(())
}

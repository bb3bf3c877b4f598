//! Batch ingestion of a directory of bundle files
//!
//! Files are processed one at a time in file-name order. A file that cannot
//! be read or parsed is recorded and skipped; a store failure stops the batch.
//! Temporal chains are rebuilt once at the end for every touched patient.

use crate::{
    config::IngestConfig,
    graph::{GraphStore, RelType, ResourceKind},
    services::{
        loader::{GraphLoader, LoadReport, LINK_RULES},
        temporal::{TemporalLinker, TemporalSummary},
    },
    Error, Result,
};
use fhirgraph_extract::{extract_bundle, ExtractedBundle};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

/// A file that failed as a whole.
#[derive(Debug, Clone, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub files_found: usize,
    pub files_processed: usize,
    pub failures: Vec<FileFailure>,
    pub created: BTreeMap<ResourceKind, u64>,
    pub duplicates: BTreeMap<ResourceKind, u64>,
    pub relationships: BTreeMap<RelType, u64>,
    /// Entries dropped because the resource was malformed.
    pub skipped_resources: usize,
    /// Entries ignored per unsupported `resourceType`.
    pub unsupported: BTreeMap<String, usize>,
    pub temporal: TemporalSummary,
    pub elapsed_ms: u64,
}

impl IngestSummary {
    fn absorb(&mut self, bundle: &ExtractedBundle, report: &LoadReport) {
        for (kind, n) in &report.created {
            *self.created.entry(*kind).or_default() += n;
        }
        for (kind, n) in &report.duplicates {
            *self.duplicates.entry(*kind).or_default() += n;
        }
        for (rel, n) in &report.relationships {
            *self.relationships.entry(*rel).or_default() += n;
        }
        self.skipped_resources += bundle.skipped.len();
        for (resource_type, n) in &bundle.unsupported {
            *self.unsupported.entry(resource_type.clone()).or_default() += n;
        }
    }

    pub fn nodes_created(&self) -> u64 {
        self.created.values().sum()
    }

    pub fn relationships_created(&self) -> u64 {
        self.relationships.values().sum()
    }
}

/// Node counts per label.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphSummary {
    pub nodes: BTreeMap<ResourceKind, u64>,
    pub total: u64,
}

pub struct BatchIngestor {
    store: Arc<dyn GraphStore>,
    loader: GraphLoader,
    linker: TemporalLinker,
    config: IngestConfig,
}

impl BatchIngestor {
    pub fn new(store: Arc<dyn GraphStore>, config: IngestConfig) -> Self {
        Self {
            loader: GraphLoader::new(store.clone()),
            linker: TemporalLinker::new(store.clone(), config.max_conditions_per_patient),
            store,
            config,
        }
    }

    /// Create the `id` uniqueness constraint for every label, plus the
    /// property indexes used to link shared Practitioner and Organization nodes.
    pub async fn ensure_constraints(&self) -> Result<()> {
        for kind in ResourceKind::ALL {
            self.store.ensure_unique_constraint(kind).await?;
        }
        for rule in LINK_RULES.iter().filter(|rule| rule.backfill) {
            self.store
                .ensure_index(rule.holder_kind(), rule.reference_property)
                .await?;
            if rule.match_property != "id" {
                self.store
                    .ensure_index(rule.other_kind(), rule.match_property)
                    .await?;
            }
        }
        tracing::info!(labels = ResourceKind::ALL.len(), "Uniqueness constraints ready");
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }

    /// Bundle files under `dir` matching the configured extension, sorted.
    pub async fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let io_error = |source: std::io::Error| Error::Io {
            path: dir.to_path_buf(),
            source,
        };
        let extension = self.config.file_extension.trim_start_matches('.');

        let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let path = entry.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
            if !matches {
                continue;
            }
            // Follows symlinks.
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_file() => files.push(path),
                Ok(_) => {}
                Err(error) => tracing::warn!(
                    file = %path.display(),
                    error = %error,
                    "Skipping unreadable directory entry"
                ),
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read, parse and extract one bundle file without touching the store.
    pub async fn extract_file(path: &Path) -> Result<ExtractedBundle> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|source| Error::Json {
                path: path.to_path_buf(),
                source,
            })?;
        extract_bundle(&value).map_err(|source| Error::InvalidBundle {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load one bundle file. Does not rebuild temporal chains.
    pub async fn ingest_file(&self, path: &Path) -> Result<(ExtractedBundle, LoadReport)> {
        let bundle = Self::extract_file(path).await?;
        let report = self.loader.load(&bundle).await?;
        tracing::info!(
            file = %path.display(),
            records = bundle.record_count(),
            skipped = bundle.skipped.len(),
            nodes = report.nodes_created(),
            relationships = report.relationships_created(),
            "Bundle ingested"
        );
        Ok((bundle, report))
    }

    /// Ingest every bundle under `dir`.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestSummary> {
        let started = Instant::now();
        if self.config.clear_before_ingest {
            self.clear().await?;
        }
        self.ensure_constraints().await?;

        let files = self.discover(dir).await?;
        tracing::info!(dir = %dir.display(), files = files.len(), "Starting ingestion");

        let mut summary = IngestSummary {
            files_found: files.len(),
            ..Default::default()
        };
        let mut touched: BTreeSet<String> = BTreeSet::new();

        for path in &files {
            match self.ingest_file(path).await {
                Ok((bundle, report)) => {
                    summary.files_processed += 1;
                    summary.absorb(&bundle, &report);
                    touched.extend(report.touched_patients);
                }
                Err(e) if e.is_file_level() => {
                    tracing::error!(file = %path.display(), error = %e, "Skipping bundle file");
                    summary.failures.push(FileFailure {
                        file: path.clone(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        summary.temporal = self.linker.link_patients(&touched).await?;
        summary.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            files_processed = summary.files_processed,
            files_failed = summary.failures.len(),
            nodes = summary.nodes_created(),
            relationships = summary.relationships_created(),
            next_edges = summary.temporal.next_edges,
            elapsed_ms = summary.elapsed_ms,
            "Ingestion finished"
        );
        Ok(summary)
    }

    pub async fn graph_summary(&self) -> Result<GraphSummary> {
        let mut summary = GraphSummary::default();
        for kind in ResourceKind::ALL {
            let n = self.store.count_nodes(kind).await?;
            summary.nodes.insert(kind, n);
            summary.total += n;
        }
        Ok(summary)
    }
}

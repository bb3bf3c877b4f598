//! Business logic layer
//!
//! Ingestion (loader, temporal linker, batch orchestration) and the
//! read-side patient queries. Every service holds the same
//! `Arc<dyn GraphStore>` handle.

pub mod ingest;
pub mod loader;
pub mod patients;
pub mod temporal;

pub use ingest::{BatchIngestor, FileFailure, GraphSummary, IngestSummary};
pub use loader::{GraphLoader, LoadReport, LINK_RULES};
pub use patients::PatientService;
pub use temporal::{PatientChain, TemporalLinker, TemporalSummary};

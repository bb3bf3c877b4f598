//! fhirgraph: FHIR bundles in, property graph out.
//!
//! Ingestion extracts flat records from bundle files, loads them as labeled
//! nodes, wires reference and temporal relationships, and the HTTP API reads
//! patient data back out of the graph.

pub mod api;
pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

pub use error::{Error, Result};

//! Graph store abstraction
//!
//! The loader, temporal linker and query service only talk to
//! [`GraphStore`]. Two implementations exist: [`Neo4jGraphStore`] for a real
//! database and [`InMemoryGraphStore`] for tests and throwaway runs.

pub mod memory;
pub mod neo4j;

pub use fhirgraph_extract::{Properties, PropertyValue, ResourceKind};
pub use memory::InMemoryGraphStore;
pub use neo4j::Neo4jGraphStore;

use crate::{
    config::{GraphBackend, GraphConfig},
    Result,
};
use async_trait::async_trait;
use serde::Serialize;
use std::{fmt, sync::Arc};

/// Relationship types written to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelType {
    HasEncounter,
    HasObservation,
    RevealedCondition,
    HasCondition,
    TreatmentFor,
    ProcedureForTreatment,
    ProcedureInEncounter,
    HasMedication,
    HasProcedure,
    HasProvider,
    HasServiceProvider,
    RequestedBy,
    FirstCondition,
    LatestCondition,
    NextCondition,
}

impl RelType {
    pub const fn as_str(self) -> &'static str {
        match self {
            RelType::HasEncounter => "HAS_ENCOUNTER",
            RelType::HasObservation => "HAS_OBSERVATION",
            RelType::RevealedCondition => "REVEALED_CONDITION",
            RelType::HasCondition => "HAS_CONDITION",
            RelType::TreatmentFor => "TREATMENT_FOR",
            RelType::ProcedureForTreatment => "PROCEDURE_FOR_TREATMENT",
            RelType::ProcedureInEncounter => "PROCEDURE_IN_ENCOUNTER",
            RelType::HasMedication => "HAS_MEDICATION",
            RelType::HasProcedure => "HAS_PROCEDURE",
            RelType::HasProvider => "HAS_PROVIDER",
            RelType::HasServiceProvider => "HAS_SERVICE_PROVIDER",
            RelType::RequestedBy => "REQUESTED_BY",
            RelType::FirstCondition => "FIRST_CONDITION",
            RelType::LatestCondition => "LATEST_CONDITION",
            RelType::NextCondition => "NEXT_CONDITION",
        }
    }
}

impl fmt::Display for RelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label plus identifier: enough to address exactly one node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    pub kind: ResourceKind,
    pub id: String,
}

impl NodeKey {
    pub fn new(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Which end of a [`LinkRule`] carries the reference property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    Source,
    Target,
}

/// Declarative match-and-create rule.
///
/// For every holder node, each node of the other kind whose `match_property`
/// equals the holder's `reference_property` is linked with a `rel` edge
/// running from `source` to `target`. Holders whose reference points nowhere
/// are left unlinked.
///
/// With `backfill` set the rule is also applied from the other side, so a
/// holder loaded before the node it references is linked once that node
/// arrives.
#[derive(Debug, Clone, Copy)]
pub struct LinkRule {
    pub rel: RelType,
    pub source: ResourceKind,
    pub target: ResourceKind,
    pub holder: Holder,
    pub reference_property: &'static str,
    /// Property of the other node compared against the reference.
    pub match_property: &'static str,
    /// `(edge property, holder property)` copied onto the edge when present.
    pub edge_property: Option<(&'static str, &'static str)>,
    pub backfill: bool,
}

impl LinkRule {
    pub fn holder_kind(&self) -> ResourceKind {
        match self.holder {
            Holder::Source => self.source,
            Holder::Target => self.target,
        }
    }

    pub fn other_kind(&self) -> ResourceKind {
        match self.holder {
            Holder::Source => self.target,
            Holder::Target => self.source,
        }
    }
}

/// An edge between two known nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub from: NodeKey,
    pub rel: RelType,
    pub to: NodeKey,
    pub properties: Properties,
}

/// Outgoing traversal `(from)-[rel]->(:target)`. Results are ordered by `id`.
#[derive(Debug, Clone)]
pub struct Traversal {
    pub from: NodeKey,
    pub rel: RelType,
    pub target: ResourceKind,
}

/// Storage operations needed by ingestion and the query API.
///
/// Write operations are idempotent: nodes are only created for unseen
/// identifiers and edges are never duplicated.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Ensure `id` is unique among nodes labeled `kind`.
    async fn ensure_unique_constraint(&self, kind: ResourceKind) -> Result<()>;

    /// Create one node per property map. Maps whose `id` already exists are
    /// left alone. Returns the number of nodes created.
    async fn create_nodes(&self, kind: ResourceKind, nodes: &[Properties]) -> Result<u64>;

    /// Ensure lookups of `kind` nodes by `property` are indexed.
    async fn ensure_index(&self, kind: ResourceKind, property: &str) -> Result<()>;

    /// Apply a link rule to the given holder nodes. Returns edges created.
    async fn link_by_reference(&self, rule: &LinkRule, holder_ids: &[String]) -> Result<u64>;

    /// Apply a link rule to every holder referencing one of the given nodes
    /// of the rule's other kind. Returns edges created.
    async fn link_referrers(&self, rule: &LinkRule, other_ids: &[String]) -> Result<u64>;

    /// Create an edge between two existing nodes. Returns `false` when an
    /// endpoint is missing or the edge already exists.
    async fn create_edge(&self, edge: &Edge) -> Result<bool>;

    /// Remove all outgoing `rel` edges of `from`. Returns edges removed.
    async fn remove_edges(&self, from: &NodeKey, rel: RelType) -> Result<u64>;

    async fn get_node(&self, key: &NodeKey) -> Result<Option<Properties>>;

    /// A page of nodes of one kind, ordered by `id`.
    async fn list_nodes(&self, kind: ResourceKind, skip: usize, limit: usize)
        -> Result<Vec<Properties>>;

    async fn traverse(&self, traversal: &Traversal) -> Result<Vec<Properties>>;

    async fn count_nodes(&self, kind: ResourceKind) -> Result<u64>;

    async fn count_edges(&self, from: &NodeKey, rel: RelType) -> Result<u64>;

    /// Delete every node and relationship.
    async fn clear(&self) -> Result<()>;

    async fn health_check(&self) -> Result<()>;
}

/// Connect the store selected by `graph.backend`.
pub async fn connect(config: &GraphConfig) -> Result<Arc<dyn GraphStore>> {
    match config.backend {
        GraphBackend::Neo4j => Ok(Arc::new(Neo4jGraphStore::connect(config).await?)),
        GraphBackend::Memory => {
            tracing::warn!("Using the in-memory graph store; data is lost on exit");
            Ok(Arc::new(InMemoryGraphStore::new()))
        }
    }
}

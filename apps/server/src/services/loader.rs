//! Graph loader
//!
//! Turns one extracted bundle into nodes, then wires reference
//! relationships between the nodes it just wrote and whatever already exists
//! in the graph.

use crate::{
    graph::{GraphStore, Holder, LinkRule, Properties, RelType, ResourceKind},
    Result,
};
use fhirgraph_extract::{ExtractedBundle, Record};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    sync::Arc,
};

const fn link(
    rel: RelType,
    source: ResourceKind,
    target: ResourceKind,
    holder: Holder,
    reference_property: &'static str,
) -> LinkRule {
    LinkRule {
        rel,
        source,
        target,
        holder,
        reference_property,
        match_property: "id",
        edge_property: None,
        backfill: false,
    }
}

/// A link to a Practitioner or Organization. Those usually arrive in their own
/// bundles, often after the resources that point at them.
const fn shared(
    rel: RelType,
    source: ResourceKind,
    target: ResourceKind,
    reference_property: &'static str,
    match_property: &'static str,
) -> LinkRule {
    LinkRule {
        match_property,
        backfill: true,
        ..link(rel, source, target, Holder::Source, reference_property)
    }
}

/// Reference relationships, applied in order after all nodes of a bundle
/// exist.
pub static LINK_RULES: &[LinkRule] = &[
    link(
        RelType::HasEncounter,
        ResourceKind::Patient,
        ResourceKind::Encounter,
        Holder::Target,
        "patient_id",
    ),
    link(
        RelType::HasObservation,
        ResourceKind::Encounter,
        ResourceKind::Observation,
        Holder::Target,
        "encounter_id",
    ),
    link(
        RelType::RevealedCondition,
        ResourceKind::Encounter,
        ResourceKind::Condition,
        Holder::Target,
        "encounter_id",
    ),
    LinkRule {
        edge_property: Some(("date", "onsetDateTime")),
        ..link(
            RelType::HasCondition,
            ResourceKind::Patient,
            ResourceKind::Condition,
            Holder::Target,
            "patient_id",
        )
    },
    link(
        RelType::TreatmentFor,
        ResourceKind::MedicationRequest,
        ResourceKind::Condition,
        Holder::Source,
        "reason_id",
    ),
    link(
        RelType::ProcedureForTreatment,
        ResourceKind::Procedure,
        ResourceKind::Condition,
        Holder::Source,
        "reason_id",
    ),
    link(
        RelType::ProcedureInEncounter,
        ResourceKind::Procedure,
        ResourceKind::Encounter,
        Holder::Source,
        "encounter_id",
    ),
    link(
        RelType::HasMedication,
        ResourceKind::Patient,
        ResourceKind::MedicationRequest,
        Holder::Target,
        "patient_id",
    ),
    link(
        RelType::HasProcedure,
        ResourceKind::Patient,
        ResourceKind::Procedure,
        Holder::Target,
        "patient_id",
    ),
    shared(
        RelType::HasProvider,
        ResourceKind::Encounter,
        ResourceKind::Practitioner,
        "provider_id",
        "id",
    ),
    shared(
        RelType::HasProvider,
        ResourceKind::Encounter,
        ResourceKind::Practitioner,
        "provider_identifier",
        "identifier",
    ),
    shared(
        RelType::HasServiceProvider,
        ResourceKind::Encounter,
        ResourceKind::Organization,
        "org_id",
        "id",
    ),
    shared(
        RelType::HasServiceProvider,
        ResourceKind::Encounter,
        ResourceKind::Organization,
        "org_identifier",
        "identifier",
    ),
    shared(
        RelType::RequestedBy,
        ResourceKind::MedicationRequest,
        ResourceKind::Practitioner,
        "requester_id",
        "id",
    ),
    shared(
        RelType::RequestedBy,
        ResourceKind::MedicationRequest,
        ResourceKind::Practitioner,
        "requester_identifier",
        "identifier",
    ),
];

/// What one bundle added to the graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub created: BTreeMap<ResourceKind, u64>,
    pub duplicates: BTreeMap<ResourceKind, u64>,
    pub relationships: BTreeMap<RelType, u64>,
    /// Patients whose condition set may have changed.
    #[serde(skip)]
    pub touched_patients: BTreeSet<String>,
}

impl LoadReport {
    pub fn nodes_created(&self) -> u64 {
        self.created.values().sum()
    }

    pub fn relationships_created(&self) -> u64 {
        self.relationships.values().sum()
    }
}

pub struct GraphLoader {
    store: Arc<dyn GraphStore>,
}

impl GraphLoader {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Write all records of `bundle`, then apply [`LINK_RULES`] to them.
    pub async fn load(&self, bundle: &ExtractedBundle) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut loaded_ids: BTreeMap<ResourceKind, Vec<String>> = BTreeMap::new();

        for kind in ResourceKind::ALL {
            let records = bundle.records_of(kind);
            if records.is_empty() {
                continue;
            }

            // Repeated ids within one bundle: first occurrence wins.
            let mut seen = HashSet::new();
            let unique: Vec<&Record> = records
                .iter()
                .filter(|record| seen.insert(record.id.as_str()))
                .collect();
            let nodes: Vec<Properties> = unique.iter().map(|r| r.properties.clone()).collect();

            let created = self.store.create_nodes(kind, &nodes).await?;
            let duplicates = records.len() as u64 - created;
            if duplicates > 0 {
                tracing::debug!(
                    resource_type = kind.resource_type(),
                    duplicates,
                    "Existing nodes left untouched"
                );
            }
            report.created.insert(kind, created);
            report.duplicates.insert(kind, duplicates);
            loaded_ids.insert(kind, unique.iter().map(|r| r.id.clone()).collect());
        }

        for rule in LINK_RULES {
            let holders = loaded_ids.get(&rule.holder_kind());
            let others = loaded_ids
                .get(&rule.other_kind())
                .filter(|_| rule.backfill);
            if holders.is_none() && others.is_none() {
                continue;
            }

            let mut created = 0;
            if let Some(holder_ids) = holders {
                created += self.store.link_by_reference(rule, holder_ids).await?;
            }
            if let Some(other_ids) = others {
                created += self.store.link_referrers(rule, other_ids).await?;
            }
            *report.relationships.entry(rule.rel).or_default() += created;
        }

        report.touched_patients.extend(
            bundle
                .records_of(ResourceKind::Patient)
                .iter()
                .map(|record| record.id.clone()),
        );
        report.touched_patients.extend(
            bundle
                .records_of(ResourceKind::Condition)
                .iter()
                .filter_map(|record| record.text("patient_id").map(str::to_string)),
        );

        tracing::debug!(
            nodes = report.nodes_created(),
            relationships = report.relationships_created(),
            "Bundle loaded"
        );
        Ok(report)
    }
}

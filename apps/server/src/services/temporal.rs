//! Temporal condition chain
//!
//! For each patient: `FIRST_CONDITION` and `LATEST_CONDITION` from the patient,
//! plus a `NEXT_CONDITION` chain through its conditions in onset order.

use crate::{
    graph::{Edge, GraphStore, NodeKey, Properties, PropertyValue, RelType, ResourceKind, Traversal},
    Result,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::{cmp::Ordering, sync::Arc};

/// A condition reduced to what ordering needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionOnset {
    pub id: String,
    /// Onset as stored on the node.
    pub raw: Option<String>,
    pub onset: Option<DateTime<Utc>>,
}

impl ConditionOnset {
    pub fn from_properties(properties: &Properties) -> Option<Self> {
        let id = properties.get("id").and_then(PropertyValue::as_str)?;
        let raw = properties
            .get("onsetDateTime")
            .and_then(PropertyValue::as_str)
            .map(str::to_string);
        let onset = raw.as_deref().and_then(parse_onset);
        Some(Self {
            id: id.to_string(),
            raw,
            onset,
        })
    }
}

/// Parse a FHIR `dateTime`: full timestamp with offset, naive timestamp
/// (taken as UTC), or a bare date, year-month or year.
pub fn parse_onset(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d"))
        .or_else(|_| NaiveDate::parse_from_str(&format!("{value}-01-01"), "%Y-%m-%d"))
        .ok()?;
    date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc())
}

fn compare_onsets(a: &ConditionOnset, b: &ConditionOnset) -> Ordering {
    let by_onset = match (a.onset, b.onset) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_onset.then_with(|| a.id.cmp(&b.id))
}

/// Sort by onset ascending (undated last, ties by id) and keep at most
/// `cap`. Returns the kept conditions and how many were dropped.
pub fn order_conditions(mut conditions: Vec<ConditionOnset>, cap: usize) -> (Vec<ConditionOnset>, usize) {
    conditions.sort_by(compare_onsets);
    let dropped = conditions.len().saturating_sub(cap);
    conditions.truncate(cap);
    (conditions, dropped)
}

/// Outcome of relinking one patient.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PatientChain {
    pub patient_id: String,
    pub conditions: usize,
    pub first_edge: bool,
    pub latest_edge: bool,
    pub next_edges: u64,
    pub dropped: usize,
}

/// Totals over a batch of patients.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TemporalSummary {
    pub patients: usize,
    pub patients_with_conditions: usize,
    pub first_edges: u64,
    pub latest_edges: u64,
    pub next_edges: u64,
    /// Patients whose chain was capped.
    pub truncated: Vec<PatientChain>,
}

impl TemporalSummary {
    fn record(&mut self, chain: PatientChain) {
        self.patients += 1;
        if chain.conditions > 0 {
            self.patients_with_conditions += 1;
        }
        self.first_edges += u64::from(chain.first_edge);
        self.latest_edges += u64::from(chain.latest_edge);
        self.next_edges += chain.next_edges;
        if chain.dropped > 0 {
            self.truncated.push(chain);
        }
    }
}

pub struct TemporalLinker {
    store: Arc<dyn GraphStore>,
    max_conditions: usize,
}

impl TemporalLinker {
    pub fn new(store: Arc<dyn GraphStore>, max_conditions: usize) -> Self {
        Self {
            store,
            max_conditions,
        }
    }

    /// Rebuild the temporal edges of one patient from its `HAS_CONDITION`
    /// neighbours. Safe to run repeatedly.
    pub async fn link_patient(&self, patient_id: &str) -> Result<PatientChain> {
        let patient = NodeKey::new(ResourceKind::Patient, patient_id);
        let nodes = self
            .store
            .traverse(&Traversal {
                from: patient.clone(),
                rel: RelType::HasCondition,
                target: ResourceKind::Condition,
            })
            .await?;
        let onsets: Vec<ConditionOnset> = nodes.iter().filter_map(ConditionOnset::from_properties).collect();

        self.store.remove_edges(&patient, RelType::FirstCondition).await?;
        self.store.remove_edges(&patient, RelType::LatestCondition).await?;
        for condition in &onsets {
            let key = NodeKey::new(ResourceKind::Condition, condition.id.as_str());
            self.store.remove_edges(&key, RelType::NextCondition).await?;
        }

        let total = onsets.len();
        let (ordered, dropped) = order_conditions(onsets, self.max_conditions);
        if dropped > 0 {
            tracing::warn!(
                patient_id,
                total,
                kept = ordered.len(),
                dropped,
                "Condition chain truncated"
            );
        }

        let mut chain = PatientChain {
            patient_id: patient_id.to_string(),
            conditions: ordered.len(),
            first_edge: false,
            latest_edge: false,
            next_edges: 0,
            dropped,
        };
        let (Some(first), Some(latest)) = (ordered.first(), ordered.last()) else {
            return Ok(chain);
        };

        for (rel, condition) in [(RelType::FirstCondition, first), (RelType::LatestCondition, latest)] {
            let created = self
                .store
                .create_edge(&Edge {
                    from: patient.clone(),
                    rel,
                    to: NodeKey::new(ResourceKind::Condition, condition.id.as_str()),
                    properties: Properties::new(),
                })
                .await?;
            match rel {
                RelType::FirstCondition => chain.first_edge = created,
                _ => chain.latest_edge = created,
            }
        }

        for pair in ordered.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);
            let mut properties = Properties::new();
            if let Some(date) = &next.raw {
                properties.insert("date".to_string(), PropertyValue::from(date.as_str()));
            }
            let created = self
                .store
                .create_edge(&Edge {
                    from: NodeKey::new(ResourceKind::Condition, current.id.as_str()),
                    rel: RelType::NextCondition,
                    to: NodeKey::new(ResourceKind::Condition, next.id.as_str()),
                    properties,
                })
                .await?;
            if created {
                chain.next_edges += 1;
            }
        }

        tracing::debug!(
            patient_id,
            conditions = chain.conditions,
            next_edges = chain.next_edges,
            "Temporal chain linked"
        );
        Ok(chain)
    }

    pub async fn link_patients<'a, I>(&self, patient_ids: I) -> Result<TemporalSummary>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut summary = TemporalSummary::default();
        for patient_id in patient_ids {
            summary.record(self.link_patient(patient_id).await?);
        }
        Ok(summary)
    }
}

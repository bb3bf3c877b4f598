//! Read-side patient queries

use crate::{
    config::ApiConfig,
    graph::{GraphStore, NodeKey, Properties, PropertyValue, RelType, ResourceKind, Traversal},
    models::{EncounterSummary, PatientCounts, PatientDetails, PatientEncounters, PatientSummary},
    services::temporal::parse_onset,
    Error, Result,
};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;

pub struct PatientService {
    store: Arc<dyn GraphStore>,
    default_limit: usize,
    max_limit: usize,
}

impl PatientService {
    pub fn new(store: Arc<dyn GraphStore>, config: &ApiConfig) -> Self {
        Self {
            store,
            default_limit: config.default_limit,
            max_limit: config.max_limit,
        }
    }

    fn resolve_limit(&self, limit: Option<usize>) -> Result<usize> {
        let limit = limit.unwrap_or(self.default_limit);
        if limit == 0 || limit > self.max_limit {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}",
                self.max_limit
            )));
        }
        Ok(limit)
    }

    /// Patients ordered by id, `skip` records in.
    pub async fn list_patients(
        &self,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Vec<PatientSummary>> {
        let limit = self.resolve_limit(limit)?;
        let skip = skip.unwrap_or(0);
        if i64::try_from(skip).is_err() {
            return Err(Error::Validation(format!(
                "skip must not exceed {}",
                i64::MAX
            )));
        }
        let nodes = self
            .store
            .list_nodes(ResourceKind::Patient, skip, limit)
            .await?;
        let patients: Vec<PatientSummary> =
            nodes.iter().filter_map(PatientSummary::from_properties).collect();
        tracing::debug!(count = patients.len(), skip, limit, "Listed patients");
        Ok(patients)
    }

    pub async fn get_patient(&self, id: &str) -> Result<PatientDetails> {
        let key = NodeKey::new(ResourceKind::Patient, id);
        let properties = self
            .store
            .get_node(&key)
            .await?
            .ok_or_else(|| not_found(id))?;

        let counts = PatientCounts {
            encounters: self.store.count_edges(&key, RelType::HasEncounter).await?,
            conditions: self.store.count_edges(&key, RelType::HasCondition).await?,
            medication_requests: self.store.count_edges(&key, RelType::HasMedication).await?,
            procedures: self.store.count_edges(&key, RelType::HasProcedure).await?,
        };

        PatientDetails::from_properties(&properties, counts)
            .ok_or_else(|| Error::Internal(format!("Patient node {id} has no id property")))
    }

    /// Encounters ordered by start instant ascending, id as tie-break.
    /// Encounters without a parseable start come last.
    pub async fn patient_encounters(&self, id: &str) -> Result<PatientEncounters> {
        let key = NodeKey::new(ResourceKind::Patient, id);
        let patient = self
            .store
            .get_node(&key)
            .await?
            .ok_or_else(|| not_found(id))?;

        let mut nodes = self
            .store
            .traverse(&Traversal {
                from: key,
                rel: RelType::HasEncounter,
                target: ResourceKind::Encounter,
            })
            .await?;
        nodes.sort_by(compare_starts);
        let encounters: Vec<EncounterSummary> = nodes
            .iter()
            .filter_map(EncounterSummary::from_properties)
            .collect();

        let fname = patient.get("fname").and_then(PropertyValue::as_str);
        let lname = patient.get("lname").and_then(PropertyValue::as_str);
        let patient_name = match (fname, lname) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        };

        Ok(PatientEncounters {
            patient_id: id.to_string(),
            patient_name,
            total_encounters: encounters.len(),
            encounters,
        })
    }
}

fn encounter_start(properties: &Properties) -> Option<DateTime<Utc>> {
    properties
        .get("encstart")
        .and_then(PropertyValue::as_str)
        .and_then(parse_onset)
}

fn compare_starts(a: &Properties, b: &Properties) -> Ordering {
    let by_start = match (encounter_start(a), encounter_start(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    let id = |p: &Properties| p.get("id").and_then(PropertyValue::as_str).map(str::to_string);
    by_start.then_with(|| id(a).cmp(&id(b)))
}

fn not_found(id: &str) -> Error {
    Error::NotFound(format!("Patient with ID {id} not found"))
}

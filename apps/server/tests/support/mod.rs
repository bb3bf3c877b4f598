//! Shared helpers for integration tests: an app over the in-memory graph
//! store plus small bundle builders.

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use fhirgraph::{
    api::create_router,
    config::{Config, GraphBackend},
    graph::{GraphStore, InMemoryGraphStore},
    services::{BatchIngestor, IngestSummary},
    state::AppState,
};
use serde_json::{json, Value};
use std::{future::Future, path::Path, pin::Pin, sync::Arc};
use tower::ServiceExt;

pub type TestFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.graph.backend = GraphBackend::Memory;
    config
}

#[derive(Clone)]
pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryGraphStore>,
    pub config: Config,
}

impl TestApp {
    pub fn new(config: Config) -> Self {
        let store = Arc::new(InMemoryGraphStore::new());
        let state = AppState::with_store(config.clone(), store.clone());
        Self {
            router: create_router(state),
            store,
            config,
        }
    }

    pub fn ingestor(&self) -> BatchIngestor {
        let store: Arc<dyn GraphStore> = self.store.clone();
        BatchIngestor::new(store, self.config.ingest.clone())
    }

    /// Write bundles into a temporary directory and ingest it.
    pub async fn ingest(&self, bundles: &[Value]) -> anyhow::Result<IngestSummary> {
        let dir = tempfile::tempdir()?;
        for (i, bundle) in bundles.iter().enumerate() {
            write_json(dir.path(), &format!("bundle-{i:03}.json"), bundle)?;
        }
        Ok(self.ingestor().ingest_directory(dir.path()).await?)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        self.request_with_extra_headers(method, uri, body, &[])
            .await
    }

    pub async fn request_with_extra_headers(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        headers: &[(&str, &str)],
    ) -> anyhow::Result<(StatusCode, HeaderMap, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)?
        };
        Ok((status, headers, body))
    }
}

pub async fn with_test_app<F>(f: F) -> anyhow::Result<()>
where
    F: FnOnce(TestApp) -> TestFuture,
{
    with_test_app_config(test_config(), f).await
}

pub async fn with_test_app_config<F>(config: Config, f: F) -> anyhow::Result<()>
where
    F: FnOnce(TestApp) -> TestFuture,
{
    f(TestApp::new(config)).await
}

pub fn assert_status(actual: StatusCode, expected: StatusCode, context: &str) {
    assert_eq!(actual, expected, "unexpected status for {context}");
}

pub fn write_json(dir: &Path, name: &str, value: &Value) -> anyhow::Result<()> {
    std::fs::write(dir.join(name), serde_json::to_vec_pretty(value)?)?;
    Ok(())
}

pub fn bundle(resources: Vec<Value>) -> Value {
    let entries: Vec<Value> = resources
        .into_iter()
        .map(|resource| {
            let id = resource["id"].as_str().unwrap_or_default().to_string();
            json!({ "fullUrl": format!("urn:uuid:{id}"), "resource": resource })
        })
        .collect();
    json!({ "resourceType": "Bundle", "type": "transaction", "entry": entries })
}

pub fn patient(id: &str, given: &str, family: &str) -> Value {
    json!({
        "resourceType": "Patient",
        "id": id,
        "name": [{ "given": [given], "family": family }],
        "gender": "female",
        "birthDate": "1970-03-12",
        "address": [{ "line": ["1 Main St"], "city": "Worcester", "state": "MA" }]
    })
}

pub fn encounter(id: &str, patient_id: &str, start: &str) -> Value {
    json!({
        "resourceType": "Encounter",
        "id": id,
        "status": "finished",
        "class": { "code": "AMB" },
        "type": [{ "text": "General examination" }],
        "subject": { "reference": format!("urn:uuid:{patient_id}") },
        "period": { "start": start, "end": start }
    })
}

pub fn condition(id: &str, patient_id: &str, encounter_id: &str, onset: Option<&str>) -> Value {
    let mut value = json!({
        "resourceType": "Condition",
        "id": id,
        "code": { "coding": [{ "code": "44054006" }], "text": "Diabetes" },
        "subject": { "reference": format!("urn:uuid:{patient_id}") },
        "encounter": { "reference": format!("urn:uuid:{encounter_id}") }
    });
    if let Some(onset) = onset {
        value["onsetDateTime"] = json!(onset);
    }
    value
}

pub fn observation(id: &str, patient_id: &str, encounter_id: &str) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "code": { "coding": [{ "code": "8302-2" }], "text": "Body Height" },
        "valueQuantity": { "value": 172.5, "unit": "cm" },
        "subject": { "reference": format!("urn:uuid:{patient_id}") },
        "encounter": { "reference": format!("urn:uuid:{encounter_id}") }
    })
}

pub fn medication_request(id: &str, patient_id: &str, reason_id: &str) -> Value {
    json!({
        "resourceType": "MedicationRequest",
        "id": id,
        "status": "active",
        "intent": "order",
        "medicationCodeableConcept": { "coding": [{ "code": "860975" }], "text": "Metformin" },
        "subject": { "reference": format!("urn:uuid:{patient_id}") },
        "reasonReference": [{ "reference": format!("urn:uuid:{reason_id}") }]
    })
}

pub fn procedure(id: &str, patient_id: &str, encounter_id: &str, reason_id: &str) -> Value {
    json!({
        "resourceType": "Procedure",
        "id": id,
        "status": "completed",
        "code": { "coding": [{ "code": "430193006" }], "text": "Medication reconciliation" },
        "subject": { "reference": format!("urn:uuid:{patient_id}") },
        "encounter": { "reference": format!("urn:uuid:{encounter_id}") },
        "reasonReference": [{ "reference": format!("urn:uuid:{reason_id}") }],
        "performedPeriod": { "start": "2020-01-01T10:00:00Z", "end": "2020-01-01T10:30:00Z" }
    })
}

pub const NPI_SYSTEM: &str = "http://hl7.org/fhir/sid/us-npi";
pub const SYNTHEA_SYSTEM: &str = "https://github.com/synthetichealth/synthea";

pub fn practitioner(id: &str, npi: &str) -> Value {
    json!({
        "resourceType": "Practitioner",
        "id": id,
        "identifier": [{ "system": NPI_SYSTEM, "value": npi }],
        "name": [{ "family": "House", "given": ["Greg"], "prefix": ["Dr."] }]
    })
}

pub fn organization(id: &str, identifier: &str) -> Value {
    json!({
        "resourceType": "Organization",
        "id": id,
        "identifier": [{ "system": SYNTHEA_SYSTEM, "value": identifier }],
        "name": "General Hospital"
    })
}

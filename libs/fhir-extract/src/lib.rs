//! Flat property extraction from FHIR bundles.
//!
//! Every supported resource type is described by a row of the table in
//! [`rules`]: a fixed list of source paths and the property each one fills.
//! [`extract_resource`] applies one row to one resource and
//! [`extract_bundle`] walks the `entry` list of a bundle, skipping
//! unsupported types and isolating malformed resources so that one bad entry
//! never fails the rest of the bundle.

pub mod path;
pub mod reference;
pub mod rules;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub use reference::{conditional_identifier, identifier_token, reference_id};
pub use rules::{rule_for, FieldRule, ResourceRule, ValueKind, RULES};

/// The resource types that become graph nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Patient,
    Practitioner,
    Organization,
    Encounter,
    Condition,
    Observation,
    MedicationRequest,
    Procedure,
}

impl ResourceKind {
    /// All kinds, in node-loading order.
    pub const ALL: [ResourceKind; 8] = [
        ResourceKind::Patient,
        ResourceKind::Practitioner,
        ResourceKind::Organization,
        ResourceKind::Encounter,
        ResourceKind::Condition,
        ResourceKind::Observation,
        ResourceKind::MedicationRequest,
        ResourceKind::Procedure,
    ];

    /// The FHIR `resourceType` tag, which doubles as the node label.
    pub const fn resource_type(self) -> &'static str {
        match self {
            ResourceKind::Patient => "Patient",
            ResourceKind::Practitioner => "Practitioner",
            ResourceKind::Organization => "Organization",
            ResourceKind::Encounter => "Encounter",
            ResourceKind::Condition => "Condition",
            ResourceKind::Observation => "Observation",
            ResourceKind::MedicationRequest => "MedicationRequest",
            ResourceKind::Procedure => "Procedure",
        }
    }

    pub const fn label(self) -> &'static str {
        self.resource_type()
    }

    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.resource_type() == resource_type)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}

/// A scalar node or edge property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Integer(i) => Some(*i as f64),
            PropertyValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Integer(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::Text(s) => f.write_str(s),
        }
    }
}

/// Flat property map. Absent fields are simply not present.
pub type Properties = BTreeMap<String, PropertyValue>;

/// One extracted resource.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub kind: ResourceKind,
    pub id: String,
    /// All extracted properties, including `id`.
    pub properties: Properties,
}

impl Record {
    pub fn get(&self, property: &str) -> Option<&PropertyValue> {
        self.properties.get(property)
    }

    pub fn text(&self, property: &str) -> Option<&str> {
        self.get(property).and_then(PropertyValue::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("bundle entry has no `resource` object")]
    MissingResource,

    #[error("resource has no `resourceType`")]
    MissingResourceType,

    #[error("{resource_type} resource has no string `id`")]
    MissingId { resource_type: String },

    #[error("{resource_type}/{id}: `{property}` expected {expected} at `{path}`")]
    UnexpectedShape {
        resource_type: String,
        id: String,
        property: &'static str,
        path: String,
        expected: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error("bundle is not a JSON object")]
    NotAnObject,

    #[error("bundle has no `entry` list")]
    MissingEntries,

    #[error("bundle `entry` is not a list")]
    EntriesNotAList,
}

/// Extract one resource.
///
/// Returns `Ok(None)` for resource types without an extraction rule.
pub fn extract_resource(resource: &Value) -> Result<Option<Record>, ExtractError> {
    let object = resource.as_object().ok_or(ExtractError::MissingResource)?;
    let resource_type = object
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or(ExtractError::MissingResourceType)?;

    let Some(rule) = rule_for(resource_type) else {
        return Ok(None);
    };

    let id = object
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ExtractError::MissingId {
            resource_type: resource_type.to_string(),
        })?;

    let mut properties = Properties::new();
    properties.insert("id".to_string(), PropertyValue::from(id));

    for field in rule.fields {
        if let Some(value) = extract_field(resource, field).map_err(|(path, expected)| {
            ExtractError::UnexpectedShape {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                property: field.property,
                path,
                expected,
            }
        })? {
            properties.insert(field.property.to_string(), value);
        }
    }

    Ok(Some(Record {
        kind: rule.kind,
        id: id.to_string(),
        properties,
    }))
}

fn extract_field(
    resource: &Value,
    field: &FieldRule,
) -> Result<Option<PropertyValue>, (String, &'static str)> {
    for source in field.sources {
        let located = path::resolve(resource, source).map_err(|m| (m.path, m.expected))?;
        let Some(value) = located else {
            continue;
        };

        let converted = match (field.kind, value) {
            (ValueKind::Text, Value::String(s)) => Some(PropertyValue::Text(s.clone())),
            (ValueKind::Text, Value::Number(n)) => Some(PropertyValue::Text(n.to_string())),
            (ValueKind::Text, Value::Bool(b)) => Some(PropertyValue::Text(b.to_string())),
            (ValueKind::Text, _) => return Err((path::render(source), "a scalar")),
            (ValueKind::Number, Value::Number(n)) => match n.as_i64() {
                Some(i) => Some(PropertyValue::Integer(i)),
                None => n.as_f64().map(PropertyValue::Float),
            },
            (ValueKind::Number, _) => return Err((path::render(source), "a number")),
            (ValueKind::ReferenceId, Value::String(s)) => {
                reference_id(s).map(PropertyValue::from)
            }
            (ValueKind::ReferenceId, _) => {
                return Err((path::render(source), "a reference string"))
            }
            (ValueKind::ConditionalIdentifier, Value::String(s)) => {
                conditional_identifier(s).map(PropertyValue::from)
            }
            (ValueKind::ConditionalIdentifier, _) => {
                return Err((path::render(source), "a reference string"))
            }
            (ValueKind::Identifier, Value::Object(map)) => {
                let system = map.get("system").and_then(Value::as_str);
                map.get("value")
                    .and_then(Value::as_str)
                    .map(|value| PropertyValue::Text(identifier_token(system, value)))
            }
            (ValueKind::Identifier, _) => return Err((path::render(source), "an identifier")),
        };

        if converted.is_some() {
            return Ok(converted);
        }
    }

    Ok(None)
}

/// A bundle entry that could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedResource {
    pub entry_index: usize,
    pub resource_type: Option<String>,
    pub reason: String,
}

/// Records of one bundle grouped by kind, plus what was left out.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractedBundle {
    pub records: BTreeMap<ResourceKind, Vec<Record>>,
    pub skipped: Vec<SkippedResource>,
    /// Entries of types without an extraction rule, counted by type.
    pub unsupported: BTreeMap<String, usize>,
}

impl ExtractedBundle {
    pub fn records_of(&self, kind: ResourceKind) -> &[Record] {
        self.records.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

/// Extract every supported resource of a bundle.
///
/// Fails only when the bundle itself has the wrong shape. A `Bundle` without
/// `entry` is empty; any other document without `entry` is rejected.
pub fn extract_bundle(bundle: &Value) -> Result<ExtractedBundle, BundleError> {
    let object = bundle.as_object().ok_or(BundleError::NotAnObject)?;

    let entries: &[Value] = match object.get("entry") {
        Some(Value::Array(entries)) => entries.as_slice(),
        Some(_) => return Err(BundleError::EntriesNotAList),
        None if object.get("resourceType").and_then(Value::as_str) == Some("Bundle") => &[],
        None => return Err(BundleError::MissingEntries),
    };

    let mut extracted = ExtractedBundle::default();

    for (entry_index, entry) in entries.iter().enumerate() {
        let resource = entry.get("resource").unwrap_or(&Value::Null);
        let resource_type = resource
            .get("resourceType")
            .and_then(Value::as_str)
            .map(str::to_string);

        match extract_resource(resource) {
            Ok(Some(record)) => extracted
                .records
                .entry(record.kind)
                .or_default()
                .push(record),
            Ok(None) => {
                let tag = resource_type.unwrap_or_default();
                *extracted.unsupported.entry(tag).or_insert(0) += 1;
            }
            Err(error) => {
                tracing::warn!(
                    entry = entry_index,
                    resource_type = resource_type.as_deref().unwrap_or("unknown"),
                    error = %error,
                    "Skipping malformed resource"
                );
                extracted.skipped.push(SkippedResource {
                    entry_index,
                    resource_type,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(extracted)
}

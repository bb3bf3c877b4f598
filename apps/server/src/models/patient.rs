use crate::graph::{Properties, PropertyValue};
use serde::{Deserialize, Serialize};

fn text(properties: &Properties, key: &str) -> Option<String> {
    properties
        .get(key)
        .and_then(PropertyValue::as_str)
        .map(str::to_string)
}

/// Brief patient information for list endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: String,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub gender: Option<String>,
    #[serde(rename = "birthDate")]
    pub birth_date: Option<String>,
}

impl PatientSummary {
    pub fn from_properties(properties: &Properties) -> Option<Self> {
        Some(Self {
            id: text(properties, "id")?,
            fname: text(properties, "fname"),
            lname: text(properties, "lname"),
            gender: text(properties, "gender"),
            birth_date: text(properties, "birthDate"),
        })
    }
}

/// Number of nodes linked to a patient, per relationship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCounts {
    pub encounters: u64,
    pub conditions: u64,
    pub medication_requests: u64,
    pub procedures: u64,
}

/// Complete patient demographics plus linked counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetails {
    pub id: String,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub prefix: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub deceased_date_time: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    pub address_line: Option<String>,
    pub marital_status: Option<String>,
    pub race: Option<String>,
    pub ethnicity: Option<String>,
    pub counts: PatientCounts,
}

impl PatientDetails {
    pub fn from_properties(properties: &Properties, counts: PatientCounts) -> Option<Self> {
        Some(Self {
            id: text(properties, "id")?,
            fname: text(properties, "fname"),
            lname: text(properties, "lname"),
            prefix: text(properties, "prefix"),
            gender: text(properties, "gender"),
            birth_date: text(properties, "birthDate"),
            deceased_date_time: text(properties, "deceasedDateTime"),
            city: text(properties, "city"),
            state: text(properties, "state"),
            postal_code: text(properties, "postalCode"),
            country: text(properties, "country"),
            address_line: text(properties, "addressLine"),
            marital_status: text(properties, "maritalStatus"),
            race: text(properties, "race"),
            ethnicity: text(properties, "ethnicity"),
            counts,
        })
    }
}

/// One visit in a patient's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterSummary {
    pub id: String,
    pub status: Option<String>,
    #[serde(rename = "class")]
    pub encounter_class: Option<String>,
    #[serde(rename = "type")]
    pub encounter_type: Option<String>,
    pub encstart: Option<String>,
    pub encend: Option<String>,
}

impl EncounterSummary {
    pub fn from_properties(properties: &Properties) -> Option<Self> {
        Some(Self {
            id: text(properties, "id")?,
            status: text(properties, "status"),
            encounter_class: text(properties, "class"),
            encounter_type: text(properties, "type"),
            encstart: text(properties, "encstart"),
            encend: text(properties, "encend"),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientEncounters {
    pub patient_id: String,
    /// `"fname lname"` when both are known.
    pub patient_name: Option<String>,
    pub total_encounters: usize,
    pub encounters: Vec<EncounterSummary>,
}

/// `?limit=&skip=` on list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub skip: Option<usize>,
}

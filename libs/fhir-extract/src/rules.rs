//! Per-resource-type extraction table.
//!
//! Each supported resource type maps to an ordered list of
//! `(destination property, source paths, value kind)` rows. A row may list
//! several source paths; the first one that yields a value wins.

use crate::path::Step::{self, Extension, First, Key};
use crate::ResourceKind;

/// How a located JSON value becomes a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Any scalar, stored as text.
    Text,
    /// A JSON number, stored as integer or float.
    Number,
    /// A reference string, stored as the parsed identifier.
    ReferenceId,
    /// A conditional reference string, stored as its `system|value` token.
    ConditionalIdentifier,
    /// An `Identifier` object, stored as its `system|value` token.
    Identifier,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub property: &'static str,
    pub sources: &'static [&'static [Step]],
    pub kind: ValueKind,
}

#[derive(Debug, Clone, Copy)]
pub struct ResourceRule {
    pub kind: ResourceKind,
    pub fields: &'static [FieldRule],
}

const fn text(property: &'static str, sources: &'static [&'static [Step]]) -> FieldRule {
    FieldRule {
        property,
        sources,
        kind: ValueKind::Text,
    }
}

const fn number(property: &'static str, sources: &'static [&'static [Step]]) -> FieldRule {
    FieldRule {
        property,
        sources,
        kind: ValueKind::Number,
    }
}

const fn reference_id(property: &'static str, sources: &'static [&'static [Step]]) -> FieldRule {
    FieldRule {
        property,
        sources,
        kind: ValueKind::ReferenceId,
    }
}

const fn conditional(property: &'static str, sources: &'static [&'static [Step]]) -> FieldRule {
    FieldRule {
        property,
        sources,
        kind: ValueKind::ConditionalIdentifier,
    }
}

const fn identifier(property: &'static str, sources: &'static [&'static [Step]]) -> FieldRule {
    FieldRule {
        property,
        sources,
        kind: ValueKind::Identifier,
    }
}

const SUBJECT: &[Step] = &[Key("subject"), Key("reference")];
const ENCOUNTER: &[Step] = &[Key("encounter"), Key("reference")];
const REASON: &[Step] = &[Key("reasonReference"), First, Key("reference")];
const CODE: &[Step] = &[Key("code"), Key("coding"), First, Key("code")];
const CODE_TEXT: &[Step] = &[Key("code"), Key("text")];
const GIVEN: &[Step] = &[Key("name"), First, Key("given"), First];
const FAMILY: &[Step] = &[Key("name"), First, Key("family")];
const PREFIX: &[Step] = &[Key("name"), First, Key("prefix"), First];
const ADDRESS_LINE: &[Step] = &[Key("address"), First, Key("line"), First];
const ADDRESS_CITY: &[Step] = &[Key("address"), First, Key("city")];
const ADDRESS_STATE: &[Step] = &[Key("address"), First, Key("state")];
const IDENTIFIER: &[Step] = &[Key("identifier"), First];
const PARTICIPANT: &[Step] = &[Key("participant"), First, Key("individual"), Key("reference")];
const SERVICE_PROVIDER: &[Step] = &[Key("serviceProvider"), Key("reference")];
const REQUESTER: &[Step] = &[Key("requester"), Key("reference")];

const PATIENT: &[FieldRule] = &[
    text("fname", &[GIVEN]),
    text("lname", &[FAMILY]),
    text("prefix", &[PREFIX]),
    text("gender", &[&[Key("gender")]]),
    text("birthDate", &[&[Key("birthDate")]]),
    text("deceasedDateTime", &[&[Key("deceasedDateTime")]]),
    text("addressLine", &[ADDRESS_LINE]),
    text("city", &[ADDRESS_CITY]),
    text("state", &[ADDRESS_STATE]),
    text("postalCode", &[&[Key("address"), First, Key("postalCode")]]),
    text("country", &[&[Key("address"), First, Key("country")]]),
    text("maritalStatus", &[&[Key("maritalStatus"), Key("text")]]),
    text(
        "race",
        &[&[
            Extension("us-core-race"),
            Key("extension"),
            First,
            Key("valueCoding"),
            Key("display"),
        ]],
    ),
    text(
        "ethnicity",
        &[&[
            Extension("us-core-ethnicity"),
            Key("extension"),
            First,
            Key("valueCoding"),
            Key("display"),
        ]],
    ),
];

const PRACTITIONER: &[FieldRule] = &[
    text("fname", &[GIVEN]),
    text("lname", &[FAMILY]),
    text("prefix", &[PREFIX]),
    text("gender", &[&[Key("gender")]]),
    identifier("identifier", &[IDENTIFIER]),
];

const ORGANIZATION: &[FieldRule] = &[
    text("name", &[&[Key("name")]]),
    identifier("identifier", &[IDENTIFIER]),
    text(
        "orgtype",
        &[&[Key("type"), First, Key("coding"), First, Key("display")]],
    ),
    text("addressLine", &[ADDRESS_LINE]),
    text("addressCity", &[ADDRESS_CITY]),
    text("addressState", &[ADDRESS_STATE]),
];

const ENCOUNTER_FIELDS: &[FieldRule] = &[
    text("status", &[&[Key("status")]]),
    text("class", &[&[Key("class"), Key("code")]]),
    text("type", &[&[Key("type"), First, Key("text")]]),
    text("encstart", &[&[Key("period"), Key("start")]]),
    text("encend", &[&[Key("period"), Key("end")]]),
    text("patient_ref", &[SUBJECT]),
    reference_id("patient_id", &[SUBJECT]),
    text("provider_ref", &[PARTICIPANT]),
    reference_id("provider_id", &[PARTICIPANT]),
    conditional("provider_identifier", &[PARTICIPANT]),
    text("org_ref", &[SERVICE_PROVIDER]),
    reference_id("org_id", &[SERVICE_PROVIDER]),
    conditional("org_identifier", &[SERVICE_PROVIDER]),
];

const CONDITION: &[FieldRule] = &[
    text(
        "clinicalStatus",
        &[&[Key("clinicalStatus"), Key("coding"), First, Key("code")]],
    ),
    text(
        "verificationStatus",
        &[&[Key("verificationStatus"), Key("coding"), First, Key("code")]],
    ),
    text("code", &[CODE]),
    text("display", &[CODE_TEXT]),
    text("onsetDateTime", &[&[Key("onsetDateTime")]]),
    text("recordedDate", &[&[Key("recordedDate")]]),
    text("patient_ref", &[SUBJECT]),
    reference_id("patient_id", &[SUBJECT]),
    text("encounter_ref", &[ENCOUNTER]),
    reference_id("encounter_id", &[ENCOUNTER]),
];

const OBSERVATION: &[FieldRule] = &[
    text("status", &[&[Key("status")]]),
    text(
        "category",
        &[&[Key("category"), First, Key("coding"), First, Key("display")]],
    ),
    text("code", &[CODE]),
    text("display", &[CODE_TEXT]),
    text("effectiveDateTime", &[&[Key("effectiveDateTime")]]),
    number("value", &[&[Key("valueQuantity"), Key("value")]]),
    text("unit", &[&[Key("valueQuantity"), Key("unit")]]),
    text("valueString", &[&[Key("valueString")]]),
    text("valueCode", &[&[Key("valueCodeableConcept"), Key("text")]]),
    text("patient_ref", &[SUBJECT]),
    reference_id("patient_id", &[SUBJECT]),
    text("encounter_ref", &[ENCOUNTER]),
    reference_id("encounter_id", &[ENCOUNTER]),
];

const MEDICATION_REQUEST: &[FieldRule] = &[
    text("status", &[&[Key("status")]]),
    text("intent", &[&[Key("intent")]]),
    text(
        "medicationCode",
        &[&[
            Key("medicationCodeableConcept"),
            Key("coding"),
            First,
            Key("code"),
        ]],
    ),
    text(
        "medicationDisplay",
        &[&[Key("medicationCodeableConcept"), Key("text")]],
    ),
    text("authoredOn", &[&[Key("authoredOn")]]),
    text("patient_ref", &[SUBJECT]),
    reference_id("patient_id", &[SUBJECT]),
    text("encounter_ref", &[ENCOUNTER]),
    reference_id("encounter_id", &[ENCOUNTER]),
    text("requester_ref", &[REQUESTER]),
    reference_id("requester_id", &[REQUESTER]),
    conditional("requester_identifier", &[REQUESTER]),
    text("reason_ref", &[REASON]),
    reference_id("reason_id", &[REASON]),
];

const PROCEDURE: &[FieldRule] = &[
    text("status", &[&[Key("status")]]),
    text("code", &[CODE]),
    text("display", &[CODE_TEXT]),
    text(
        "performedStart",
        &[
            &[Key("performedPeriod"), Key("start")],
            &[Key("performedDateTime")],
        ],
    ),
    text("performedEnd", &[&[Key("performedPeriod"), Key("end")]]),
    text("patient_ref", &[SUBJECT]),
    reference_id("patient_id", &[SUBJECT]),
    text("encounter_ref", &[ENCOUNTER]),
    reference_id("encounter_id", &[ENCOUNTER]),
    text("reason_ref", &[REASON]),
    reference_id("reason_id", &[REASON]),
];

/// The extraction table, one row per supported resource type.
pub static RULES: &[ResourceRule] = &[
    ResourceRule {
        kind: ResourceKind::Patient,
        fields: PATIENT,
    },
    ResourceRule {
        kind: ResourceKind::Practitioner,
        fields: PRACTITIONER,
    },
    ResourceRule {
        kind: ResourceKind::Organization,
        fields: ORGANIZATION,
    },
    ResourceRule {
        kind: ResourceKind::Encounter,
        fields: ENCOUNTER_FIELDS,
    },
    ResourceRule {
        kind: ResourceKind::Condition,
        fields: CONDITION,
    },
    ResourceRule {
        kind: ResourceKind::Observation,
        fields: OBSERVATION,
    },
    ResourceRule {
        kind: ResourceKind::MedicationRequest,
        fields: MEDICATION_REQUEST,
    },
    ResourceRule {
        kind: ResourceKind::Procedure,
        fields: PROCEDURE,
    },
];

/// Look up the extraction rule for a resource type tag.
pub fn rule_for(resource_type: &str) -> Option<&'static ResourceRule> {
    RULES
        .iter()
        .find(|rule| rule.kind.resource_type() == resource_type)
}

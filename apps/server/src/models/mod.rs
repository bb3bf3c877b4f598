//! Response and query models for the HTTP API

mod patient;

pub use patient::{
    EncounterSummary, Pagination, PatientCounts, PatientDetails, PatientEncounters, PatientSummary,
};

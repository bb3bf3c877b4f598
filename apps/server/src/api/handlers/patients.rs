//! Patient read handlers

use crate::{models::Pagination, state::AppState, Result};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// List patients ordered by id
pub async fn list_patients(
    State(state): State<AppState>,
    page: std::result::Result<Query<Pagination>, QueryRejection>,
) -> Result<Response> {
    let Query(page) = page?;
    let patients = state
        .patient_service
        .list_patients(page.limit, page.skip)
        .await?;
    Ok((StatusCode::OK, Json(patients)).into_response())
}

/// Patient demographics plus linked counts
pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let patient = state.patient_service.get_patient(&id).await?;
    Ok((StatusCode::OK, Json(patient)).into_response())
}

/// Encounter history, oldest first
pub async fn get_patient_encounters(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let encounters = state.patient_service.patient_encounters(&id).await?;
    Ok((StatusCode::OK, Json(encounters)).into_response())
}

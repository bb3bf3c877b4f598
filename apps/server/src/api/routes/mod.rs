use crate::api::handlers::{patients, system};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn system_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(system::root))
        .route("/health", get(system::health))
}

pub fn patient_routes() -> Router<AppState> {
    Router::new()
        .route("/patients", get(patients::list_patients))
        .route("/patients/:id", get(patients::get_patient))
        .route(
            "/patients/:id/encounters",
            get(patients::get_patient_encounters),
        )
}

//! Shared application state

use crate::{
    config::Config,
    graph::{self, GraphStore},
    services::PatientService,
    Result,
};
use std::sync::Arc;

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn GraphStore>,
    pub patient_service: Arc<PatientService>,
}

impl AppState {
    /// Connect the configured graph store and build services over it.
    pub async fn new(config: Config) -> Result<Self> {
        let store = graph::connect(&config.graph).await?;
        Ok(Self::with_store(config, store))
    }

    /// Build state over an existing store handle.
    pub fn with_store(config: Config, store: Arc<dyn GraphStore>) -> Self {
        let patient_service = Arc::new(PatientService::new(store.clone(), &config.api));
        Self {
            config: Arc::new(config),
            store,
            patient_service,
        }
    }
}

//! Shared application state handed to every handler

use std::sync::Arc;

use crate::{
    clock::{Clock, SystemClock},
    config::{Config, DatabaseBackend},
    db::{MemoryStore, PostgresStore, Store},
    services::{AwardeeService, ParticipantService, PhysicalMeasurementsService, QuestionnaireService},
    Result,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub participant_service: Arc<ParticipantService>,
    pub physical_measurements_service: Arc<PhysicalMeasurementsService>,
    pub questionnaire_service: Arc<QuestionnaireService>,
    pub awardee_service: Arc<AwardeeService>,
}

impl AppState {
    /// Connect the configured backend, apply migrations when enabled and wire the services
    pub async fn new(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = match config.database.backend {
            DatabaseBackend::Postgres => {
                let store = PostgresStore::connect(&config.database).await?;
                if config.database.run_migrations {
                    tracing::info!("Running database migrations");
                    store.run_migrations().await?;
                }
                Arc::new(store)
            }
            DatabaseBackend::Memory => {
                tracing::warn!("Using the in-memory store; data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::with_store(config, store, Arc::new(SystemClock)))
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        let participant_service = Arc::new(ParticipantService::new(
            store.clone(),
            clock.clone(),
            &config.enrollment,
        ));
        let physical_measurements_service = Arc::new(PhysicalMeasurementsService::new(
            store.clone(),
            clock.clone(),
            &config.enrollment,
            &config.sync,
        ));
        let questionnaire_service = Arc::new(QuestionnaireService::new(store.clone()));
        let awardee_service = Arc::new(AwardeeService::new(store.clone()));

        Self {
            config: Arc::new(config),
            store,
            clock,
            participant_service,
            physical_measurements_service,
            questionnaire_service,
            awardee_service,
        }
    }
}

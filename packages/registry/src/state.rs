use std::sync::Arc;

use common::retry::RetryPolicy;
use common::storage::http::HttpStorageVerifier;
use sea_orm::DatabaseConnection;

use crate::analysis::{AnalysisService, Collaborators, LifecycleOptions};
use crate::config::AppConfig;
use crate::error::RegistryError;
use crate::ids::UuidAllocator;
use crate::schema::{SchemaRegistry, VersionPolicy};
use crate::study::DbStudyDirectory;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DatabaseConnection,
    pub schemas: Arc<SchemaRegistry>,
    pub analyses: AnalysisService,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        config: AppConfig,
        collaborators: Collaborators,
    ) -> Result<Self, RegistryError> {
        let schemas = Arc::new(SchemaRegistry::new(
            config.schema.cache_size,
            config.schema.register_attempts,
        ));
        let policy = Arc::new(VersionPolicy::from_config(&config.validation)?);
        let options = LifecycleOptions {
            storage_retry: RetryPolicy::from(&config.storage),
            resolver_attempts: config.resolver.max_attempts,
        };
        let analyses = AnalysisService::new(
            db.clone(),
            schemas.clone(),
            policy,
            collaborators,
            options,
        );
        Ok(Self {
            config,
            db,
            schemas,
            analyses,
        })
    }

    /// Production wiring: HTTP storage, UUID ids and studies from the database.
    pub fn from_config(db: DatabaseConnection, config: AppConfig) -> Result<Self, RegistryError> {
        let storage = HttpStorageVerifier::new(&config.storage)
            .map_err(|e| RegistryError::Internal(format!("storage client: {e}")))?;
        let collaborators = Collaborators {
            ids: Arc::new(UuidAllocator),
            studies: Arc::new(DbStudyDirectory::new(db.clone())),
            storage: Arc::new(storage),
        };
        Self::new(db, config, collaborators)
    }
}

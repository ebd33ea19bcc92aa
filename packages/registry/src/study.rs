use async_trait::async_trait;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};

use crate::entity::study;
use crate::error::RegistryError;

/// Read access to studies, which are managed elsewhere.
#[async_trait]
pub trait StudyDirectory: Send + Sync {
    async fn exists(&self, study_id: &str) -> Result<bool, RegistryError>;
}

/// [`StudyDirectory`] over the `study` table.
#[derive(Clone)]
pub struct DbStudyDirectory {
    db: DatabaseConnection,
}

impl DbStudyDirectory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StudyDirectory for DbStudyDirectory {
    async fn exists(&self, study_id: &str) -> Result<bool, RegistryError> {
        let count = study::Entity::find()
            .filter(study::Column::Id.eq(study_id))
            .count(&self.db)
            .await?;
        Ok(count > 0)
    }
}

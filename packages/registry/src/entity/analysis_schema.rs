use common::AnalysisTypeRef;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One immutable version of an analysis type.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analysis_schema")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique_key = "name_version")]
    pub name: String,
    #[sea_orm(unique_key = "name_version")]
    pub version: i32,

    /// Type-specific schema as registered, before merging with the payload envelope.
    #[sea_orm(column_type = "JsonBinary")]
    pub schema: serde_json::Value,

    pub created_at: DateTimeUtc,
}

impl Model {
    pub fn type_ref(&self) -> AnalysisTypeRef {
        AnalysisTypeRef::new(self.name.clone(), self.version)
    }
}

impl ActiveModelBehavior for ActiveModel {}

use common::AnalysisState;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Analysis aggregate root. Points at its schema version and data blob by id; state changes,
/// files and sample links point back at it by id only.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analysis")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub study_id: String,

    pub analysis_schema_id: i32,

    #[sea_orm(unique)]
    pub analysis_data_id: i32,

    pub state: AnalysisState,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

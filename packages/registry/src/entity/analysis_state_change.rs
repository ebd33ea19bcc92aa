use common::AnalysisState;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Append-only audit row. Never updated or deleted.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analysis_state_change")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(indexed)]
    pub analysis_id: String,

    pub initial_state: AnalysisState,
    pub updated_state: AnalysisState,

    pub updated_at: DateTimeUtc,
}

impl ActiveModelBehavior for ActiveModel {}

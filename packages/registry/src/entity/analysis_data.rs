use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Experiment-specific part of an analysis, stored as validated but otherwise opaque JSON.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analysis_data")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(column_type = "JsonBinary")]
    pub data: serde_json::Value,
}

impl ActiveModelBehavior for ActiveModel {}

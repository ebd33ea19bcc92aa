use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sample")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique_key = "specimen_submitter_sample")]
    pub specimen_id: String,
    #[sea_orm(unique_key = "specimen_submitter_sample")]
    pub submitter_sample_id: String,

    pub sample_type: String,
    pub matched_normal_submitter_sample_id: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub info: Option<serde_json::Value>,
}

impl ActiveModelBehavior for ActiveModel {}

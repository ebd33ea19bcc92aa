use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "donor")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique_key = "study_submitter_donor")]
    pub study_id: String,
    #[sea_orm(unique_key = "study_submitter_donor")]
    pub submitter_donor_id: String,

    pub gender: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub info: Option<serde_json::Value>,
}

impl ActiveModelBehavior for ActiveModel {}

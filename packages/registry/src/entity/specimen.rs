use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "specimen")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(unique_key = "donor_submitter_specimen")]
    pub donor_id: String,
    #[sea_orm(unique_key = "donor_submitter_specimen")]
    pub submitter_specimen_id: String,

    pub specimen_type: String,
    pub specimen_tissue_source: String,
    pub tumour_normal_designation: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub info: Option<serde_json::Value>,
}

impl ActiveModelBehavior for ActiveModel {}

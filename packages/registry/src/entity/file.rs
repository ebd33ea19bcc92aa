use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A file belonging to one analysis. `id` doubles as the object id in object storage.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "file")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    #[sea_orm(indexed)]
    pub analysis_id: String,
    #[sea_orm(indexed)]
    pub study_id: String,

    pub name: String,
    pub size: i64,
    pub md5: Option<String>,
    /// "open" or "controlled".
    pub access: String,
    pub file_type: String,
    pub data_type: Option<String>,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub info: Option<serde_json::Value>,

    pub position: i32,
}

impl ActiveModelBehavior for ActiveModel {}

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Analysis to sample association.
#[sea_orm::model]
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sample_set")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub analysis_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub sample_id: String,

    /// Order of first appearance in the submitted payload.
    pub position: i32,
}

impl ActiveModelBehavior for ActiveModel {}

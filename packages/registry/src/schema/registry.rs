use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use common::AnalysisTypeId;
use common::analysis_type::{validate_name, validate_registrable_name, validate_version};
use jsonschema::Validator;
use lru::LruCache;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::render::{check_registrable, render};
use super::validator::ValidationMode;
use crate::entity::analysis_schema;
use crate::error::RegistryError;
use crate::models::Pagination;

type CacheKey = (String, i32, ValidationMode);

/// An analysis type as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisType {
    pub name: String,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

/// Filters for [`SchemaRegistry::list`].
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub names: Vec<String>,
    pub versions: Vec<i32>,
    pub page: u64,
    pub per_page: u64,
    pub hide_schema: bool,
    pub unrendered_only: bool,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            versions: Vec::new(),
            page: 1,
            per_page: 20,
            hide_schema: false,
            unrendered_only: false,
        }
    }
}

/// Versioned analysis type schemas.
///
/// Registered schemas never change, so compiled validators are cached per
/// `(name, version, mode)` for the life of the registry.
pub struct SchemaRegistry {
    cache: Mutex<LruCache<CacheKey, Arc<Validator>>>,
    register_attempts: u32,
}

impl SchemaRegistry {
    pub fn new(cache_size: usize, register_attempts: u32) -> Self {
        let capacity = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            register_attempts: register_attempts.max(1),
        }
    }

    /// Store `schema` as the next version of `name`.
    ///
    /// The version is claimed with an insert that ignores `(name, version)` conflicts, so a
    /// concurrent registration that took the same number makes this one retry with the next.
    #[instrument(skip(self, conn, schema))]
    pub async fn register<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        schema: Value,
    ) -> Result<analysis_schema::Model, RegistryError> {
        validate_registrable_name(name)?;
        check_registrable(&schema)?;

        for attempt in 1..=self.register_attempts {
            let version = self.latest_version(conn, name).await?.unwrap_or(0) + 1;
            let model = analysis_schema::ActiveModel {
                name: Set(name.to_string()),
                version: Set(version),
                schema: Set(schema.clone()),
                created_at: Set(Utc::now()),
                ..Default::default()
            };

            let result = analysis_schema::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        analysis_schema::Column::Name,
                        analysis_schema::Column::Version,
                    ])
                    .do_nothing()
                    .to_owned(),
                )
                .exec_without_returning(conn)
                .await;

            match result {
                Ok(n) if n > 0 => {
                    let entry = find_version(conn, name, version).await?.ok_or_else(|| {
                        RegistryError::Internal(format!("{name}:{version} missing after insert"))
                    })?;
                    info!(analysis_type = %entry.type_ref(), "Registered analysis type");
                    return Ok(entry);
                }
                Ok(_) | Err(DbErr::RecordNotInserted) => {
                    debug!(attempt, version, "Version already claimed, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistryError::Internal(format!(
            "could not claim a version for '{name}' after {} attempts",
            self.register_attempts
        )))
    }

    pub async fn latest_version<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
    ) -> Result<Option<i32>, RegistryError> {
        Ok(self.latest(conn, name).await?.map(|m| m.version))
    }

    pub async fn latest<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
    ) -> Result<Option<analysis_schema::Model>, RegistryError> {
        Ok(analysis_schema::Entity::find()
            .filter(analysis_schema::Column::Name.eq(name))
            .order_by_desc(analysis_schema::Column::Version)
            .one(conn)
            .await?)
    }

    /// Resolve `name` at `version`, or at its latest version when `version` is `None`.
    pub async fn resolve<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        version: Option<i32>,
    ) -> Result<analysis_schema::Model, RegistryError> {
        validate_name(name)?;
        if let Some(v) = version {
            validate_version(v)?;
        }

        let latest = self
            .latest(conn, name)
            .await?
            .ok_or_else(|| RegistryError::UnknownAnalysisType(name.to_string()))?;

        match version {
            None => Ok(latest),
            Some(v) if v == latest.version => Ok(latest),
            Some(v) => find_version(conn, name, v).await?.ok_or_else(|| {
                RegistryError::UnknownAnalysisTypeVersion {
                    name: name.to_string(),
                    version: v,
                    latest: latest.version,
                }
            }),
        }
    }

    pub async fn resolve_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: &AnalysisTypeId,
    ) -> Result<analysis_schema::Model, RegistryError> {
        self.resolve(conn, &id.name, id.version).await
    }

    /// Look up a version by its row id, as referenced from an analysis.
    pub async fn find_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        schema_id: i32,
    ) -> Result<analysis_schema::Model, RegistryError> {
        analysis_schema::Entity::find_by_id(schema_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                RegistryError::Internal(format!("analysis schema {schema_id} is missing"))
            })
    }

    /// The type with either its registered schema or the schema payloads are validated against.
    pub async fn get_analysis_type<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        version: Option<i32>,
        unrendered_only: bool,
    ) -> Result<AnalysisType, RegistryError> {
        let entry = self.resolve(conn, name, version).await?;
        Ok(to_analysis_type(entry, false, unrendered_only))
    }

    pub async fn list<C: ConnectionTrait>(
        &self,
        conn: &C,
        query: &ListQuery,
    ) -> Result<(Vec<AnalysisType>, Pagination), RegistryError> {
        for name in &query.names {
            validate_name(name)?;
        }
        let bad: Vec<String> = query
            .versions
            .iter()
            .filter(|v| **v < 1)
            .map(ToString::to_string)
            .collect();
        if !bad.is_empty() {
            return Err(RegistryError::MalformedParameter(format!(
                "Analysis type versions must be greater than 0, found: {}",
                bad.join(", ")
            )));
        }

        let mut select = analysis_schema::Entity::find();
        if !query.names.is_empty() {
            select = select.filter(analysis_schema::Column::Name.is_in(query.names.clone()));
        }
        if !query.versions.is_empty() {
            select =
                select.filter(analysis_schema::Column::Version.is_in(query.versions.clone()));
        }

        let per_page = query.per_page.max(1);
        let page = query.page.max(1);
        let total = select.clone().count(conn).await?;
        let rows = select
            .order_by_asc(analysis_schema::Column::Name)
            .order_by_asc(analysis_schema::Column::Version)
            .offset((page - 1) * per_page)
            .limit(per_page)
            .all(conn)
            .await?;

        let items = rows
            .into_iter()
            .map(|m| to_analysis_type(m, query.hide_schema, query.unrendered_only))
            .collect();
        Ok((items, Pagination::new(page, per_page, total)))
    }

    /// Compiled validator for `entry` in the given mode.
    pub fn validator(
        &self,
        entry: &analysis_schema::Model,
        mode: ValidationMode,
    ) -> Result<Arc<Validator>, RegistryError> {
        let key = (entry.name.clone(), entry.version, mode);
        if let Some(hit) = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(hit.clone());
        }

        let compiled = jsonschema::validator_for(&render(&entry.schema, mode)).map_err(|e| {
            RegistryError::MalformedSchema(format!("{}: {e}", entry.type_ref()))
        })?;
        let compiled = Arc::new(compiled);
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, compiled.clone());
        Ok(compiled)
    }
}

async fn find_version<C: ConnectionTrait>(
    conn: &C,
    name: &str,
    version: i32,
) -> Result<Option<analysis_schema::Model>, DbErr> {
    analysis_schema::Entity::find()
        .filter(analysis_schema::Column::Name.eq(name))
        .filter(analysis_schema::Column::Version.eq(version))
        .one(conn)
        .await
}

fn to_analysis_type(
    entry: analysis_schema::Model,
    hide_schema: bool,
    unrendered_only: bool,
) -> AnalysisType {
    let schema = if hide_schema {
        None
    } else if unrendered_only {
        Some(entry.schema)
    } else {
        Some(render(&entry.schema, ValidationMode::Create))
    };
    AnalysisType {
        name: entry.name,
        version: entry.version,
        created_at: entry.created_at,
        schema,
    }
}

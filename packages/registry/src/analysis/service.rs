use std::sync::Arc;

use chrono::Utc;
use common::AnalysisState;
use common::payload::{Payload, analysis_type_of};
use common::retry::RetryPolicy;
use common::storage::StorageVerifier;
use sea_orm::sea_query::{LockType, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use super::model::{Analysis, AnalysisHeader, AnalysisView, StateTransition, published_bounds};
use super::patch::merge_patch;
use super::verify::verify_files;
use crate::composite::{CompositeEntityResolver, lock_order};
use crate::entity::{analysis, analysis_data, analysis_schema, analysis_state_change, file, sample_set};
use crate::error::RegistryError;
use crate::ids::{EntityKind, IdAllocator};
use crate::models::Pagination;
use crate::schema::{PayloadValidator, SchemaRegistry, ValidationError, ValidationErrors, VersionPolicy};
use crate::study::StudyDirectory;

/// External systems the lifecycle service depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub ids: Arc<dyn IdAllocator>,
    pub studies: Arc<dyn StudyDirectory>,
    pub storage: Arc<dyn StorageVerifier>,
}

#[derive(Debug, Clone, Copy)]
pub struct LifecycleOptions {
    /// Timeout and retries for each storage call during publish.
    pub storage_retry: RetryPolicy,
    /// Lookup/insert rounds per business key in the entity resolver.
    pub resolver_attempts: u32,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            storage_retry: RetryPolicy::default(),
            resolver_attempts: 3,
        }
    }
}

/// Creates, updates and moves analyses through UNPUBLISHED, PUBLISHED and SUPPRESSED.
///
/// Every state change locks the analysis row and appends an audit record in the same
/// transaction, so recorded initial states always match the state they replaced.
#[derive(Clone)]
pub struct AnalysisService {
    db: DatabaseConnection,
    schemas: Arc<SchemaRegistry>,
    policy: Arc<VersionPolicy>,
    collaborators: Collaborators,
    options: LifecycleOptions,
}

impl AnalysisService {
    pub fn new(
        db: DatabaseConnection,
        schemas: Arc<SchemaRegistry>,
        policy: Arc<VersionPolicy>,
        collaborators: Collaborators,
        options: LifecycleOptions,
    ) -> Self {
        Self {
            db,
            schemas,
            policy,
            collaborators,
            options,
        }
    }

    fn validator(&self) -> PayloadValidator<'_> {
        PayloadValidator::new(&self.schemas, &self.policy)
    }

    fn resolver<'a, C: ConnectionTrait>(&'a self, conn: &'a C) -> CompositeEntityResolver<'a, C> {
        CompositeEntityResolver::new(
            conn,
            self.collaborators.ids.as_ref(),
            self.options.resolver_attempts,
        )
    }

    /// Validate and persist a new analysis. Returns its id.
    #[instrument(skip(self, payload))]
    pub async fn create(&self, study_id: &str, payload: Value) -> Result<String, RegistryError> {
        if !self.collaborators.studies.exists(study_id).await? {
            return Err(RegistryError::UnknownStudy(study_id.to_string()));
        }

        let type_id = analysis_type_of(&payload).ok_or_else(|| {
            RegistryError::MalformedParameter(
                "The payload must name an analysisType with at least a name".to_string(),
            )
        })?;
        let entry = self
            .validator()
            .validate_for_create(&self.db, &payload, &type_id)
            .await?;

        let payload: Payload = serde_json::from_value(payload).map_err(|e| {
            RegistryError::SchemaViolation(ValidationErrors::from(vec![ValidationError::new(
                "",
                e.to_string(),
            )]))
        })?;
        if let Some(claimed) = &payload.study_id {
            if claimed != study_id {
                return Err(RegistryError::StudyIdMismatch {
                    payload: claimed.clone(),
                    target: study_id.to_string(),
                });
            }
        }

        let analysis_id = self.collaborators.ids.new_id(EntityKind::Analysis);
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let data = analysis_data::ActiveModel {
            data: Set(Value::Object(payload.data.clone())),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        analysis::ActiveModel {
            id: Set(analysis_id.clone()),
            study_id: Set(study_id.to_string()),
            analysis_schema_id: Set(entry.id),
            analysis_data_id: Set(data.id),
            state: Set(AnalysisState::Unpublished),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let resolver = self.resolver(&txn);
        for position in lock_order(&payload.samples) {
            let resolved = resolver
                .resolve_sample(study_id, &payload.samples[position])
                .await?;
            let link = sample_set::ActiveModel {
                analysis_id: Set(analysis_id.clone()),
                sample_id: Set(resolved.sample_id),
                position: Set(position as i32),
            };
            let result = sample_set::Entity::insert(link)
                .on_conflict(
                    OnConflict::columns([sample_set::Column::AnalysisId, sample_set::Column::SampleId])
                        .do_nothing()
                        .to_owned(),
                )
                .exec_without_returning(&txn)
                .await;
            match result {
                Ok(_) | Err(DbErr::RecordNotInserted) => {}
                Err(e) => return Err(e.into()),
            }
        }

        for (position, submitted) in payload.files.iter().enumerate() {
            file::ActiveModel {
                id: Set(self.collaborators.ids.new_id(EntityKind::File)),
                analysis_id: Set(analysis_id.clone()),
                study_id: Set(study_id.to_string()),
                name: Set(submitted.file_name.clone()),
                size: Set(submitted.file_size),
                md5: Set(submitted.file_md5sum.clone()),
                access: Set(submitted.file_access.clone()),
                file_type: Set(submitted.file_type.clone()),
                data_type: Set(submitted.data_type.clone()),
                info: Set(submitted.info.clone()),
                position: Set(position as i32),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;

        info!(
            analysis_id = %analysis_id,
            analysis_type = %entry.type_ref(),
            samples = payload.samples.len(),
            files = payload.files.len(),
            "Created analysis"
        );
        Ok(analysis_id)
    }

    /// Switch the analysis to the type named in `patch` and replace its data with the rest of
    /// `patch`. Samples and files are left alone.
    #[instrument(skip(self, patch))]
    pub async fn update_analysis(
        &self,
        study_id: &str,
        analysis_id: &str,
        patch: Value,
    ) -> Result<analysis_schema::Model, RegistryError> {
        self.check_analysis_and_study_related(study_id, analysis_id)
            .await?;

        let type_id = analysis_type_of(&patch).ok_or_else(|| {
            RegistryError::MalformedParameter(
                "The update must name an analysisType with at least a name".to_string(),
            )
        })?;
        let entry = self
            .validator()
            .validate_for_update(&self.db, &patch, &type_id)
            .await?;

        let data = strip_analysis_type(patch);
        self.store_update(study_id, analysis_id, &entry, data).await?;
        Ok(entry)
    }

    /// Apply a JSON merge patch to the analysis data, keeping its current type.
    #[instrument(skip(self, merge))]
    pub async fn patch_analysis(
        &self,
        study_id: &str,
        analysis_id: &str,
        merge: Value,
    ) -> Result<analysis_schema::Model, RegistryError> {
        let row = self
            .check_analysis_and_study_related(study_id, analysis_id)
            .await?;
        if merge.get("analysisType").is_some() {
            return Err(RegistryError::MalformedParameter(
                "A patch cannot change the analysisType; use a full update instead".to_string(),
            ));
        }

        let current = self.schemas.find_by_id(&self.db, row.analysis_schema_id).await?;
        let data = self.load_data(&self.db, &row).await?;

        let mut document = Value::Object(data);
        merge_patch(&mut document, &merge);
        if let Value::Object(map) = &mut document {
            map.insert(
                "analysisType".to_string(),
                json!({"name": current.name, "version": current.version}),
            );
        }

        let entry = self
            .validator()
            .validate_for_update(&self.db, &document, &current.type_ref().into())
            .await?;

        let data = strip_analysis_type(document);
        self.store_update(study_id, analysis_id, &entry, data).await?;
        Ok(entry)
    }

    async fn store_update(
        &self,
        study_id: &str,
        analysis_id: &str,
        entry: &analysis_schema::Model,
        data: Map<String, Value>,
    ) -> Result<(), RegistryError> {
        let txn = self.db.begin().await?;
        let row = lock_related(&txn, study_id, analysis_id).await?;

        analysis_data::ActiveModel {
            id: Set(row.analysis_data_id),
            data: Set(Value::Object(data)),
        }
        .update(&txn)
        .await?;

        analysis::ActiveModel {
            id: Set(row.id.clone()),
            analysis_schema_id: Set(entry.id),
            updated_at: Set(Utc::now()),
            ..Default::default()
        }
        .update(&txn)
        .await?;

        txn.commit().await?;
        info!(analysis_id, analysis_type = %entry.type_ref(), "Updated analysis");
        Ok(())
    }

    /// Verify every file against storage and, only if all pass, mark the analysis PUBLISHED.
    #[instrument(skip(self))]
    pub async fn publish(
        &self,
        study_id: &str,
        analysis_id: &str,
        ignore_undefined_md5: bool,
    ) -> Result<StateTransition, RegistryError> {
        self.check_analysis_and_study_related(study_id, analysis_id)
            .await?;
        let analysis = self.read_deep(analysis_id).await?;

        let type_ref = &analysis.header.analysis_type;
        let entry = self
            .schemas
            .resolve(&self.db, &type_ref.name, Some(type_ref.version))
            .await?;
        self.validator()
            .check_version_accepted(&self.db, &entry)
            .await?;

        let report = verify_files(
            self.collaborators.storage.as_ref(),
            &analysis.files,
            &self.options.storage_retry,
            ignore_undefined_md5,
        )
        .await;
        if let Some(err) = report.into_error(analysis_id) {
            warn!(error = %err, "Publish refused");
            return Err(err);
        }

        self.transition(study_id, analysis_id, AnalysisState::Published, |_| Ok(()))
            .await
    }

    #[instrument(skip(self))]
    pub async fn unpublish(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<StateTransition, RegistryError> {
        self.transition(study_id, analysis_id, AnalysisState::Unpublished, |row| {
            if row.state == AnalysisState::Suppressed {
                Err(RegistryError::SuppressedStateTransition(row.id.clone()))
            } else {
                Ok(())
            }
        })
        .await
    }

    /// Allowed from any state.
    #[instrument(skip(self))]
    pub async fn suppress(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<StateTransition, RegistryError> {
        self.transition(study_id, analysis_id, AnalysisState::Suppressed, |_| Ok(()))
            .await
    }

    async fn transition<F>(
        &self,
        study_id: &str,
        analysis_id: &str,
        target: AnalysisState,
        precondition: F,
    ) -> Result<StateTransition, RegistryError>
    where
        F: FnOnce(&analysis::Model) -> Result<(), RegistryError>,
    {
        let txn = self.db.begin().await?;
        let row = lock_related(&txn, study_id, analysis_id).await?;
        precondition(&row)?;

        let now = Utc::now();
        analysis::ActiveModel {
            id: Set(row.id.clone()),
            state: Set(target),
            updated_at: Set(now),
            ..Default::default()
        }
        .update(&txn)
        .await?;

        let change = analysis_state_change::ActiveModel {
            analysis_id: Set(row.id.clone()),
            initial_state: Set(row.state),
            updated_state: Set(target),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;

        info!(
            analysis_id,
            from = %change.initial_state,
            to = %change.updated_state,
            "Analysis state changed"
        );
        Ok(change.into())
    }

    /// Fails with `UnknownAnalysis` if the id is unknown and `EntityNotRelatedToStudy` if it
    /// belongs to another study.
    pub async fn check_analysis_and_study_related(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<analysis::Model, RegistryError> {
        let row = find_analysis(&self.db, analysis_id).await?;
        ensure_related(&row, study_id)?;
        Ok(row)
    }

    pub async fn read(&self, analysis_id: &str, deep: bool) -> Result<AnalysisView, RegistryError> {
        if deep {
            Ok(AnalysisView::Deep(Box::new(self.read_deep(analysis_id).await?)))
        } else {
            let row = find_analysis(&self.db, analysis_id).await?;
            Ok(AnalysisView::Shallow(self.header(&self.db, row).await?))
        }
    }

    /// Read with files, samples, data and state history.
    pub async fn read_deep(&self, analysis_id: &str) -> Result<Analysis, RegistryError> {
        let row = find_analysis(&self.db, analysis_id).await?;
        self.assemble(&self.db, row).await
    }

    /// Deep read scoped to a study.
    pub async fn read_secured(
        &self,
        study_id: &str,
        analysis_id: &str,
    ) -> Result<Analysis, RegistryError> {
        let row = self
            .check_analysis_and_study_related(study_id, analysis_id)
            .await?;
        self.assemble(&self.db, row).await
    }

    pub async fn read_state(&self, analysis_id: &str) -> Result<AnalysisState, RegistryError> {
        Ok(find_analysis(&self.db, analysis_id).await?.state)
    }

    /// Deep reads of a study's analyses in any of `states`, a comma separated list that
    /// defaults to PUBLISHED.
    pub async fn list_by_study(
        &self,
        study_id: &str,
        states: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<Analysis>, Pagination), RegistryError> {
        let mut wanted = match states {
            Some(s) => AnalysisState::parse_list(s)
                .map_err(|e| RegistryError::MalformedParameter(e.to_string()))?,
            None => Vec::new(),
        };
        if wanted.is_empty() {
            wanted.push(AnalysisState::Published);
        }

        if !self.collaborators.studies.exists(study_id).await? {
            return Err(RegistryError::UnknownStudy(study_id.to_string()));
        }

        let select = analysis::Entity::find()
            .filter(analysis::Column::StudyId.eq(study_id))
            .filter(analysis::Column::State.is_in(wanted));

        let per_page = per_page.max(1);
        let page = page.max(1);
        let total = select.clone().count(&self.db).await?;
        let rows = select
            .order_by_asc(analysis::Column::CreatedAt)
            .order_by_asc(analysis::Column::Id)
            .offset((page - 1) * per_page)
            .limit(per_page)
            .all(&self.db)
            .await?;

        let mut analyses = Vec::with_capacity(rows.len());
        for row in rows {
            analyses.push(self.assemble(&self.db, row).await?);
        }
        Ok((analyses, Pagination::new(page, per_page, total)))
    }

    async fn header<C: ConnectionTrait>(
        &self,
        conn: &C,
        row: analysis::Model,
    ) -> Result<AnalysisHeader, RegistryError> {
        let entry = self.schemas.find_by_id(conn, row.analysis_schema_id).await?;
        Ok(AnalysisHeader {
            analysis_id: row.id,
            study_id: row.study_id,
            analysis_type: entry.type_ref(),
            analysis_state: row.state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    async fn load_data<C: ConnectionTrait>(
        &self,
        conn: &C,
        row: &analysis::Model,
    ) -> Result<Map<String, Value>, RegistryError> {
        let data = analysis_data::Entity::find_by_id(row.analysis_data_id)
            .one(conn)
            .await?
            .ok_or_else(|| {
                RegistryError::Internal(format!("data for analysis '{}' is missing", row.id))
            })?;
        match data.data {
            Value::Object(map) => Ok(map),
            _ => Err(RegistryError::Internal(format!(
                "data for analysis '{}' is not an object",
                row.id
            ))),
        }
    }

    async fn assemble<C: ConnectionTrait>(
        &self,
        conn: &C,
        row: analysis::Model,
    ) -> Result<Analysis, RegistryError> {
        let data = self.load_data(conn, &row).await?;

        let files = file::Entity::find()
            .filter(file::Column::AnalysisId.eq(row.id.as_str()))
            .order_by_asc(file::Column::Position)
            .all(conn)
            .await?;
        if files.is_empty() {
            return Err(RegistryError::AnalysisMissingFiles(row.id));
        }

        let links = sample_set::Entity::find()
            .filter(sample_set::Column::AnalysisId.eq(row.id.as_str()))
            .order_by_asc(sample_set::Column::Position)
            .all(conn)
            .await?;
        if links.is_empty() {
            return Err(RegistryError::AnalysisMissingSamples(row.id));
        }
        let resolver = self.resolver(conn);
        let mut samples = Vec::with_capacity(links.len());
        for link in &links {
            samples.push(resolver.read(&link.sample_id).await?);
        }

        let state_history = analysis_state_change::Entity::find()
            .filter(analysis_state_change::Column::AnalysisId.eq(row.id.as_str()))
            .order_by_asc(analysis_state_change::Column::UpdatedAt)
            .order_by_asc(analysis_state_change::Column::Id)
            .all(conn)
            .await?;
        let (first_published_at, published_at) = published_bounds(&state_history);

        Ok(Analysis {
            header: self.header(conn, row).await?,
            data,
            samples,
            files,
            state_history,
            first_published_at,
            published_at,
        })
    }
}

fn strip_analysis_type(document: Value) -> Map<String, Value> {
    match document {
        Value::Object(mut map) => {
            map.remove("analysisType");
            map
        }
        _ => Map::new(),
    }
}

async fn find_analysis<C: ConnectionTrait>(
    conn: &C,
    analysis_id: &str,
) -> Result<analysis::Model, RegistryError> {
    analysis::Entity::find_by_id(analysis_id.to_string())
        .one(conn)
        .await?
        .ok_or_else(|| RegistryError::UnknownAnalysis(analysis_id.to_string()))
}

/// Row-locked read for the duration of `conn`'s transaction.
async fn lock_related<C: ConnectionTrait>(
    conn: &C,
    study_id: &str,
    analysis_id: &str,
) -> Result<analysis::Model, RegistryError> {
    let row = analysis::Entity::find_by_id(analysis_id.to_string())
        .lock(LockType::Update)
        .one(conn)
        .await?
        .ok_or_else(|| RegistryError::UnknownAnalysis(analysis_id.to_string()))?;
    ensure_related(&row, study_id)?;
    Ok(row)
}

fn ensure_related(row: &analysis::Model, study_id: &str) -> Result<(), RegistryError> {
    if row.study_id == study_id {
        Ok(())
    } else {
        Err(RegistryError::EntityNotRelatedToStudy {
            analysis_id: row.id.clone(),
            claimed: study_id.to_string(),
            actual: row.study_id.clone(),
        })
    }
}

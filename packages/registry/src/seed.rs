use std::path::Path;

use sea_orm::sea_query::{
    Index, IndexCreateStatement, MysqlQueryBuilder, PostgresQueryBuilder, SqliteQueryBuilder,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, DbErr};
use serde_json::Value;
use tracing::{info, warn};

use crate::entity::{analysis, analysis_state_change, file};
use crate::error::RegistryError;
use crate::schema::SchemaRegistry;

/// Register every `<name>.json` schema in `dir` whose content differs from the latest
/// registered version of `<name>`. Returns how many versions were added.
pub async fn seed_analysis_types(
    db: &DatabaseConnection,
    registry: &SchemaRegistry,
    dir: &Path,
) -> Result<u32, RegistryError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| RegistryError::Internal(format!("reading {}: {e}", dir.display())))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| RegistryError::Internal(format!("reading {}: {e}", dir.display())))?
    {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut registered = 0u32;
    for path in paths {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "Skipping schema file with a non UTF-8 name");
            continue;
        };

        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| RegistryError::Internal(format!("reading {}: {e}", path.display())))?;
        let schema: Value = serde_json::from_slice(&raw).map_err(|e| {
            RegistryError::MalformedSchema(format!("{}: {e}", path.display()))
        })?;

        if let Some(latest) = registry.latest(db, name).await? {
            if latest.schema == schema {
                continue;
            }
        }

        let entry = registry.register(db, name, schema).await?;
        info!(analysis_type = %entry.type_ref(), path = %path.display(), "Seeded analysis type");
        registered += 1;
    }

    if registered > 0 {
        info!("Seeded {} analysis type versions", registered);
    }
    Ok(registered)
}

fn index_sql(backend: DatabaseBackend, stmt: &IndexCreateStatement) -> String {
    match backend {
        DatabaseBackend::Postgres => stmt.to_string(PostgresQueryBuilder),
        DatabaseBackend::Sqlite => stmt.to_string(SqliteQueryBuilder),
        _ => stmt.to_string(MysqlQueryBuilder),
    }
}

/// Ensure required database indexes exist.
///
/// Schema sync only creates single column and unique indexes, so the composite
/// lookup indexes are created here on startup.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    // Study listings filter by study and state.
    let by_study_state = Index::create()
        .if_not_exists()
        .name("idx_analysis_study_state")
        .table(analysis::Entity)
        .col(analysis::Column::StudyId)
        .col(analysis::Column::State)
        .to_owned();

    // History is read per analysis in time order.
    let history = Index::create()
        .if_not_exists()
        .name("idx_state_change_analysis_updated")
        .table(analysis_state_change::Entity)
        .col(analysis_state_change::Column::AnalysisId)
        .col(analysis_state_change::Column::UpdatedAt)
        .to_owned();

    let files = Index::create()
        .if_not_exists()
        .name("idx_file_analysis_position")
        .table(file::Entity)
        .col(file::Column::AnalysisId)
        .col(file::Column::Position)
        .to_owned();

    for (name, stmt) in [
        ("idx_analysis_study_state", by_study_state),
        ("idx_state_change_analysis_updated", history),
        ("idx_file_analysis_position", files),
    ] {
        match db.execute_unprepared(&index_sql(backend, &stmt)).await {
            Ok(_) => info!("Ensured index {} exists", name),
            Err(e) => warn!("Failed to create index {}: {}", name, e),
        }
    }

    Ok(())
}

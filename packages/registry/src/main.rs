use std::path::Path;

use anyhow::Context;
use tracing::info;

use registry::config::AppConfig;
use registry::database::init_db;
use registry::seed::{ensure_indexes, seed_analysis_types};
use registry::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = init_db(&config.database)
        .await
        .context("Failed to initialize database")?;
    ensure_indexes(&db)
        .await
        .context("Failed to ensure database indexes")?;

    let state = AppState::from_config(db, config).context("Failed to build services")?;

    if let Some(dir) = &state.config.seed.schemas_dir {
        let added = seed_analysis_types(&state.db, &state.schemas, Path::new(dir))
            .await
            .with_context(|| format!("Failed to seed analysis types from {dir}"))?;
        info!(added, dir = %dir, "Analysis type seeding finished");
    }

    info!(
        storage = %state.config.storage.url,
        latest_only = state.config.validation.latest_only,
        "Metadata registry ready"
    );
    Ok(())
}

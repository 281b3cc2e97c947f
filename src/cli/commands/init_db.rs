//! Staging database initialization.

use console::style;

use qualer_stage::repository::util::redact_url_password;
use qualer_stage::{Settings, StagingStore};

use super::helpers::open_database;

/// Create the staging table and report how many rows it holds.
pub async fn cmd_init_db(settings: &Settings) -> anyhow::Result<()> {
    let store = open_database(settings).await?;
    let rows = store.count(None).await?;

    println!(
        "{} Staging table ready in {}",
        style("✓").green(),
        redact_url_password(settings.db_url.as_deref().unwrap_or_default())
    );
    println!("  Backend: {}", store.backend_name());
    println!("  Staged rows: {}", rows);

    store.close().await?;
    Ok(())
}

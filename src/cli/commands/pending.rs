//! Listing of rows waiting for the parsing pass.

use console::style;

use qualer_stage::{Settings, StagingStore};

use super::helpers::open_database;

pub async fn cmd_pending(settings: &Settings, service: &str, limit: usize) -> anyhow::Result<()> {
    let store = open_database(settings).await?;
    let rows = store.unparsed(service).await?;

    if rows.is_empty() {
        println!("{} Nothing pending for {}", style("✓").green(), service);
        store.close().await?;
        return Ok(());
    }

    println!(
        "{} {} unparsed row(s) for {}",
        style("→").cyan(),
        rows.len(),
        style(service).bold()
    );
    let shown = if limit == 0 { rows.len() } else { limit };
    for row in rows.iter().take(shown) {
        let size = row.response_body.as_deref().map(str::len).unwrap_or(0);
        println!(
            "  {:>6}  {:<4}  {}  {} bytes  {}",
            row.id,
            row.method,
            style(&row.created_at).dim(),
            size,
            row.url
        );
    }
    if rows.len() > shown {
        println!("  ... and {} more", rows.len() - shown);
    }

    store.close().await?;
    Ok(())
}

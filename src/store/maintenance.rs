use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use tracing::info;

use super::db_setup::count_rows;
use crate::model::StoreStats;
use crate::util::ensure_directory;

pub(crate) fn collect_stats(connection: &Connection) -> Result<StoreStats> {
    Ok(StoreStats {
        titles: count_rows(connection, "SELECT COUNT(*) FROM titles")?,
        chapters: count_rows(connection, "SELECT COUNT(*) FROM chapters")?,
        subchapters: count_rows(connection, "SELECT COUNT(*) FROM subchapters")?,
        parts: count_rows(connection, "SELECT COUNT(*) FROM parts")?,
        sections: count_rows(connection, "SELECT COUNT(*) FROM sections")?,
        ingestion_records: count_rows(connection, "SELECT COUNT(*) FROM ingestion_records")?,
    })
}

pub(crate) fn backup_into(connection: &Connection, destination: &Path) -> Result<u64> {
    if destination.exists() {
        bail!("backup destination already exists: {}", destination.display());
    }
    if let Some(parent) = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        ensure_directory(parent)?;
    }

    let target = destination.to_string_lossy().into_owned();
    connection
        .execute("VACUUM INTO ?1", [&target])
        .with_context(|| format!("failed to back up database to {target}"))?;

    let bytes = fs::metadata(destination)
        .with_context(|| format!("failed to stat {}", destination.display()))?
        .len();
    info!(path = %destination.display(), bytes, "database backup written");
    Ok(bytes)
}

pub(crate) fn compact_database(connection: &Connection) -> Result<()> {
    connection
        .execute("INSERT INTO sections_fts(sections_fts) VALUES('optimize')", [])
        .context("failed to optimize sections_fts")?;
    connection
        .execute_batch("VACUUM")
        .context("failed to vacuum database")?;
    info!("database compacted");
    Ok(())
}

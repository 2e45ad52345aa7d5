use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::debug;

use crate::util::now_utc_string;

pub const DB_SCHEMA_VERSION: &str = "1.0.0";

const REQUIRED_TABLES: &[&str] = &[
    "metadata",
    "titles",
    "chapters",
    "subchapters",
    "parts",
    "sections",
    "sections_fts",
    "ingestion_records",
];

pub(crate) fn configure_connection(connection: &Connection) -> Result<()> {
    let journal_mode: String = connection
        .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign keys")?;
    connection
        .pragma_update(None, "temp_store", "MEMORY")
        .context("failed to set temp_store=MEMORY")?;
    connection
        .busy_timeout(Duration::from_secs(30))
        .context("failed to set busy timeout")?;

    debug!(journal_mode = %journal_mode, "configured sqlite connection");
    Ok(())
}

pub(crate) fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS titles (
              id INTEGER PRIMARY KEY,
              title_number INTEGER NOT NULL UNIQUE,
              title_name TEXT NOT NULL,
              last_updated TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chapters (
              id INTEGER PRIMARY KEY,
              title_id INTEGER NOT NULL,
              chapter_number TEXT NOT NULL,
              chapter_name TEXT NOT NULL,
              UNIQUE(title_id, chapter_number),
              FOREIGN KEY(title_id) REFERENCES titles(id)
            );

            CREATE TABLE IF NOT EXISTS subchapters (
              id INTEGER PRIMARY KEY,
              chapter_id INTEGER NOT NULL,
              subchapter_letter TEXT NOT NULL,
              subchapter_name TEXT NOT NULL,
              UNIQUE(chapter_id, subchapter_letter),
              UNIQUE(id, chapter_id),
              FOREIGN KEY(chapter_id) REFERENCES chapters(id)
            );

            CREATE TABLE IF NOT EXISTS parts (
              id INTEGER PRIMARY KEY,
              chapter_id INTEGER NOT NULL,
              subchapter_id INTEGER,
              part_number INTEGER NOT NULL,
              part_name TEXT NOT NULL,
              authority_citation TEXT,
              source_citation TEXT,
              UNIQUE(chapter_id, part_number),
              FOREIGN KEY(chapter_id) REFERENCES chapters(id),
              FOREIGN KEY(subchapter_id, chapter_id) REFERENCES subchapters(id, chapter_id)
            );

            CREATE TABLE IF NOT EXISTS sections (
              id INTEGER PRIMARY KEY,
              part_id INTEGER NOT NULL,
              section_number TEXT NOT NULL,
              section_heading TEXT NOT NULL DEFAULT '',
              section_content TEXT NOT NULL DEFAULT '',
              authority_citation TEXT,
              source_citation TEXT,
              xml_node_id TEXT,
              UNIQUE(part_id, section_number),
              FOREIGN KEY(part_id) REFERENCES parts(id)
            );

            CREATE TABLE IF NOT EXISTS ingestion_records (
              title_number INTEGER PRIMARY KEY,
              status TEXT NOT NULL
                CHECK(status IN ('pending', 'in_progress', 'completed', 'failed')),
              file_hash TEXT,
              file_size INTEGER,
              error_message TEXT,
              records_processed INTEGER NOT NULL DEFAULT 0,
              last_scraped TEXT NOT NULL
            );
            ",
        )
        .context("failed to create core tables")?;

    connection
        .execute_batch(
            "
            CREATE VIRTUAL TABLE IF NOT EXISTS sections_fts
            USING fts5(section_heading, section_content, content='sections', content_rowid='id');

            CREATE TRIGGER IF NOT EXISTS sections_fts_insert AFTER INSERT ON sections BEGIN
              INSERT INTO sections_fts(rowid, section_heading, section_content)
              VALUES (new.id, new.section_heading, new.section_content);
            END;

            CREATE TRIGGER IF NOT EXISTS sections_fts_delete AFTER DELETE ON sections BEGIN
              INSERT INTO sections_fts(sections_fts, rowid, section_heading, section_content)
              VALUES ('delete', old.id, old.section_heading, old.section_content);
            END;

            CREATE TRIGGER IF NOT EXISTS sections_fts_update AFTER UPDATE ON sections BEGIN
              INSERT INTO sections_fts(sections_fts, rowid, section_heading, section_content)
              VALUES ('delete', old.id, old.section_heading, old.section_content);
              INSERT INTO sections_fts(rowid, section_heading, section_content)
              VALUES (new.id, new.section_heading, new.section_content);
            END;
            ",
        )
        .context("failed to initialize FTS5 table sections_fts")?;

    connection.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_chapters_title ON chapters(title_id);
        CREATE INDEX IF NOT EXISTS idx_subchapters_chapter ON subchapters(chapter_id);
        CREATE INDEX IF NOT EXISTS idx_parts_chapter ON parts(chapter_id);
        CREATE INDEX IF NOT EXISTS idx_parts_subchapter ON parts(subchapter_id);
        CREATE INDEX IF NOT EXISTS idx_sections_part ON sections(part_id);
        CREATE INDEX IF NOT EXISTS idx_ingestion_records_status ON ingestion_records(status);
        ",
    )?;

    let now = now_utc_string();
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_updated_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now],
    )?;

    Ok(())
}

pub(crate) fn schema_is_initialized(connection: &Connection) -> Result<bool> {
    let mut statement = connection
        .prepare("SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)")
        .context("failed to inspect sqlite_master")?;

    for table in REQUIRED_TABLES {
        let exists: bool = statement.query_row([table], |row| row.get(0))?;
        if !exists {
            debug!(table, "required table missing");
            return Ok(false);
        }
    }

    Ok(true)
}

pub(crate) fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

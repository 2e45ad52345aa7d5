use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::model::{IngestionRecord, IngestionStatus};

const RECORD_COLUMNS: &str = "title_number, status, file_hash, file_size, error_message,
     records_processed, last_scraped";

pub(crate) fn upsert_ingestion_record(
    connection: &Connection,
    record: &IngestionRecord,
) -> Result<()> {
    connection
        .execute(
            "INSERT INTO ingestion_records(
               title_number, status, file_hash, file_size, error_message,
               records_processed, last_scraped
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(title_number) DO UPDATE SET
               status = excluded.status,
               file_hash = excluded.file_hash,
               file_size = excluded.file_size,
               error_message = excluded.error_message,
               records_processed = excluded.records_processed,
               last_scraped = excluded.last_scraped",
            params![
                record.title_number,
                record.status.as_str(),
                record.file_hash,
                record.file_size.map(|size| size as i64),
                record.error_message,
                record.records_processed as i64,
                record.last_scraped
            ],
        )
        .with_context(|| {
            format!(
                "failed to write ingestion record for title {}",
                record.title_number
            )
        })?;
    Ok(())
}

pub(crate) fn load_ingestion_record(
    connection: &Connection,
    title: u32,
) -> Result<Option<IngestionRecord>> {
    let sql = format!("SELECT {RECORD_COLUMNS} FROM ingestion_records WHERE title_number = ?1");
    let raw = connection
        .query_row(&sql, [title], raw_record)
        .optional()
        .with_context(|| format!("failed to read ingestion record for title {title}"))?;

    raw.map(RawRecord::into_record).transpose()
}

pub(crate) fn load_recent_ingestions(
    connection: &Connection,
    limit: usize,
) -> Result<Vec<IngestionRecord>> {
    let sql = format!(
        "SELECT {RECORD_COLUMNS} FROM ingestion_records
         ORDER BY last_scraped DESC, title_number ASC
         LIMIT ?1"
    );
    let mut statement = connection.prepare(&sql)?;
    let rows = statement.query_map([limit as i64], raw_record)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row?.into_record()?);
    }
    Ok(records)
}

pub(crate) fn load_status_counts(
    connection: &Connection,
) -> Result<BTreeMap<IngestionStatus, i64>> {
    let mut statement =
        connection.prepare("SELECT status, COUNT(*) FROM ingestion_records GROUP BY status")?;
    let rows = statement.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut counts = BTreeMap::new();
    for row in rows {
        let (status, count) = row?;
        counts.insert(IngestionStatus::parse(&status)?, count);
    }
    Ok(counts)
}

struct RawRecord {
    title_number: u32,
    status: String,
    file_hash: Option<String>,
    file_size: Option<i64>,
    error_message: Option<String>,
    records_processed: i64,
    last_scraped: String,
}

impl RawRecord {
    fn into_record(self) -> Result<IngestionRecord> {
        Ok(IngestionRecord {
            title_number: self.title_number,
            status: IngestionStatus::parse(&self.status)?,
            file_hash: self.file_hash,
            file_size: self
                .file_size
                .map(u64::try_from)
                .transpose()
                .context("stored file size is negative")?,
            error_message: self.error_message,
            records_processed: usize::try_from(self.records_processed)
                .context("stored record count is negative")?,
            last_scraped: self.last_scraped,
        })
    }
}

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok(RawRecord {
        title_number: row.get(0)?,
        status: row.get(1)?,
        file_hash: row.get(2)?,
        file_size: row.get(3)?,
        error_message: row.get(4)?,
        records_processed: row.get(5)?,
        last_scraped: row.get(6)?,
    })
}

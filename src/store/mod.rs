use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::model::{
    IngestionRecord, IngestionStatus, ParsedTitle, SearchHit, StoreStats, TitleDetail,
    TitleSummary,
};
use crate::util::ensure_directory;

mod db_setup;
mod hierarchy;
mod maintenance;
mod records;
mod search;

pub use db_setup::DB_SCHEMA_VERSION;

use db_setup::*;
use hierarchy::*;
use maintenance::*;
use records::*;
use search::*;

pub struct Store {
    connection: Connection,
    path: PathBuf,
}

impl Store {
    pub fn initialize(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            ensure_directory(parent)?;
        }

        let connection = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;

        info!(path = %path.display(), schema_version = DB_SCHEMA_VERSION, "database initialized");
        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IngestError::NotInitialized {
                path: path.display().to_string(),
            }
            .into());
        }

        let connection = Connection::open(path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        configure_connection(&connection)?;

        if !schema_is_initialized(&connection)? {
            return Err(IngestError::NotInitialized {
                path: path.display().to_string(),
            }
            .into());
        }

        debug!(path = %path.display(), "database opened");
        Ok(Self {
            connection,
            path: path.to_path_buf(),
        })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let connection = Connection::open_in_memory().context("failed to open in-memory db")?;
        configure_connection(&connection)?;
        ensure_schema(&connection)?;
        Ok(Self {
            connection,
            path: PathBuf::from(":memory:"),
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn persist_title(
        &mut self,
        parsed: &ParsedTitle,
        file_hash: &str,
        file_size: u64,
    ) -> Result<usize> {
        let title = parsed.number;
        let persistence = |err: anyhow::Error| IngestError::Persistence {
            title,
            detail: format!("{err:#}"),
        };

        let tx = self
            .connection
            .transaction()
            .map_err(|err| persistence(err.into()))?;

        let sections = persist_hierarchy(&tx, parsed).map_err(persistence)?;
        upsert_ingestion_record(
            &tx,
            &IngestionRecord::completed(title, file_hash, file_size, sections),
        )
        .map_err(persistence)?;

        tx.commit().map_err(|err| persistence(err.into()))?;

        debug!(title, sections, "committed title hierarchy");
        Ok(sections)
    }

    pub fn record_ingestion(&self, record: &IngestionRecord) -> Result<()> {
        upsert_ingestion_record(&self.connection, record)
    }

    pub fn ingestion_record(&self, title: u32) -> Result<Option<IngestionRecord>> {
        load_ingestion_record(&self.connection, title)
    }

    pub fn ingestion_status_counts(&self) -> Result<BTreeMap<IngestionStatus, i64>> {
        load_status_counts(&self.connection)
    }

    pub fn recent_ingestions(&self, limit: usize) -> Result<Vec<IngestionRecord>> {
        load_recent_ingestions(&self.connection, limit)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        collect_stats(&self.connection)
    }

    pub fn search_sections(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        run_section_search(&self.connection, query, limit)
    }

    pub fn title_summaries(&self) -> Result<Vec<TitleSummary>> {
        load_title_summaries(&self.connection)
    }

    pub fn title_detail(&self, title: u32) -> Result<Option<TitleDetail>> {
        load_title_detail(&self.connection, title)
    }

    pub fn backup(&self, destination: &Path) -> Result<u64> {
        backup_into(&self.connection, destination)
    }

    pub fn compact(&self) -> Result<()> {
        compact_database(&self.connection)
    }
}

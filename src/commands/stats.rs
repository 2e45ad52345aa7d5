use std::collections::BTreeMap;
use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::{GlobalArgs, StatsArgs};
use crate::model::{IngestionRecord, StoreStats};
use crate::store::{DB_SCHEMA_VERSION, Store};

const RECENT_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
struct StatsReport {
    db_path: String,
    schema_version: &'static str,
    counts: StoreStats,
    ingestion_status: BTreeMap<String, i64>,
    recent: Vec<IngestionRecord>,
}

pub fn run(global: &GlobalArgs, args: StatsArgs) -> Result<()> {
    let store = Store::open(&global.db_path)?;

    let report = StatsReport {
        db_path: store.path().display().to_string(),
        schema_version: DB_SCHEMA_VERSION,
        counts: store.stats()?,
        ingestion_status: store
            .ingestion_status_counts()?
            .into_iter()
            .map(|(status, count)| (status.to_string(), count))
            .collect(),
        recent: store.recent_ingestions(RECENT_LIMIT)?,
    };

    info!(
        path = %report.db_path,
        titles = report.counts.titles,
        sections = report.counts.sections,
        "database status"
    );

    if args.json {
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &report)
            .context("failed to serialize stats json output")?;
        writeln!(output)?;
        output.flush()?;
        return Ok(());
    }

    write_text_report(&report)
}

fn write_text_report(report: &StatsReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    let counts = &report.counts;

    writeln!(output, "Database: {}", report.db_path)?;
    writeln!(output, "Schema version: {}", report.schema_version)?;
    writeln!(output, "Titles: {}", counts.titles)?;
    writeln!(output, "Chapters: {}", counts.chapters)?;
    writeln!(output, "Subchapters: {}", counts.subchapters)?;
    writeln!(output, "Parts: {}", counts.parts)?;
    writeln!(output, "Sections: {}", counts.sections)?;
    writeln!(output, "Ingestion records: {}", counts.ingestion_records)?;

    if !report.ingestion_status.is_empty() {
        writeln!(output, "Ingestion status:")?;
        for (status, count) in &report.ingestion_status {
            writeln!(output, "\t{status}: {count}")?;
        }
    }

    if !report.recent.is_empty() {
        writeln!(output, "Recent activity:")?;
        for record in &report.recent {
            writeln!(
                output,
                "\tTitle {}: {} ({} records) at {}",
                record.title_number,
                record.status,
                record.records_processed,
                record.last_scraped
            )?;
            if let Some(error) = &record.error_message {
                writeln!(output, "\t\terror: {error}")?;
            }
        }
    }

    output.flush()?;
    Ok(())
}

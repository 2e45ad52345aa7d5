use std::io::{self, Write};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::{GlobalArgs, ScrapeArgs};
use crate::commands::ingest_config;
use crate::config::all_titles;
use crate::ingest::Pipeline;
use crate::model::RunReport;
use crate::store::Store;

pub fn run(global: &GlobalArgs, args: ScrapeArgs) -> Result<()> {
    let config = ingest_config(global, &args.fetch);
    let store = Store::open(&config.db_path)?;
    let mut pipeline = Pipeline::http(&config, store)?;

    let report = if args.incremental {
        info!("incremental scrape requested");
        pipeline.run_incremental()
    } else {
        let titles = if args.titles.is_empty() {
            all_titles()
        } else {
            args.titles
        };
        info!(titles = ?titles, force = args.force, "full scrape requested");
        pipeline.run_full(&titles, args.force)
    };

    debug!(records = ?report.record_counts(), "per-title record counts");
    if report.outcomes.is_empty() {
        info!("nothing to ingest");
    }
    for title in report.failed_titles() {
        warn!(title, "title did not complete");
    }

    write_report(&report)
}

fn write_report(report: &RunReport) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "{:<6} {:<10} {:>8}  Error", "Title", "Status", "Records")?;
    for (title, outcome) in &report.outcomes {
        writeln!(
            output,
            "{:<6} {:<10} {:>8}  {}",
            title,
            outcome.status,
            outcome.records,
            outcome.error.as_deref().unwrap_or("")
        )?;
    }
    writeln!(
        output,
        "Titles: {}  Succeeded: {}  Failed: {}  Records: {}",
        report.outcomes.len(),
        report.succeeded(),
        report.failed_titles().len(),
        report.total_records()
    )?;

    output.flush()?;
    Ok(())
}

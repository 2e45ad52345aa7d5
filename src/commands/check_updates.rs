use std::io::{self, Write};

use anyhow::Result;
use tracing::info;

use crate::cli::{CheckUpdatesArgs, GlobalArgs};
use crate::commands::ingest_config;
use crate::config::all_titles;
use crate::ingest::Pipeline;
use crate::store::Store;

pub fn run(global: &GlobalArgs, args: CheckUpdatesArgs) -> Result<()> {
    let config = ingest_config(global, &args.fetch);
    let store = Store::open(&config.db_path)?;
    let pipeline = Pipeline::http(&config, store)?;

    let titles = if args.titles.is_empty() {
        all_titles()
    } else {
        args.titles
    };
    let updates = pipeline.check_updates(&titles);
    let changed = updates.values().filter(|changed| **changed).count();
    info!(checked = updates.len(), changed, "update check complete");

    let mut output = io::BufWriter::new(io::stdout().lock());
    for (title, changed) in &updates {
        let label = if *changed { "Updated" } else { "Current" };
        writeln!(output, "Title {title}: {label}")?;
    }
    writeln!(output, "{changed} of {} titles have updates", updates.len())?;
    output.flush()?;
    Ok(())
}

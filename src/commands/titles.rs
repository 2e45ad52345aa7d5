use std::io::{self, Write};

use anyhow::Result;
use tracing::warn;

use crate::cli::{GlobalArgs, ListTitlesArgs};
use crate::store::Store;

pub fn run(global: &GlobalArgs, args: ListTitlesArgs) -> Result<()> {
    let store = Store::open(&global.db_path)?;
    let mut output = io::BufWriter::new(io::stdout().lock());

    if let Some(title) = args.title {
        match store.title_detail(title)? {
            Some(detail) => {
                writeln!(output, "Title {}: {}", detail.title_number, detail.title_name)?;
                writeln!(output, "Last updated: {}", detail.last_updated)?;
                writeln!(output, "Chapters: {}", detail.chapters)?;
                writeln!(output, "Subchapters: {}", detail.subchapters)?;
                writeln!(output, "Parts: {}", detail.parts)?;
                writeln!(output, "Sections: {}", detail.sections)?;
            }
            None => {
                warn!(title, "title has not been ingested");
                writeln!(output, "Title {title} not found")?;
            }
        }
        output.flush()?;
        return Ok(());
    }

    let summaries = store.title_summaries()?;
    writeln!(
        output,
        "{:<6} {:<12} {:>9}  {:<24}  Name",
        "Title", "Status", "Sections", "Last scraped"
    )?;
    for summary in &summaries {
        let status = summary
            .status
            .map(|status| status.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        writeln!(
            output,
            "{:<6} {:<12} {:>9}  {:<24}  {}",
            summary.title_number,
            status,
            summary.sections,
            summary.last_scraped.as_deref().unwrap_or("-"),
            summary.title_name
        )?;
    }
    writeln!(output, "Titles: {}", summaries.len())?;

    output.flush()?;
    Ok(())
}

use std::io::{self, Write};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::cli::{GlobalArgs, SearchArgs};
use crate::model::SearchHit;
use crate::store::Store;
use crate::util::preview;

const PREVIEW_CHARS: usize = 200;

#[derive(Debug, Serialize)]
struct SearchResponse<'a> {
    query: &'a str,
    limit: usize,
    returned: usize,
    results: &'a [SearchHit],
}

pub fn run(global: &GlobalArgs, args: SearchArgs) -> Result<()> {
    let store = Store::open(&global.db_path)?;
    let hits = store.search_sections(&args.query, args.limit)?;
    info!(query = %args.query, hits = hits.len(), "search complete");

    if args.json {
        let response = SearchResponse {
            query: &args.query,
            limit: args.limit,
            returned: hits.len(),
            results: &hits,
        };
        let mut output = io::BufWriter::new(io::stdout().lock());
        serde_json::to_writer_pretty(&mut output, &response)
            .context("failed to serialize search json output")?;
        writeln!(output)?;
        output.flush()?;
        return Ok(());
    }

    let mut output = io::BufWriter::new(io::stdout().lock());
    writeln!(output, "Query: {}", args.query)?;
    writeln!(output, "Results: {}", hits.len())?;

    for hit in &hits {
        let subchapter = hit
            .subchapter_letter
            .as_deref()
            .map(|letter| format!(" / Subchapter {letter}"))
            .unwrap_or_default();
        writeln!(
            output,
            "{}. {} CFR § {} {} (score {:.3})",
            hit.rank, hit.title_number, hit.section_number, hit.section_heading, hit.score
        )?;
        writeln!(
            output,
            "\tTitle {} {} / Chapter {}{} / {}",
            hit.title_number, hit.title_name, hit.chapter_number, subchapter, hit.part_name
        )?;
        writeln!(output, "\tmatch: {}", hit.snippet)?;
        writeln!(
            output,
            "\tpreview: {}",
            preview(&hit.section_content, PREVIEW_CHARS)
        )?;
    }

    output.flush()?;
    Ok(())
}

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::model::{IngestionStatus, SearchHit, TitleDetail, TitleSummary};

pub(crate) fn run_section_search(
    connection: &Connection,
    query_text: &str,
    limit: usize,
) -> Result<Vec<SearchHit>> {
    let query_text = query_text.trim();
    if query_text.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let mut statement = connection.prepare(
        "
        SELECT
          s.id,
          s.section_number,
          s.section_heading,
          s.section_content,
          snippet(sections_fts, 1, '[', ']', ' ... ', 18),
          bm25(sections_fts),
          p.part_number,
          p.part_name,
          sc.subchapter_letter,
          c.chapter_number,
          t.title_number,
          t.title_name
        FROM sections_fts
        JOIN sections s ON s.id = sections_fts.rowid
        JOIN parts p ON p.id = s.part_id
        LEFT JOIN subchapters sc ON sc.id = p.subchapter_id
        JOIN chapters c ON c.id = p.chapter_id
        JOIN titles t ON t.id = c.title_id
        WHERE sections_fts MATCH ?1
        ORDER BY bm25(sections_fts) ASC
        LIMIT ?2
        ",
    )?;

    let mut rows = statement
        .query(params![query_text, limit as i64])
        .with_context(|| format!("full-text query failed: {query_text}"))?;

    let mut out = Vec::new();
    while let Some(row) = rows
        .next()
        .with_context(|| format!("full-text query failed: {query_text}"))?
    {
        let bm25: f64 = row.get(5)?;
        out.push(SearchHit {
            rank: out.len() + 1,
            score: -bm25,
            section_id: row.get(0)?,
            section_number: row.get(1)?,
            section_heading: row.get(2)?,
            section_content: row.get(3)?,
            snippet: row.get(4)?,
            part_number: row.get(6)?,
            part_name: row.get(7)?,
            subchapter_letter: row.get(8)?,
            chapter_number: row.get(9)?,
            title_number: row.get(10)?,
            title_name: row.get(11)?,
        });
    }

    debug!(query = query_text, hits = out.len(), "section search complete");
    Ok(out)
}

pub(crate) fn load_title_summaries(connection: &Connection) -> Result<Vec<TitleSummary>> {
    let mut statement = connection.prepare(
        "
        SELECT
          t.title_number,
          t.title_name,
          (
            SELECT COUNT(*)
            FROM sections s
            JOIN parts p ON p.id = s.part_id
            JOIN chapters c ON c.id = p.chapter_id
            WHERE c.title_id = t.id
          ),
          r.status,
          r.last_scraped
        FROM titles t
        LEFT JOIN ingestion_records r ON r.title_number = t.title_number
        ORDER BY t.title_number
        ",
    )?;

    let mut rows = statement.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let status = row
            .get::<_, Option<String>>(3)?
            .map(|value| IngestionStatus::parse(&value))
            .transpose()?;
        out.push(TitleSummary {
            title_number: row.get(0)?,
            title_name: row.get(1)?,
            sections: row.get(2)?,
            status,
            last_scraped: row.get(4)?,
        });
    }

    Ok(out)
}

pub(crate) fn load_title_detail(
    connection: &Connection,
    title: u32,
) -> Result<Option<TitleDetail>> {
    connection
        .query_row(
            "
            SELECT
              t.title_number,
              t.title_name,
              t.last_updated,
              (SELECT COUNT(*) FROM chapters c WHERE c.title_id = t.id),
              (
                SELECT COUNT(*)
                FROM subchapters sc
                JOIN chapters c ON c.id = sc.chapter_id
                WHERE c.title_id = t.id
              ),
              (
                SELECT COUNT(*)
                FROM parts p
                JOIN chapters c ON c.id = p.chapter_id
                WHERE c.title_id = t.id
              ),
              (
                SELECT COUNT(*)
                FROM sections s
                JOIN parts p ON p.id = s.part_id
                JOIN chapters c ON c.id = p.chapter_id
                WHERE c.title_id = t.id
              )
            FROM titles t
            WHERE t.title_number = ?1
            ",
            [title],
            |row| {
                Ok(TitleDetail {
                    title_number: row.get(0)?,
                    title_name: row.get(1)?,
                    last_updated: row.get(2)?,
                    chapters: row.get(3)?,
                    subchapters: row.get(4)?,
                    parts: row.get(5)?,
                    sections: row.get(6)?,
                })
            },
        )
        .optional()
        .with_context(|| format!("failed to load details for title {title}"))
}

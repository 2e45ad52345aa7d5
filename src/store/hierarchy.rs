use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::model::{ChapterChild, ParsedPart, ParsedSection, ParsedTitle};
use crate::util::now_utc_string;

pub(crate) fn persist_hierarchy(connection: &Connection, parsed: &ParsedTitle) -> Result<usize> {
    let title_id = get_or_create_title(connection, parsed.number, &parsed.name)?;
    let mut sections = 0_usize;

    for chapter in &parsed.chapters {
        let chapter_id =
            get_or_create_chapter(connection, title_id, &chapter.label, &chapter.name)?;

        for child in &chapter.children {
            match child {
                ChapterChild::Subchapter(subchapter) => {
                    let subchapter_id = get_or_create_subchapter(
                        connection,
                        chapter_id,
                        &subchapter.letter,
                        &subchapter.name,
                    )?;
                    for part in &subchapter.parts {
                        sections +=
                            persist_part(connection, chapter_id, Some(subchapter_id), part)?;
                    }
                }
                ChapterChild::Part(part) => {
                    sections += persist_part(connection, chapter_id, None, part)?;
                }
            }
        }
    }

    debug!(title = parsed.number, sections, "persisted title hierarchy");
    Ok(sections)
}

fn persist_part(
    connection: &Connection,
    chapter_id: i64,
    subchapter_id: Option<i64>,
    part: &ParsedPart,
) -> Result<usize> {
    let part_id = get_or_create_part(connection, chapter_id, subchapter_id, part)?;
    for section in &part.sections {
        upsert_section(connection, part_id, section)?;
    }
    Ok(part.sections.len())
}

pub(crate) fn get_or_create_title(connection: &Connection, number: u32, name: &str) -> Result<i64> {
    let existing = connection
        .query_row(
            "SELECT id FROM titles WHERE title_number = ?1",
            [number],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context(|| format!("failed to look up title {number}"))?;

    if let Some(id) = existing {
        return Ok(id);
    }

    connection
        .execute(
            "INSERT INTO titles(title_number, title_name, last_updated) VALUES (?1, ?2, ?3)",
            params![number, name, now_utc_string()],
        )
        .with_context(|| format!("failed to insert title {number}"))?;
    Ok(connection.last_insert_rowid())
}

pub(crate) fn get_or_create_chapter(
    connection: &Connection,
    title_id: i64,
    label: &str,
    name: &str,
) -> Result<i64> {
    let existing = connection
        .query_row(
            "SELECT id FROM chapters WHERE title_id = ?1 AND chapter_number = ?2",
            params![title_id, label],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context(|| format!("failed to look up chapter {label}"))?;

    if let Some(id) = existing {
        return Ok(id);
    }

    connection
        .execute(
            "INSERT INTO chapters(title_id, chapter_number, chapter_name) VALUES (?1, ?2, ?3)",
            params![title_id, label, name],
        )
        .with_context(|| format!("failed to insert chapter {label}"))?;
    Ok(connection.last_insert_rowid())
}

pub(crate) fn get_or_create_subchapter(
    connection: &Connection,
    chapter_id: i64,
    letter: &str,
    name: &str,
) -> Result<i64> {
    let existing = connection
        .query_row(
            "SELECT id FROM subchapters WHERE chapter_id = ?1 AND subchapter_letter = ?2",
            params![chapter_id, letter],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context(|| format!("failed to look up subchapter {letter}"))?;

    if let Some(id) = existing {
        return Ok(id);
    }

    connection
        .execute(
            "INSERT INTO subchapters(chapter_id, subchapter_letter, subchapter_name)
             VALUES (?1, ?2, ?3)",
            params![chapter_id, letter, name],
        )
        .with_context(|| format!("failed to insert subchapter {letter}"))?;
    Ok(connection.last_insert_rowid())
}

pub(crate) fn get_or_create_part(
    connection: &Connection,
    chapter_id: i64,
    subchapter_id: Option<i64>,
    part: &ParsedPart,
) -> Result<i64> {
    let existing = connection
        .query_row(
            "SELECT id FROM parts WHERE chapter_id = ?1 AND part_number = ?2",
            params![chapter_id, part.number],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context(|| format!("failed to look up part {}", part.number))?;

    if let Some(id) = existing {
        return Ok(id);
    }

    connection
        .execute(
            "INSERT INTO parts(
               chapter_id, subchapter_id, part_number, part_name,
               authority_citation, source_citation
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chapter_id,
                subchapter_id,
                part.number,
                part.name,
                part.authority,
                part.source
            ],
        )
        .with_context(|| format!("failed to insert part {}", part.number))?;
    Ok(connection.last_insert_rowid())
}

pub(crate) fn upsert_section(
    connection: &Connection,
    part_id: i64,
    section: &ParsedSection,
) -> Result<i64> {
    let existing = connection
        .query_row(
            "SELECT id FROM sections WHERE part_id = ?1 AND section_number = ?2",
            params![part_id, section.number],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .with_context(|| format!("failed to look up section {}", section.number))?;

    if let Some(id) = existing {
        connection
            .execute(
                "UPDATE sections
                 SET section_heading = ?1, section_content = ?2,
                     authority_citation = ?3, source_citation = ?4, xml_node_id = ?5
                 WHERE id = ?6",
                params![
                    section.heading,
                    section.content,
                    section.authority,
                    section.source,
                    section.xml_node_id,
                    id
                ],
            )
            .with_context(|| format!("failed to update section {}", section.number))?;
        return Ok(id);
    }

    connection
        .execute(
            "INSERT INTO sections(
               part_id, section_number, section_heading, section_content,
               authority_citation, source_citation, xml_node_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                part_id,
                section.number,
                section.heading,
                section.content,
                section.authority,
                section.source,
                section.xml_node_id
            ],
        )
        .with_context(|| format!("failed to insert section {}", section.number))?;
    Ok(connection.last_insert_rowid())
}

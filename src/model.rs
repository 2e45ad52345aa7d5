use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::util::now_utc_string;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    pub number: u32,
    pub name: String,
    pub chapters: Vec<ParsedChapter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChapter {
    pub label: String,
    pub name: String,
    pub children: Vec<ChapterChild>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterChild {
    Subchapter(ParsedSubchapter),
    Part(ParsedPart),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSubchapter {
    pub letter: String,
    pub name: String,
    pub parts: Vec<ParsedPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPart {
    pub number: i64,
    pub name: String,
    pub authority: Option<String>,
    pub source: Option<String>,
    pub sections: Vec<ParsedSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSection {
    pub number: String,
    pub heading: String,
    pub content: String,
    pub authority: Option<String>,
    pub source: Option<String>,
    pub xml_node_id: Option<String>,
}

impl ParsedTitle {
    pub fn section_count(&self) -> usize {
        self.chapters
            .iter()
            .flat_map(|chapter| chapter.children.iter())
            .map(|child| match child {
                ChapterChild::Subchapter(subchapter) => subchapter
                    .parts
                    .iter()
                    .map(|part| part.sections.len())
                    .sum(),
                ChapterChild::Part(part) => part.sections.len(),
            })
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => bail!("unknown ingestion status: {other}"),
        }
    }
}

impl fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionRecord {
    pub title_number: u32,
    pub status: IngestionStatus,
    pub file_hash: Option<String>,
    pub file_size: Option<u64>,
    pub error_message: Option<String>,
    pub records_processed: usize,
    pub last_scraped: String,
}

impl IngestionRecord {
    pub fn in_progress(title_number: u32, file_hash: &str, file_size: u64) -> Self {
        Self {
            title_number,
            status: IngestionStatus::InProgress,
            file_hash: Some(file_hash.to_string()),
            file_size: Some(file_size),
            error_message: None,
            records_processed: 0,
            last_scraped: now_utc_string(),
        }
    }

    pub fn completed(title_number: u32, file_hash: &str, file_size: u64, records: usize) -> Self {
        Self {
            status: IngestionStatus::Completed,
            records_processed: records,
            ..Self::in_progress(title_number, file_hash, file_size)
        }
    }

    pub fn failed(title_number: u32, error_message: impl Into<String>) -> Self {
        Self {
            title_number,
            status: IngestionStatus::Failed,
            file_hash: None,
            file_size: None,
            error_message: Some(error_message.into()),
            records_processed: 0,
            last_scraped: now_utc_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub titles: i64,
    pub chapters: i64,
    pub subchapters: i64,
    pub parts: i64,
    pub sections: i64,
    pub ingestion_records: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub score: f64,
    pub section_id: i64,
    pub section_number: String,
    pub section_heading: String,
    pub section_content: String,
    pub snippet: String,
    pub part_number: i64,
    pub part_name: String,
    pub subchapter_letter: Option<String>,
    pub chapter_number: String,
    pub title_number: u32,
    pub title_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TitleSummary {
    pub title_number: u32,
    pub title_name: String,
    pub sections: i64,
    pub status: Option<IngestionStatus>,
    pub last_scraped: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TitleDetail {
    pub title_number: u32,
    pub title_name: String,
    pub last_updated: String,
    pub chapters: i64,
    pub subchapters: i64,
    pub parts: i64,
    pub sections: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitOutcome {
    pub records: usize,
    pub status: IngestionStatus,
    pub error: Option<String>,
}

impl UnitOutcome {
    pub fn completed(records: usize) -> Self {
        Self {
            records,
            status: IngestionStatus::Completed,
            error: None,
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            records: 0,
            status: IngestionStatus::Failed,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == IngestionStatus::Completed
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub outcomes: BTreeMap<u32, UnitOutcome>,
}

impl RunReport {
    pub fn record_counts(&self) -> BTreeMap<u32, usize> {
        self.outcomes
            .iter()
            .map(|(title, outcome)| (*title, outcome.records))
            .collect()
    }

    pub fn total_records(&self) -> usize {
        self.outcomes.values().map(|outcome| outcome.records).sum()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .values()
            .filter(|outcome| outcome.is_success())
            .count()
    }

    pub fn failed_titles(&self) -> Vec<u32> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| !outcome.is_success())
            .map(|(title, _)| *title)
            .collect()
    }
}

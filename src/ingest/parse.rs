use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

use crate::error::IngestError;
use crate::ingest::markup::{XmlElement, clean_text, flattened_clean};
use crate::model::{
    ChapterChild, ParsedChapter, ParsedPart, ParsedSection, ParsedSubchapter, ParsedTitle,
};

const CHAPTER_STRATEGIES: &[LabelStrategy] = &[
    LabelStrategy::Heading(HeadingPattern::Chapter),
    LabelStrategy::Attribute("N"),
];
const SUBCHAPTER_STRATEGIES: &[LabelStrategy] = &[
    LabelStrategy::Heading(HeadingPattern::Subchapter),
    LabelStrategy::Attribute("N"),
];
const PART_STRATEGIES: &[LabelStrategy] = &[
    LabelStrategy::Heading(HeadingPattern::Part),
    LabelStrategy::Attribute("N"),
];
const SECTION_STRATEGIES: &[LabelStrategy] = &[
    LabelStrategy::SectionAttribute("N"),
    LabelStrategy::Heading(HeadingPattern::Section),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadingPattern {
    Chapter,
    Subchapter,
    Part,
    Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelStrategy {
    Heading(HeadingPattern),
    Attribute(&'static str),
    SectionAttribute(&'static str),
}

#[derive(Debug)]
pub struct StructuralParser {
    chapter_label: Regex,
    subchapter_label: Regex,
    part_number: Regex,
    section_number: Regex,
    section_prefix: Regex,
}

impl StructuralParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            chapter_label: Regex::new(r"(?i)CHAPTER\s+([IVXLCDM]+)")
                .context("failed to compile chapter label regex")?,
            subchapter_label: Regex::new(r"(?i)SUBCHAPTER\s+([A-Z])")
                .context("failed to compile subchapter label regex")?,
            part_number: Regex::new(r"(?i)PART\s+(\d+)")
                .context("failed to compile part number regex")?,
            section_number: Regex::new(r"§\s*([\d.]+)")
                .context("failed to compile section number regex")?,
            section_prefix: Regex::new(r"^§\s*[\d.]+\s*")
                .context("failed to compile section prefix regex")?,
        })
    }

    pub fn parse_title(&self, root: &XmlElement, title_number: u32) -> ParsedTitle {
        let name = title_name(root).unwrap_or_else(|| format!("Title {title_number}"));

        let chapters = root
            .descendants(&|element| element.is("DIV3", "CHAPTER"))
            .into_iter()
            .filter_map(|element| match self.parse_chapter(element) {
                Ok(chapter) => Some(chapter),
                Err(err) => {
                    warn!(title = title_number, error = %err, "skipping chapter");
                    None
                }
            })
            .collect();

        ParsedTitle {
            number: title_number,
            name,
            chapters,
        }
    }

    fn parse_chapter(&self, element: &XmlElement) -> Result<ParsedChapter, IngestError> {
        let heading = heading_text(element)
            .ok_or_else(|| IngestError::extraction("chapter", "missing HEAD element"))?;
        let label = self
            .resolve_label(CHAPTER_STRATEGIES, element, &heading)
            .ok_or_else(|| {
                IngestError::extraction(
                    "chapter",
                    format!("could not parse chapter number from: {heading}"),
                )
            })?;

        let mut children = Vec::new();
        self.collect_chapter_children(element, true, &mut children);

        Ok(ParsedChapter {
            label,
            name: heading,
            children,
        })
    }

    fn collect_chapter_children(
        &self,
        element: &XmlElement,
        direct: bool,
        children: &mut Vec<ChapterChild>,
    ) {
        for child in &element.children {
            if child.is("DIV4", "SUBCHAP") {
                match self.parse_subchapter(child) {
                    Ok(subchapter) => children.push(ChapterChild::Subchapter(subchapter)),
                    Err(err) => warn!(error = %err, "skipping subchapter"),
                }
            } else if direct && child.is("DIV5", "PART") {
                if let Some(part) = self.parse_part_logged(child) {
                    children.push(ChapterChild::Part(part));
                }
            } else {
                self.collect_chapter_children(child, false, children);
            }
        }
    }

    fn parse_subchapter(&self, element: &XmlElement) -> Result<ParsedSubchapter, IngestError> {
        let heading = heading_text(element)
            .ok_or_else(|| IngestError::extraction("subchapter", "missing HEAD element"))?;
        let letter = self
            .resolve_label(SUBCHAPTER_STRATEGIES, element, &heading)
            .ok_or_else(|| {
                IngestError::extraction(
                    "subchapter",
                    format!("could not parse subchapter letter from: {heading}"),
                )
            })?;

        let parts = element
            .descendants(&|candidate| candidate.is("DIV5", "PART"))
            .into_iter()
            .filter_map(|part| self.parse_part_logged(part))
            .collect();

        Ok(ParsedSubchapter {
            letter,
            name: heading,
            parts,
        })
    }

    fn parse_part_logged(&self, element: &XmlElement) -> Option<ParsedPart> {
        match self.parse_part(element) {
            Ok(part) => {
                debug!(
                    part = part.number,
                    sections = part.sections.len(),
                    "parsed part"
                );
                Some(part)
            }
            Err(err) => {
                warn!(error = %err, "skipping part");
                None
            }
        }
    }

    fn parse_part(&self, element: &XmlElement) -> Result<ParsedPart, IngestError> {
        let heading = heading_text(element)
            .ok_or_else(|| IngestError::extraction("part", "missing HEAD element"))?;
        let number = self
            .resolve_label(PART_STRATEGIES, element, &heading)
            .filter(|value| value.chars().all(|ch| ch.is_ascii_digit()))
            .and_then(|value| value.parse::<i64>().ok())
            .ok_or_else(|| {
                IngestError::extraction(
                    "part",
                    format!("could not parse part number from: {heading}"),
                )
            })?;

        let sections = element
            .descendants(&|candidate| candidate.is("DIV8", "SECTION"))
            .into_iter()
            .filter_map(|section| match self.parse_section(section) {
                Ok(section) => Some(section),
                Err(err) => {
                    warn!(part = number, error = %err, "skipping section");
                    None
                }
            })
            .collect();

        Ok(ParsedPart {
            number,
            name: heading,
            authority: citation_text(element, "AUTH"),
            source: citation_text(element, "SOURCE"),
            sections,
        })
    }

    fn parse_section(&self, element: &XmlElement) -> Result<ParsedSection, IngestError> {
        let heading = heading_text(element).unwrap_or_default();
        let number = self
            .resolve_label(SECTION_STRATEGIES, element, &heading)
            .ok_or_else(|| {
                IngestError::extraction("section", "could not extract section number")
            })?;

        let paragraphs = element
            .descendants(&|candidate| candidate.name == "P")
            .into_iter()
            .map(flattened_clean)
            .filter(|paragraph| !paragraph.is_empty())
            .collect::<Vec<String>>();

        Ok(ParsedSection {
            number,
            heading: self.section_prefix.replace(&heading, "").trim().to_string(),
            content: paragraphs.join("\n\n"),
            authority: citation_text(element, "AUTH"),
            source: citation_text(element, "SOURCE"),
            xml_node_id: element.attr("NODE").map(ToOwned::to_owned),
        })
    }

    fn resolve_label(
        &self,
        strategies: &[LabelStrategy],
        element: &XmlElement,
        heading: &str,
    ) -> Option<String> {
        strategies
            .iter()
            .find_map(|strategy| self.apply_strategy(*strategy, element, heading))
    }

    fn apply_strategy(
        &self,
        strategy: LabelStrategy,
        element: &XmlElement,
        heading: &str,
    ) -> Option<String> {
        match strategy {
            LabelStrategy::Heading(pattern) => capture_label(self.pattern(pattern), heading),
            LabelStrategy::Attribute(name) => attribute_label(element, name),
            LabelStrategy::SectionAttribute(name) => section_attribute_label(element, name),
        }
    }

    fn pattern(&self, pattern: HeadingPattern) -> &Regex {
        match pattern {
            HeadingPattern::Chapter => &self.chapter_label,
            HeadingPattern::Subchapter => &self.subchapter_label,
            HeadingPattern::Part => &self.part_number,
            HeadingPattern::Section => &self.section_number,
        }
    }
}

fn capture_label(pattern: &Regex, heading: &str) -> Option<String> {
    pattern
        .captures(heading)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

fn attribute_label(element: &XmlElement, name: &str) -> Option<String> {
    element
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn section_attribute_label(element: &XmlElement, name: &str) -> Option<String> {
    let raw = element.attr(name)?.trim();
    let number = raw.strip_prefix('§').map(str::trim).unwrap_or(raw);
    if number.is_empty() {
        None
    } else {
        Some(number.to_string())
    }
}

fn heading_text(element: &XmlElement) -> Option<String> {
    element.child("HEAD").map(flattened_clean)
}

fn title_name(root: &XmlElement) -> Option<String> {
    root.find_descendant("HEAD")
        .or_else(|| root.find_descendant("TITLE"))
        .map(|element| clean_text(&element.text))
        .filter(|name| !name.is_empty())
}

fn citation_text(element: &XmlElement, name: &str) -> Option<String> {
    element.find_descendant(name).map(flattened_clean)
}

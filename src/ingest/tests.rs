use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, bail};

use super::changes::ChangeDetector;
use super::fetch::{Fetcher, Transport};
use super::markup::{self, clean_text, flatten_text};
use super::parse::StructuralParser;
use super::pipeline::{Pipeline, ingest_document};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::model::{ChapterChild, IngestionStatus};
use crate::store::Store;

const BASE_URL: &str = "https://example.test/ECFR";

const SAMPLE_DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<DLPSTEXTCLASS>
<HEADER>
<FILEDESC>
<TITLESTMT>
<TITLE>Title 1: Test Provisions</TITLE>
</TITLESTMT>
</FILEDESC>
</HEADER>
<TEXT>
<BODY>
<ECFRBRWS>
<DIV1 N="1" TYPE="TITLE">
<HEAD>Title 1—Test Provisions</HEAD>
<DIV3 N="I" TYPE="CHAPTER">
<HEAD>CHAPTER I—TEST CHAPTER</HEAD>
<DIV4 N="A" TYPE="SUBCHAP">
<HEAD>SUBCHAPTER A—GENERAL</HEAD>
<DIV5 N="1" TYPE="PART">
<HEAD>PART 1—DEFINITIONS</HEAD>
<AUTH>
<HED>Authority:</HED>
<PSPACE>Test Authority Citation</PSPACE>
</AUTH>
<DIV8 N="§ 1.1" TYPE="SECTION" NODE="1:1.0.1.1.1.0.1.1">
<HEAD>§ 1.1 Test definitions.</HEAD>
<P>This section contains test definitions.</P>
<P><I>Term 1</I> means the first test term.</P>
<P><I>Term 2</I> means the second test term.</P>
</DIV8>
</DIV5>
</DIV4>
</DIV3>
</DIV1>
</ECFRBRWS>
</BODY>
</TEXT>
</DLPSTEXTCLASS>"#;

const TWO_CHAPTER_DOCUMENT: &str = r#"<DLPSTEXTCLASS><TEXT><BODY><ECFRBRWS>
<DIV1 N="40" TYPE="TITLE">
<HEAD>Title 40—Protection of Environment</HEAD>
<DIV3 N="I" TYPE="CHAPTER">
<HEAD>CHAPTER I—ENVIRONMENTAL PROTECTION AGENCY</HEAD>
<DIV4 N="A" TYPE="SUBCHAP">
<HEAD>SUBCHAPTER A—GENERAL</HEAD>
<DIV5 N="1" TYPE="PART">
<HEAD>PART 1—STATEMENT OF ORGANIZATION</HEAD>
<DIV8 N="§ 1.1" TYPE="SECTION">
<HEAD>§ 1.1 Creation and authority.</HEAD>
<P>The agency was established in 1970.</P>
</DIV8>
</DIV5>
</DIV4>
</DIV3>
<DIV3 N="II" TYPE="CHAPTER">
<HEAD>CHAPTER II—ENVIRONMENTAL PROTECTION AGENCY (CONTINUED)</HEAD>
<DIV5 N="50" TYPE="PART">
<HEAD>PART 50—NATIONAL AMBIENT AIR QUALITY STANDARDS</HEAD>
<SOURCE><HED>Source:</HED><PSPACE>36 FR 22384, Nov. 25, 1971</PSPACE></SOURCE>
<DIV8 N="§ 50.1" TYPE="SECTION">
<HEAD>§ 50.1 Definitions.</HEAD>
<P>Ambient air means that portion of the atmosphere external to buildings.</P>
</DIV8>
</DIV5>
</DIV3>
</DIV1>
</ECFRBRWS></BODY></TEXT></DLPSTEXTCLASS>"#;

const EMPTY_TITLE_DOCUMENT: &str = r#"<DLPSTEXTCLASS><TEXT><BODY><ECFRBRWS>
<DIV1 N="3" TYPE="TITLE"><HEAD>Title 3—The President</HEAD></DIV1>
</ECFRBRWS></BODY></TEXT></DLPSTEXTCLASS>"#;

const MALFORMED_DOCUMENT: &str = "<DLPSTEXTCLASS><DIV1><HEAD>Broken</DIV1>";

#[derive(Clone, Default)]
struct ScriptedTransport {
    documents: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    calls: Rc<Cell<usize>>,
}

impl ScriptedTransport {
    fn serve(&self, title: u32, body: &str) {
        self.documents
            .borrow_mut()
            .insert(title_url(title), body.as_bytes().to_vec());
    }

    fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Transport for ScriptedTransport {
    fn get(&self, url: &str) -> Result<Box<dyn Read>> {
        self.calls.set(self.calls.get() + 1);
        match self.documents.borrow().get(url) {
            Some(body) => Ok(Box::new(Cursor::new(body.clone()))),
            None => bail!("404 Not Found for {url}"),
        }
    }
}

fn title_url(title: u32) -> String {
    format!("{BASE_URL}/title-{title}/ECFR-title{title}.xml")
}

fn test_config(dir: &Path) -> IngestConfig {
    IngestConfig {
        base_url: BASE_URL.to_string(),
        data_dir: dir.to_path_buf(),
        db_path: dir.join("ecfr.db"),
        max_retries: 3,
        retry_delay: Duration::ZERO,
        request_delay: Duration::ZERO,
        ..IngestConfig::default()
    }
}

fn test_pipeline(dir: &Path, transport: &ScriptedTransport) -> Pipeline<ScriptedTransport> {
    let store = Store::open_in_memory().expect("in-memory store should initialize");
    Pipeline::new(test_config(dir), transport.clone(), store).expect("pipeline should build")
}

fn parse_document(xml: &str, title: u32) -> crate::model::ParsedTitle {
    let root = markup::parse_bytes(xml.as_bytes(), "fixture").expect("fixture should parse");
    StructuralParser::new()
        .expect("parser should compile")
        .parse_title(&root, title)
}

#[test]
fn flatten_text_joins_text_and_tails_in_document_order() {
    let root = markup::parse_bytes(b"<P>Alpha <I>beta</I> gamma <E>delta</E></P>", "inline")
        .expect("inline markup should parse");

    assert_eq!(root.text, "Alpha ");
    assert_eq!(root.children[0].tail, " gamma ");
    assert_eq!(
        clean_text(&flatten_text(&root)),
        "Alpha beta gamma delta"
    );
}

#[test]
fn clean_text_collapses_whitespace_and_decodes_escapes() {
    assert_eq!(
        clean_text("  Fish &amp; Game\n\t&lt;1&gt; &quot;q&quot; &apos;s  "),
        "Fish & Game <1> \"q\" 's"
    );

    let root = markup::parse_bytes(b"<P>Fish &amp; Wildlife</P>", "escaped")
        .expect("escaped markup should parse");
    assert_eq!(markup::flattened_clean(&root), "Fish & Wildlife");
}

#[test]
fn malformed_markup_is_a_validation_error() {
    for (bytes, label) in [
        (MALFORMED_DOCUMENT.as_bytes(), "mismatched"),
        (b"<A><B>text".as_slice(), "unclosed"),
        (b"".as_slice(), "empty"),
        (b"<A/><B/>".as_slice(), "two roots"),
        (b"<A>fish & game</A>".as_slice(), "bare ampersand"),
        (b"<A>&nbsp;x</A>".as_slice(), "undefined entity"),
        (b"<A>\xff\xfe bad utf8</A>".as_slice(), "invalid utf-8 text"),
        (b"<A N=\"&bogus;\"/>".as_slice(), "undefined entity in attribute"),
        (b"<A><![CDATA[\xff]]></A>".as_slice(), "invalid utf-8 cdata"),
    ] {
        let err = markup::parse_bytes(bytes, label).expect_err("markup should be rejected");
        assert!(
            matches!(
                err.downcast_ref::<IngestError>(),
                Some(IngestError::Validation { .. })
            ),
            "{label}: unexpected error {err:#}"
        );
    }
}

#[test]
fn parser_extracts_full_hierarchy_from_sample_document() {
    let parsed = parse_document(SAMPLE_DOCUMENT, 1);

    assert_eq!(parsed.name, "Title 1—Test Provisions");
    assert_eq!(parsed.chapters.len(), 1);
    assert_eq!(parsed.section_count(), 1);

    let chapter = &parsed.chapters[0];
    assert_eq!(chapter.label, "I");
    assert_eq!(chapter.name, "CHAPTER I—TEST CHAPTER");

    let ChapterChild::Subchapter(subchapter) = &chapter.children[0] else {
        panic!("expected a subchapter");
    };
    assert_eq!(subchapter.letter, "A");

    let part = &subchapter.parts[0];
    assert_eq!(part.number, 1);
    assert_eq!(part.name, "PART 1—DEFINITIONS");
    assert_eq!(
        part.authority.as_deref(),
        Some("Authority: Test Authority Citation")
    );
    assert_eq!(part.source, None);

    let section = &part.sections[0];
    assert_eq!(section.number, "1.1");
    assert_eq!(section.heading, "Test definitions.");
    assert_eq!(
        section.content,
        "This section contains test definitions.\n\n\
         Term 1 means the first test term.\n\n\
         Term 2 means the second test term."
    );
    assert_eq!(section.xml_node_id.as_deref(), Some("1:1.0.1.1.1.0.1.1"));
}

#[test]
fn parser_keeps_direct_parts_separate_from_subchapters() {
    let parsed = parse_document(TWO_CHAPTER_DOCUMENT, 40);

    let labels = parsed
        .chapters
        .iter()
        .map(|chapter| chapter.label.as_str())
        .collect::<Vec<&str>>();
    assert_eq!(labels, vec!["I", "II"]);

    let ChapterChild::Part(part) = &parsed.chapters[1].children[0] else {
        panic!("expected a direct part under chapter II");
    };
    assert_eq!(part.number, 50);
    assert_eq!(
        part.source.as_deref(),
        Some("Source: 36 FR 22384, Nov. 25, 1971")
    );
    assert_eq!(part.sections[0].number, "50.1");
}

#[test]
fn labels_fall_back_to_structural_attributes() {
    let xml = r#"<DIV1 TYPE="TITLE"><HEAD>Title 9</HEAD>
<DIV3 N="IV" TYPE="CHAPTER"><HEAD>Miscellaneous Provisions</HEAD>
<DIV4 N="C" TYPE="SUBCHAP"><HEAD>Reserved Matters</HEAD>
<DIV5 N="12" TYPE="PART"><HEAD>General Rules</HEAD>
<DIV8 TYPE="SECTION"><HEAD>§ 12.4 Scope of rules.</HEAD><P>Body.</P></DIV8>
</DIV5></DIV4></DIV3></DIV1>"#;

    let parsed = parse_document(xml, 9);
    let chapter = &parsed.chapters[0];
    assert_eq!(chapter.label, "IV");

    let ChapterChild::Subchapter(subchapter) = &chapter.children[0] else {
        panic!("expected a subchapter");
    };
    assert_eq!(subchapter.letter, "C");
    assert_eq!(subchapter.parts[0].number, 12);

    let section = &subchapter.parts[0].sections[0];
    assert_eq!(section.number, "12.4");
    assert_eq!(section.heading, "Scope of rules.");
    assert_eq!(section.xml_node_id, None);
}

#[test]
fn unlabelled_chapters_and_parts_are_skipped_without_aborting() {
    let xml = r#"<DIV1 TYPE="TITLE"><HEAD>Title 5</HEAD>
<DIV3 TYPE="CHAPTER"><HEAD>Reserved</HEAD>
<DIV5 N="1" TYPE="PART"><HEAD>PART 1—LOST</HEAD>
<DIV8 N="1.1" TYPE="SECTION"><HEAD>§ 1.1 Lost.</HEAD></DIV8></DIV5>
</DIV3>
<DIV3 N="II" TYPE="CHAPTER"><HEAD>CHAPTER II—KEPT</HEAD>
<DIV5 N="abc" TYPE="PART"><HEAD>PART X—UNNUMBERED</HEAD>
<DIV8 N="9.1" TYPE="SECTION"><HEAD>§ 9.1 Dropped.</HEAD></DIV8></DIV5>
<DIV5 TYPE="PART"><HEAD>PART 20—KEPT PART</HEAD>
<DIV8 N="20.1" TYPE="SECTION"><HEAD>§ 20.1 Kept.</HEAD></DIV8></DIV5>
</DIV3></DIV1>"#;

    let parsed = parse_document(xml, 5);
    assert_eq!(parsed.chapters.len(), 1);
    assert_eq!(parsed.chapters[0].label, "II");
    assert_eq!(parsed.chapters[0].children.len(), 1);

    let ChapterChild::Part(part) = &parsed.chapters[0].children[0] else {
        panic!("expected a direct part");
    };
    assert_eq!(part.number, 20);
    assert_eq!(part.sections[0].number, "20.1");
    assert_eq!(part.sections[0].content, "");
}

#[test]
fn title_name_falls_back_to_synthetic_label() {
    let parsed = parse_document("<DLPSTEXTCLASS><TEXT/></DLPSTEXTCLASS>", 17);
    assert_eq!(parsed.name, "Title 17");
    assert!(parsed.chapters.is_empty());
}

#[test]
fn fetch_skips_existing_document_without_network() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let config = test_config(dir.path());
    let transport = ScriptedTransport::default();

    fs::create_dir_all(config.download_dir()).expect("download dir should be created");
    fs::write(config.title_path(4), SAMPLE_DOCUMENT).expect("fixture should be written");

    let fetcher = Fetcher::new(config.clone(), transport.clone());
    let document = fetcher.fetch(4, false).expect("existing document should be reused");

    assert_eq!(transport.calls(), 0);
    assert_eq!(document.size, SAMPLE_DOCUMENT.len() as u64);
}

#[test]
fn forced_fetch_replaces_existing_document() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let config = test_config(dir.path());
    let transport = ScriptedTransport::default();
    transport.serve(4, SAMPLE_DOCUMENT);

    fs::create_dir_all(config.download_dir()).expect("download dir should be created");
    fs::write(config.title_path(4), "<old/>").expect("fixture should be written");

    let fetcher = Fetcher::new(config.clone(), transport.clone());
    let document = fetcher.fetch(4, true).expect("forced fetch should succeed");

    assert_eq!(transport.calls(), 1);
    let stored = fs::read_to_string(&document.path).expect("document should be readable");
    assert_eq!(stored, SAMPLE_DOCUMENT);
}

#[test]
fn fetch_gives_up_after_exactly_max_retries() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let config = test_config(dir.path());
    let transport = ScriptedTransport::default();

    let fetcher = Fetcher::new(config.clone(), transport.clone());
    let err = fetcher.fetch(6, false).expect_err("fetch should fail");

    assert_eq!(transport.calls(), 3);
    match err.downcast_ref::<IngestError>() {
        Some(IngestError::Transport { attempts, url, .. }) => {
            assert_eq!(*attempts, 3);
            assert_eq!(url, &title_url(6));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
    assert!(!config.title_path(6).exists());
}

#[test]
fn fetch_rejects_malformed_download_when_validating() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let config = test_config(dir.path());
    let transport = ScriptedTransport::default();
    transport.serve(8, MALFORMED_DOCUMENT);

    let fetcher = Fetcher::new(config.clone(), transport.clone());
    assert!(fetcher.fetch(8, false).is_err());
    assert_eq!(transport.calls(), 1);
    assert!(!config.title_path(8).exists());
    assert!(!config.title_path(8).with_extension("xml.part").exists());
}

#[test]
fn two_chapter_scenario_persists_expected_hierarchy() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(40, TWO_CHAPTER_DOCUMENT);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    let report = pipeline.run_full(&[40], false);
    assert_eq!(report.record_counts().get(&40), Some(&2));
    assert_eq!(report.succeeded(), 1);

    let stats = pipeline.store().stats().expect("stats should load");
    assert_eq!(stats.titles, 1);
    assert_eq!(stats.chapters, 2);
    assert_eq!(stats.subchapters, 1);
    assert_eq!(stats.parts, 2);
    assert_eq!(stats.sections, 2);

    let subchapter_id: Option<i64> = pipeline
        .store()
        .connection()
        .query_row(
            "SELECT subchapter_id FROM parts WHERE part_number = 50",
            [],
            |row| row.get(0),
        )
        .expect("part 50 should exist");
    assert_eq!(subchapter_id, None);

    let owning_titles: i64 = pipeline
        .store()
        .connection()
        .query_row(
            "SELECT COUNT(DISTINCT t.title_number)
             FROM sections s
             JOIN parts p ON p.id = s.part_id
             JOIN chapters c ON c.id = p.chapter_id
             JOIN titles t ON t.id = c.title_id",
            [],
            |row| row.get(0),
        )
        .expect("join should succeed");
    assert_eq!(owning_titles, 1);

    let hits = pipeline
        .store()
        .search_sections("\"portion of the atmosphere\"", 10)
        .expect("search should succeed");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].section_number, "50.1");
    assert_eq!(hits[0].rank, 1);
}

#[test]
fn reingesting_same_document_is_idempotent() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(40, TWO_CHAPTER_DOCUMENT);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    pipeline.run_full(&[40], true);
    let first = pipeline.store().stats().expect("stats should load");

    let report = pipeline.run_full(&[40], true);
    let second = pipeline.store().stats().expect("stats should load");

    assert_eq!(report.total_records(), 2);
    assert_eq!(first, second);
    assert_eq!(transport.calls(), 2);
}

#[test]
fn existing_download_is_reused_without_force() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(40, TWO_CHAPTER_DOCUMENT);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    pipeline.run_full(&[40], false);
    let report = pipeline.run_full(&[40], false);

    assert_eq!(transport.calls(), 1);
    assert_eq!(report.total_records(), 2);
}

#[test]
fn duplicate_section_numbers_collapse_with_last_content_winning() {
    let xml = r#"<DIV1 TYPE="TITLE"><HEAD>Title 2</HEAD>
<DIV3 N="I" TYPE="CHAPTER"><HEAD>CHAPTER I—GRANTS</HEAD>
<DIV5 N="1" TYPE="PART"><HEAD>PART 1—ABOUT</HEAD>
<DIV8 N="§ 1.1" TYPE="SECTION"><HEAD>§ 1.1 First.</HEAD><P>Original wording.</P></DIV8>
<DIV8 N="§ 1.1" TYPE="SECTION"><HEAD>§ 1.1 Second.</HEAD><P>Replacement wording.</P></DIV8>
</DIV5></DIV3></DIV1>"#;

    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(2, xml);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    let report = pipeline.run_full(&[2], false);
    assert_eq!(report.total_records(), 2);
    assert_eq!(pipeline.store().stats().expect("stats").sections, 1);

    let (heading, content): (String, String) = pipeline
        .store()
        .connection()
        .query_row(
            "SELECT section_heading, section_content FROM sections WHERE section_number = '1.1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .expect("section should exist");
    assert_eq!(heading, "Second.");
    assert_eq!(content, "Replacement wording.");
}

#[test]
fn document_without_sections_succeeds_with_zero_records() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(3, EMPTY_TITLE_DOCUMENT);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    let report = pipeline.run_full(&[3], false);
    let outcome = report.outcomes.get(&3).expect("title 3 should be reported");
    assert!(outcome.is_success());
    assert_eq!(outcome.records, 0);

    let stats = pipeline.store().stats().expect("stats should load");
    assert_eq!(stats.titles, 1);
    assert_eq!(stats.sections, 0);

    let record = pipeline
        .store()
        .ingestion_record(3)
        .expect("lookup should succeed")
        .expect("record should exist");
    assert_eq!(record.status, IngestionStatus::Completed);
    assert_eq!(record.records_processed, 0);
}

#[test]
fn malformed_document_marks_record_failed_and_returns_error() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let config = IngestConfig {
        validate_xml: false,
        ..test_config(dir.path())
    };
    let transport = ScriptedTransport::default();
    transport.serve(11, MALFORMED_DOCUMENT);

    let fetcher = Fetcher::new(config, transport.clone());
    let document = fetcher.fetch(11, false).expect("unvalidated fetch should succeed");

    let mut store = Store::open_in_memory().expect("in-memory store should initialize");
    let parser = StructuralParser::new().expect("parser should compile");
    let err = ingest_document(&mut store, &parser, &document).expect_err("ingest should fail");
    assert!(matches!(
        err.downcast_ref::<IngestError>(),
        Some(IngestError::Validation { .. })
    ));

    let record = store
        .ingestion_record(11)
        .expect("lookup should succeed")
        .expect("record should exist");
    assert_eq!(record.status, IngestionStatus::Failed);
    assert!(
        record
            .error_message
            .as_deref()
            .is_some_and(|message| !message.is_empty())
    );
    assert_eq!(record.file_hash, None);
    assert_eq!(store.stats().expect("stats").titles, 0);
}

#[test]
fn rejected_download_marks_record_failed_during_run() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(11, MALFORMED_DOCUMENT);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    let report = pipeline.run_full(&[11, 12], false);
    assert_eq!(report.failed_titles(), vec![11, 12]);
    assert_eq!(transport.calls(), 4);

    let record = pipeline
        .store()
        .ingestion_record(11)
        .expect("lookup should succeed")
        .expect("rejected title should have a record");
    assert_eq!(record.status, IngestionStatus::Failed);
    assert!(
        record
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("invalid XML document"))
    );
    assert_eq!(
        record.error_message.as_deref(),
        report.outcomes[&11].error.as_deref()
    );

    assert!(
        pipeline
            .store()
            .ingestion_record(12)
            .expect("lookup should succeed")
            .is_none()
    );
    assert_eq!(pipeline.store().stats().expect("stats").titles, 0);
}

#[test]
fn storage_failure_rolls_back_title_and_keeps_other_titles() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(1, SAMPLE_DOCUMENT);
    transport.serve(40, TWO_CHAPTER_DOCUMENT);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    assert_eq!(pipeline.run_full(&[1], false).succeeded(), 1);
    pipeline
        .store()
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_section_50_1 BEFORE INSERT ON sections
             WHEN NEW.section_number = '50.1'
             BEGIN
               SELECT RAISE(ABORT, 'section write rejected');
             END;",
        )
        .expect("trigger should be created");

    let report = pipeline.run_full(&[1, 40], false);
    assert_eq!(report.failed_titles(), vec![40]);
    assert!(
        report.outcomes[&40]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("storage failure while ingesting title 40"))
    );

    assert!(
        pipeline
            .store()
            .title_detail(40)
            .expect("lookup should succeed")
            .is_none()
    );
    let stats = pipeline.store().stats().expect("stats should load");
    assert_eq!(stats.titles, 1);
    assert_eq!(stats.chapters, 1);
    assert_eq!(stats.subchapters, 1);
    assert_eq!(stats.parts, 1);
    assert_eq!(stats.sections, 1);
    assert_eq!(stats.ingestion_records, 2);

    let failed = pipeline
        .store()
        .ingestion_record(40)
        .expect("lookup should succeed")
        .expect("record should exist");
    assert_eq!(failed.status, IngestionStatus::Failed);
    assert!(
        failed
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("section write rejected"))
    );

    let kept = pipeline
        .store()
        .ingestion_record(1)
        .expect("lookup should succeed")
        .expect("record should exist");
    assert_eq!(kept.status, IngestionStatus::Completed);
    assert_eq!(kept.records_processed, 1);
}

#[test]
fn run_continues_past_failed_titles() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(1, SAMPLE_DOCUMENT);
    transport.serve(3, EMPTY_TITLE_DOCUMENT);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    let report = pipeline.run_full(&[1, 2, 3], false);

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed_titles(), vec![2]);
    assert_eq!(report.record_counts().get(&2), Some(&0));
    assert!(
        report.outcomes[&2]
            .error
            .as_deref()
            .is_some_and(|error| error.contains("after 3 attempts"))
    );
    assert_eq!(report.total_records(), 1);
}

#[test]
fn change_detection_compares_fingerprints() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(1, SAMPLE_DOCUMENT);
    let mut pipeline = test_pipeline(dir.path(), &transport);

    assert_eq!(pipeline.check_updates(&[1]).get(&1), Some(&true));
    assert_eq!(transport.calls(), 0);

    pipeline.run_full(&[1], false);
    assert_eq!(pipeline.check_updates(&[1]).get(&1), Some(&false));
    assert_eq!(transport.calls(), 2);

    transport.serve(1, &SAMPLE_DOCUMENT.replace("second test term", "second test terms"));
    assert_eq!(pipeline.check_updates(&[1]).get(&1), Some(&true));
}

#[test]
fn change_detector_reports_single_byte_difference() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let config = test_config(dir.path());
    let transport = ScriptedTransport::default();
    transport.serve(40, TWO_CHAPTER_DOCUMENT);

    let fetcher = Fetcher::new(config, transport.clone());
    let mut store = Store::open_in_memory().expect("in-memory store should initialize");
    let parser = StructuralParser::new().expect("parser should compile");
    let document = fetcher.fetch(40, false).expect("fetch should succeed");
    ingest_document(&mut store, &parser, &document).expect("ingest should succeed");

    let detector = ChangeDetector::new(&fetcher, &store);
    assert!(!detector.has_changed(40).expect("detection should succeed"));

    transport.serve(40, &TWO_CHAPTER_DOCUMENT.replacen("1970", "1971", 1));
    assert!(detector.has_changed(40).expect("detection should succeed"));
}

#[test]
fn incremental_run_only_reingests_changed_titles() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let transport = ScriptedTransport::default();
    transport.serve(1, SAMPLE_DOCUMENT);
    transport.serve(40, TWO_CHAPTER_DOCUMENT);
    let config = IngestConfig {
        max_retries: 1,
        ..test_config(dir.path())
    };
    let store = Store::open_in_memory().expect("in-memory store should initialize");
    let mut pipeline =
        Pipeline::new(config, transport.clone(), store).expect("pipeline should build");

    pipeline.run_full(&[1, 40], false);
    transport.serve(40, &TWO_CHAPTER_DOCUMENT.replacen("1970", "1971", 1));

    let report = pipeline.run_incremental();

    assert!(!report.outcomes.contains_key(&1));
    let changed = report.outcomes.get(&40).expect("title 40 should be re-ingested");
    assert!(changed.is_success());
    assert_eq!(changed.records, 2);
    assert_eq!(report.outcomes.len(), 49);
    assert_eq!(report.succeeded(), 1);

    let hits = pipeline
        .store()
        .search_sections("1971", 10)
        .expect("search should succeed");
    assert!(hits.iter().any(|hit| hit.section_number == "1.1"));
}

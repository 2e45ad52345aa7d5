use std::collections::BTreeMap;

use anyhow::Result;
use tracing::{error, info, warn};

use crate::config::{IngestConfig, all_titles};
use crate::error::IngestError;
use crate::ingest::changes::ChangeDetector;
use crate::ingest::fetch::{FetchedDocument, Fetcher, HttpTransport, Transport};
use crate::ingest::markup;
use crate::ingest::parse::StructuralParser;
use crate::model::{IngestionRecord, RunReport, UnitOutcome};
use crate::store::Store;
use crate::util::sha256_file;

pub struct Pipeline<T: Transport> {
    fetcher: Fetcher<T>,
    parser: StructuralParser,
    store: Store,
}

impl Pipeline<HttpTransport> {
    pub fn http(config: &IngestConfig, store: Store) -> Result<Self> {
        Self::new(config.clone(), HttpTransport::new(config)?, store)
    }
}

impl<T: Transport> Pipeline<T> {
    pub fn new(config: IngestConfig, transport: T, store: Store) -> Result<Self> {
        Ok(Self {
            fetcher: Fetcher::new(config, transport),
            parser: StructuralParser::new()?,
            store,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn run_full(&mut self, titles: &[u32], force: bool) -> RunReport {
        info!(titles = titles.len(), force, "starting ingestion run");
        let mut report = RunReport::default();

        for &title in titles {
            let outcome = match self.fetcher.fetch(title, force) {
                Ok(document) => {
                    match ingest_document(&mut self.store, &self.parser, &document) {
                        Ok(records) => UnitOutcome::completed(records),
                        Err(err) => UnitOutcome::failed(format!("{err:#}")),
                    }
                }
                Err(err) => {
                    let detail = format!("{err:#}");
                    if matches!(
                        err.downcast_ref::<IngestError>(),
                        Some(IngestError::Validation { .. })
                    ) {
                        mark_failed(&self.store, title, &detail);
                    } else {
                        warn!(title, error = %detail, "fetch failed, skipping title");
                    }
                    UnitOutcome::failed(detail)
                }
            };
            report.outcomes.insert(title, outcome);
        }

        info!(
            titles = report.outcomes.len(),
            succeeded = report.succeeded(),
            failed = report.failed_titles().len(),
            records = report.total_records(),
            "ingestion run complete"
        );
        report
    }

    pub fn run_incremental(&mut self) -> RunReport {
        let updates = self.check_updates(&all_titles());
        let changed = updates
            .into_iter()
            .filter_map(|(title, changed)| changed.then_some(title))
            .collect::<Vec<u32>>();

        if changed.is_empty() {
            info!("no titles changed since last ingestion");
            return RunReport::default();
        }

        info!(changed = changed.len(), "re-ingesting changed titles");
        self.run_full(&changed, true)
    }

    pub fn check_updates(&self, titles: &[u32]) -> BTreeMap<u32, bool> {
        let detector = ChangeDetector::new(&self.fetcher, &self.store);

        titles
            .iter()
            .map(|&title| {
                let changed = detector.has_changed(title).unwrap_or_else(|err| {
                    warn!(
                        title,
                        error = %format!("{err:#}"),
                        "change detection failed, treating title as changed"
                    );
                    true
                });
                (title, changed)
            })
            .collect()
    }
}

pub fn ingest_document(
    store: &mut Store,
    parser: &StructuralParser,
    document: &FetchedDocument,
) -> Result<usize> {
    let title = document.title;
    let file_hash = match sha256_file(&document.path) {
        Ok(hash) => hash,
        Err(err) => return record_failure(store, title, err),
    };

    store.record_ingestion(&IngestionRecord::in_progress(title, &file_hash, document.size))?;

    match parse_and_persist(store, parser, document, &file_hash) {
        Ok(records) => {
            info!(title, records, bytes = document.size, "title ingested");
            Ok(records)
        }
        Err(err) => record_failure(store, title, err),
    }
}

fn parse_and_persist(
    store: &mut Store,
    parser: &StructuralParser,
    document: &FetchedDocument,
    file_hash: &str,
) -> Result<usize> {
    let root = markup::parse_file(&document.path)?;
    let parsed = parser.parse_title(&root, document.title);
    info!(
        title = parsed.number,
        name = %parsed.name,
        chapters = parsed.chapters.len(),
        sections = parsed.section_count(),
        "parsed title document"
    );
    store.persist_title(&parsed, file_hash, document.size)
}

fn record_failure(store: &Store, title: u32, err: anyhow::Error) -> Result<usize> {
    mark_failed(store, title, &format!("{err:#}"));
    Err(err)
}

fn mark_failed(store: &Store, title: u32, detail: &str) {
    error!(title, error = %detail, "title ingestion failed");

    if let Err(record_err) = store.record_ingestion(&IngestionRecord::failed(title, detail)) {
        warn!(title, error = %format!("{record_err:#}"), "failed to record ingestion failure");
    }
}

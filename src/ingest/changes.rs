use anyhow::Result;
use tracing::{debug, info};

use crate::ingest::fetch::{Fetcher, Transport};
use crate::store::Store;
use crate::util::sha256_file;

pub struct ChangeDetector<'a, T: Transport> {
    fetcher: &'a Fetcher<T>,
    store: &'a Store,
}

impl<'a, T: Transport> ChangeDetector<'a, T> {
    pub fn new(fetcher: &'a Fetcher<T>, store: &'a Store) -> Self {
        Self { fetcher, store }
    }

    pub fn has_changed(&self, title: u32) -> Result<bool> {
        let Some(record) = self.store.ingestion_record(title)? else {
            info!(title, "title has never been ingested");
            return Ok(true);
        };

        let document = self.fetcher.fetch(title, true)?;
        let current_hash = sha256_file(&document.path)?;
        let changed = record.file_hash.as_deref() != Some(current_hash.as_str());

        debug!(
            title,
            stored_hash = record.file_hash.as_deref().unwrap_or(""),
            current_hash = %current_hash,
            changed,
            "compared document fingerprints"
        );

        Ok(changed)
    }
}

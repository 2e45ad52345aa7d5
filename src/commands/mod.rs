use std::time::Duration;

use crate::cli::{FetchArgs, GlobalArgs};
use crate::config::IngestConfig;

pub mod check_updates;
pub mod database;
pub mod scrape;
pub mod search;
pub mod stats;
pub mod titles;

pub(crate) fn ingest_config(global: &GlobalArgs, fetch: &FetchArgs) -> IngestConfig {
    IngestConfig {
        base_url: fetch.base_url.clone(),
        data_dir: global.data_dir.clone(),
        db_path: global.db_path.clone(),
        request_timeout: Duration::from_secs(fetch.timeout_secs),
        max_retries: fetch.max_retries,
        retry_delay: Duration::from_millis(fetch.retry_delay_ms),
        request_delay: Duration::from_millis(fetch.request_delay_ms),
        validate_xml: !fetch.no_validate,
        ..IngestConfig::default()
    }
}

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, ACCEPT_ENCODING, HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::ingest::markup;
use crate::util::ensure_directory;

pub trait Transport {
    fn get(&self, url: &str) -> Result<Box<dyn Read>>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/xml, text/xml, */*"),
        );
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &str) -> Result<Box<dyn Read>> {
        let response = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("request to {url} returned an error status"))?;
        Ok(Box::new(response))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDocument {
    pub title: u32,
    pub path: PathBuf,
    pub size: u64,
}

pub struct Fetcher<T: Transport> {
    config: IngestConfig,
    transport: T,
}

impl<T: Transport> Fetcher<T> {
    pub fn new(config: IngestConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn fetch(&self, title: u32, force: bool) -> Result<FetchedDocument> {
        let target = self.config.title_path(title);

        if target.exists() && !force && self.config.skip_existing {
            info!(title, path = %target.display(), "document already downloaded, skipping fetch");
            return document_for(title, target);
        }

        let download_dir = self.config.download_dir();
        ensure_directory(&download_dir)?;

        let url = self.config.title_url(title);
        let partial = target.with_extension("xml.part");
        info!(title, url = %url, "downloading title document");

        let bytes = self.download_with_retries(&url, &partial)?;

        if self.config.validate_xml {
            if let Err(err) = markup::validate_file(&partial) {
                discard_partial(&partial);
                return Err(
                    err.context(format!("downloaded document for title {title} is invalid"))
                );
            }
        }

        fs::rename(&partial, &target).with_context(|| {
            format!(
                "failed to move {} into place at {}",
                partial.display(),
                target.display()
            )
        })?;

        info!(title, bytes, path = %target.display(), "downloaded title document");
        document_for(title, target)
    }

    fn download_with_retries(&self, url: &str, partial: &Path) -> Result<u64> {
        let max_attempts = self.config.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            debug!(url, attempt, "requesting document");

            match self.download_once(url, partial) {
                Ok(bytes) => {
                    thread::sleep(self.config.request_delay);
                    return Ok(bytes);
                }
                Err(err) => {
                    warn!(url, attempt, error = %format!("{err:#}"), "request failed");
                    last_error = Some(err);
                    if attempt < max_attempts {
                        thread::sleep(self.config.retry_delay * attempt);
                    }
                }
            }
        }

        discard_partial(partial);
        let last_error = last_error
            .map(|err| format!("{err:#}"))
            .unwrap_or_else(|| "no attempt was made".to_string());

        Err(IngestError::Transport {
            url: url.to_string(),
            attempts: max_attempts,
            last_error,
        }
        .into())
    }

    fn download_once(&self, url: &str, partial: &Path) -> Result<u64> {
        let mut body = self.transport.get(url)?;
        let file = File::create(partial)
            .with_context(|| format!("failed to create {}", partial.display()))?;
        let mut writer = BufWriter::new(file);
        let mut chunk = vec![0_u8; self.config.chunk_size.max(1)];
        let mut written = 0_u64;

        loop {
            let count = body
                .read(&mut chunk)
                .with_context(|| format!("failed to read response body from {url}"))?;
            if count == 0 {
                break;
            }
            writer
                .write_all(&chunk[..count])
                .with_context(|| format!("failed to write {}", partial.display()))?;
            written += count as u64;
        }

        writer
            .flush()
            .with_context(|| format!("failed to flush {}", partial.display()))?;

        if written == 0 {
            return Err(anyhow!("empty response body from {url}"));
        }

        Ok(written)
    }
}

fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => debug!(path = %partial.display(), "removed partial download"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            path = %partial.display(),
            error = %err,
            "failed to remove partial download"
        ),
    }
}

fn document_for(title: u32, path: PathBuf) -> Result<FetchedDocument> {
    let size = fs::metadata(&path)
        .with_context(|| format!("failed to stat {}", path.display()))?
        .len();
    Ok(FetchedDocument { title, path, size })
}

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://www.govinfo.gov/bulkdata/ECFR";
pub const DEFAULT_USER_AGENT: &str = "eCFR-Scraper/1.0 (Educational/Research Purpose)";
pub const FIRST_TITLE: u32 = 1;
pub const LAST_TITLE: u32 = 50;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub user_agent: String,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub request_delay: Duration,
    pub chunk_size: usize,
    pub validate_xml: bool,
    pub skip_existing: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("data");
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: data_dir.join("ecfr.db"),
            data_dir,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            request_delay: Duration::from_millis(500),
            chunk_size: 8192,
            validate_xml: true,
            skip_existing: true,
        }
    }
}

impl IngestConfig {
    pub fn download_dir(&self) -> PathBuf {
        self.data_dir.join("xml_files")
    }

    pub fn title_url(&self, title: u32) -> String {
        format!(
            "{}/title-{title}/ECFR-title{title}.xml",
            self.base_url.trim_end_matches('/')
        )
    }

    pub fn title_path(&self, title: u32) -> PathBuf {
        self.download_dir().join(format!("ECFR-title{title}.xml"))
    }
}

pub fn all_titles() -> Vec<u32> {
    (FIRST_TITLE..=LAST_TITLE).collect()
}

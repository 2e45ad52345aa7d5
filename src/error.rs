use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to fetch {url} after {attempts} attempts: {last_error}")]
    Transport {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("invalid XML document {path}: {detail}")]
    Validation { path: String, detail: String },

    #[error("could not classify {element} element: {detail}")]
    Extraction { element: String, detail: String },

    #[error("storage failure while ingesting title {title}: {detail}")]
    Persistence { title: u32, detail: String },

    #[error("database at {path} is not initialized; run init-db first")]
    NotInitialized { path: String },
}

impl IngestError {
    pub fn extraction(element: &str, detail: impl Into<String>) -> Self {
        Self::Extraction {
            element: element.to_string(),
            detail: detail.into(),
        }
    }
}

//! Idempotent staging of raw responses.
//!
//! Every backend keys records by `(url, service, method)`. Storing a key that
//! already exists is a silent no-op reported as [`StoreOutcome::Duplicate`]:
//! the first writer wins and retries never create extra rows.

pub mod csv;
pub mod database;

pub use self::csv::CsvStore;
pub use database::DatabaseStore;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;

/// One response ready to be staged.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedResponse {
    pub url: String,
    pub service: String,
    pub method: String,
    pub request_headers: BTreeMap<String, String>,
    pub response_body: String,
    pub response_headers: BTreeMap<String, String>,
}

impl StagedResponse {
    pub fn new(
        url: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
        response_body: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            service: service.into(),
            method: method.into(),
            request_headers: BTreeMap::new(),
            response_body: response_body.into(),
            response_headers: BTreeMap::new(),
        }
    }

    pub fn with_request_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn with_response_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.response_headers = headers;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Inserted,
    /// A record with the same key already existed and was left untouched.
    Duplicate,
}

/// Backend-neutral staging contract.
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Persist one response. Duplicates are not errors.
    async fn store(&self, response: &StagedResponse) -> Result<StoreOutcome>;

    /// Release resources. Safe to call more than once; later stores fail
    /// with `StorageUnavailable`.
    async fn close(&self) -> Result<()>;

    fn backend_name(&self) -> &'static str;
}

/// Where staged responses should go.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageTarget {
    Database(String),
    Csv(PathBuf),
    #[default]
    None,
}

impl StorageTarget {
    /// An explicit CSV directory wins over a database URL.
    pub fn select(csv_dir: Option<PathBuf>, db_url: Option<String>) -> Self {
        match (csv_dir, db_url.filter(|u| !u.trim().is_empty())) {
            (Some(dir), _) => StorageTarget::Csv(dir),
            (None, Some(url)) => StorageTarget::Database(url),
            (None, None) => StorageTarget::None,
        }
    }

    /// Open the backend; `None` when no storage is configured.
    pub async fn open(&self) -> Result<Option<Box<dyn StagingStore>>> {
        match self {
            StorageTarget::Database(url) => {
                let store = DatabaseStore::connect(url).await?;
                info!("Staging into {} database", store.backend_name());
                Ok(Some(Box::new(store)))
            }
            StorageTarget::Csv(dir) => {
                let store = CsvStore::new(dir)?;
                info!("Staging into CSV files under {}", dir.display());
                Ok(Some(Box::new(store)))
            }
            StorageTarget::None => Ok(None),
        }
    }
}

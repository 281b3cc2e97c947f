//! Flat-file staging backend: one CSV per service.
//!
//! Files are append-only and every field is quoted, which keeps exported
//! bodies from being read as spreadsheet formulas. Not safe for concurrent
//! writers to the same directory.

use std::collections::{HashMap, HashSet};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use tracing::debug;

use super::{StagedResponse, StagingStore, StoreOutcome};
use crate::error::{Error, Result};

/// Column order of every staging CSV.
pub const CSV_HEADER: [&str; 6] = [
    "timestamp",
    "url",
    "method",
    "response_body",
    "request_headers",
    "response_headers",
];

#[derive(Default)]
struct CsvState {
    closed: bool,
    /// `(url, method)` keys already on disk, loaded per service on first use.
    seen: HashMap<String, HashSet<(String, String)>>,
}

pub struct CsvStore {
    dir: PathBuf,
    state: Mutex<CsvState>,
}

impl CsvStore {
    /// Stage into `dir`, creating it when missing.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            state: Mutex::new(CsvState::default()),
        })
    }

    /// File holding the rows of `service`.
    ///
    /// Service names map one-to-one onto file names, so anything outside
    /// `[A-Za-z0-9._-]` is rejected rather than rewritten.
    pub fn path_for(&self, service: &str) -> Result<PathBuf> {
        let valid = !service.is_empty()
            && service
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(Error::InvalidService(service.to_string()));
        }
        Ok(self.dir.join(format!("{}.csv", service)))
    }

    fn load_keys(path: &Path) -> Result<HashSet<(String, String)>> {
        let mut keys = HashSet::new();
        if !path.exists() {
            return Ok(keys);
        }
        let mut reader = ReaderBuilder::new().has_headers(true).from_path(path)?;
        for record in reader.records() {
            let record = record?;
            if let (Some(url), Some(method)) = (record.get(1), record.get(2)) {
                keys.insert((url.to_string(), method.to_string()));
            }
        }
        Ok(keys)
    }
}

#[async_trait]
impl StagingStore for CsvStore {
    async fn store(&self, response: &StagedResponse) -> Result<StoreOutcome> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(Error::StorageUnavailable("CSV staging store is closed"));
        }

        let path = self.path_for(&response.service)?;
        if !state.seen.contains_key(&response.service) {
            let keys = Self::load_keys(&path)?;
            state.seen.insert(response.service.clone(), keys);
        }

        let key = (response.url.clone(), response.method.clone());
        if state
            .seen
            .get(&response.service)
            .is_some_and(|keys| keys.contains(&key))
        {
            debug!("Already staged {} {} in {}", key.1, key.0, path.display());
            return Ok(StoreOutcome::Duplicate);
        }

        let is_new = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = WriterBuilder::new()
            .quote_style(QuoteStyle::Always)
            .from_writer(file);

        if is_new {
            writer.write_record(CSV_HEADER)?;
        }
        let timestamp = Utc::now().to_rfc3339();
        let request_headers = serde_json::to_string(&response.request_headers)?;
        let response_headers = serde_json::to_string(&response.response_headers)?;
        writer.write_record([
            timestamp.as_str(),
            response.url.as_str(),
            response.method.as_str(),
            response.response_body.as_str(),
            request_headers.as_str(),
            response_headers.as_str(),
        ])?;
        writer.flush()?;

        state
            .seen
            .entry(response.service.clone())
            .or_default()
            .insert(key);
        debug!("Staged {} {} in {}", response.method, response.url, path.display());
        Ok(StoreOutcome::Inserted)
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closed = true;
        state.seen.clear();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "csv"
    }
}

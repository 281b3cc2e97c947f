//! qualer-stage - authenticated fetch-and-stage client for Qualer.
//!
//! Logs into a Qualer tenant through a real browser, replays requests
//! against its internal endpoints with the browser's cookies, and stages the
//! raw responses in SQLite, PostgreSQL or CSV files for offline parsing.

pub mod browser;
pub mod config;
pub mod cookies;
pub mod csrf;
pub mod error;
pub mod executor;
pub mod forms;
pub mod http_client;
pub mod repository;
pub mod schema;
pub mod session;
pub mod staging;
pub mod unwrap;

pub use config::Settings;
pub use error::{Error, Result};
pub use executor::{EndpointRequest, ExecutedResponse, FetchPath};
pub use session::{AuthSession, Credentials};
pub use staging::{StagedResponse, StagingStore, StoreOutcome};

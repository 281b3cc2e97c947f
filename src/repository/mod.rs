//! Repository layer for database persistence.
//!
//! All database access uses Diesel. SQLite is always available; PostgreSQL
//! sits behind the `postgres` feature.

pub mod models;
pub mod pool;
pub mod util;

pub use models::{NewStagedRow, StagedRow};
pub use pool::{DbError, DbPool, SqliteConn};

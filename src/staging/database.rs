//! Relational staging backend (SQLite, or PostgreSQL with `postgres`).

use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};
use tracing::debug;

use super::{StagedResponse, StagingStore, StoreOutcome};
use crate::error::{Error, Result};
use crate::repository::pool::{DbPool, SqliteConn};
use crate::repository::util::{headers_from_column, headers_to_column};
use crate::repository::{NewStagedRow, StagedRow};
use crate::schema::datadump;
use crate::{with_conn, with_conn_split};

#[cfg(feature = "postgres")]
use diesel::sql_types::{Nullable, Text};
#[cfg(feature = "postgres")]
use diesel_async::AsyncPgConnection;

const SQLITE_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS datadump (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        url TEXT NOT NULL,
        service TEXT NOT NULL,
        method TEXT NOT NULL,
        request_header TEXT,
        response_body TEXT,
        response_header TEXT,
        parsed BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (url, service, method)
    );
    CREATE INDEX IF NOT EXISTS idx_datadump_service_parsed ON datadump(service, parsed);
"#;

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS datadump (
        id SERIAL PRIMARY KEY,
        url TEXT NOT NULL,
        service TEXT NOT NULL,
        method TEXT NOT NULL,
        request_header JSONB,
        response_body TEXT,
        response_header JSONB,
        parsed BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        CONSTRAINT uq_api_response UNIQUE (url, service, method)
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_datadump_service_parsed ON datadump(service, parsed)",
];

// Header columns are JSONB and `created_at` a TIMESTAMP on PostgreSQL, so
// rows go in and out through casts to the TEXT shape of `schema::datadump`.
#[cfg(feature = "postgres")]
const POSTGRES_INSERT: &str = r#"INSERT INTO datadump
        (url, service, method, request_header, response_body, response_header)
    VALUES ($1, $2, $3, $4::jsonb, $5, $6::jsonb)
    ON CONFLICT (url, service, method) DO NOTHING"#;

#[cfg(feature = "postgres")]
const POSTGRES_SELECT: &str = r#"SELECT id, url, service, method,
        request_header::text AS request_header,
        response_body,
        response_header::text AS response_header,
        parsed,
        to_char(created_at, 'YYYY-MM-DD"T"HH24:MI:SS') AS created_at
    FROM datadump"#;

/// Staging table `datadump` behind a [`DbPool`].
///
/// Header maps are stored as JSON: TEXT on SQLite, JSONB on PostgreSQL.
pub struct DatabaseStore {
    pool: RwLock<Option<DbPool>>,
}

impl DatabaseStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool: RwLock::new(Some(pool)),
        }
    }

    /// Open the database at `url` and make sure the table exists.
    pub async fn connect(url: &str) -> Result<Self> {
        let store = Self::new(DbPool::from_url(url)?);
        store.init_schema().await?;
        Ok(store)
    }

    fn pool(&self) -> Result<DbPool> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(Error::StorageUnavailable("staging database is closed"))
    }

    /// Create the staging table and its index if missing.
    pub async fn init_schema(&self) -> Result<()> {
        let pool = self.pool()?;
        with_conn_split!(pool,
            sqlite: conn => {
                Self::init_sqlite_schema(&mut conn).await?
            },
            postgres: conn => {
                Self::init_postgres_schema(&mut conn).await?
            }
        );
        Ok(())
    }

    async fn init_sqlite_schema(conn: &mut SqliteConn) -> Result<()> {
        conn.batch_execute(SQLITE_SCHEMA).await?;
        Ok(())
    }

    #[cfg(feature = "postgres")]
    async fn init_postgres_schema(conn: &mut AsyncPgConnection) -> Result<()> {
        // PostgreSQL requires separate statements
        for stmt in POSTGRES_SCHEMA {
            diesel::sql_query(*stmt).execute(conn).await?;
        }
        Ok(())
    }

    /// Fetch the row for a natural key.
    pub async fn get(&self, url: &str, service: &str, method: &str) -> Result<Option<StagedRow>> {
        let pool = self.pool()?;
        let row = with_conn_split!(pool,
            sqlite: conn => {
                datadump::table
                    .filter(datadump::url.eq(url))
                    .filter(datadump::service.eq(service))
                    .filter(datadump::method.eq(method))
                    .select(StagedRow::as_select())
                    .first(&mut conn)
                    .await
                    .optional()?
            },
            postgres: conn => {
                diesel::sql_query(format!(
                    "{} WHERE url = $1 AND service = $2 AND method = $3 LIMIT 1",
                    POSTGRES_SELECT
                ))
                .bind::<Text, _>(url)
                .bind::<Text, _>(service)
                .bind::<Text, _>(method)
                .get_result::<StagedRow>(&mut conn)
                .await
                .optional()?
            }
        );
        Ok(row)
    }

    /// Number of staged rows, optionally for one service.
    pub async fn count(&self, service: Option<&str>) -> Result<i64> {
        let pool = self.pool()?;
        let count = with_conn!(pool, conn => {
            match service {
                Some(service) => {
                    datadump::table
                        .filter(datadump::service.eq(service))
                        .count()
                        .get_result::<i64>(&mut conn)
                        .await?
                }
                None => datadump::table.count().get_result::<i64>(&mut conn).await?,
            }
        });
        Ok(count)
    }

    /// Rows of `service` not yet consumed by the parsing pass, oldest first.
    pub async fn unparsed(&self, service: &str) -> Result<Vec<StagedRow>> {
        let pool = self.pool()?;
        let rows = with_conn_split!(pool,
            sqlite: conn => {
                datadump::table
                    .filter(datadump::service.eq(service))
                    .filter(datadump::parsed.eq(false))
                    .order(datadump::id.asc())
                    .select(StagedRow::as_select())
                    .load(&mut conn)
                    .await?
            },
            postgres: conn => {
                diesel::sql_query(format!(
                    "{} WHERE service = $1 AND parsed = FALSE ORDER BY id",
                    POSTGRES_SELECT
                ))
                .bind::<Text, _>(service)
                .load::<StagedRow>(&mut conn)
                .await?
            }
        );
        Ok(rows)
    }

    /// Flag rows as consumed. Only the parsing pass calls this.
    pub async fn mark_parsed(&self, ids: &[i32]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let pool = self.pool()?;
        let updated = with_conn!(pool, conn => {
            diesel::update(datadump::table.filter(datadump::id.eq_any(ids.to_vec())))
                .set(datadump::parsed.eq(true))
                .execute(&mut conn)
                .await?
        });
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl StagingStore for DatabaseStore {
    async fn store(&self, response: &StagedResponse) -> Result<StoreOutcome> {
        let pool = self.pool()?;

        let request_header = headers_to_column(&response.request_headers)?;
        let response_header = headers_to_column(&response.response_headers)?;
        let created_at = Utc::now().to_rfc3339();
        let row = NewStagedRow {
            url: &response.url,
            service: &response.service,
            method: &response.method,
            request_header: request_header.as_deref(),
            response_body: Some(&response.response_body),
            response_header: response_header.as_deref(),
            created_at: &created_at,
        };

        let inserted = with_conn_split!(pool,
            sqlite: conn => {
                diesel::insert_into(datadump::table)
                    .values(&row)
                    .on_conflict((datadump::url, datadump::service, datadump::method))
                    .do_nothing()
                    .execute(&mut conn)
                    .await?
            },
            postgres: conn => {
                diesel::sql_query(POSTGRES_INSERT)
                    .bind::<Text, _>(row.url)
                    .bind::<Text, _>(row.service)
                    .bind::<Text, _>(row.method)
                    .bind::<Nullable<Text>, _>(row.request_header)
                    .bind::<Nullable<Text>, _>(row.response_body)
                    .bind::<Nullable<Text>, _>(row.response_header)
                    .execute(&mut conn)
                    .await?
            }
        );

        if inserted == 0 {
            debug!(
                "Already staged {} {} for {}",
                response.method, response.url, response.service
            );
            Ok(StoreOutcome::Duplicate)
        } else {
            debug!(
                "Staged {} {} for {}",
                response.method, response.url, response.service
            );
            Ok(StoreOutcome::Inserted)
        }
    }

    async fn close(&self) -> Result<()> {
        self.pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(DbPool::backend_name)
            .unwrap_or("closed")
    }
}

impl StagedRow {
    pub fn request_headers(&self) -> std::collections::BTreeMap<String, String> {
        headers_from_column(self.request_header.as_deref())
    }

    pub fn response_headers(&self) -> std::collections::BTreeMap<String, String> {
        headers_from_column(self.response_header.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    async fn setup_store() -> (DatabaseStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("staging.db");
        let store = DatabaseStore::connect(&db_path.display().to_string())
            .await
            .unwrap();
        (store, dir)
    }

    fn response(body: &str) -> StagedResponse {
        StagedResponse::new(
            "https://acme.qualer.com/ClientDashboard/Clients_Read",
            "clients",
            "POST",
            body,
        )
        .with_response_headers(BTreeMap::from([(
            "content-type".to_string(),
            "application/json".to_string(),
        )]))
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (store, _dir) = setup_store().await;
        let outcome = store.store(&response(r#"{"Data":[]}"#)).await.unwrap();
        assert_eq!(outcome, StoreOutcome::Inserted);

        let row = store
            .get(
                "https://acme.qualer.com/ClientDashboard/Clients_Read",
                "clients",
                "POST",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.response_body.as_deref(), Some(r#"{"Data":[]}"#));
        assert!(!row.parsed);
        assert!(row.request_header.is_none());
        assert_eq!(row.response_headers()["content-type"], "application/json");
    }

    #[tokio::test]
    async fn test_duplicate_keeps_first_writer() {
        let (store, _dir) = setup_store().await;
        assert_eq!(
            store.store(&response("first")).await.unwrap(),
            StoreOutcome::Inserted
        );
        assert_eq!(
            store.store(&response("second")).await.unwrap(),
            StoreOutcome::Duplicate
        );
        assert_eq!(store.count(None).await.unwrap(), 1);

        let row = store
            .get(
                "https://acme.qualer.com/ClientDashboard/Clients_Read",
                "clients",
                "POST",
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.response_body.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_key_includes_service_and_method() {
        let (store, _dir) = setup_store().await;
        store.store(&response("a")).await.unwrap();

        let mut other_service = response("b");
        other_service.service = "clients_v2".to_string();
        let mut other_method = response("c");
        other_method.method = "GET".to_string();

        assert_eq!(store.store(&other_service).await.unwrap(), StoreOutcome::Inserted);
        assert_eq!(store.store(&other_method).await.unwrap(), StoreOutcome::Inserted);
        assert_eq!(store.count(None).await.unwrap(), 3);
        assert_eq!(store.count(Some("clients")).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unparsed_and_mark_parsed() {
        let (store, _dir) = setup_store().await;
        for i in 0..3 {
            let r = StagedResponse::new(format!("https://x/{i}"), "assets", "GET", "{}");
            store.store(&r).await.unwrap();
        }
        store
            .store(&StagedResponse::new("https://x/other", "clients", "GET", "{}"))
            .await
            .unwrap();

        let pending = store.unparsed("assets").await.unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].url, "https://x/0");

        let updated = store.mark_parsed(&[pending[0].id, pending[1].id]).await.unwrap();
        assert_eq!(updated, 2);

        let pending = store.unparsed("assets").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].url, "https://x/2");
        assert_eq!(store.unparsed("clients").await.unwrap().len(), 1);
        assert_eq!(store.mark_parsed(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let (store, _dir) = setup_store().await;
        store.store(&response("kept")).await.unwrap();
        store.init_schema().await.unwrap();
        assert_eq!(store.count(None).await.unwrap(), 1);
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_postgres_schema_types() {
        let table = POSTGRES_SCHEMA[0];
        assert!(table.contains("request_header JSONB"));
        assert!(table.contains("response_header JSONB"));
        assert!(table.contains("created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP"));
        assert!(POSTGRES_INSERT.contains("$4::jsonb"));
        assert!(POSTGRES_INSERT.contains("$6::jsonb"));
        assert!(!POSTGRES_INSERT.contains("created_at"));
        assert!(POSTGRES_SELECT.contains("request_header::text AS request_header"));
    }

    /// Runs against a live server when `QUALER_TEST_POSTGRES_URL` is set.
    #[cfg(feature = "postgres")]
    #[tokio::test]
    async fn test_postgres_store_and_get() {
        let Ok(url) = std::env::var("QUALER_TEST_POSTGRES_URL") else {
            return;
        };
        let store = DatabaseStore::connect(&url).await.unwrap();
        let mut staged = response(r#"{"Data":[1]}"#);
        staged.url = format!("https://x/pg/{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());

        assert_eq!(store.store(&staged).await.unwrap(), StoreOutcome::Inserted);
        assert_eq!(store.store(&staged).await.unwrap(), StoreOutcome::Duplicate);

        let row = store
            .get(&staged.url, &staged.service, &staged.method)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.response_headers()["content-type"], "application/json");
        assert!(row.request_header.is_none());
        assert!(!row.created_at.is_empty());
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (store, _dir) = setup_store().await;
        assert_eq!(store.backend_name(), "sqlite");
        store.close().await.unwrap();
        store.close().await.unwrap();
        assert_eq!(store.backend_name(), "closed");
        assert!(matches!(
            store.store(&response("late")).await,
            Err(Error::StorageUnavailable(_))
        ));
        assert!(matches!(store.count(None).await, Err(Error::StorageUnavailable(_))));
    }
}

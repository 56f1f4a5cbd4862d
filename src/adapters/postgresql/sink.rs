//! PostgreSQL storage sink
//!
//! One table per destination:
//!
//! ```sql
//! CREATE TABLE "schema"."destination" (
//!     id          TEXT PRIMARY KEY,
//!     kind        TEXT NOT NULL,
//!     event_name  TEXT,
//!     distinct_id TEXT,
//!     event_time  TIMESTAMPTZ,
//!     properties  JSONB NOT NULL,
//!     exported_at TIMESTAMPTZ NOT NULL DEFAULT now()
//! )
//! ```
//!
//! Rows are inserted with `UNNEST` over column arrays, one transaction per
//! batch. Ids already present are skipped, so re-running a unit cannot
//! duplicate rows.

use super::client::PostgreSQLClient;
use crate::adapters::database::StorageSink;
use crate::config::schema::PostgreSQLConfig;
use crate::domain::{DestinationName, NormalizedRecord, Result, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Rows per INSERT statement
const INSERT_CHUNK: usize = 5_000;

/// Writes destinations as PostgreSQL tables
pub struct PostgreSQLSink {
    client: PostgreSQLClient,
}

impl PostgreSQLSink {
    /// Build the pool and check the server is reachable
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the server can't be reached.
    pub async fn connect(config: PostgreSQLConfig) -> Result<Self> {
        let client = PostgreSQLClient::new(config)?;
        client.test_connection().await?;
        Ok(Self { client })
    }

    fn table(&self, destination: &DestinationName) -> String {
        qualified_name(self.client.schema(), destination)
    }

    async fn write(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
        create: bool,
    ) -> std::result::Result<usize, StorageError> {
        let table = self.table(destination);
        let mut conn = self.client.connection().await?;
        let tx = conn.transaction().await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to begin transaction: {}", e))
        })?;

        tx.batch_execute(&format!(
            "SET LOCAL statement_timeout = {}",
            self.client.statement_timeout_ms()
        ))
        .await
        .map_err(|e| {
            StorageError::WriteFailed(format!("Failed to set statement timeout: {}", e))
        })?;

        if create {
            tx.batch_execute(&create_table_sql(&table))
                .await
                .map_err(|e| match e.code() {
                    Some(code) if *code == tokio_postgres::error::SqlState::DUPLICATE_TABLE => {
                        StorageError::DestinationExists(table.clone())
                    }
                    _ => StorageError::SchemaFailed(format!("{}: {}", table, e)),
                })?;
        }

        let statement = insert_sql(&table);
        let mut inserted = 0u64;
        for chunk in records.chunks(INSERT_CHUNK) {
            let columns = Columns::from_records(chunk);
            inserted += tx
                .execute(
                    statement.as_str(),
                    &[
                        &columns.ids,
                        &columns.kinds,
                        &columns.event_names,
                        &columns.distinct_ids,
                        &columns.event_times,
                        &columns.properties,
                    ],
                )
                .await
                .map_err(|e| StorageError::WriteFailed(format!("{}: {}", table, e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::WriteFailed(format!("Failed to commit: {}", e)))?;

        if (inserted as usize) < records.len() {
            tracing::debug!(
                table = %table,
                skipped = records.len() - inserted as usize,
                "Rows with existing ids skipped"
            );
        }
        Ok(inserted as usize)
    }
}

#[async_trait]
impl StorageSink for PostgreSQLSink {
    fn kind(&self) -> &'static str {
        "postgresql"
    }

    async fn exists(
        &mut self,
        destination: &DestinationName,
    ) -> std::result::Result<bool, StorageError> {
        let table = self.table(destination);
        let conn = self.client.connection().await?;
        let row = conn
            .query_one("SELECT to_regclass($1)::text", &[&table])
            .await
            .map_err(|e| StorageError::ConnectionFailed(format!("{}: {}", table, e)))?;
        Ok(row.get::<_, Option<String>>(0).is_some())
    }

    async fn create(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> std::result::Result<usize, StorageError> {
        self.write(destination, records, true).await
    }

    async fn append(
        &mut self,
        destination: &DestinationName,
        records: &[NormalizedRecord],
    ) -> std::result::Result<usize, StorageError> {
        self.write(destination, records, false).await
    }
}

/// Column arrays for one UNNEST insert
struct Columns {
    ids: Vec<String>,
    kinds: Vec<String>,
    event_names: Vec<Option<String>>,
    distinct_ids: Vec<Option<String>>,
    event_times: Vec<Option<DateTime<Utc>>>,
    properties: Vec<Value>,
}

impl Columns {
    fn from_records(records: &[NormalizedRecord]) -> Self {
        let mut columns = Self {
            ids: Vec::with_capacity(records.len()),
            kinds: Vec::with_capacity(records.len()),
            event_names: Vec::with_capacity(records.len()),
            distinct_ids: Vec::with_capacity(records.len()),
            event_times: Vec::with_capacity(records.len()),
            properties: Vec::with_capacity(records.len()),
        };
        for record in records {
            columns.ids.push(record.id.clone());
            columns.kinds.push(record.kind.as_str().to_string());
            columns.event_names.push(record.event_name.clone());
            columns.distinct_ids.push(record.distinct_id.clone());
            columns.event_times.push(record.event_time);
            columns.properties.push(record.properties.clone());
        }
        columns
    }
}

/// `"schema"."table"`; both parts are validated identifiers
fn qualified_name(schema: &str, destination: &DestinationName) -> String {
    format!("\"{}\".\"{}\"", schema, destination.as_str())
}

fn create_table_sql(table: &str) -> String {
    format!(
        "CREATE TABLE {table} (\
            id TEXT PRIMARY KEY, \
            kind TEXT NOT NULL, \
            event_name TEXT, \
            distinct_id TEXT, \
            event_time TIMESTAMPTZ, \
            properties JSONB NOT NULL, \
            exported_at TIMESTAMPTZ NOT NULL DEFAULT now()\
        )"
    )
}

fn insert_sql(table: &str) -> String {
    format!(
        "INSERT INTO {table} (id, kind, event_name, distinct_id, event_time, properties) \
         SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[], \
         $5::timestamptz[], $6::jsonb[]) \
         ON CONFLICT (id) DO NOTHING"
    )
}

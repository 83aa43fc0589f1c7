//! Rolling probe history per monitored target
//!
//! Each target has one row with a success and a failure counter plus the time
//! of the latest result of each kind. Rows are created on the first result and
//! only ever incremented afterwards; `app_name` is unique.

use crate::models::{HealthRecord, ProbeOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Persistent store of [`HealthRecord`]s
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Count one probe result for `key` and return the updated row
    async fn record(
        &self,
        key: &str,
        outcome: &ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Result<HealthRecord, HistoryError>;

    /// Every row, ordered by name
    async fn all(&self) -> Result<Vec<HealthRecord>, HistoryError>;

    /// Rows for one name; empty when the name was never probed
    async fn by_name(&self, name: &str) -> Result<Vec<HealthRecord>, HistoryError>;

    /// Check the store is reachable
    async fn ping(&self) -> Result<(), HistoryError> {
        Ok(())
    }
}

const CREATE_STATES_TABLE: &str = r#"
    create table if not exists states (
        id serial primary key,
        app_name varchar(255) not null,
        failure_count integer not null default 0,
        success_count integer not null default 0,
        last_failure timestamptz,
        last_success timestamptz,
        created_at timestamptz not null default now()
    )
"#;

const CREATE_STATES_INDEX: &str =
    "create unique index if not exists states_app_name_key on states (app_name)";

/// Postgres-backed history in the `states` table
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url` and make sure the table exists
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, HistoryError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), HistoryError> {
        sqlx::query(CREATE_STATES_TABLE).execute(&self.pool).await?;
        sqlx::query(CREATE_STATES_INDEX).execute(&self.pool).await?;
        info!("History schema ready");
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn record(
        &self,
        key: &str,
        outcome: &ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Result<HealthRecord, HistoryError> {
        let first = HealthRecord::first(key, outcome, at);

        // single statement: concurrent first results for a key land on one row
        let record = sqlx::query_as(
            r#"
            insert into states
                (app_name, failure_count, success_count, last_failure, last_success, created_at)
            values ($1, $2, $3, $4, $5, $6)
            on conflict (app_name) do update set
                failure_count = states.failure_count + excluded.failure_count,
                success_count = states.success_count + excluded.success_count,
                last_failure = case when excluded.last_failure is null
                    then states.last_failure else excluded.last_failure end,
                last_success = case when excluded.last_success is null
                    then states.last_success else excluded.last_success end
            returning app_name, failure_count, success_count, last_failure, last_success, created_at
            "#,
        )
        .bind(&first.app_name)
        .bind(first.failure_count)
        .bind(first.success_count)
        .bind(first.last_failure)
        .bind(first.last_success)
        .bind(first.created_at)
        .fetch_one(&self.pool)
        .await?;

        debug!(key = %key, success = outcome.is_success(), "Recorded probe result");
        Ok(record)
    }

    async fn all(&self) -> Result<Vec<HealthRecord>, HistoryError> {
        let records = sqlx::query_as(
            r#"
            select app_name, failure_count, success_count, last_failure, last_success, created_at
            from states
            order by app_name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn by_name(&self, name: &str) -> Result<Vec<HealthRecord>, HistoryError> {
        let records = sqlx::query_as(
            r#"
            select app_name, failure_count, success_count, last_failure, last_success, created_at
            from states
            where app_name = $1
            order by id
            "#,
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn ping(&self) -> Result<(), HistoryError> {
        sqlx::query("select 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// History kept in process memory
#[derive(Default)]
pub struct InMemoryHistoryStore {
    records: DashMap<String, HealthRecord>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn record(
        &self,
        key: &str,
        outcome: &ProbeOutcome,
        at: DateTime<Utc>,
    ) -> Result<HealthRecord, HistoryError> {
        let entry = self
            .records
            .entry(key.to_string())
            .and_modify(|record| record.apply(outcome, at))
            .or_insert_with(|| HealthRecord::first(key, outcome, at));
        Ok(entry.value().clone())
    }

    async fn all(&self) -> Result<Vec<HealthRecord>, HistoryError> {
        let mut records: Vec<HealthRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.app_name.cmp(&b.app_name));
        Ok(records)
    }

    async fn by_name(&self, name: &str) -> Result<Vec<HealthRecord>, HistoryError> {
        Ok(self
            .records
            .get(name)
            .map(|r| vec![r.value().clone()])
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fail_fail_success_sequence() {
        let store = InMemoryHistoryStore::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(30);
        let t2 = t1 + Duration::seconds(30);

        store.record("p1", &ProbeOutcome::failure("refused"), t0).await.unwrap();
        store.record("p1", &ProbeOutcome::failure("timeout"), t1).await.unwrap();
        let record = store.record("p1", &ProbeOutcome::Success, t2).await.unwrap();

        assert_eq!(record.failure_count, 2);
        assert_eq!(record.success_count, 1);
        assert_eq!(record.last_failure, Some(t1));
        assert_eq!(record.last_success, Some(t2));
        assert_eq!(record.created_at, t0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_name_is_empty() {
        let store = InMemoryHistoryStore::new();
        assert!(store.by_name("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_is_sorted_by_name() {
        let store = InMemoryHistoryStore::new();
        let now = Utc::now();
        store.record("zeta", &ProbeOutcome::Success, now).await.unwrap();
        store.record("alpha", &ProbeOutcome::Success, now).await.unwrap();

        let names: Vec<String> = store
            .all()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.app_name)
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn test_concurrent_records_are_all_counted() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .record("p1", &ProbeOutcome::Success, Utc::now())
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = &store.by_name("p1").await.unwrap()[0];
        assert_eq!(record.success_count, 20);
    }
}

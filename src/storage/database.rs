//! SQLite-backed store for runs and results.
//!
//! Every record is serialized to a JSON `data` column at its single write
//! site; the normalized columns beside it are secondary indices for
//! filtering and aggregation, never a competing source of truth.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use thiserror::Error;
use uuid::Uuid;

use crate::schema::{Run, RunResult, RunStatus};

/// Idempotent schema statements applied at connect time.
const MIGRATIONS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        task_id TEXT NOT NULL,
        harness_id TEXT NOT NULL,
        model_id TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        duration_ms INTEGER,
        data TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS results (
        run_id TEXT PRIMARY KEY,
        passed INTEGER NOT NULL,
        score REAL NOT NULL,
        tokens_input INTEGER NOT NULL,
        tokens_output INTEGER NOT NULL,
        wall_clock_ms INTEGER NOT NULL,
        cost_usd REAL NOT NULL,
        tool_calls INTEGER NOT NULL DEFAULT 0,
        data TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_runs_task ON runs(task_id)",
    "CREATE INDEX IF NOT EXISTS idx_runs_harness ON runs(harness_id)",
    "CREATE INDEX IF NOT EXISTS idx_runs_model ON runs(model_id)",
    "CREATE INDEX IF NOT EXISTS idx_results_score ON results(score)",
];

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Opening the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Record (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Filter criteria for querying runs with their results.
#[derive(Debug, Default, Clone)]
pub struct RunQuery {
    pub harness_id: Option<String>,
    pub model_id: Option<String>,
    pub task_id: Option<String>,
    pub limit: Option<i64>,
}

impl RunQuery {
    /// Creates a new empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by harness id.
    pub fn with_harness(mut self, harness_id: impl Into<String>) -> Self {
        self.harness_id = Some(harness_id.into());
        self
    }

    /// Filters by model id.
    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    /// Filters by task id.
    pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Caps the number of returned rows.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A run joined with its result, when one exists yet.
#[derive(Debug, Clone)]
pub struct RunWithResult {
    pub run: Run,
    pub result: Option<RunResult>,
}

/// Per harness+model aggregate over completed runs.
#[derive(Debug, Clone)]
pub struct LeaderboardEntry {
    pub harness_id: String,
    pub model_id: String,
    pub avg_score: f64,
    pub total_runs: i64,
    pub pass_rate: f64,
    pub avg_cost: f64,
    pub avg_duration_ms: f64,
}

/// SQLite store for runs and results.
pub struct BenchStore {
    pool: SqlitePool,
}

impl BenchStore {
    /// Opens (creating if missing) the database at `path` in WAL mode and
    /// applies migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Opens an in-memory store, useful for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        // A single connection so every query sees the same in-memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Inserts a newly dispatched run.
    pub async fn insert_run(&self, run: &Run) -> Result<(), StoreError> {
        let data = serde_json::to_string(run)?;

        sqlx::query(
            r#"
            INSERT INTO runs (id, task_id, harness_id, model_id, status, started_at, completed_at, duration_ms, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.to_string())
        .bind(&run.task_id)
        .bind(&run.harness_id)
        .bind(&run.model_id)
        .bind(run.status.as_str())
        .bind(run.started_at.to_rfc3339())
        .bind(run.completed_at.map(|t| t.to_rfc3339()))
        .bind(run.duration_ms.map(|d| d as i64))
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Transitions a run to a terminal status, rewriting both the indexed
    /// columns and the JSON record so the two can never diverge.
    pub async fn update_run_status(
        &self,
        run_id: Uuid,
        status: RunStatus,
        completed_at: DateTime<Utc>,
        duration_ms: u64,
    ) -> Result<(), StoreError> {
        let mut run = self
            .get_run(run_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Run {}", run_id)))?;
        run.finish(status, completed_at, duration_ms);

        let data = serde_json::to_string(&run)?;

        sqlx::query(
            r#"
            UPDATE runs SET status = ?, completed_at = ?, duration_ms = ?, data = ?
            WHERE id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(completed_at.to_rfc3339())
        .bind(duration_ms as i64)
        .bind(data)
        .bind(run_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts the single result for a run. The primary key on `run_id`
    /// enforces the one-result-per-run invariant at the storage layer.
    pub async fn insert_result(&self, result: &RunResult) -> Result<(), StoreError> {
        let data = serde_json::to_string(result)?;

        sqlx::query(
            r#"
            INSERT INTO results (run_id, passed, score, tokens_input, tokens_output, wall_clock_ms, cost_usd, tool_calls, data)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.run_id.to_string())
        .bind(result.passed as i64)
        .bind(result.score)
        .bind(result.metrics.tokens_input as i64)
        .bind(result.metrics.tokens_output as i64)
        .bind(result.metrics.wall_clock_ms as i64)
        .bind(result.metrics.cost_usd)
        .bind(result.metrics.tool_calls as i64)
        .bind(data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetches a run by id.
    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<Run>, StoreError> {
        let row = sqlx::query("SELECT data FROM runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    /// Fetches the result for a run.
    pub async fn get_result(&self, run_id: Uuid) -> Result<Option<RunResult>, StoreError> {
        let row = sqlx::query("SELECT data FROM results WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data: String = row.get("data");
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    /// All runs of one task, most recent first.
    pub async fn get_runs_by_task(&self, task_id: &str) -> Result<Vec<Run>, StoreError> {
        self.runs_where("task_id", task_id).await
    }

    /// All runs of one harness, most recent first.
    pub async fn get_runs_by_harness(&self, harness_id: &str) -> Result<Vec<Run>, StoreError> {
        self.runs_where("harness_id", harness_id).await
    }

    async fn runs_where(&self, column: &str, value: &str) -> Result<Vec<Run>, StoreError> {
        let query = format!(
            "SELECT data FROM runs WHERE {} = ? ORDER BY started_at DESC",
            column
        );
        let rows = sqlx::query(&query)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;

        decode_runs(rows)
    }

    /// All runs, most recent first.
    pub async fn get_all_runs(&self) -> Result<Vec<Run>, StoreError> {
        let rows = sqlx::query("SELECT data FROM runs ORDER BY started_at DESC")
            .fetch_all(&self.pool)
            .await?;

        decode_runs(rows)
    }

    /// Runs joined with their results, filtered and most recent first.
    pub async fn get_runs_with_results(
        &self,
        filter: &RunQuery,
    ) -> Result<Vec<RunWithResult>, StoreError> {
        let mut query = String::from(
            r#"
            SELECT r.data AS run_data, res.data AS result_data
            FROM runs r
            LEFT JOIN results res ON r.id = res.run_id
            "#,
        );

        let mut conditions = Vec::new();
        if filter.harness_id.is_some() {
            conditions.push("r.harness_id = ?");
        }
        if filter.model_id.is_some() {
            conditions.push("r.model_id = ?");
        }
        if filter.task_id.is_some() {
            conditions.push("r.task_id = ?");
        }

        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }

        query.push_str(" ORDER BY r.started_at DESC");

        if filter.limit.is_some() {
            query.push_str(" LIMIT ?");
        }

        let mut sqlx_query = sqlx::query(&query);
        if let Some(ref harness_id) = filter.harness_id {
            sqlx_query = sqlx_query.bind(harness_id);
        }
        if let Some(ref model_id) = filter.model_id {
            sqlx_query = sqlx_query.bind(model_id);
        }
        if let Some(ref task_id) = filter.task_id {
            sqlx_query = sqlx_query.bind(task_id);
        }
        if let Some(limit) = filter.limit {
            sqlx_query = sqlx_query.bind(limit);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let run_data: String = row.get("run_data");
            let result_data: Option<String> = row.get("result_data");

            results.push(RunWithResult {
                run: serde_json::from_str(&run_data)?,
                result: match result_data {
                    Some(data) => Some(serde_json::from_str(&data)?),
                    None => None,
                },
            });
        }

        Ok(results)
    }

    /// Per harness+model aggregates over completed runs, best first.
    pub async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                r.harness_id,
                r.model_id,
                AVG(res.score) AS avg_score,
                COUNT(*) AS total_runs,
                AVG(CASE WHEN res.passed = 1 THEN 1.0 ELSE 0.0 END) AS pass_rate,
                AVG(res.cost_usd) AS avg_cost,
                AVG(res.wall_clock_ms) AS avg_duration_ms
            FROM runs r
            JOIN results res ON r.id = res.run_id
            WHERE r.status = 'completed'
            GROUP BY r.harness_id, r.model_id
            ORDER BY avg_score DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(LeaderboardEntry {
                harness_id: row.get("harness_id"),
                model_id: row.get("model_id"),
                avg_score: row.get("avg_score"),
                total_runs: row.get("total_runs"),
                pass_rate: row.get("pass_rate"),
                avg_cost: row.get("avg_cost"),
                avg_duration_ms: row.get("avg_duration_ms"),
            });
        }

        Ok(entries)
    }

    /// Closes the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_runs(rows: Vec<sqlx::sqlite::SqliteRow>) -> Result<Vec<Run>, StoreError> {
    let mut runs = Vec::with_capacity(rows.len());
    for row in rows {
        let data: String = row.get("data");
        runs.push(serde_json::from_str(&data)?);
    }
    Ok(runs)
}

// SQLite persistence for accepted indicator state, decision history and
// snapshot archives. The accepted-state pointer only ever moves inside
// `commit_run`'s transaction.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;
use uuid::Uuid;

use radar_common::{
    Decision, HistoryEntry, IndicatorState, ResolutionStatus, Snapshot, SourceCategory,
};

use crate::error::{Result, StoreError};

/// Locks older than this are considered abandoned and may be stolen.
const STALE_LOCK_MINUTES: i64 = 30;

pub struct StateStore {
    pool: SqlitePool,
}

/// A row from the decision_history table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct HistoryRow {
    run_id: String,
    topic: String,
    field_name: String,
    final_value: String,
    chosen_source: String,
    pending_sources: String,
    status: String,
    reason: String,
    created_at: DateTime<Utc>,
}

/// A row from the indicator_states table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct IndicatorRow {
    topic: String,
    field_name: String,
    final_value: String,
    chosen_source: String,
    reason: String,
    updated_at: DateTime<Utc>,
}

impl StateStore {
    /// Open (or create) the database file and run migrations.
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| anyhow::anyhow!("cannot create data dir: {e}"))
                    .map_err(StoreError::Other)?;
            }
        }
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(StoreError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests. Single connection — each SQLite memory
    /// database is private to its connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Direct pool access for tests that need to sabotage the schema.
    #[cfg(feature = "test-support")]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        let statements = [
            "CREATE TABLE IF NOT EXISTS latest_fetch (
                topic TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS accepted_state (
                topic TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                committed_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS indicator_states (
                topic TEXT NOT NULL,
                field_name TEXT NOT NULL,
                final_value TEXT NOT NULL,
                chosen_source TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (topic, field_name)
            )",
            "CREATE TABLE IF NOT EXISTS decision_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                topic TEXT NOT NULL,
                field_name TEXT NOT NULL,
                final_value TEXT NOT NULL,
                chosen_source TEXT NOT NULL,
                pending_sources TEXT NOT NULL,
                status TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            "CREATE INDEX IF NOT EXISTS idx_decision_history_run_id
                ON decision_history(run_id)",
            "CREATE INDEX IF NOT EXISTS idx_decision_history_topic
                ON decision_history(topic)",
            "CREATE TABLE IF NOT EXISTS snapshot_archive (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic TEXT NOT NULL,
                run_id TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                archived_at TEXT NOT NULL
            )",
            "CREATE TABLE IF NOT EXISTS run_locks (
                topic TEXT PRIMARY KEY,
                run_id TEXT NOT NULL,
                acquired_at TEXT NOT NULL
            )",
        ];
        for sql in statements {
            sqlx::query(sql).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Overwrite the latest-raw-fetch record for a topic. Diagnostic and
    /// replay data only, never read back as reconciliation input.
    pub async fn save_raw_fetch(&self, snapshot: &Snapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        sqlx::query(
            "INSERT INTO latest_fetch (topic, snapshot, saved_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(topic) DO UPDATE SET
                 snapshot = excluded.snapshot,
                 saved_at = excluded.saved_at",
        )
        .bind(&snapshot.topic)
        .bind(&json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The last successfully reconciled snapshot, or None on first run.
    pub async fn load_accepted_state(&self, topic: &str) -> Result<Option<Snapshot>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT snapshot FROM accepted_state WHERE topic = ?1")
                .bind(topic)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Advance the accepted state for a topic. Appends every decision to the
    /// history log, upserts per-field indicator state, replaces the
    /// accepted-state pointer and archives the snapshot — all in one
    /// transaction, so a partial failure leaves the previous state intact.
    pub async fn commit_run(
        &self,
        run_id: Uuid,
        snapshot: &Snapshot,
        decisions: &[Decision],
    ) -> Result<()> {
        let topic = snapshot.topic.as_str();
        let now = Utc::now();
        let snapshot_json = serde_json::to_string(snapshot)?;
        let run_id_str = run_id.to_string();

        let mut tx = self.pool.begin().await?;

        for decision in decisions {
            let pending = serde_json::to_string(&decision.pending_sources)?;
            sqlx::query(
                "INSERT INTO decision_history
                    (run_id, topic, field_name, final_value, chosen_source,
                     pending_sources, status, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(&run_id_str)
            .bind(topic)
            .bind(&decision.field)
            .bind(&decision.final_value)
            .bind(decision.chosen_source.as_str())
            .bind(&pending)
            .bind(decision.status.as_str())
            .bind(&decision.rationale)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "INSERT INTO indicator_states
                    (topic, field_name, final_value, chosen_source, status, reason, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(topic, field_name) DO UPDATE SET
                     final_value = excluded.final_value,
                     chosen_source = excluded.chosen_source,
                     status = excluded.status,
                     reason = excluded.reason,
                     updated_at = excluded.updated_at",
            )
            .bind(topic)
            .bind(&decision.field)
            .bind(&decision.final_value)
            .bind(decision.chosen_source.as_str())
            .bind(decision.status.as_str())
            .bind(&decision.rationale)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO accepted_state (topic, run_id, snapshot, committed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(topic) DO UPDATE SET
                 run_id = excluded.run_id,
                 snapshot = excluded.snapshot,
                 committed_at = excluded.committed_at",
        )
        .bind(topic)
        .bind(&run_id_str)
        .bind(&snapshot_json)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO snapshot_archive (topic, run_id, snapshot, archived_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(topic)
        .bind(&run_id_str)
        .bind(&snapshot_json)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(topic, run_id = %run_id, decisions = decisions.len(), "Committed run");
        Ok(())
    }

    /// Decision history, newest first, optionally filtered.
    pub async fn list_history(
        &self,
        topic: Option<&str>,
        run_id: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<HistoryEntry>> {
        let mut sql = String::from(
            "SELECT run_id, topic, field_name, final_value, chosen_source,
                    pending_sources, status, reason, created_at
             FROM decision_history WHERE 1=1",
        );
        if topic.is_some() {
            sql.push_str(" AND topic = ?");
        }
        if run_id.is_some() {
            sql.push_str(" AND run_id = ?");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let mut query = sqlx::query_as::<_, HistoryRow>(&sql);
        if let Some(t) = topic {
            query = query.bind(t.to_string());
        }
        if let Some(r) = run_id {
            query = query.bind(r.to_string());
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(history_entry_from_row).collect()
    }

    /// Current accepted indicator values for a topic, most recent first.
    pub async fn indicator_states(&self, topic: &str) -> Result<Vec<IndicatorState>> {
        let rows = sqlx::query_as::<_, IndicatorRow>(
            "SELECT topic, field_name, final_value, chosen_source, reason, updated_at
             FROM indicator_states
             WHERE topic = ?1
             ORDER BY updated_at DESC, field_name ASC",
        )
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| IndicatorState {
                topic: r.topic,
                field: r.field_name,
                value: r.final_value,
                source: SourceCategory::parse_lenient(&r.chosen_source),
                rationale: r.reason,
                updated_at: r.updated_at,
            })
            .collect())
    }

    /// Take the per-topic advisory run lock. Stale locks are stolen; a live
    /// lock from another run yields `StoreError::LockConflict`.
    pub async fn acquire_run_lock(&self, topic: &str, run_id: Uuid) -> Result<()> {
        let cutoff = Utc::now() - Duration::minutes(STALE_LOCK_MINUTES);
        sqlx::query("DELETE FROM run_locks WHERE topic = ?1 AND acquired_at < ?2")
            .bind(topic)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        let result = sqlx::query(
            "INSERT INTO run_locks (topic, run_id, acquired_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(topic) DO NOTHING",
        )
        .bind(topic)
        .bind(run_id.to_string())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::LockConflict(topic.to_string()));
        }
        Ok(())
    }

    pub async fn release_run_lock(&self, topic: &str) -> Result<()> {
        sqlx::query("DELETE FROM run_locks WHERE topic = ?1")
            .bind(topic)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn history_entry_from_row(row: HistoryRow) -> Result<HistoryEntry> {
    let run_id = Uuid::parse_str(&row.run_id)
        .map_err(|e| StoreError::Corrupt(format!("bad run_id '{}': {e}", row.run_id)))?;
    let pending_sources: Vec<SourceCategory> = serde_json::from_str(&row.pending_sources)?;

    Ok(HistoryEntry {
        run_id,
        topic: row.topic,
        decision: Decision {
            field: row.field_name,
            final_value: row.final_value,
            chosen_source: SourceCategory::parse_lenient(&row.chosen_source),
            pending_sources,
            rationale: row.reason,
            status: ResolutionStatus::parse_lenient(&row.status),
        },
        created_at: row.created_at,
    })
}

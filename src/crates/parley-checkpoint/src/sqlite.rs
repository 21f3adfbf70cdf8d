//! SQLite checkpoint saver
//!
//! Durable backend built on an `sqlx` connection pool. Messages live in an
//! append-only table keyed by `(thread_id, seq)`; each checkpoint row records
//! how many messages it covers. An append runs in one transaction, and the
//! writer takes the database write lock before checking its parent, so a lost
//! race between two processes surfaces as [`CheckpointError::ConcurrentWrite`]
//! instead of a silent overwrite or a bare "database is locked".

use crate::checkpoint::{
    ensure_parent, new_checkpoint_id, AppendRequest, Checkpoint, CheckpointMetadata,
    CheckpointSource, CheckpointSummary, ConversationState, EngineNode, SeedRequest,
    CHECKPOINT_VERSION,
};
use crate::error::{CheckpointError, Result};
use crate::message::Message;
use crate::traits::{CheckpointSaver, CheckpointStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Checkpoint saver persisting streams in a SQLite database.
#[derive(Clone, Debug)]
pub struct SqliteCheckpointSaver {
    pool: SqlitePool,
}

impl SqliteCheckpointSaver {
    /// Open (creating if needed) a database file and run migrations.
    pub async fn connect<P: AsRef<Path>>(database_path: P) -> Result<Self> {
        Self::connect_with(database_path, 5).await
    }

    /// Open a database file with a custom pool size.
    pub async fn connect_with<P: AsRef<Path>>(database_path: P, max_connections: u32) -> Result<Self> {
        let path = database_path.as_ref();
        let path_str = path
            .to_str()
            .ok_or_else(|| CheckpointError::Storage("Invalid database path".to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let database_url = format!("sqlite:{}", path_str);
        debug!(url = %database_url, "Connecting to checkpoint database");

        let options = SqliteConnectOptions::from_str(&database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to connect to database: {}", e)))?;

        let saver = Self { pool };
        saver.run_migrations().await?;

        info!(path = %path.display(), "Checkpoint database ready");
        Ok(saver)
    }

    /// Private in-memory database; lives as long as the saver.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        // A second connection would open a second, empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let saver = Self { pool };
        saver.run_migrations().await?;
        Ok(saver)
    }

    /// Wrap an existing pool. Migrations are not run.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply the embedded schema migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn snapshot(&self, thread_id: &str, row: SqliteRow) -> Result<Checkpoint> {
        let summary = row_to_summary(thread_id, &row)?;

        let thread = sqlx::query("SELECT welcome, settings FROM threads WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await?;
        let welcome = thread
            .try_get::<Option<String>, _>("welcome")?
            .map(|raw| serde_json::from_str::<Message>(&raw))
            .transpose()?;
        let settings = serde_json::from_str(&thread.try_get::<String, _>("settings")?)?;

        let rows = sqlx::query(
            "SELECT body FROM messages WHERE thread_id = ? AND seq < ? ORDER BY seq ASC",
        )
        .bind(thread_id)
        .bind(summary.message_count as i64)
        .fetch_all(&self.pool)
        .await?;

        let messages = rows
            .iter()
            .map(|r| Ok(serde_json::from_str::<Message>(&r.try_get::<String, _>("body")?)?))
            .collect::<Result<Vec<_>>>()?;

        if messages.len() != summary.message_count {
            return Err(CheckpointError::Invalid(format!(
                "checkpoint {} covers {} messages but {} are stored",
                summary.id,
                summary.message_count,
                messages.len()
            )));
        }

        Ok(Checkpoint {
            v: CHECKPOINT_VERSION,
            id: summary.id,
            thread_id: thread_id.to_string(),
            step: summary.step,
            ts: summary.ts,
            node: summary.node,
            state: ConversationState::new(messages),
            welcome,
            settings,
            metadata: summary.metadata,
        })
    }

    async fn latest_row(&self, thread_id: &str) -> Result<Option<SqliteRow>> {
        Ok(sqlx::query(LATEST_CHECKPOINT)
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

const LATEST_CHECKPOINT: &str = "SELECT id, step, ts, node, message_count, metadata
     FROM checkpoints WHERE thread_id = ? ORDER BY step DESC LIMIT 1";

fn row_to_summary(thread_id: &str, row: &SqliteRow) -> Result<CheckpointSummary> {
    let ts: String = row.try_get("ts")?;
    let node: String = row.try_get("node")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(CheckpointSummary {
        id: row.try_get("id")?,
        thread_id: thread_id.to_string(),
        step: row.try_get::<i64, _>("step")? as u64,
        ts: DateTime::parse_from_rfc3339(&ts)
            .map_err(|e| CheckpointError::Invalid(format!("bad checkpoint timestamp: {}", e)))?
            .with_timezone(&Utc),
        node: node.parse::<EngineNode>().map_err(CheckpointError::Invalid)?,
        message_count: row.try_get::<i64, _>("message_count")? as usize,
        metadata: serde_json::from_str(&metadata)?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl CheckpointSaver for SqliteCheckpointSaver {
    async fn seed(&self, thread_id: &str, request: SeedRequest) -> Result<Checkpoint> {
        let now = Utc::now();
        let welcome = request.welcome.as_ref().map(serde_json::to_string).transpose()?;
        let settings = serde_json::to_string(&request.settings)?;
        let metadata = serde_json::to_string(&CheckpointMetadata::new(CheckpointSource::Seed))?;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO threads (thread_id, welcome, settings, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(thread_id)
        .bind(welcome)
        .bind(settings)
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await;
        match inserted {
            Err(e) if is_unique_violation(&e) => {
                return Err(CheckpointError::AlreadyExists(thread_id.to_string()))
            }
            other => {
                other?;
            }
        }

        sqlx::query("INSERT INTO messages (thread_id, seq, body) VALUES (?, 0, ?)")
            .bind(thread_id)
            .bind(serde_json::to_string(&request.system)?)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO checkpoints (thread_id, step, id, ts, node, message_count, metadata)
             VALUES (?, 0, ?, ?, ?, 1, ?)",
        )
        .bind(thread_id)
        .bind(new_checkpoint_id())
        .bind(now.to_rfc3339())
        .bind(EngineNode::QueryOrRespond.as_str())
        .bind(metadata)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(thread_id, "Seeded checkpoint stream");

        self.load_latest(thread_id).await
    }

    async fn load_latest(&self, thread_id: &str) -> Result<Checkpoint> {
        let row = self
            .latest_row(thread_id)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;
        self.snapshot(thread_id, row).await
    }

    async fn append(&self, thread_id: &str, request: AppendRequest) -> Result<Checkpoint> {
        let mut tx = self.pool.begin().await?;

        // Take the write lock before the parent check reads the latest row.
        sqlx::query("UPDATE threads SET settings = settings WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| contended_or_storage(e, thread_id, &request))?;

        let latest = sqlx::query(LATEST_CHECKPOINT)
            .bind(thread_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| CheckpointError::NotFound(thread_id.to_string()))?;
        let latest = row_to_summary(thread_id, &latest)?;
        ensure_parent(thread_id, request.parent.as_deref(), &latest.id)?;

        let base = latest.message_count;
        for (offset, message) in request.messages.iter().enumerate() {
            sqlx::query("INSERT INTO messages (thread_id, seq, body) VALUES (?, ?, ?)")
                .bind(thread_id)
                .bind((base + offset) as i64)
                .bind(serde_json::to_string(message)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_or_storage(e, thread_id, &request, &latest.id))?;
        }

        let step = latest.step + 1;
        let checkpoint_id = new_checkpoint_id();
        sqlx::query(
            "INSERT INTO checkpoints (thread_id, step, id, ts, node, message_count, metadata)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(thread_id)
        .bind(step as i64)
        .bind(&checkpoint_id)
        .bind(Utc::now().to_rfc3339())
        .bind(request.node.as_str())
        .bind((base + request.messages.len()) as i64)
        .bind(serde_json::to_string(&request.metadata)?)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_storage(e, thread_id, &request, &latest.id))?;

        tx.commit()
            .await
            .map_err(|e| contended_or_storage(e, thread_id, &request))?;
        debug!(thread_id, step, node = %request.node, appended = request.messages.len(), "Appended checkpoint");

        let row = sqlx::query(
            "SELECT id, step, ts, node, message_count, metadata FROM checkpoints WHERE id = ?",
        )
        .bind(&checkpoint_id)
        .fetch_one(&self.pool)
        .await?;
        self.snapshot(thread_id, row).await
    }

    async fn list(&self, thread_id: &str, limit: Option<usize>) -> Result<CheckpointStream> {
        if !self.exists(thread_id).await? {
            return Err(CheckpointError::NotFound(thread_id.to_string()));
        }

        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let rows = sqlx::query(
            "SELECT id, step, ts, node, message_count, metadata
             FROM checkpoints WHERE thread_id = ? ORDER BY step DESC LIMIT ?",
        )
        .bind(thread_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let summaries: Vec<Result<CheckpointSummary>> =
            rows.iter().map(|row| row_to_summary(thread_id, row)).collect();
        Ok(Box::pin(stream::iter(summaries)))
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in ["checkpoints", "messages", "threads"] {
            sqlx::query(&format!("DELETE FROM {} WHERE thread_id = ?", table))
                .bind(thread_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn exists(&self, thread_id: &str) -> Result<bool> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM threads WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("count")? > 0)
    }
}

fn conflict_or_storage(
    err: sqlx::Error,
    thread_id: &str,
    request: &AppendRequest,
    latest: &str,
) -> CheckpointError {
    if is_unique_violation(&err) || is_busy(&err) {
        CheckpointError::ConcurrentWrite {
            thread_id: thread_id.to_string(),
            expected: request.parent.clone(),
            actual: latest.to_string(),
        }
    } else {
        err.into()
    }
}

/// A busy database while appending means another writer still holds the
/// stream; the latest checkpoint is not known at that point.
fn contended_or_storage(err: sqlx::Error, thread_id: &str, request: &AppendRequest) -> CheckpointError {
    conflict_or_storage(err, thread_id, request, "unknown (database busy)")
}

/// `SQLITE_BUSY` and its extended codes (`BUSY_SNAPSHOT` = 517, ...).
fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map_or(false, |code| code & 0xff == SQLITE_BUSY),
        _ => false,
    }
}

const SQLITE_BUSY: i32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_seed_and_append() {
        let saver = SqliteCheckpointSaver::in_memory().await.unwrap();
        let seeded = saver
            .seed("t1", SeedRequest::new(Message::system("sys")))
            .await
            .unwrap();
        assert_eq!(seeded.step, 0);
        assert_eq!(seeded.state.len(), 1);

        let next = saver
            .append(
                "t1",
                AppendRequest::new(&seeded.id, vec![Message::user("hi"), Message::assistant("hello")], EngineNode::Done),
            )
            .await
            .unwrap();
        assert_eq!(next.step, 1);
        assert_eq!(next.state.len(), 3);
        assert_eq!(next.state.messages[1].content, "hi");
    }

    #[tokio::test]
    async fn test_missing_thread() {
        let saver = SqliteCheckpointSaver::in_memory().await.unwrap();
        assert!(matches!(
            saver.load_latest("missing").await.unwrap_err(),
            CheckpointError::NotFound(_)
        ));
        assert!(matches!(
            saver
                .append("missing", AppendRequest::unconditional(vec![], EngineNode::Done))
                .await
                .unwrap_err(),
            CheckpointError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_seed() {
        let saver = SqliteCheckpointSaver::in_memory().await.unwrap();
        saver.seed("t1", SeedRequest::new(Message::system("sys"))).await.unwrap();
        let err = saver
            .seed("t1", SeedRequest::new(Message::system("sys")))
            .await
            .unwrap_err();
        assert!(matches!(err, CheckpointError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_stale_parent() {
        let saver = SqliteCheckpointSaver::in_memory().await.unwrap();
        let seeded = saver.seed("t1", SeedRequest::new(Message::system("sys"))).await.unwrap();
        saver
            .append("t1", AppendRequest::new(&seeded.id, vec![Message::user("a")], EngineNode::Done))
            .await
            .unwrap();

        let err = saver
            .append("t1", AppendRequest::new(&seeded.id, vec![Message::user("b")], EngineNode::Done))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(saver.load_latest("t1").await.unwrap().state.len(), 2);
    }
}

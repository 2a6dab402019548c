//! C11 Checkpoint Store: durable, resumable persistence of `Investigation`
//! state (spec.md §4.11). Same pooled-rusqlite shape as the C1 staging
//! store; the whole `Investigation` is stored as one schema-versioned JSON
//! blob rather than normalized columns, since nothing downstream queries
//! into its fields at the SQL level.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use riskgraph_kernel::investigation::Investigation;

use crate::error::{CheckpointError, StagingError};

pub type CheckpointPool = Pool<SqliteConnectionManager>;

/// Bumped whenever `Investigation`'s serialized shape changes incompatibly
/// (spec.md §4.11 "schema-versioned"). A stored row whose version doesn't
/// match this is refused rather than guessed at.
pub const SCHEMA_VERSION: &str = "riskgraph.checkpoint.v1";

pub struct CheckpointStore {
    pool: CheckpointPool,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    id TEXT PRIMARY KEY,
    repo_id TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    resumable INTEGER NOT NULL,
    updated_at TEXT NOT NULL,
    investigation_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_resumable ON checkpoints (resumable, updated_at);
";

impl CheckpointStore {
    pub fn open(path: &str, pool_size: u32) -> Result<Self, CheckpointError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(StagingError::from)?;
        {
            let conn = pool.get().map_err(StagingError::from)?;
            conn.execute_batch(SCHEMA).map_err(StagingError::from)?;
        }
        Ok(CheckpointStore { pool })
    }

    pub fn open_in_memory(pool_size: u32) -> Result<Self, CheckpointError> {
        Self::open(":memory:", pool_size)
    }

    /// Upserts the investigation's full state in a single transaction
    /// (spec.md §4.11 point 1 "every checkpoint write is atomic").
    pub fn save(&self, investigation: &Investigation) -> Result<(), CheckpointError> {
        let investigation_json = serde_json::to_string(investigation).map_err(StagingError::from)?;
        let mut conn = self.pool.get().map_err(StagingError::from)?;
        let tx = conn.transaction().map_err(StagingError::from)?;
        tx.execute(
            "INSERT INTO checkpoints (id, repo_id, schema_version, resumable, updated_at, investigation_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 repo_id = excluded.repo_id,
                 schema_version = excluded.schema_version,
                 resumable = excluded.resumable,
                 updated_at = excluded.updated_at,
                 investigation_json = excluded.investigation_json",
            params![
                investigation.id,
                investigation.repo_id,
                SCHEMA_VERSION,
                investigation.is_resumable() as i64,
                chrono::Utc::now().to_rfc3339(),
                investigation_json,
            ],
        )
        .map_err(StagingError::from)?;
        tx.commit().map_err(StagingError::from)?;
        Ok(())
    }

    /// Loads a checkpoint by id (spec.md §6 `Load(id)`). A schema version
    /// mismatch is refused rather than migrated on the fly -- migration, if
    /// ever needed, is a separate offline tool.
    pub fn load(&self, id: &str) -> Result<Investigation, CheckpointError> {
        let conn = self.pool.get().map_err(StagingError::from)?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT schema_version, investigation_json FROM checkpoints WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();
        let (schema_version, investigation_json) =
            row.ok_or_else(|| CheckpointError::NotFound(id.to_string()))?;
        if schema_version != SCHEMA_VERSION {
            return Err(CheckpointError::SchemaVersionMismatch {
                expected: SCHEMA_VERSION.to_string(),
                found: schema_version,
            });
        }
        let investigation: Investigation =
            serde_json::from_str(&investigation_json).map_err(StagingError::from)?;
        Ok(investigation)
    }

    /// Lists the most recently updated resumable investigations (spec.md §6
    /// `ListResumable`), newest first.
    pub fn list_resumable(&self, limit: u32) -> Result<Vec<Investigation>, CheckpointError> {
        let conn = self.pool.get().map_err(StagingError::from)?;
        let mut stmt = conn
            .prepare(
                "SELECT investigation_json FROM checkpoints
                 WHERE resumable = 1 AND schema_version = ?1
                 ORDER BY updated_at DESC LIMIT ?2",
            )
            .map_err(StagingError::from)?;
        let rows = stmt
            .query_map(params![SCHEMA_VERSION, limit], |row| row.get::<_, String>(0))
            .map_err(StagingError::from)?;
        let mut out = Vec::new();
        for row in rows {
            let json = row.map_err(StagingError::from)?;
            let investigation: Investigation =
                serde_json::from_str(&json).map_err(StagingError::from)?;
            out.push(investigation);
        }
        Ok(out)
    }

    /// Deletes a checkpoint (spec.md §6 `Delete(id)`). Idempotent: deleting
    /// an id that doesn't exist is not an error.
    pub fn delete(&self, id: &str) -> Result<(), CheckpointError> {
        let conn = self.pool.get().map_err(StagingError::from)?;
        conn.execute("DELETE FROM checkpoints WHERE id = ?1", params![id])
            .map_err(StagingError::from)?;
        Ok(())
    }
}

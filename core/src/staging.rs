//! C1 Staging Store: durable relational storage of raw GitHub records
//! (spec.md §4.1). Pooled rusqlite connections; every write is a single
//! transaction; reads are point lookups or streamed scans.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use riskgraph_kernel::ports::{CommitRecord, IssueRecord, PrRecord, TimelineEvent};

use crate::error::StagingError;

pub type StagingPool = Pool<SqliteConnectionManager>;

pub struct StagingStore {
    pool: StagingPool,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS commits (
    repo_id TEXT NOT NULL,
    sha TEXT NOT NULL,
    message TEXT NOT NULL,
    author_email TEXT NOT NULL,
    author_date TEXT NOT NULL,
    additions INTEGER NOT NULL,
    deletions INTEGER NOT NULL,
    raw_files_json TEXT NOT NULL,
    PRIMARY KEY (repo_id, sha)
);

CREATE TABLE IF NOT EXISTS pull_requests (
    repo_id TEXT NOT NULL,
    number INTEGER NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    author_login TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    merged_at TEXT,
    merge_commit_sha TEXT,
    PRIMARY KEY (repo_id, number)
);

CREATE TABLE IF NOT EXISTS issues (
    repo_id TEXT NOT NULL,
    number INTEGER NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    state TEXT NOT NULL,
    created_at TEXT NOT NULL,
    closed_at TEXT,
    labels_json TEXT NOT NULL,
    closure_reason TEXT,
    PRIMARY KEY (repo_id, number)
);

CREATE TABLE IF NOT EXISTS issue_timeline (
    repo_id TEXT NOT NULL,
    issue_number INTEGER NOT NULL,
    event_type TEXT NOT NULL,
    source_type TEXT NOT NULL,
    source_id INTEGER,
    source_sha TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS issue_commit_refs (
    repo_id TEXT NOT NULL,
    issue_number INTEGER NOT NULL,
    commit_sha TEXT NOT NULL,
    confidence REAL NOT NULL,
    action TEXT NOT NULL,
    detection_method TEXT NOT NULL,
    extracted_from TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_timeline_issue ON issue_timeline (repo_id, issue_number);
CREATE INDEX IF NOT EXISTS idx_commit_refs_issue ON issue_commit_refs (repo_id, issue_number);
";

impl StagingStore {
    pub fn open(path: &str, pool_size: u32) -> Result<Self, StagingError> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(pool_size).build(manager)?;
        {
            let conn = pool.get()?;
            conn.execute_batch(SCHEMA)?;
        }
        Ok(StagingStore { pool })
    }

    pub fn open_in_memory(pool_size: u32) -> Result<Self, StagingError> {
        Self::open(":memory:", pool_size)
    }

    /// Upserts a batch of commits in a single transaction (spec.md §4.1
    /// "all writes are transactional per batch").
    pub fn upsert_commits(&self, repo_id: &str, commits: &[CommitRecord]) -> Result<(), StagingError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for commit in commits {
            let raw_files_json = serde_json::to_string(&commit.files)?;
            tx.execute(
                "INSERT INTO commits (repo_id, sha, message, author_email, author_date, additions, deletions, raw_files_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(repo_id, sha) DO UPDATE SET
                     message = excluded.message,
                     author_email = excluded.author_email,
                     author_date = excluded.author_date,
                     additions = excluded.additions,
                     deletions = excluded.deletions,
                     raw_files_json = excluded.raw_files_json",
                params![
                    repo_id,
                    commit.sha,
                    commit.message,
                    commit.author_email,
                    commit.author_date.to_rfc3339(),
                    commit.additions,
                    commit.deletions,
                    raw_files_json,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_pull_requests(&self, repo_id: &str, prs: &[PrRecord]) -> Result<(), StagingError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for pr in prs {
            tx.execute(
                "INSERT INTO pull_requests (repo_id, number, title, body, author_login, state, created_at, merged_at, merge_commit_sha)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(repo_id, number) DO UPDATE SET
                     title = excluded.title,
                     body = excluded.body,
                     state = excluded.state,
                     merged_at = excluded.merged_at,
                     merge_commit_sha = excluded.merge_commit_sha",
                params![
                    repo_id,
                    pr.number,
                    pr.title,
                    pr.body,
                    pr.author_login,
                    pr.state,
                    pr.created_at.to_rfc3339(),
                    pr.merged_at.map(|t| t.to_rfc3339()),
                    pr.merge_commit_sha,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_issues(&self, repo_id: &str, issues: &[IssueRecord]) -> Result<(), StagingError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        for issue in issues {
            let labels_json = serde_json::to_string(&issue.labels)?;
            tx.execute(
                "INSERT INTO issues (repo_id, number, title, body, state, created_at, closed_at, labels_json, closure_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(repo_id, number) DO UPDATE SET
                     title = excluded.title,
                     body = excluded.body,
                     state = excluded.state,
                     closed_at = excluded.closed_at,
                     labels_json = excluded.labels_json,
                     closure_reason = excluded.closure_reason",
                params![
                    repo_id,
                    issue.number,
                    issue.title,
                    issue.body,
                    issue.state,
                    issue.created_at.to_rfc3339(),
                    issue.closed_at.map(|t| t.to_rfc3339()),
                    labels_json,
                    issue.closure_reason,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Replaces the timeline for the given issues. Timeline events have no
    /// natural key of their own (GitHub doesn't expose one); idempotent
    /// ingestion is achieved by deleting and re-inserting per issue rather
    /// than upserting per event.
    pub fn replace_timeline(
        &self,
        repo_id: &str,
        issue_number: i64,
        events: &[TimelineEvent],
    ) -> Result<(), StagingError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM issue_timeline WHERE repo_id = ?1 AND issue_number = ?2",
            params![repo_id, issue_number],
        )?;
        for event in events {
            tx.execute(
                "INSERT INTO issue_timeline (repo_id, issue_number, event_type, source_type, source_id, source_sha, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    repo_id,
                    issue_number,
                    format!("{:?}", event.event_type),
                    format!("{:?}", event.source_type),
                    event.source_id,
                    event.source_sha,
                    event.created_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn record_issue_commit_ref(
        &self,
        repo_id: &str,
        issue_number: i64,
        commit_sha: &str,
        confidence: f64,
        action: &str,
        detection_method: &str,
        extracted_from: &str,
    ) -> Result<(), StagingError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO issue_commit_refs (repo_id, issue_number, commit_sha, confidence, action, detection_method, extracted_from)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![repo_id, issue_number, commit_sha, confidence, action, detection_method, extracted_from],
        )?;
        Ok(())
    }

    /// Point lookup used by C6's `commit_patch` operation (spec.md §4.6).
    pub fn commit_patch(&self, repo_id: &str, sha: &str) -> Result<Option<String>, StagingError> {
        let conn = self.pool.get()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT raw_files_json FROM commits WHERE repo_id = ?1 AND sha = ?2",
                params![repo_id, sha],
                |row| row.get(0),
            )
            .ok();
        Ok(raw)
    }

    /// Point lookup used by C3's temporal/semantic/file-overlap validators
    /// when the candidate reference names a commit.
    pub fn find_commit(&self, repo_id: &str, sha: &str) -> Result<Option<CommitRecord>, StagingError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT sha, message, author_email, author_date, additions, deletions, raw_files_json
                 FROM commits WHERE repo_id = ?1 AND sha = ?2",
                params![repo_id, sha],
                |row| {
                    let raw_files_json: String = row.get(6)?;
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, u32>(5)?,
                        raw_files_json,
                    ))
                },
            )
            .ok();
        Ok(row.map(|(sha, message, author_email, author_date, additions, deletions, raw_files_json)| {
            let files = serde_json::from_str(&raw_files_json).unwrap_or_default();
            let date = parse_rfc3339(author_date);
            CommitRecord {
                sha,
                message,
                author_email,
                author_date: date,
                committer_date: date,
                additions,
                deletions,
                files,
            }
        }))
    }

    /// Point lookup used by C3 when the candidate reference names a PR.
    pub fn find_pr(&self, repo_id: &str, number: i64) -> Result<Option<PrRecord>, StagingError> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT number, title, body, author_login, state, created_at, merged_at, merge_commit_sha
                 FROM pull_requests WHERE repo_id = ?1 AND number = ?2",
                params![repo_id, number],
                |row| {
                    Ok(PrRecord {
                        number: row.get(0)?,
                        title: row.get(1)?,
                        body: row.get(2)?,
                        author_login: row.get(3)?,
                        state: row.get(4)?,
                        created_at: parse_rfc3339(row.get::<_, String>(5)?),
                        merged_at: row.get::<_, Option<String>>(6)?.map(parse_rfc3339),
                        merge_commit_sha: row.get(7)?,
                    })
                },
            )
            .ok();
        Ok(row)
    }

    /// Issues that are closed and have no Tier-A timeline event -- the
    /// input set for C3 (spec.md §4.3).
    pub fn orphaned_closed_issues(&self, repo_id: &str) -> Result<Vec<IssueRecord>, StagingError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT i.number, i.title, i.body, i.state, i.created_at, i.closed_at, i.labels_json, i.closure_reason
             FROM issues i
             WHERE i.repo_id = ?1 AND i.state = 'closed'
               AND NOT EXISTS (
                   SELECT 1 FROM issue_timeline t
                   WHERE t.repo_id = i.repo_id AND t.issue_number = i.number
                     AND t.event_type IN ('CrossReferenced', 'Closed')
               )",
        )?;
        let rows = stmt.query_map(params![repo_id], |row| {
            let labels_json: String = row.get(6)?;
            let labels: Vec<String> = serde_json::from_str(&labels_json).unwrap_or_default();
            Ok(IssueRecord {
                number: row.get(0)?,
                title: row.get(1)?,
                body: row.get(2)?,
                state: row.get(3)?,
                created_at: parse_rfc3339(row.get::<_, String>(4)?),
                closed_at: row.get::<_, Option<String>>(5)?.map(parse_rfc3339),
                labels,
                closure_reason: row.get(7)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn parse_rfc3339(s: String) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

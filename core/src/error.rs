use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("natural-key collision for {entity} {key}: {detail}")]
    NaturalKeyCollision {
        entity: &'static str,
        key: String,
        detail: String,
    },
}

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph store error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("query deadline exceeded after {0:?}")]
    DeadlineExceeded(std::time::Duration),

    #[error("collision rule violated: {0}")]
    Collision(String),
}

#[derive(Debug, Error)]
pub enum LinkResolverError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("llm provider error: {0}")]
    Llm(String),

    #[error("batch {batch_id} quarantined after {attempts} failed attempts: {reason}")]
    Quarantined {
        batch_id: String,
        attempts: u8,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum FileResolverError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("link resolver error: {0}")]
    LinkResolver(#[from] LinkResolverError),

    #[error("fetcher error: {0}")]
    Fetcher(String),

    #[error("phase {phase} exceeded its wall-clock budget of {budget_secs}s")]
    PhaseBudgetExceeded { phase: u8, budget_secs: u64 },

    #[error("phases executed out of order: attempted phase {attempted} before phase {required} completed")]
    PhaseOrderViolation { attempted: u8, required: u8 },
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("query deadline exceeded")]
    DeadlineExceeded,

    #[error("file resolution error: {0}")]
    FileResolution(String),

    #[error("phase 1 metrics error: {0}")]
    Phase1Metrics(String),
}

#[derive(Debug, Error)]
pub enum InvestigationError {
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("llm provider error: {0}")]
    Llm(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("investigation cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("no checkpoint found for id {0}")]
    NotFound(String),

    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch { expected: String, found: String },
}

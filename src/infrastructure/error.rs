use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Backend API error: {0}")]
    Api(String),
    #[error("Authentication required")]
    Unauthorized,
    #[error("Credential error: {0}")]
    Credential(String),
    #[error("Conflict declined: {0}")]
    ConflictDeclined(String),
    #[error("Internal state error: {0}")]
    State(String),
}

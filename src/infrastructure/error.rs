use crate::domain::time::TimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    InvalidTime(#[from] TimeError),
    #[error("someone else updated {item_id} concurrently")]
    Conflict { item_id: String },
    #[error("{item_id} no longer exists")]
    Gone { item_id: String },
    #[error("network failure: {0}")]
    Network(String),
}

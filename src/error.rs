use thiserror::Error;

pub type MigrateResult<T> = Result<T, MigrateError>;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Workbook read error: {0}")]
    Read(String),

    #[error("Workbook write error: {0}")]
    Write(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

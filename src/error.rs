use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] tokio_rusqlite::Error),

    /// Transient listing/detail failure; the item stays unprocessed and is
    /// picked up again on a later run.
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Scoring API error: {0}")]
    Oracle(String),

    /// Oracle response missing required fields or otherwise beyond repair.
    #[error("Invalid oracle response: {0}")]
    Validation(String),

    /// Daily scoring quota hit; remaining candidates are deferred to the
    /// next run rather than failed.
    #[error("Daily scoring quota exhausted")]
    QuotaExhausted,

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

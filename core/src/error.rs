use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("No save found for timestamp '{timestamp}'")]
    NotFound { timestamp: String },

    #[error("Save '{timestamp}' is corrupt: {reason}")]
    CorruptData { timestamp: String, reason: String },

    #[error("Item definition '{item}' missing from catalog")]
    MissingItemDefinition { item: String },

    #[error("Expected {what} in scene '{scene}' but none was found")]
    MissingEntity { what: &'static str, scene: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SaveError {
    /// Recoverable errors are logged and skipped during restore;
    /// everything else aborts the operation that raised it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SaveError::MissingItemDefinition { .. } | SaveError::MissingEntity { .. }
        )
    }
}

pub type SaveResult<T> = Result<T, SaveError>;

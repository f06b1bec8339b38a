//! Data-layer error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrmError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("invalid {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },

    #[error("constraint violation: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CrmError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        CrmError::NotFound { entity, id }
    }

    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        CrmError::Invalid {
            field,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for CrmError {
    fn from(err: sqlx::Error) -> Self {
        // Foreign-key and NOT NULL failures surface as database errors with a
        // constraint message; keep them apart from I/O failures.
        if let sqlx::Error::Database(ref db_err) = err {
            let msg = db_err.message();
            if msg.contains("constraint failed") {
                return CrmError::Conflict(msg.to_string());
            }
        }
        CrmError::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, CrmError>;

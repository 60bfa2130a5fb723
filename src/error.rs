use std::time::Duration;

use uuid::Uuid;

use crate::models::RecipientRef;

/// Errors raised by the directory, catalog, calendar and assignment ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Malformed input such as an inverted date range or an empty link.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The (recipient, survey, block) triple is already assigned.
    #[error("assignment already exists for {recipient} on survey {survey_id} in block {block_id}")]
    DuplicateAssignment {
        recipient: RecipientRef,
        survey_id: Uuid,
        block_id: Uuid,
    },

    #[error("{entity} not found (id={id})")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Failure of a single call to the messaging transport.
///
/// Never escapes the dispatcher: it is converted into a `failed` log entry.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("send timed out after {0:?}")]
    Timeout(Duration),

    #[error("API error: status={status}, body={body}")]
    Api { status: u16, body: String },
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

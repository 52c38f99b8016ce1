use thiserror::Error;

use crate::db::DbError;

#[derive(Debug, Error)]
pub enum ClientRuleError {
    /// A user-supplied field is missing or malformed. The message is shown verbatim.
    #[error("{0}")]
    InvalidInput(String),
    #[error("unknown client rule: {0}")]
    RuleNotFound(String),
    #[error("{0}")]
    DuplicateRule(String),
    #[error("{0}")]
    ImmutableRule(String),
    #[error("client rule file is corrupt: {0}")]
    CorruptStore(String),
    #[error("client rule backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("failed to save client rules: {0}")]
    Persistence(String),
}

impl ClientRuleError {
    /// Errors the caller can fix by changing the request.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ClientRuleError::InvalidInput(_)
                | ClientRuleError::RuleNotFound(_)
                | ClientRuleError::DuplicateRule(_)
                | ClientRuleError::ImmutableRule(_)
        )
    }
}

impl From<DbError> for ClientRuleError {
    fn from(err: DbError) -> Self {
        ClientRuleError::BackendUnavailable(err.to_string())
    }
}

impl From<libsql::Error> for ClientRuleError {
    fn from(err: libsql::Error) -> Self {
        ClientRuleError::BackendUnavailable(err.to_string())
    }
}

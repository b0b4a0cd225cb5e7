use thiserror::Error;
use uuid::Uuid;

/// Broad error categories. The HTTP layer maps each to one status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Internal,
}

/// Errors raised by marketplace operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Account verification required")]
    Unverified,

    #[error("Invalid PIN")]
    PinRejected,

    #[error("Too many PIN attempts, try again later")]
    PinLocked,

    #[error("Withdrawal PIN already configured")]
    PinAlreadyConfigured,

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("{entity} {id} is {actual}, expected {expected}")]
    StaleState {
        entity: &'static str,
        id: Uuid,
        expected: String,
        actual: String,
    },

    #[error("Cannot {action} a {entity} that is {from}")]
    InvalidTransition {
        entity: &'static str,
        action: &'static str,
        from: String,
    },

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientBalance { available: i64, requested: i64 },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        MarketError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::InvalidAmount(_)
            | MarketError::Validation(_)
            | MarketError::InsufficientBalance { .. } => ErrorKind::Validation,
            MarketError::InvalidSignature => ErrorKind::Unauthenticated,
            MarketError::Forbidden(_)
            | MarketError::Unverified
            | MarketError::PinRejected
            | MarketError::PinLocked => ErrorKind::Forbidden,
            MarketError::NotFound { .. } => ErrorKind::NotFound,
            MarketError::StaleState { .. }
            | MarketError::InvalidTransition { .. }
            | MarketError::PinAlreadyConfigured
            | MarketError::AlreadyExists(_) => ErrorKind::Conflict,
            MarketError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type MarketResult<T> = Result<T, MarketError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_errors_do_not_reveal_configuration() {
        // mismatch and missing PIN share one variant and one message
        assert_eq!(MarketError::PinRejected.to_string(), "Invalid PIN");
        assert_eq!(MarketError::PinRejected.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn stale_state_is_a_conflict() {
        let err = MarketError::StaleState {
            entity: "milestone",
            id: Uuid::nil(),
            expected: "approved".into(),
            actual: "released".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("expected approved"));
    }
}

use std::fmt;

/// Service-level error for the rsvp pipeline.
///
/// Component layers (messaging, cache, storage, config) carry their own
/// structured error enums; this type is the coarse-grained form they fold
/// into at service boundaries such as bootstrap and the dispatcher loops.
#[derive(Debug, Clone, PartialEq)]
pub enum RsvpError {
    DatabaseError(String),
    MessagingError(String),
    StorageError(String),
    CacheError(String),
    SpreadsheetError(String),
    ValidationError(String),
    InvalidInput(String),
    ConfigurationError(String),
}

impl fmt::Display for RsvpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsvpError::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            RsvpError::MessagingError(msg) => write!(f, "Messaging error: {msg}"),
            RsvpError::StorageError(msg) => write!(f, "Storage error: {msg}"),
            RsvpError::CacheError(msg) => write!(f, "Cache error: {msg}"),
            RsvpError::SpreadsheetError(msg) => write!(f, "Spreadsheet error: {msg}"),
            RsvpError::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            RsvpError::InvalidInput(msg) => write!(f, "Invalid input: {msg}"),
            RsvpError::ConfigurationError(msg) => write!(f, "Configuration error: {msg}"),
        }
    }
}

impl std::error::Error for RsvpError {}

impl From<sqlx::Error> for RsvpError {
    fn from(error: sqlx::Error) -> Self {
        RsvpError::DatabaseError(error.to_string())
    }
}

impl From<serde_json::Error> for RsvpError {
    fn from(error: serde_json::Error) -> Self {
        RsvpError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

impl From<crate::messaging::MessagingError> for RsvpError {
    fn from(error: crate::messaging::MessagingError) -> Self {
        RsvpError::MessagingError(error.to_string())
    }
}

impl From<crate::storage::StorageError> for RsvpError {
    fn from(error: crate::storage::StorageError) -> Self {
        RsvpError::StorageError(error.to_string())
    }
}

impl From<crate::cache::CacheError> for RsvpError {
    fn from(error: crate::cache::CacheError) -> Self {
        RsvpError::CacheError(error.to_string())
    }
}

impl From<crate::config::ConfigurationError> for RsvpError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        RsvpError::ConfigurationError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RsvpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category() {
        let err = RsvpError::DatabaseError("connection refused".to_string());
        assert_eq!(err.to_string(), "Database error: connection refused");

        let err = RsvpError::ValidationError("bad chunk".to_string());
        assert!(err.to_string().starts_with("Validation error:"));
    }

    #[test]
    fn test_from_serde_json() {
        let parse_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: RsvpError = parse_err.into();
        assert!(matches!(err, RsvpError::ValidationError(_)));
    }
}

use thiserror::Error;

/// Canonical error type for storage primitives and engine contract violations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No object, location record or migration job under that id.
    #[error("{entity} `{id}` does not exist")]
    NotFound {
        /// e.g. `"migration job"`
        entity: &'static str,
        id: String,
    },

    /// Another migration or writer holds the entity.
    #[error("conflict on {entity} `{id}`: {message}")]
    Conflict {
        entity: &'static str,
        id: String,
        message: String,
    },

    /// Unparseable tier or history state, or a job in the wrong phase.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// Bad object id or policy value.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A tier or control-plane backend rejected the operation.
    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to encode control-plane document: {0}")]
    Serialization(String),

    /// Corrupt control-plane document or timestamp.
    #[error("failed to decode control-plane document: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Broken engine invariant, e.g. a queued write dropped before replay.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    #[must_use]
    pub fn conflict(entity: &'static str, id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            entity,
            id: id.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Wraps a backend failure message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        match e.classify() {
            serde_json::error::Category::Io => Self::Serialization(e.to_string()),
            _ => Self::Deserialization(e.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = CoreError::not_found("migration job", "1234");
        assert_eq!(err.to_string(), "migration job `1234` does not exist");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_conflict_display() {
        let err = CoreError::conflict("object", "abc", "lock held");
        assert_eq!(err.to_string(), "conflict on object `abc`: lock held");
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_serde_json_syntax_maps_to_deserialization() {
        let err = serde_json::from_str::<u32>("{").unwrap_err();
        assert!(matches!(CoreError::from(err), CoreError::Deserialization(_)));
    }
}

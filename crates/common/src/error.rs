use thiserror::Error;

/// Top-level error type for Terralens operations.
///
/// Errors are `Clone` because a failed build is cached in its handle and
/// returned verbatim to every later resolver of the same key.
#[derive(Clone, Debug, Error)]
pub enum TerralensError {
    // --- Validation errors (detected locally, never reach the engine) ---
    #[error("unknown operation '{operation}' for tool '{tool}'")]
    InvalidOperation { tool: String, operation: String },

    #[error("missing or invalid parameter: {0}")]
    MissingParameter(String),

    #[error("conflicting parameters: {0}")]
    ConflictingParameters(String),

    // --- Registry errors ---
    #[error("handle {key} not found or expired — rebuild the upstream step")]
    HandleNotFound { key: String },

    #[error("build for handle {key} did not finish within {timeout_secs}s — retry the operation")]
    BuildTimeout { key: String, timeout_secs: u64 },

    // --- External engine errors ---
    #[error("engine failure: {0}")]
    EngineFailure(String),

    // --- Invariant violations (should never surface to a client) ---
    #[error("internal registry error: {0}")]
    InternalRegistry(String),
}

impl TerralensError {
    /// Stable error kind string carried in the response protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidOperation { .. } => "InvalidOperation",
            Self::MissingParameter(_) => "MissingParameter",
            Self::ConflictingParameters(_) => "ConflictingParameters",
            Self::HandleNotFound { .. } => "HandleNotFound",
            Self::BuildTimeout { .. } => "BuildTimeout",
            Self::EngineFailure(_) => "EngineFailure",
            Self::InternalRegistry(_) => "InternalRegistryError",
        }
    }

    /// Whether the error was caused by the request itself rather than by
    /// the registry or the engine.
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidOperation { .. }
                | Self::MissingParameter(_)
                | Self::ConflictingParameters(_)
        )
    }

    /// Transport-agnostic status equivalent for the response boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidOperation { .. }
            | Self::MissingParameter(_)
            | Self::ConflictingParameters(_) => 400,
            Self::HandleNotFound { .. } => 404,
            Self::BuildTimeout { .. } => 504,
            Self::EngineFailure(_) | Self::InternalRegistry(_) => 500,
        }
    }
}

/// Status equivalent for an error kind string, for callers that only hold
/// the serialized response.
pub fn status_for_kind(kind: &str) -> u16 {
    match kind {
        "InvalidOperation" | "MissingParameter" | "ConflictingParameters" => 400,
        "HandleNotFound" => 404,
        "BuildTimeout" => 504,
        _ => 500,
    }
}

/// Result type alias for Terralens operations.
pub type Result<T> = std::result::Result<T, TerralensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = TerralensError::HandleNotFound {
            key: "idx_9f3a".into(),
        };
        assert_eq!(not_found.status_code(), 404);
        assert_eq!(status_for_kind(not_found.kind()), 404);

        let timeout = TerralensError::BuildTimeout {
            key: "composite_ab12".into(),
            timeout_secs: 120,
        };
        assert_eq!(timeout.status_code(), 504);

        assert_eq!(
            TerralensError::MissingParameter("dataset".into()).status_code(),
            400
        );
        assert_eq!(
            TerralensError::EngineFailure("boom".into()).status_code(),
            500
        );
    }

    #[test]
    fn test_error_messages_name_the_contract() {
        let e = TerralensError::HandleNotFound {
            key: "idx_9f3a".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("idx_9f3a"));
        assert!(msg.contains("rebuild"));
    }

    #[test]
    fn test_caller_error_classification() {
        assert!(TerralensError::InvalidOperation {
            tool: "compute".into(),
            operation: "frobnicate".into(),
        }
        .is_caller_error());
        assert!(!TerralensError::EngineFailure("down".into()).is_caller_error());
    }
}

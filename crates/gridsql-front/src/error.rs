//! Diagnostics surfaced by the statement front-end.
//!
//! Every failure carries a standard SQL-state code so the access-API layer can
//! fill its diagnostic records without reinterpreting the error.

use std::{fmt, time::Duration};

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Standard SQL-state codes produced by this layer or by the cluster engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlState {
    /// `42000` syntax error or access violation.
    SyntaxErrorOrAccessViolation,
    /// `HY000` general error.
    GeneralError,
    /// `HYT00` timeout expired.
    TimeoutExpired,
    /// `HY008` operation canceled.
    OperationCanceled,
    /// `08S01` communication link failure.
    CommunicationLinkFailure,
    /// `HYC00` optional feature not implemented.
    OptionalFeatureNotImplemented,
}

impl SqlState {
    pub fn code(&self) -> &'static str {
        match self {
            SqlState::SyntaxErrorOrAccessViolation => "42000",
            SqlState::GeneralError => "HY000",
            SqlState::TimeoutExpired => "HYT00",
            SqlState::OperationCanceled => "HY008",
            SqlState::CommunicationLinkFailure => "08S01",
            SqlState::OptionalFeatureNotImplemented => "HYC00",
        }
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl Serialize for SqlState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// Opaque failure reported by the cluster query engine.
///
/// The router hands these back to the caller untouched, so the state code is
/// whatever the engine decided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EngineError {
    state: SqlState,
    message: String,
}

impl EngineError {
    pub fn new(state: SqlState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: message.into(),
        }
    }

    pub fn general(message: impl Into<String>) -> Self {
        Self::new(SqlState::GeneralError, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(SqlState::SyntaxErrorOrAccessViolation, message)
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            SqlState::TimeoutExpired,
            format!("Query timeout expired after {} ms", limit.as_millis()),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(SqlState::OperationCanceled, "Query was cancelled")
    }

    pub fn link_failure(message: impl Into<String>) -> Self {
        Self::new(SqlState::CommunicationLinkFailure, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(SqlState::OptionalFeatureNotImplemented, message)
    }

    pub fn sql_state(&self) -> SqlState {
        self.state
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors returned while tokenizing, classifying, converting or routing a
/// statement.
#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("{message} at position {position}")]
    Lexical { message: String, position: usize },

    #[error("Unexpected character '{lexeme}' at position {position}")]
    UnknownToken { lexeme: String, position: usize },

    #[error("{command}: expected {expected} argument(s), got {actual} (position {position})")]
    ArgumentCount {
        command: String,
        expected: usize,
        actual: usize,
        position: usize,
    },

    #[error("{message} (position {position})")]
    ArgumentType {
        position: usize,
        expected: String,
        lexeme: String,
        message: String,
    },

    #[error("Option {option} is specified more than once (position {position})")]
    DuplicateOption { option: String, position: usize },

    #[error("Failed to execute {command}: {source:#}")]
    HandlerExecution {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Forward(#[from] EngineError),
}

impl FrontendError {
    pub fn sql_state(&self) -> SqlState {
        match self {
            FrontendError::Lexical { .. }
            | FrontendError::UnknownToken { .. }
            | FrontendError::ArgumentCount { .. }
            | FrontendError::ArgumentType { .. }
            | FrontendError::DuplicateOption { .. } => SqlState::SyntaxErrorOrAccessViolation,
            FrontendError::HandlerExecution { .. } => SqlState::GeneralError,
            FrontendError::Forward(err) => err.sql_state(),
        }
    }

    /// Byte offset of the offending token, when the error points at one.
    pub fn position(&self) -> Option<usize> {
        match self {
            FrontendError::Lexical { position, .. }
            | FrontendError::UnknownToken { position, .. }
            | FrontendError::ArgumentCount { position, .. }
            | FrontendError::ArgumentType { position, .. }
            | FrontendError::DuplicateOption { position, .. } => Some(*position),
            FrontendError::HandlerExecution { .. } | FrontendError::Forward(_) => None,
        }
    }

    pub fn diagnostic(&self) -> Diagnostic {
        Diagnostic {
            sql_state: self.sql_state(),
            message: self.to_string(),
            position: self.position(),
        }
    }
}

/// Flat diagnostic record handed to the access-API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub sql_state: SqlState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn parse_errors_map_to_syntax_state() {
        let err = FrontendError::ArgumentCount {
            command: "SET STREAMING".into(),
            expected: 1,
            actual: 0,
            position: 13,
        };
        assert_eq!(err.sql_state(), SqlState::SyntaxErrorOrAccessViolation);
        assert_eq!(err.sql_state().code(), "42000");
        assert_eq!(err.position(), Some(13));
        assert_eq!(
            err.to_string(),
            "SET STREAMING: expected 1 argument(s), got 0 (position 13)"
        );
    }

    #[test]
    fn forward_errors_keep_engine_state() {
        let err = FrontendError::from(EngineError::timeout(Duration::from_millis(250)));
        assert_eq!(err.sql_state(), SqlState::TimeoutExpired);
        assert_eq!(err.to_string(), "Query timeout expired after 250 ms");
        assert_eq!(err.position(), None);
    }

    #[test]
    fn handler_failures_are_general_errors() {
        let err = FrontendError::HandlerExecution {
            command: "SET STREAMING".into(),
            source: anyhow!("connection is closed"),
        };
        assert_eq!(err.sql_state(), SqlState::GeneralError);
        assert!(err.to_string().contains("connection is closed"));
    }

    #[test]
    fn diagnostic_serializes_code_as_string() {
        let err = FrontendError::Lexical {
            message: "Unterminated string literal".into(),
            position: 7,
        };
        let value = serde_json::to_value(err.diagnostic()).unwrap();
        assert_eq!(value["sql_state"], "42000");
        assert_eq!(value["position"], 7);
        assert_eq!(
            value["message"],
            "Unterminated string literal at position 7"
        );
    }
}

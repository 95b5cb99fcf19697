//! Engine Error Types
//!
//! Every failure the engine can produce is caused by client input (a malformed
//! filter, path or literal) or by a broken schema declaration at startup. None
//! of them are transient, so none are retried.
//!
//! [`ErrorResponse`] renders an [`EngineError`] as the SCIM error body defined
//! in RFC 7644 Section 3.12, for the REST layer to return verbatim.

use http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::schema::TypeTag;

/// SCIM Error schema URI
pub const SCHEMA_ERROR: &str = "urn:ietf:params:scim:api:messages:2.0:Error";

/// A filter expression that does not match the grammar.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} at position {position}")]
pub struct FilterSyntaxError {
    /// Byte offset into the input where the problem was detected
    pub position: usize,
    /// Human-readable description
    pub message: String,
}

impl FilterSyntaxError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// An attribute path that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed path '{path}': {reason}")]
pub struct MalformedPathError {
    pub path: String,
    pub reason: String,
}

impl MalformedPathError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A literal that cannot be coerced to the type its attribute is declared with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid value {literal} for attribute '{path}' of type {type_tag}: {reason}")]
pub struct InvalidLiteralError {
    pub path: String,
    pub type_tag: TypeTag,
    pub literal: String,
    pub reason: String,
}

/// A schema declaration that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("Schema '{resource_type}': {source}")]
    MalformedPath {
        resource_type: String,
        source: MalformedPathError,
    },

    #[error("Schema '{resource_type}' declares attribute '{path}' more than once")]
    DuplicatePath {
        resource_type: String,
        path: String,
    },
}

/// Umbrella error for the operations exposed to the REST layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid filter: {0}")]
    Syntax(#[from] FilterSyntaxError),

    #[error(transparent)]
    MalformedPath(#[from] MalformedPathError),

    #[error(transparent)]
    InvalidLiteral(#[from] InvalidLiteralError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

// =============================================================================
// Client-facing error body
// =============================================================================

/// SCIM error response per RFC 7644.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// SCIM schema URIs (always contains the Error schema)
    pub schemas: Vec<String>,

    /// HTTP status code as a string (e.g., "400")
    pub status: String,

    /// SCIM-specific error type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scim_type: Option<ScimErrorType>,

    /// Human-readable error detail
    pub detail: String,
}

impl ErrorResponse {
    fn new(
        status: StatusCode,
        scim_type: Option<ScimErrorType>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            schemas: vec![SCHEMA_ERROR.to_string()],
            status: status.as_u16().to_string(),
            scim_type,
            detail: detail.into(),
        }
    }

    /// Invalid filter syntax error (400)
    pub fn invalid_filter(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidFilter),
            detail,
        )
    }

    /// Invalid attribute path (400)
    pub fn invalid_path(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidPath),
            detail,
        )
    }

    /// Invalid attribute value (400)
    pub fn invalid_value(detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            Some(ScimErrorType::InvalidValue),
            detail,
        )
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        self.status
            .parse()
            .ok()
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Syntax(e) => Self::invalid_filter(e.to_string()),
            EngineError::MalformedPath(e) => Self::invalid_path(e.to_string()),
            EngineError::InvalidLiteral(e) => Self::invalid_value(e.to_string()),
        }
    }
}

impl From<EngineError> for ErrorResponse {
    fn from(err: EngineError) -> Self {
        Self::from(&err)
    }
}

/// SCIM error types per RFC 7644 Section 3.12 that the engine can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScimErrorType {
    /// Filter syntax is invalid or unsupported
    InvalidFilter,

    /// Attribute path is malformed
    InvalidPath,

    /// Attribute value is invalid for its type
    InvalidValue,
}

impl std::fmt::Display for ScimErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScimErrorType::InvalidFilter => write!(f, "invalidFilter"),
            ScimErrorType::InvalidPath => write!(f, "invalidPath"),
            ScimErrorType::InvalidValue => write!(f, "invalidValue"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

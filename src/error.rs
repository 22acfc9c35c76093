// Typed errors for the twin and the `{success, error}` shape lookups report

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TwinError {
    #[error("not found")]
    NodeNotFound(String),
}

/// A single port entry that could not be turned into a `PortMapping`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortDecodeError {
    #[error("port value {0:?} is not numeric")]
    NotNumeric(String),
    #[error("port {0} is outside 1-65535")]
    OutOfRange(i64),
    #[error("port entry has neither host nor container port")]
    Empty,
    #[error("unsupported port shape: {0}")]
    Shape(String),
}

/// Result envelope for lookup-style operations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LookupResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> From<Result<T, TwinError>> for LookupResult<T> {
    fn from(result: Result<T, TwinError>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

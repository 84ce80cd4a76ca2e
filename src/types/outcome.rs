use serde::Serialize;

use super::errors::{ErrorKind, SyncError};

/// The `{ success, error? }` envelope handed to UI layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> From<Result<T, SyncError>> for Outcome<T> {
    fn from(result: Result<T, SyncError>) -> Self {
        match result {
            Ok(data) => Outcome {
                success: true,
                error: None,
                error_kind: None,
                data: Some(data),
            },
            Err(e) => Outcome {
                success: false,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
                data: None,
            },
        }
    }
}

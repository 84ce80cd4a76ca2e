use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// === ValidationErrors ===

/// A single rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Every field that failed client-side validation, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub fields: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f.field == field)
    }

    /// `Ok(())` when nothing was rejected.
    pub fn into_result(self) -> Result<(), SyncError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(SyncError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

// === SyncError ===

/// Errors surfaced by the synchronization core to its consumers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Input rejected before any network call.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),
    /// No signed-in user.
    #[error("Not authenticated")]
    NotAuthenticated,
    /// The remote store or the network failed.
    #[error("Gateway error: {0}")]
    Gateway(String),
    /// A collection with this name already exists for the user.
    #[error("Collection name already exists: {0}")]
    DuplicateName(String),
    /// The row no longer exists (or belongs to someone else).
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Fieldless discriminant of [`SyncError`], for UI dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotAuthenticated,
    Gateway,
    DuplicateName,
    NotFound,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::NotAuthenticated => ErrorKind::NotAuthenticated,
            SyncError::Gateway(_) => ErrorKind::Gateway,
            SyncError::DuplicateName(_) => ErrorKind::DuplicateName,
            SyncError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.push(field, message);
        SyncError::Validation(errors)
    }
}

// === GatewayError ===

/// Errors reported by a gateway implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// No row matched the id for this user.
    #[error("Row not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint rejected the write.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// Any other storage failure.
    #[error("Store error: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Store(e.to_string())
    }
}

impl From<GatewayError> for SyncError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::NotFound(id) => SyncError::NotFound(id),
            GatewayError::Conflict(name) => SyncError::DuplicateName(name),
            GatewayError::Unavailable(msg) | GatewayError::Store(msg) => SyncError::Gateway(msg),
        }
    }
}

// === SettingsError ===

/// Errors related to loading or saving sync settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Reading or writing the settings file failed.
    #[error("Settings IO error: {0}")]
    Io(String),
    /// The settings file is not valid JSON for [`crate::types::settings::SyncSettings`].
    #[error("Settings serialization error: {0}")]
    Serialization(String),
    /// A value was out of range.
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}

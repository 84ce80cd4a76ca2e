//! Signed-in user identity shared by the managers.
//!
//! Authentication itself happens elsewhere; this only records which user id
//! the session was issued for.

use std::sync::{Arc, PoisonError, RwLock};

use crate::types::errors::SyncError;

/// Cheaply clonable handle to the current user id.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    user_id: Arc<RwLock<Option<String>>>,
}

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user_id: &str) -> Self {
        let identity = Self::new();
        identity.sign_in(user_id);
        identity
    }

    pub fn sign_in(&self, user_id: &str) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = Some(user_id.to_string());
    }

    pub fn sign_out(&self) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn current(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The signed-in user id, or [`SyncError::NotAuthenticated`].
    pub fn require(&self) -> Result<String, SyncError> {
        self.current().ok_or(SyncError::NotAuthenticated)
    }
}

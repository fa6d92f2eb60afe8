//! Identity provider port.

use std::sync::RwLock;

use crate::types::OwnerId;

/// Session-level failure; never retried, the caller re-authenticates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// No signed-in identity.
    #[error("session expired, please log in again")]
    NoSession,
    /// The identity provider refused the credentials.
    #[error("authentication rejected: {0}")]
    Rejected(String),
}

/// Source of the canonical owner id for the signed-in account.
pub trait IdentityProvider: Send + Sync {
    /// Current owner id, or `None` when nobody is signed in.
    fn current_owner_id(&self) -> Option<OwnerId>;

    /// Drops the current session.
    fn invalidate(&self);

    /// Like [`Self::current_owner_id`] but maps absence to [`AuthError::NoSession`].
    fn require_owner_id(&self) -> Result<OwnerId, AuthError> {
        self.current_owner_id().ok_or(AuthError::NoSession)
    }
}

/// Identity fixed at construction, cleared by [`IdentityProvider::invalidate`].
#[derive(Debug, Default)]
pub struct StaticIdentity {
    owner: RwLock<Option<OwnerId>>,
}

impl StaticIdentity {
    pub fn signed_in(owner: OwnerId) -> Self {
        Self {
            owner: RwLock::new(Some(owner)),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_owner_id(&self) -> Option<OwnerId> {
        match self.owner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn invalidate(&self) {
        match self.owner.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

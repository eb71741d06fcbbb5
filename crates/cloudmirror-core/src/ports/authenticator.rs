//! Authenticator port
//!
//! Credential acquisition sits outside the engine. The CLI asks an
//! authenticator for a [`TransportCredential`] once per run and hands it to
//! the remote store adapter.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::domain::errors::AuthError;

/// A bearer credential for the remote store's transport
#[derive(Clone)]
pub struct TransportCredential {
    /// Bearer token sent with every request
    pub access_token: String,
    /// When the token stops being accepted, if known
    pub expires_at: Option<DateTime<Utc>>,
}

impl TransportCredential {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Returns true if the token has a known expiry in the past
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Utc::now() >= at)
    }
}

// Never print the token itself.
impl fmt::Debug for TransportCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportCredential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Port trait for credential acquisition
#[async_trait::async_trait]
pub trait IAuthenticator: Send + Sync {
    /// Produces transport credentials from the credential material at `credentials_file`
    ///
    /// # Errors
    /// `AuthError` when the material is unreadable, malformed, unsupported,
    /// or rejected by the token endpoint
    async fn authenticate(&self, credentials_file: &Path)
        -> Result<TransportCredential, AuthError>;
}

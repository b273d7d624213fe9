//! Authorization collaborator and per-request credentials.
//!
//! The client does not acquire or refresh tokens itself. An [`Authorizer`]
//! grants access before each logical request, contributes header fields to
//! every attempt, and forgets its cached token when the server rejects it.

use std::fmt;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::request::Headers;

/// Outcome of [`Authorizer::request_access`] when access was not granted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The collaborator explicitly denied access.
    #[error("access denied")]
    Denied,
    /// Token acquisition failed.
    #[error("{0}")]
    Failed(String),
}

/// External component supplying, refreshing and revoking request credentials.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Makes sure a usable token is available before a request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`AccessError`] if access cannot be granted; no network call
    /// is made for the request in that case.
    async fn request_access(&self) -> Result<(), AccessError>;

    /// Discards the locally cached token so the next access request refreshes it.
    fn revoke_local_access_token(&self);

    /// Header fields injected into every outgoing request.
    fn authorization_fields(&self) -> Headers;
}

/// Username and password used to answer authentication challenges.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    user: String,
    password: String,
}

impl Credential {
    /// Creates a credential.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// The user name.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// `Authorization` header value for HTTP Basic.
    #[must_use]
    pub fn basic_authorization(&self) -> String {
        let token = STANDARD.encode(format!("{}:{}", self.user, self.password));
        format!("Basic {token}")
    }
}

// Keeps passwords out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

//! Identity backends consumed by the session store.
//!
//! `HttpIdentityProvider` talks to the Academy REST API; the offline
//! `LocalIdentityProvider` lives in the `local` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ApiClient;
use crate::models::User;
use crate::utils::redact_token;

use super::AuthError;

/// A freshly established identity and the token proving it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub user: User,
    pub token: String,
}

/// Identity-verification capability.
///
/// Every call may suspend on I/O and may fail; callers that cannot wait
/// forever wrap these futures in their own timeout.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a previously issued token to its user
    async fn verify(&self, token: &str) -> Result<User, AuthError>;

    /// Exchange credentials for a new token
    async fn authenticate(&self, email: &str, secret: &str) -> Result<Grant, AuthError>;

    /// Create an account and sign it in
    async fn create_account(&self, name: &str, email: &str, secret: &str) -> Result<Grant, AuthError>;
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Identity backed by the REST endpoints under `/auth`.
#[derive(Clone)]
pub struct HttpIdentityProvider {
    api: ApiClient,
}

impl HttpIdentityProvider {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn verify(&self, token: &str) -> Result<User, AuthError> {
        debug!(token = %redact_token(token), "Verifying token");
        Ok(self.api.with_token(token).get("/auth/me").await?)
    }

    async fn authenticate(&self, email: &str, secret: &str) -> Result<Grant, AuthError> {
        let body = LoginRequest { email, password: secret };
        Ok(self.api.post("/auth/login", &body).await?)
    }

    async fn create_account(&self, name: &str, email: &str, secret: &str) -> Result<Grant, AuthError> {
        let body = RegisterRequest { name, email, password: secret };
        Ok(self.api.post("/auth/register", &body).await?)
    }
}

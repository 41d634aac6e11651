use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::User;

use super::identity::{Grant, IdentityProvider};
use super::storage::{TokenStore, TOKEN_KEY};
use super::validation::require;
use super::AuthError;

/// Authentication status as seen by readers of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum SessionStatus {
    Unresolved,
    Resolving,
    Authenticated,
    Unauthenticated,
}

impl SessionStatus {
    /// Terminal statuses are the only ones the route guard acts on
    pub fn is_settled(&self) -> bool {
        matches!(self, SessionStatus::Authenticated | SessionStatus::Unauthenticated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Unresolved => "unresolved",
            SessionStatus::Resolving => "resolving",
            SessionStatus::Authenticated => "authenticated",
            SessionStatus::Unauthenticated => "unauthenticated",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current authentication state. A user is carried exactly when authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Unresolved,
    Resolving,
    Authenticated(User),
    Unauthenticated,
}

impl Session {
    pub fn status(&self) -> SessionStatus {
        match self {
            Session::Unresolved => SessionStatus::Unresolved,
            Session::Resolving => SessionStatus::Resolving,
            Session::Authenticated(_) => SessionStatus::Authenticated,
            Session::Unauthenticated => SessionStatus::Unauthenticated,
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Session::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated(_))
    }

    pub fn is_settled(&self) -> bool {
        self.status().is_settled()
    }
}

/// Single owner of the session.
///
/// Readers take snapshots or subscribe to changes; only the operations
/// below write. Status and user are published together in one update, and
/// writes that would not change the session do not wake subscribers.
///
/// Operations are not coalesced: when two are in flight, whichever
/// completes last decides the final session.
pub struct SessionStore {
    provider: Arc<dyn IdentityProvider>,
    tokens: Arc<dyn TokenStore>,
    state: watch::Sender<Session>,
}

impl SessionStore {
    pub fn new(provider: Arc<dyn IdentityProvider>, tokens: Arc<dyn TokenStore>) -> Self {
        let (state, _) = watch::channel(Session::Unresolved);
        Self {
            provider,
            tokens,
            state,
        }
    }

    // =========================================================================
    // Readers
    // =========================================================================

    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.state.borrow().status()
    }

    pub fn user(&self) -> Option<User> {
        self.state.borrow().user().cloned()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// Receiver that observes every published change
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Restore the session from the persisted token. Runs once, at startup.
    ///
    /// Never fails: an absent, unreadable or rejected token ends in
    /// `Unauthenticated`, and a token that could not be verified for any
    /// reason is removed from storage.
    pub async fn restore(&self) -> SessionStatus {
        let started = self.state.send_if_modified(|session| {
            if *session == Session::Unresolved {
                *session = Session::Resolving;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(status = %self.status(), "Session already restored");
            return self.status();
        }

        let token = match self.tokens.read(TOKEN_KEY) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted token");
                None
            }
        };

        let Some(token) = token else {
            debug!("No persisted token");
            self.publish(Session::Unauthenticated);
            return SessionStatus::Unauthenticated;
        };

        match self.provider.verify(&token).await {
            Ok(user) => {
                info!(user_id = %user.id, "Session restored");
                self.publish(Session::Authenticated(user));
                SessionStatus::Authenticated
            }
            Err(e) => {
                warn!(error = %e, "Persisted token could not be verified, clearing it");
                self.clear_token_if_unchanged(&token);
                self.publish(Session::Unauthenticated);
                SessionStatus::Unauthenticated
            }
        }
    }

    /// Sign in with email and secret.
    ///
    /// Empty input is rejected before the identity provider is called and
    /// leaves the session untouched. Any other failure signs the session out.
    pub async fn login(&self, email: &str, secret: &str) -> Result<User, AuthError> {
        require("Email", email)?;
        require("Password", secret)?;

        let result = self.provider.authenticate(email.trim(), secret).await;
        self.complete_sign_in("login", result)
    }

    /// Create an account and sign it in. Same contract as [`login`](Self::login).
    pub async fn register(&self, name: &str, email: &str, secret: &str) -> Result<User, AuthError> {
        require("Name", name)?;
        require("Email", email)?;
        require("Password", secret)?;

        let result = self
            .provider
            .create_account(name.trim(), email.trim(), secret)
            .await;
        self.complete_sign_in("register", result)
    }

    /// Sign out and forget the persisted token. Idempotent.
    pub fn logout(&self) {
        self.clear_token();
        if self.publish(Session::Unauthenticated) {
            info!("Signed out");
        }
    }

    /// Sign out because the backend no longer accepts the token
    pub fn expire(&self) {
        if self.is_authenticated() {
            warn!("Session expired, signing out");
        }
        self.logout();
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn complete_sign_in(
        &self,
        operation: &'static str,
        result: Result<Grant, AuthError>,
    ) -> Result<User, AuthError> {
        match result {
            Ok(Grant { user, token }) => {
                if let Err(e) = self.tokens.write(TOKEN_KEY, &token) {
                    warn!(operation, error = %e, "Failed to persist token");
                }
                info!(operation, user_id = %user.id, "Signed in");
                self.publish(Session::Authenticated(user.clone()));
                Ok(user)
            }
            Err(e) => {
                warn!(operation, error = %e, "Sign-in failed");
                self.clear_token();
                self.publish(Session::Unauthenticated);
                Err(e)
            }
        }
    }

    /// Replace the session, notifying subscribers only on an actual change
    fn publish(&self, next: Session) -> bool {
        self.state.send_if_modified(|session| {
            if *session == next {
                false
            } else {
                debug!(from = %session.status(), to = %next.status(), "Session transition");
                *session = next;
                true
            }
        })
    }

    fn clear_token(&self) {
        if let Err(e) = self.tokens.remove(TOKEN_KEY) {
            warn!(error = %e, "Failed to remove persisted token");
        }
    }

    /// Remove the token unless a concurrent sign-in already replaced it
    fn clear_token_if_unchanged(&self, token: &str) {
        match self.tokens.read(TOKEN_KEY) {
            Ok(Some(current)) if current != token => {
                debug!("Persisted token replaced while verifying, keeping it");
            }
            _ => self.clear_token(),
        }
    }
}

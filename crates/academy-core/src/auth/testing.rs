//! Test doubles for the identity provider and navigator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::models::{Role, User};

use super::guard::Navigator;
use super::identity::{Grant, IdentityProvider};
use super::AuthError;

/// Identity provider with canned answers and call counters.
///
/// A gated provider parks every call until [`release`](Self::release) is
/// called once per pending call.
#[derive(Default)]
pub(crate) struct ScriptedProvider {
    issued: Mutex<HashMap<String, User>>,
    offline: AtomicBool,
    gate: Option<Notify>,
    pub verify_calls: AtomicUsize,
    pub authenticate_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub const WRONG_SECRET: &'static str = "wrong-secret";
    pub const TAKEN_EMAIL: &'static str = "taken@example.com";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Notify::new()),
            ..Self::default()
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn release(&self) {
        if let Some(ref gate) = self.gate {
            gate.notify_one();
        }
    }

    /// Issue a token the provider will accept for `email`
    pub fn issue(&self, email: &str) -> String {
        self.issue_for(Self::user_for(email, None))
    }

    fn issue_for(&self, user: User) -> String {
        let token = format!("token-{}", user.email);
        self.issued.lock().insert(token.clone(), user);
        token
    }

    fn user_for(email: &str, name: Option<&str>) -> User {
        let display_name = name
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());
        User {
            id: format!("id-{}", email),
            display_name,
            email: email.to_string(),
            avatar_ref: None,
            role: Role::Learner,
        }
    }

    async fn pass_gate(&self) -> Result<(), AuthError> {
        if let Some(ref gate) = self.gate {
            gate.notified().await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for ScriptedProvider {
    async fn verify(&self, token: &str) -> Result<User, AuthError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await?;
        self.issued
            .lock()
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::Rejected("Unknown token".to_string()))
    }

    async fn authenticate(&self, email: &str, secret: &str) -> Result<Grant, AuthError> {
        self.authenticate_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await?;
        if secret == Self::WRONG_SECRET {
            return Err(AuthError::Rejected("Invalid email or password".to_string()));
        }
        let user = Self::user_for(email, None);
        let token = self.issue_for(user.clone());
        Ok(Grant { user, token })
    }

    async fn create_account(&self, name: &str, email: &str, _secret: &str) -> Result<Grant, AuthError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.pass_gate().await?;
        if email == Self::TAKEN_EMAIL {
            return Err(AuthError::Rejected("An account with this email already exists".to_string()));
        }
        let user = Self::user_for(email, Some(name));
        let token = self.issue_for(user.clone());
        Ok(Grant { user, token })
    }
}

/// Navigator that records every redirect target
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingNavigator {
    redirects: Arc<Mutex<Vec<String>>>,
}

impl RecordingNavigator {
    pub fn redirects(&self) -> Vec<String> {
        self.redirects.lock().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn redirect_to(&self, path: &str) {
        self.redirects.lock().push(path.to_string());
    }
}

/// Let spawned tasks on the current-thread test runtime run until they park
pub(crate) async fn run_pending() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

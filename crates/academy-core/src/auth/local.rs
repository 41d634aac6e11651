//! Offline identity backend.
//!
//! Accounts live in process memory and, when opened on a data directory,
//! in `accounts.json` so tokens stay verifiable across restarts. Secrets
//! are stored as argon2 hashes; tokens are random and expire after a
//! fixed lifetime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::models::{Role, User};

use super::identity::{Grant, IdentityProvider};
use super::validation::{validate_email, validate_new_secret};
use super::AuthError;

/// Accounts file name in the data directory
const ACCOUNTS_FILE: &str = "accounts.json";

/// Token lifetime in minutes.
pub const DEFAULT_TOKEN_TTL_MINUTES: i64 = 30;

/// Length of issued tokens in alphanumeric characters
const TOKEN_LENGTH: usize = 48;

/// Same message for unknown email and wrong secret
const INVALID_CREDENTIALS: &str = "Invalid email or password";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Account {
    user: User,
    password_hash: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IssuedToken {
    email: String,
    issued_at: DateTime<Utc>,
}

impl IssuedToken {
    fn is_expired(&self, ttl: Duration) -> bool {
        Utc::now() > self.issued_at + ttl
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Registry {
    next_id: u64,
    /// Keyed by normalized email
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, IssuedToken>,
}

pub struct LocalIdentityProvider {
    registry: RwLock<Registry>,
    path: Option<PathBuf>,
    token_ttl: Duration,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

fn hash_error(e: password_hash::Error) -> AuthError {
    AuthError::Internal(format!("Failed to hash password: {}", e))
}

fn hash_secret(secret: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(hash_error)
}

/// Hash on the blocking pool, outside any registry lock
async fn hash_secret_blocking(secret: &str) -> Result<String, AuthError> {
    let secret = secret.to_string();
    tokio::task::spawn_blocking(move || hash_secret(&secret))
        .await
        .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))?
}

async fn secret_matches_blocking(secret: &str, hash: String) -> bool {
    let secret = secret.to_string();
    match tokio::task::spawn_blocking(move || secret_matches(&secret, &hash)).await {
        Ok(matches) => matches,
        Err(e) => {
            warn!(error = %e, "Password verification task failed");
            false
        }
    }
}

fn secret_matches(secret: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "Stored password hash is unreadable");
            false
        }
    }
}

impl LocalIdentityProvider {
    /// In-memory provider; everything is lost when it is dropped
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            path: None,
            token_ttl: Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
        }
    }

    /// Provider persisted to `accounts.json` under `data_dir`
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(ACCOUNTS_FILE);
        let registry = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read accounts file")?;
            serde_json::from_str(&contents).context("Failed to parse accounts file")?
        } else {
            Registry::default()
        };
        debug!(path = ?path, accounts = registry.accounts.len(), "Local identity store opened");

        Ok(Self {
            registry: RwLock::new(registry),
            path: Some(path),
            token_ttl: Duration::minutes(DEFAULT_TOKEN_TTL_MINUTES),
        })
    }

    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Number of registered accounts
    pub fn account_count(&self) -> usize {
        self.registry.read().accounts.len()
    }

    /// Register an account with a specific role, e.g. to seed an instructor
    pub fn add_account(&self, name: &str, email: &str, secret: &str, role: Role) -> Result<User, AuthError> {
        check_new_account(name, email, secret)?;
        let password_hash = hash_secret(secret)?;

        let mut registry = self.registry.write();
        let user = self.insert_account(&mut registry, name, email, password_hash, role)?;
        self.persist(&registry);
        Ok(user)
    }

    /// Insert a validated account; the duplicate check happens under the lock
    fn insert_account(
        &self,
        registry: &mut Registry,
        name: &str,
        email: &str,
        password_hash: String,
        role: Role,
    ) -> Result<User, AuthError> {
        let key = normalize_email(email);
        if registry.accounts.contains_key(&key) {
            return Err(AuthError::Rejected(
                "An account with this email already exists".to_string(),
            ));
        }

        registry.next_id += 1;
        let user = User {
            id: format!("user-{}", registry.next_id),
            display_name: name.trim().to_string(),
            email: key.clone(),
            avatar_ref: None,
            role,
        };
        let account = Account {
            user: user.clone(),
            password_hash,
            created_at: Utc::now(),
        };
        registry.accounts.insert(key, account);
        info!(user_id = %user.id, role = user.role.label(), "Account created");
        Ok(user)
    }

    fn issue_token(&self, registry: &mut Registry, email: &str) -> String {
        let ttl = self.token_ttl;
        registry.tokens.retain(|_, issued| !issued.is_expired(ttl));

        let token = generate_token();
        registry.tokens.insert(
            token.clone(),
            IssuedToken {
                email: email.to_string(),
                issued_at: Utc::now(),
            },
        );
        token
    }

    /// Best-effort save; a failed write only costs durability
    fn persist(&self, registry: &Registry) {
        let Some(ref path) = self.path else {
            return;
        };
        let result = (|| -> Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(registry)?;
            std::fs::write(path, contents)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(error = %e, "Failed to save accounts file");
        }
    }
}

fn check_new_account(name: &str, email: &str, secret: &str) -> Result<(), AuthError> {
    if name.trim().is_empty() {
        return Err(AuthError::Rejected("Name is required".to_string()));
    }
    validate_email(email).map_err(|e| AuthError::Rejected(e.to_string()))?;
    validate_new_secret(secret).map_err(|e| AuthError::Rejected(e.to_string()))?;
    Ok(())
}

impl Default for LocalIdentityProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn verify(&self, token: &str) -> Result<User, AuthError> {
        let mut registry = self.registry.write();
        let issued = registry
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::Rejected("Unknown token".to_string()))?;

        if issued.is_expired(self.token_ttl) {
            registry.tokens.remove(token);
            self.persist(&registry);
            return Err(AuthError::Rejected("Token expired".to_string()));
        }

        registry
            .accounts
            .get(&issued.email)
            .map(|account| account.user.clone())
            .ok_or_else(|| AuthError::Rejected("Account no longer exists".to_string()))
    }

    async fn authenticate(&self, email: &str, secret: &str) -> Result<Grant, AuthError> {
        let key = normalize_email(email);
        let account = self
            .registry
            .read()
            .accounts
            .get(&key)
            .map(|account| (account.user.clone(), account.password_hash.clone()));

        let Some((user, hash)) = account else {
            return Err(AuthError::Rejected(INVALID_CREDENTIALS.to_string()));
        };
        if !secret_matches_blocking(secret, hash).await {
            return Err(AuthError::Rejected(INVALID_CREDENTIALS.to_string()));
        }

        let mut registry = self.registry.write();
        let token = self.issue_token(&mut registry, &key);
        self.persist(&registry);
        Ok(Grant { user, token })
    }

    async fn create_account(&self, name: &str, email: &str, secret: &str) -> Result<Grant, AuthError> {
        check_new_account(name, email, secret)?;
        let password_hash = hash_secret_blocking(secret).await?;

        let mut registry = self.registry.write();
        let user = self.insert_account(&mut registry, name, email, password_hash, Role::Learner)?;
        let token = self.issue_token(&mut registry, &user.email);
        self.persist(&registry);
        Ok(Grant { user, token })
    }
}

//! Authentication module for managing the user session.
//!
//! This module provides:
//! - `SessionStore`: owner of the session and its lifecycle operations
//! - `RouteGuard`: gating of protected pages on the session status
//! - `TokenStore`: persistence of the session token (file, keychain, memory)
//! - `IdentityProvider`: token and credential verification (HTTP or local)
//!
//! A session starts unresolved, is restored once from the persisted token,
//! and afterwards moves between authenticated and unauthenticated through
//! login, registration and logout.

pub mod error;
pub mod guard;
pub mod identity;
pub mod local;
pub mod session;
pub mod storage;
pub mod validation;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{AuthError, ValidationError};
pub use guard::{GuardDecision, Navigator, Render, RouteGuard, SideEffect, DEFAULT_LOGIN_PATH};
pub use identity::{Grant, HttpIdentityProvider, IdentityProvider};
pub use local::LocalIdentityProvider;
pub use session::{Session, SessionStatus, SessionStore};
pub use storage::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, StorageError, TokenStore, TOKEN_KEY};

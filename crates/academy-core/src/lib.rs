//! Academy core library.
//!
//! Session lifecycle for the Academy learning platform: the session store
//! that owns authentication state, the route guard that gates protected
//! pages, token persistence, identity backends, and the thin REST client
//! shared by every front end.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError};
pub use auth::{
    AuthError, GuardDecision, IdentityProvider, Navigator, Render, RouteGuard, Session,
    SessionStatus, SessionStore, SideEffect, TokenStore, ValidationError,
};
pub use config::Config;
pub use models::{Role, User};

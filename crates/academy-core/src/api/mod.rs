//! REST API client module for the Academy backend.
//!
//! This module provides the `ApiClient` used by the HTTP identity backend
//! and by front ends fetching protected resources. Requests carry the
//! persisted bearer token; a 401 response clears it and notifies the
//! session so the route guard can send the user back to the login page.

pub mod client;
pub mod error;

pub use client::{ApiClient, DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
pub use error::ApiError;

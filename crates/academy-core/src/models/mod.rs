//! Data models shared across the session core.
//!
//! - `User`: the signed-in identity record
//! - `Role`: capability tier of a user

pub mod user;

pub use user::{Role, User};

//! API route modules.

pub mod accounts;
pub mod auth;
pub mod circles;
pub mod health;

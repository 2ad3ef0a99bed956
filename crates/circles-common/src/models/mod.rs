//! Core domain models shared across all Circles crates.
//!
//! These are the "truth" types: what the database stores and the API serializes.
//! Ids are SQLite integer row ids.

pub mod account;
pub mod circle;
pub mod role;

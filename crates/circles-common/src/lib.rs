//! # circles-common
//!
//! Shared types, configuration, error handling, and the permission primitives used across
//! all Circles crates. This is the foundation layer with no storage access, only primitives
//! and contracts.

pub mod circle_spec;
pub mod codec;
pub mod config;
pub mod error;
pub mod models;
pub mod permissions;
pub mod sqlite_row;
pub mod validation;

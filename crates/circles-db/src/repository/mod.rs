//! Repository layer: query functions organized by domain.

pub mod accounts;
pub mod circles;
pub mod members;
pub mod permissions;
pub mod provisioning;
pub mod roles;
pub mod sessions;

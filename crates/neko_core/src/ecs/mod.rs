//! # Entity Identifiers
//!
//! The component tables themselves live in the scene code; the kernel only
//! owns the key type so registries and native systems agree on it.

mod entity;

pub use entity::EntityId;

//! # NEKO Shared
//!
//! Plain value types used on both sides of the script/native bridge.
//!
//! ## RULE
//!
//! Nothing in here owns a resource. Everything is `Copy`, so it can be handed
//! to script, to native systems and to the render thread without ceremony.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{GameTime, TICK_DELTA, TICK_RATE};
pub use math::{Quat, Transform, Vec2, Vec3};

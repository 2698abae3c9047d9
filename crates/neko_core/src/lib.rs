//! # NEKO Core
//!
//! Kernel primitives shared by the engine subsystems:
//!
//! - [`EntityId`]: stable key used by native component tables and by the
//!   keyed script registries.
//! - [`RenderSyncChannel`]: the relay that carries "object created" and
//!   "object destroyed" events from the script thread to the render thread.
//!
//! ## Example
//!
//! ```rust,ignore
//! use neko_core::{RenderSyncChannel, FrameDrain};
//!
//! let channel = RenderSyncChannel::new();
//! channel.constructed(7u64);
//! channel.sync_from_scripting(); // end of tick
//!
//! let mut drain = FrameDrain::new(channel.clone());
//! let changes = drain.drain(); // once per render frame
//! assert_eq!(changes.created, &[7]);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ecs;
pub mod sync;

pub use ecs::EntityId;
pub use sync::{FrameChanges, FrameDrain, LifecycleLists, RenderSyncChannel, RenderSyncStats};

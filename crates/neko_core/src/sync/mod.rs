//! # Script -> Render Synchronization
//!
//! ## The Problem
//!
//! ```text
//! Thread 1 (Script):  creates / destroys render-visible objects mid-tick
//! Thread 2 (Render):  builds GPU-side state for those objects once per frame
//!
//! Render reading the script's lists directly: RACE CONDITION
//! Render seeing half a tick:                  TORN STATE
//! ```
//!
//! ## The Solution: Pending + Unconsumed Lists
//!
//! ```text
//! Tick N (script thread):
//!   constructed()/destructed() append to PENDING (script-local, never contended)
//!   end of tick: sync_from_scripting() appends PENDING onto UNCONSUMED (lock)
//!
//! Frame K (render thread):
//!   sync_from_renderer() swaps UNCONSUMED out (same lock)
//! ```
//!
//! One mutex guards both the append and the swap, so a tick's events are
//! either entirely visible to a frame or not at all.

mod render_sync;

pub use render_sync::{FrameChanges, FrameDrain, LifecycleLists, RenderSyncChannel, RenderSyncStats};

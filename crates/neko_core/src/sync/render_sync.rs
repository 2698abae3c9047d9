//! # Render Sync Channel
//!
//! Double-buffered relay of lifecycle events for one object kind.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌───────────────────────────────────┐
//!                 │        RenderSyncChannel<T>       │
//!                 │                                   │
//!                 │  ┌───────────┐   ┌─────────────┐  │
//!  constructed ──►│  │  pending  │──►│ unconsumed  │──┼──► sync_from_renderer
//!  destructed  ──►│  │ (per tick)│   │ (cumulative)│  │      (swap out)
//!                 │  └───────────┘   └─────────────┘  │
//!                 │        sync_from_scripting        │
//!                 └───────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Every event is delivered exactly once.
//! - FIFO within a category (created / destroyed).
//! - No ordering between categories: a renderer may see the destroy event of
//!   an object in the same batch as (or a later batch than) its create event.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// A pair of ordered event lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleLists<T> {
    /// Objects created, in creation order.
    pub created: Vec<T>,
    /// Objects destroyed, in destruction order.
    pub destroyed: Vec<T>,
}

impl<T> LifecycleLists<T> {
    /// Creates empty lists with `capacity` reserved in each.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            created: Vec::with_capacity(capacity),
            destroyed: Vec::with_capacity(capacity),
        }
    }

    /// Total number of events across both lists.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.created.len() + self.destroyed.len()
    }

    /// Returns true if both lists are empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.destroyed.is_empty()
    }

    /// Clears both lists, keeping capacity.
    pub fn clear(&mut self) {
        self.created.clear();
        self.destroyed.clear();
    }

    /// Moves all of `other`'s events onto the end of `self`, leaving `other` empty.
    fn append(&mut self, other: &mut Self) {
        self.created.append(&mut other.created);
        self.destroyed.append(&mut other.destroyed);
    }
}

impl<T> Default for LifecycleLists<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            destroyed: Vec::new(),
        }
    }
}

/// Snapshot of channel counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSyncStats {
    /// Number of `sync_from_scripting` calls so far.
    pub ticks_flushed: u64,
    /// Number of `sync_from_renderer` calls so far.
    pub frames_drained: u64,
    /// Events recorded this tick, not yet flushed.
    pub pending: usize,
    /// Events flushed, not yet drained by the renderer.
    pub unconsumed: usize,
}

/// Lifecycle relay from the script thread to the render thread.
///
/// The pending lists belong to the script thread: `constructed`,
/// `destructed` and `sync_from_scripting` are the only calls that lock them
/// while running, so recording never waits on the renderer. The render
/// thread only touches the unconsumed lists, which are guarded by their own
/// mutex. [`RenderSyncChannel::stats`] reads the pending size from a counter
/// and takes no pending lock.
///
/// ## Usage
///
/// ```rust,ignore
/// let channel = RenderSyncChannel::<MeshHandle>::new();
///
/// // Script thread, during the tick
/// channel.constructed(mesh.clone());
///
/// // Script thread, end of tick (exactly once)
/// channel.sync_from_scripting();
///
/// // Render thread, once per frame
/// let (mut created, mut destroyed) = (Vec::new(), Vec::new());
/// channel.sync_from_renderer(&mut created, &mut destroyed);
/// ```
pub struct RenderSyncChannel<T> {
    /// Events recorded during the current tick.
    pending: Mutex<LifecycleLists<T>>,
    /// Length of `pending`, readable without its lock.
    pending_len: AtomicUsize,
    /// Events flushed at tick boundaries, waiting for the renderer.
    unconsumed: Mutex<LifecycleLists<T>>,
    /// Tick flush counter.
    ticks_flushed: AtomicU64,
    /// Frame drain counter.
    frames_drained: AtomicU64,
}

impl<T> RenderSyncChannel<T> {
    /// Creates a new channel shared between the script and render threads.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_capacity(0)
    }

    /// Creates a new channel with `capacity` events reserved per list.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(LifecycleLists::with_capacity(capacity)),
            pending_len: AtomicUsize::new(0),
            unconsumed: Mutex::new(LifecycleLists::with_capacity(capacity)),
            ticks_flushed: AtomicU64::new(0),
            frames_drained: AtomicU64::new(0),
        })
    }

    /// Records that `item` was created during the current tick.
    ///
    /// Script thread only. O(1) amortized.
    #[inline]
    pub fn constructed(&self, item: T) {
        self.pending.lock().created.push(item);
        self.pending_len.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that `item` was destroyed during the current tick.
    ///
    /// Script thread only. O(1) amortized.
    #[inline]
    pub fn destructed(&self, item: T) {
        self.pending.lock().destroyed.push(item);
        self.pending_len.fetch_add(1, Ordering::Relaxed);
    }

    /// Publishes this tick's events to the renderer.
    ///
    /// Appends the pending lists onto the unconsumed lists under the shared
    /// lock, then leaves the pending lists empty. Call exactly once per tick,
    /// at the end of the tick.
    ///
    /// # Returns
    ///
    /// The number of events published.
    pub fn sync_from_scripting(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        {
            let mut unconsumed = self.unconsumed.lock();
            unconsumed.append(&mut pending);
        }
        self.pending_len.store(0, Ordering::Relaxed);
        self.ticks_flushed.fetch_add(1, Ordering::Relaxed);

        if count > 0 {
            tracing::trace!(events = count, "render sync: tick flushed");
        }
        count
    }

    /// Hands every published event to the renderer.
    ///
    /// The output vectors are cleared first and then swapped with the
    /// unconsumed lists, so the channel is left empty and keeps the caller's
    /// capacity for the next round. Empty outputs mean "no changes since the
    /// last frame". Call once per render frame.
    ///
    /// # Returns
    ///
    /// The number of events delivered.
    pub fn sync_from_renderer(&self, out_created: &mut Vec<T>, out_destroyed: &mut Vec<T>) -> usize {
        out_created.clear();
        out_destroyed.clear();
        {
            let mut unconsumed = self.unconsumed.lock();
            std::mem::swap(out_created, &mut unconsumed.created);
            std::mem::swap(out_destroyed, &mut unconsumed.destroyed);
        }
        self.frames_drained.fetch_add(1, Ordering::Relaxed);
        out_created.len() + out_destroyed.len()
    }

    /// Drops every pending and unconsumed event.
    ///
    /// Used at teardown, when the script thread has stopped ticking. This
    /// takes the pending lock, so calling it while the script thread is
    /// still recording makes the two threads contend.
    pub fn reset_from_renderer(&self) {
        let mut pending = self.pending.lock();
        let mut unconsumed = self.unconsumed.lock();
        let dropped = pending.len() + unconsumed.len();
        pending.clear();
        unconsumed.clear();
        self.pending_len.store(0, Ordering::Relaxed);
        if dropped > 0 {
            tracing::debug!(events = dropped, "render sync: reset discarded events");
        }
    }

    /// Returns the channel counters. Safe to call from the render thread.
    #[must_use]
    pub fn stats(&self) -> RenderSyncStats {
        let unconsumed = self.unconsumed.lock().len();
        RenderSyncStats {
            ticks_flushed: self.ticks_flushed.load(Ordering::Relaxed),
            frames_drained: self.frames_drained.load(Ordering::Relaxed),
            pending: self.pending_len.load(Ordering::Relaxed),
            unconsumed,
        }
    }
}

impl<T> std::fmt::Debug for RenderSyncChannel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSyncChannel")
            .field("stats", &self.stats())
            .finish()
    }
}

/// Renderer-side view of one frame's lifecycle changes.
#[derive(Debug)]
pub struct FrameChanges<'a, T> {
    /// Objects created since the previous frame, in creation order.
    pub created: &'a [T],
    /// Objects destroyed since the previous frame, in destruction order.
    pub destroyed: &'a [T],
}

impl<T> FrameChanges<'_, T> {
    /// Returns true if nothing changed since the previous frame.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.destroyed.is_empty()
    }
}

/// Render-thread helper that owns reusable output lists.
///
/// ## Usage
///
/// ```rust,ignore
/// let mut drain = FrameDrain::new(render_sync.meshes());
///
/// loop {
///     let changes = drain.drain();
///     for mesh in changes.created { upload(mesh); }
///     for mesh in changes.destroyed { release(mesh); }
/// }
/// ```
pub struct FrameDrain<T> {
    channel: Arc<RenderSyncChannel<T>>,
    created: Vec<T>,
    destroyed: Vec<T>,
}

impl<T> FrameDrain<T> {
    /// Creates a drain reading from `channel`.
    #[must_use]
    pub fn new(channel: Arc<RenderSyncChannel<T>>) -> Self {
        Self {
            channel,
            created: Vec::new(),
            destroyed: Vec::new(),
        }
    }

    /// Pulls everything published since the previous call.
    pub fn drain(&mut self) -> FrameChanges<'_, T> {
        self.channel
            .sync_from_renderer(&mut self.created, &mut self.destroyed);
        FrameChanges {
            created: &self.created,
            destroyed: &self.destroyed,
        }
    }

    /// The channel this drain reads from.
    #[must_use]
    pub fn channel(&self) -> &Arc<RenderSyncChannel<T>> {
        &self.channel
    }
}

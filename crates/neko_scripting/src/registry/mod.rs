//! # Object Registries
//!
//! Registries own the native side's view of every wrapper of one class:
//!
//! - [`ObjectRegistry`]: insertion-ordered pool, one entry per `create`
//! - [`KeyedObjectRegistry`]: at most one live wrapper per native key
//!
//! Both register the class template with the [`ProxyHeap`] on `initialize`,
//! announce render-relevant objects on their optional render sync channel,
//! and drop finalized wrappers on `purge`.

mod keyed;
mod pool;

use std::sync::Arc;

pub use keyed::KeyedObjectRegistry;
pub use pool::ObjectRegistry;

use crate::error::{ScriptingError, ScriptingResult};
use crate::runtime::{ClassId, ProxyHeap};
use crate::wrapped::{Handle, Payload, Wrapped};

/// Lifecycle operations shared by every registry, used by the context to
/// drive them in dependency order.
pub trait Registry: Send {
    /// Script class served by this registry.
    fn class_name(&self) -> &'static str;

    /// Registers the class template. Idempotent.
    fn initialize(&mut self) -> ClassId;

    /// Whether [`Registry::initialize`] ran.
    fn is_initialized(&self) -> bool;

    /// Drops wrappers the runtime finalized. Returns how many.
    fn purge(&mut self) -> usize;

    /// Invalidates and drops every wrapper. Returns how many.
    fn clear(&mut self) -> usize;

    /// Wrappers currently held.
    fn len(&self) -> usize;

    /// Whether the registry holds nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn require_class<T: Payload>(class: Option<ClassId>) -> ScriptingResult<ClassId> {
    class.ok_or(ScriptingError::PreconditionViolation {
        class: T::KIND.script_name(),
        reason: "registry used before initialize()",
    })
}

/// Builds a wrapper and its weak proxy slot.
fn manufacture<T: Payload>(heap: &Arc<ProxyHeap>, class: ClassId, payload: T) -> Handle<T> {
    let handle = Wrapped::new(heap.allocate_id(), heap, payload);
    heap.adopt(class, &handle);
    tracing::trace!(class = %T::KIND, proxy = %handle.id(), "wrapper created");
    handle
}

//! # Wrapped Objects
//!
//! A [`Wrapped<T>`] pairs one native payload with one script-visible proxy in
//! the [`ProxyHeap`]. Native holders share it through [`Handle<T>`]
//! (`Arc<Wrapped<T>>`); whether the *script side* keeps it alive is decided
//! by the counted references below.
//!
//! ## Reference counting
//!
//! ```text
//! refs: 0 ──add_ref──► 1 ──add_ref──► 2
//!        ◄───unref────   ◄───unref────
//! proxy: Weak            Strong        Strong
//! ```
//!
//! The proxy is strong exactly when `refs > 0`. The slot mode is flipped
//! while the wrapper's own lock is held (wrapper lock, then heap lock; the
//! heap never takes a wrapper lock while holding its own).
//!
//! Once the wrapper is deleted (destroyed by native code or finalized by the
//! runtime) every further operation fails with
//! [`ScriptingError::DanglingReference`].

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::config::ReclaimPolicy;
use crate::error::{ScriptingError, ScriptingResult};
use crate::runtime::{ProxyHeap, ProxyId, ProxyMode, Reclaimable};

/// Shared native handle to a wrapper.
pub type Handle<T> = Arc<Wrapped<T>>;

/// Every payload class the bridge exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WrappedKind {
    /// `vec2`
    Vector2,
    /// `vec3`
    Vector3,
    /// `quaternion`
    Quaternion,
    /// `mesh`
    Mesh,
    /// `text`
    Text,
    /// `entity`
    Entity,
    /// `transform`
    Transform,
    /// `camera`
    Camera,
}

impl WrappedKind {
    /// Constructor name seen by script.
    #[must_use]
    pub const fn script_name(self) -> &'static str {
        match self {
            Self::Vector2 => "vec2",
            Self::Vector3 => "vec3",
            Self::Quaternion => "quaternion",
            Self::Mesh => "mesh",
            Self::Text => "text",
            Self::Entity => "entity",
            Self::Transform => "transform",
            Self::Camera => "camera",
        }
    }

    /// Looks a kind up by constructor name.
    #[must_use]
    pub fn from_script_name(name: &str) -> Option<Self> {
        Some(match name {
            "vec2" => Self::Vector2,
            "vec3" => Self::Vector3,
            "quaternion" => Self::Quaternion,
            "mesh" => Self::Mesh,
            "text" => Self::Text,
            "entity" => Self::Entity,
            "transform" => Self::Transform,
            "camera" => Self::Camera,
            _ => return None,
        })
    }
}

impl fmt::Display for WrappedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.script_name())
    }
}

/// Native data that can live behind a proxy.
pub trait Payload: Sized + Send + 'static {
    /// Class this payload is exposed as.
    const KIND: WrappedKind;

    /// Bytes reported to the runtime as external memory.
    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>()
    }

    /// Drops owned sub-resources. Called exactly once, when the wrapper is
    /// deleted.
    fn release(&mut self) {}

    /// `toString()` as seen by script.
    fn describe(&self) -> String;
}

struct WrapState<T> {
    payload: T,
    refs: u32,
    deleted: bool,
    dirty: bool,
}

/// One payload plus its proxy bookkeeping.
pub struct Wrapped<T: Payload> {
    id: ProxyId,
    heap: Weak<ProxyHeap>,
    state: Mutex<WrapState<T>>,
}

impl<T: Payload> Wrapped<T> {
    pub(crate) fn new(id: ProxyId, heap: &Arc<ProxyHeap>, payload: T) -> Handle<T> {
        Arc::new(Self {
            id,
            heap: Arc::downgrade(heap),
            state: Mutex::new(WrapState {
                payload,
                refs: 0,
                deleted: false,
                dirty: true,
            }),
        })
    }

    /// Proxy identity.
    #[must_use]
    pub fn id(&self) -> ProxyId {
        self.id
    }

    /// Class of the payload.
    #[must_use]
    pub fn kind(&self) -> WrappedKind {
        T::KIND
    }

    /// Counts a reference held by script. The first one pins the proxy.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::DanglingReference`] if the wrapper is deleted.
    pub fn add_ref(&self) -> ScriptingResult<u32> {
        let mut state = self.state.lock();
        if state.deleted {
            drop(state);
            return Err(self.dangling("add_ref"));
        }
        state.refs += 1;
        // flipped under the state lock so mode and count never disagree
        if state.refs == 1 {
            self.set_proxy_mode(ProxyMode::Strong);
        }
        Ok(state.refs)
    }

    /// Drops a counted reference. The last one makes the proxy weak again
    /// (and reclaims it on the spot under [`ReclaimPolicy::Immediate`]).
    ///
    /// # Errors
    ///
    /// [`ScriptingError::DanglingReference`] if the wrapper is deleted or the
    /// count is already zero.
    pub fn unref(&self) -> ScriptingResult<u32> {
        let refs = {
            let mut state = self.state.lock();
            if state.deleted || state.refs == 0 {
                drop(state);
                return Err(self.dangling("unref"));
            }
            state.refs -= 1;
            if state.refs == 0 {
                self.set_proxy_mode(ProxyMode::Weak);
            }
            state.refs
        };
        // reclaiming finalizes this wrapper, so the state lock must be gone
        if refs == 0 {
            if let Some(heap) = self.heap.upgrade() {
                if heap.policy() == ReclaimPolicy::Immediate {
                    heap.reclaim(self.id);
                }
            }
        }
        Ok(refs)
    }

    /// Current counted references.
    #[must_use]
    pub fn ref_count(&self) -> u32 {
        self.state.lock().refs
    }

    /// Mode of the proxy slot, `None` once the runtime dropped it.
    #[must_use]
    pub fn proxy_mode(&self) -> Option<ProxyMode> {
        self.heap.upgrade().and_then(|heap| heap.mode(self.id))
    }

    /// Whether the proxy is pinned.
    #[must_use]
    pub fn is_strong(&self) -> bool {
        self.proxy_mode() == Some(ProxyMode::Strong)
    }

    /// Whether the wrapper was destroyed or finalized.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.state.lock().deleted
    }

    /// Whether the payload changed since the last [`Wrapped::mark_clean`].
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Flags the payload as changed.
    pub fn mark_dirty(&self) {
        self.state.lock().dirty = true;
    }

    /// Clears the change flag.
    pub fn mark_clean(&self) {
        self.state.lock().dirty = false;
    }

    /// Reads the payload. The closure must not call back into this wrapper.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::DanglingReference`] if the wrapper is deleted.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> ScriptingResult<R> {
        let state = self.state.lock();
        if state.deleted {
            drop(state);
            return Err(self.dangling("read"));
        }
        Ok(f(&state.payload))
    }

    /// Mutates the payload and marks it dirty.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::DanglingReference`] if the wrapper is deleted.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> ScriptingResult<R> {
        let mut state = self.state.lock();
        if state.deleted {
            drop(state);
            return Err(self.dangling("write"));
        }
        state.dirty = true;
        Ok(f(&mut state.payload))
    }

    /// Explicit native destroy: releases the payload and demotes the proxy.
    /// Returns false if the wrapper was already deleted.
    pub fn destroy(&self) -> bool {
        let destroyed = self.invalidate();
        if destroyed {
            self.set_proxy_mode(ProxyMode::Weak);
            tracing::trace!(class = %T::KIND, proxy = %self.id, "wrapper destroyed");
        }
        destroyed
    }

    fn invalidate(&self) -> bool {
        let mut state = self.state.lock();
        if state.deleted {
            return false;
        }
        state.deleted = true;
        state.refs = 0;
        state.payload.release();
        true
    }

    fn set_proxy_mode(&self, mode: ProxyMode) {
        if let Some(heap) = self.heap.upgrade() {
            heap.set_mode(self.id, mode);
        }
    }

    fn dangling(&self, operation: &'static str) -> ScriptingError {
        tracing::error!(class = %T::KIND, proxy = %self.id, operation, "dangling reference");
        ScriptingError::DanglingReference {
            class: T::KIND.script_name(),
            id: self.id,
            operation,
        }
    }
}

impl<T: Payload> Reclaimable for Wrapped<T> {
    fn finalize(&self) -> bool {
        self.invalidate()
    }
}

impl<T: Payload> fmt::Debug for Wrapped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Wrapped")
            .field("class", &T::KIND)
            .field("id", &self.id)
            .field("refs", &state.refs)
            .field("deleted", &state.deleted)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::Vector3;
    use crate::registry::{ObjectRegistry, Registry};
    use neko_shared::Vec3;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts how often its sub-resources were released.
    struct Tracked {
        releases: Arc<AtomicUsize>,
    }

    impl Payload for Tracked {
        const KIND: WrappedKind = WrappedKind::Text;

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "tracked".to_owned()
        }
    }

    fn tracked() -> (Arc<ProxyHeap>, Handle<Tracked>, Arc<AtomicUsize>) {
        let heap = ProxyHeap::new(ReclaimPolicy::Collector);
        let mut reg = ObjectRegistry::new(heap.clone());
        reg.initialize();
        let releases = Arc::new(AtomicUsize::new(0));
        let handle = reg
            .create(Tracked {
                releases: releases.clone(),
            })
            .unwrap();
        (heap, handle, releases)
    }

    fn vec3_registry(policy: ReclaimPolicy) -> (Arc<ProxyHeap>, ObjectRegistry<Vector3>) {
        let heap = ProxyHeap::new(policy);
        let mut reg = ObjectRegistry::new(heap.clone());
        reg.initialize();
        (heap, reg)
    }

    #[test]
    fn test_strong_iff_counted() {
        let (_heap, mut reg) = vec3_registry(ReclaimPolicy::Collector);
        let v = reg.create_from(Vec3::ONE).unwrap();
        assert!(!v.is_strong());

        for step in [1u32, 2, 3] {
            assert_eq!(v.add_ref().unwrap(), step);
            assert!(v.is_strong());
        }
        assert_eq!(v.unref().unwrap(), 2);
        assert!(v.is_strong());
        assert_eq!(v.unref().unwrap(), 1);
        assert!(v.is_strong());
        assert_eq!(v.unref().unwrap(), 0);
        assert!(!v.is_strong());
        assert_eq!(v.proxy_mode(), Some(ProxyMode::Weak));
    }

    #[test]
    fn test_unref_at_zero_is_dangling() {
        let (_heap, mut reg) = vec3_registry(ReclaimPolicy::Collector);
        let v = reg.create_from(Vec3::ONE).unwrap();
        let err = v.unref().unwrap_err();
        assert!(matches!(err, ScriptingError::DanglingReference { operation: "unref", .. }));
        assert_eq!(v.ref_count(), 0);
    }

    #[test]
    fn test_immediate_policy_reclaims_on_last_unref() {
        let (heap, mut reg) = vec3_registry(ReclaimPolicy::Immediate);
        let v = reg.create_from(Vec3::ONE).unwrap();
        v.add_ref().unwrap();
        v.unref().unwrap();

        assert!(v.is_deleted());
        assert!(!heap.contains(v.id()));
        assert_eq!(v.proxy_mode(), None);
    }

    #[test]
    fn test_deleted_wrapper_rejects_everything() {
        let (_heap, mut reg) = vec3_registry(ReclaimPolicy::Collector);
        let v = reg.create_from(Vec3::ONE).unwrap();
        v.add_ref().unwrap();
        assert!(v.destroy());
        assert!(!v.destroy());

        assert!(v.read(|p| p.value).is_err());
        assert!(v.write(|p| p.value = Vec3::ZERO).is_err());
        assert!(v.add_ref().is_err());
        assert!(v.unref().is_err());
        assert!(!v.is_strong());
    }

    #[test]
    fn test_finalize_releases_once() {
        let (_heap, handle, releases) = tracked();
        assert!(handle.finalize());
        assert!(!handle.finalize());
        assert!(handle.is_deleted());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_collect_after_destroy_does_not_release_again() {
        let (heap, handle, releases) = tracked();
        assert!(handle.destroy());
        assert_eq!(heap.mode(handle.id()), Some(ProxyMode::Weak));

        assert_eq!(heap.collect(), 1);
        assert!(handle.is_deleted());
        assert!(!heap.contains(handle.id()));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_refs_keep_mode_in_step() {
        let (_heap, mut reg) = vec3_registry(ReclaimPolicy::Collector);
        let v = reg.create_from(Vec3::ONE).unwrap();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..2_000 {
                        v.add_ref().unwrap();
                        // our own reference is still counted here
                        assert!(v.is_strong());
                        v.unref().unwrap();
                    }
                });
            }
        });

        assert_eq!(v.ref_count(), 0);
        assert_eq!(v.proxy_mode(), Some(ProxyMode::Weak));
        assert!(!v.is_deleted());
    }

    #[test]
    fn test_write_marks_dirty() {
        let (_heap, mut reg) = vec3_registry(ReclaimPolicy::Collector);
        let v = reg.create_from(Vec3::ONE).unwrap();
        v.mark_clean();
        assert!(!v.is_dirty());
        v.read(|p| p.value).unwrap();
        assert!(!v.is_dirty());
        v.write(|p| p.value.x = 4.0).unwrap();
        assert!(v.is_dirty());
    }
}

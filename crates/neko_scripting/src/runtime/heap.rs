//! # Proxy Heap
//!
//! The runtime side of the bridge: every wrapper has exactly one proxy slot
//! here, and the slot decides whether the runtime keeps the object alive.
//!
//! ## Proxy modes
//!
//! - **Strong**: at least one holder counted a reference. Never reclaimed.
//! - **Weak**: nobody holds a counted reference. The next collection pass
//!   (or the unref itself, under [`ReclaimPolicy::Immediate`]) finalizes the
//!   wrapper and drops the slot.
//!
//! ## Lock discipline
//!
//! The heap never calls into a wrapper while holding its own lock. Slots are
//! taken out first and finalized afterwards, so a finalizer is free to call
//! back into the heap (a transform releasing its member vectors does).

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ReclaimPolicy;
use crate::wrapped::{Handle, Payload, Wrapped, WrappedKind};

/// Identity of a script-visible proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProxyId(u64);

impl ProxyId {
    /// Rebuilds an id from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProxyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity of a registered class template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClassId(u32);

/// Script-visible class description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClassTemplate {
    /// Constructor name in script.
    pub name: &'static str,
    /// Payload kind behind the class.
    pub kind: WrappedKind,
}

impl ClassTemplate {
    /// Template for a payload type.
    #[must_use]
    pub const fn of<T: Payload>() -> Self {
        Self {
            name: T::KIND.script_name(),
            kind: T::KIND,
        }
    }
}

/// Whether the runtime may reclaim a proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProxyMode {
    /// Pinned by at least one counted reference.
    Strong,
    /// Collectable.
    Weak,
}

/// Finalization hook the heap holds for each slot.
pub(crate) trait Reclaimable: Send + Sync {
    /// Invalidates the wrapper. Returns false if it was already deleted.
    fn finalize(&self) -> bool;
}

struct ProxySlot {
    class: ClassId,
    mode: ProxyMode,
    bytes: usize,
    object: Arc<dyn Any + Send + Sync>,
    finalizer: Arc<dyn Reclaimable>,
}

/// Object table of the script runtime.
pub struct ProxyHeap {
    policy: ReclaimPolicy,
    templates: Mutex<Vec<ClassTemplate>>,
    slots: Mutex<BTreeMap<ProxyId, ProxySlot>>,
    next_id: AtomicU64,
    external_bytes: AtomicUsize,
    reclaimed_total: AtomicU64,
}

impl ProxyHeap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new(policy: ReclaimPolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            templates: Mutex::new(Vec::new()),
            slots: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            external_bytes: AtomicUsize::new(0),
            reclaimed_total: AtomicU64::new(0),
        })
    }

    /// Reclaim policy of this heap.
    #[must_use]
    pub fn policy(&self) -> ReclaimPolicy {
        self.policy
    }

    /// Registers a class template. Registering a name twice returns the
    /// first id.
    pub fn register_template(&self, template: ClassTemplate) -> ClassId {
        let mut templates = self.templates.lock();
        if let Some(index) = templates.iter().position(|t| t.name == template.name) {
            if templates[index].kind != template.kind {
                tracing::warn!(
                    name = template.name,
                    "class template re-registered with a different kind, keeping the first"
                );
            }
            return ClassId(index as u32);
        }
        templates.push(template);
        tracing::debug!(name = template.name, "class template registered");
        ClassId((templates.len() - 1) as u32)
    }

    /// Looks up a registered template.
    #[must_use]
    pub fn template(&self, class: ClassId) -> Option<ClassTemplate> {
        self.templates.lock().get(class.0 as usize).copied()
    }

    pub(crate) fn allocate_id(&self) -> ProxyId {
        ProxyId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates the proxy slot for a freshly built wrapper. Starts weak.
    pub(crate) fn adopt<T: Payload>(&self, class: ClassId, handle: &Handle<T>) {
        let bytes = handle.read(|payload| payload.estimate_size()).unwrap_or_default();
        let object: Arc<dyn Any + Send + Sync> = handle.clone();
        let finalizer: Arc<dyn Reclaimable> = handle.clone();
        self.slots.lock().insert(
            handle.id(),
            ProxySlot {
                class,
                mode: ProxyMode::Weak,
                bytes,
                object,
                finalizer,
            },
        );
        self.external_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Flips a proxy between strong and weak. False if the slot is gone.
    pub(crate) fn set_mode(&self, id: ProxyId, mode: ProxyMode) -> bool {
        match self.slots.lock().get_mut(&id) {
            Some(slot) => {
                slot.mode = mode;
                true
            }
            None => false,
        }
    }

    /// Current mode of a proxy, `None` once it has been reclaimed.
    #[must_use]
    pub fn mode(&self, id: ProxyId) -> Option<ProxyMode> {
        self.slots.lock().get(&id).map(|slot| slot.mode)
    }

    /// Whether a proxy slot still exists.
    #[must_use]
    pub fn contains(&self, id: ProxyId) -> bool {
        self.slots.lock().contains_key(&id)
    }

    /// Number of live proxy slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether the heap holds no proxies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Number of strong proxies.
    #[must_use]
    pub fn strong_count(&self) -> usize {
        self.slots
            .lock()
            .values()
            .filter(|slot| slot.mode == ProxyMode::Strong)
            .count()
    }

    /// Payload bytes reported to the runtime for live proxies.
    #[must_use]
    pub fn external_memory(&self) -> usize {
        self.external_bytes.load(Ordering::Relaxed)
    }

    /// Total proxies reclaimed over the heap's lifetime.
    ///
    /// Only ever grows. Contexts sharing the heap each remember the value
    /// they last purged against, so any change means some registry may hold
    /// finalized wrappers.
    #[must_use]
    pub fn reclaimed_total(&self) -> u64 {
        self.reclaimed_total.load(Ordering::Relaxed)
    }

    /// Class of a live proxy.
    #[must_use]
    pub fn kind_of(&self, id: ProxyId) -> Option<WrappedKind> {
        let class = self.slots.lock().get(&id).map(|slot| slot.class)?;
        self.template(class).map(|t| t.kind)
    }

    /// Typed wrapper behind a live proxy. `None` if the proxy was reclaimed
    /// or wraps a different payload type.
    #[must_use]
    pub fn resolve<T: Payload>(&self, id: ProxyId) -> Option<Handle<T>> {
        let object = self.slots.lock().get(&id).map(|slot| slot.object.clone())?;
        object.downcast::<Wrapped<T>>().ok()
    }

    /// Collection pass: finalizes and drops every weak proxy.
    ///
    /// Returns the number of proxies reclaimed.
    pub fn collect(&self) -> usize {
        let taken: Vec<(ProxyId, ProxySlot)> = {
            let mut slots = self.slots.lock();
            let weak: Vec<ProxyId> = slots
                .iter()
                .filter(|(_, slot)| slot.mode == ProxyMode::Weak)
                .map(|(id, _)| *id)
                .collect();
            weak.into_iter()
                .filter_map(|id| slots.remove(&id).map(|slot| (id, slot)))
                .collect()
        };

        let count = taken.len();
        for (id, slot) in taken {
            self.finish(id, &slot);
        }
        if count > 0 {
            tracing::debug!(reclaimed = count, live = self.len(), "collection pass");
        }
        count
    }

    /// Reclaims one weak proxy right away. Strong proxies are left alone.
    pub fn reclaim(&self, id: ProxyId) -> bool {
        let slot = {
            let mut slots = self.slots.lock();
            match slots.get(&id) {
                Some(slot) if slot.mode == ProxyMode::Weak => slots.remove(&id),
                _ => None,
            }
        };
        match slot {
            Some(slot) => {
                self.finish(id, &slot);
                true
            }
            None => false,
        }
    }

    /// Drops every proxy regardless of mode. Used at context teardown.
    pub fn clear(&self) -> usize {
        let taken = std::mem::take(&mut *self.slots.lock());
        let count = taken.len();
        for (id, slot) in &taken {
            self.finish(*id, slot);
        }
        count
    }

    fn finish(&self, id: ProxyId, slot: &ProxySlot) {
        if slot.finalizer.finalize() {
            tracing::trace!(proxy = %id, "proxy finalized");
        }
        self.external_bytes.fetch_sub(slot.bytes, Ordering::Relaxed);
        self.reclaimed_total.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for ProxyHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHeap")
            .field("policy", &self.policy)
            .field("live", &self.len())
            .field("external_bytes", &self.external_memory())
            .finish_non_exhaustive()
    }
}

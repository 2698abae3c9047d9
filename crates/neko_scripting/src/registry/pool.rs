//! Insertion-ordered pool of wrappers.

use std::sync::Arc;

use neko_core::RenderSyncChannel;

use super::{manufacture, require_class, Registry};
use crate::error::ScriptingResult;
use crate::runtime::{ClassId, ClassTemplate, ProxyHeap, ProxyId};
use crate::wrapped::{Handle, Payload};

/// Pool registry: every `create` adds one wrapper.
pub struct ObjectRegistry<T: Payload> {
    heap: Arc<ProxyHeap>,
    class: Option<ClassId>,
    pool: Vec<Handle<T>>,
    render_sync: Option<Arc<RenderSyncChannel<Handle<T>>>>,
}

impl<T: Payload> ObjectRegistry<T> {
    /// Registry without render announcements.
    #[must_use]
    pub fn new(heap: Arc<ProxyHeap>) -> Self {
        Self {
            heap,
            class: None,
            pool: Vec::new(),
            render_sync: None,
        }
    }

    /// Registry that announces creation and destruction to the renderer.
    #[must_use]
    pub fn with_render_sync(heap: Arc<ProxyHeap>, channel: Arc<RenderSyncChannel<Handle<T>>>) -> Self {
        Self {
            render_sync: Some(channel),
            ..Self::new(heap)
        }
    }

    /// Wraps a payload built on the script side.
    ///
    /// # Errors
    ///
    /// [`ScriptingError::PreconditionViolation`](crate::ScriptingError) if
    /// the registry is not initialized.
    pub fn create(&mut self, payload: T) -> ScriptingResult<Handle<T>> {
        let class = require_class::<T>(self.class)?;
        let handle = manufacture(&self.heap, class, payload);
        self.pool.push(handle.clone());
        if let Some(channel) = &self.render_sync {
            channel.constructed(handle.clone());
        }
        Ok(handle)
    }

    /// Wraps native data. The native value is moved in, so the caller's
    /// copy is gone (use `std::mem::take` to leave an empty one behind).
    ///
    /// # Errors
    ///
    /// Same as [`ObjectRegistry::create`].
    pub fn create_from<N>(&mut self, native: N) -> ScriptingResult<Handle<T>>
    where
        T: From<N>,
    {
        require_class::<T>(self.class)?;
        self.create(T::from(native))
    }

    /// Explicitly destroys a wrapper: invalidates it, removes it from the
    /// pool and announces it. False if the pool does not hold it.
    pub fn destroy(&mut self, handle: &Handle<T>) -> bool {
        let Some(index) = self.pool.iter().position(|h| Arc::ptr_eq(h, handle)) else {
            return false;
        };
        let handle = self.pool.remove(index);
        handle.destroy();
        if let Some(channel) = &self.render_sync {
            channel.destructed(handle);
        }
        true
    }

    /// Finds a wrapper by proxy id.
    #[must_use]
    pub fn get(&self, id: ProxyId) -> Option<&Handle<T>> {
        self.pool.iter().find(|h| h.id() == id)
    }

    /// Whether the pool holds this exact wrapper.
    #[must_use]
    pub fn contains(&self, handle: &Handle<T>) -> bool {
        self.pool.iter().any(|h| Arc::ptr_eq(h, handle))
    }

    /// Wrappers in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &Handle<T>> {
        self.pool.iter()
    }

    /// Template id, once initialized.
    #[must_use]
    pub fn class(&self) -> Option<ClassId> {
        self.class
    }
}

impl<T: Payload> Registry for ObjectRegistry<T> {
    fn class_name(&self) -> &'static str {
        T::KIND.script_name()
    }

    fn initialize(&mut self) -> ClassId {
        if let Some(class) = self.class {
            return class;
        }
        let class = self.heap.register_template(ClassTemplate::of::<T>());
        self.class = Some(class);
        class
    }

    fn is_initialized(&self) -> bool {
        self.class.is_some()
    }

    fn purge(&mut self) -> usize {
        let (dead, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pool)
            .into_iter()
            .partition(|h| h.is_deleted());
        self.pool = live;
        let purged = dead.len();
        if let Some(channel) = &self.render_sync {
            for handle in dead {
                channel.destructed(handle);
            }
        }
        if purged > 0 {
            tracing::debug!(class = T::KIND.script_name(), purged, "registry purged");
        }
        purged
    }

    fn clear(&mut self) -> usize {
        let count = self.pool.len();
        for handle in self.pool.drain(..) {
            handle.destroy();
        }
        count
    }

    fn len(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReclaimPolicy;
    use crate::error::ScriptingError;
    use crate::objects::{DynamicMesh, MeshData, Vector3};
    use neko_core::FrameDrain;
    use neko_shared::{Vec2, Vec3};

    #[test]
    fn test_create_before_initialize_fails() {
        let heap = ProxyHeap::new(ReclaimPolicy::Collector);
        let mut reg = ObjectRegistry::<Vector3>::new(heap.clone());
        let err = reg.create_from(Vec3::ONE).unwrap_err();
        assert!(matches!(err, ScriptingError::PreconditionViolation { class: "vec3", .. }));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_initialize_twice_keeps_class() {
        let heap = ProxyHeap::new(ReclaimPolicy::Collector);
        let mut reg = ObjectRegistry::<Vector3>::new(heap);
        let first = reg.initialize();
        assert_eq!(reg.initialize(), first);
    }

    #[test]
    fn test_pool_keeps_creation_order() {
        let heap = ProxyHeap::new(ReclaimPolicy::Collector);
        let mut reg = ObjectRegistry::<Vector3>::new(heap);
        reg.initialize();
        let a = reg.create_from(Vec3::X).unwrap();
        let b = reg.create_from(Vec3::Y).unwrap();
        let c = reg.create_from(Vec3::Z).unwrap();

        assert!(reg.destroy(&b));
        assert!(!reg.destroy(&b));
        let order: Vec<_> = reg.iter().map(|h| h.id()).collect();
        assert_eq!(order, vec![a.id(), c.id()]);
    }

    #[test]
    fn test_purge_announces_finalized_once() {
        let heap = ProxyHeap::new(ReclaimPolicy::Collector);
        let channel = RenderSyncChannel::new();
        let mut drain = FrameDrain::new(channel.clone());
        let mut reg = ObjectRegistry::<DynamicMesh>::with_render_sync(heap.clone(), channel.clone());
        reg.initialize();

        let kept = reg.create_from(MeshData::plane(Vec2::new(1.0, 1.0), (1, 1), Vec3::Y)).unwrap();
        kept.add_ref().unwrap();
        let lost = reg.create(DynamicMesh::default()).unwrap();

        assert_eq!(heap.collect(), 1);
        assert_eq!(reg.purge(), 1);
        assert_eq!(reg.purge(), 0);
        assert_eq!(reg.len(), 1);

        channel.sync_from_scripting();
        let frame = drain.drain();
        assert_eq!(frame.created.len(), 2);
        assert_eq!(frame.destroyed.len(), 1);
        assert!(Arc::ptr_eq(&frame.destroyed[0], &lost));
    }

    #[test]
    fn test_clear_invalidates_without_events() {
        let heap = ProxyHeap::new(ReclaimPolicy::Collector);
        let channel = RenderSyncChannel::new();
        let mut reg = ObjectRegistry::<DynamicMesh>::with_render_sync(heap, channel.clone());
        reg.initialize();
        let mesh = reg.create(DynamicMesh::default()).unwrap();
        mesh.add_ref().unwrap();

        assert_eq!(reg.clear(), 1);
        assert!(reg.is_empty());
        assert!(mesh.is_deleted());
        assert_eq!(channel.stats().pending, 1); // only the creation
    }
}

//! Every registry a context owns, plus the render sync channels they feed.

use std::sync::Arc;

use neko_core::{EntityId, RenderSyncChannel, RenderSyncStats};
use neko_shared::Transform;

use crate::error::ScriptingResult;
use crate::objects::{
    CameraComponent, DynamicMesh, EntityObject, Quaternion, Text, TransformComponent, Vector2, Vector3,
};
use crate::registry::{KeyedObjectRegistry, ObjectRegistry, Registry};
use crate::runtime::ProxyHeap;
use crate::wrapped::Handle;

/// Mesh handle as the renderer sees it.
pub type MeshHandle = Handle<DynamicMesh>;
/// Text handle as the renderer sees it.
pub type TextHandle = Handle<Text>;

/// Render-relevant lifecycle channels. Cheap to clone; hand one to the
/// render thread.
#[derive(Clone, Debug)]
pub struct RenderSync {
    meshes: Arc<RenderSyncChannel<MeshHandle>>,
    texts: Arc<RenderSyncChannel<TextHandle>>,
}

impl RenderSync {
    /// Channels with `capacity` events reserved per list.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            meshes: RenderSyncChannel::with_capacity(capacity),
            texts: RenderSyncChannel::with_capacity(capacity),
        }
    }

    /// Mesh channel.
    #[must_use]
    pub fn meshes(&self) -> &Arc<RenderSyncChannel<MeshHandle>> {
        &self.meshes
    }

    /// Text channel.
    #[must_use]
    pub fn texts(&self) -> &Arc<RenderSyncChannel<TextHandle>> {
        &self.texts
    }

    /// End-of-tick flush of both channels. Returns events flushed.
    pub fn sync_from_scripting(&self) -> usize {
        self.meshes.sync_from_scripting() + self.texts.sync_from_scripting()
    }

    /// Drops everything in flight on both channels.
    pub fn reset_from_renderer(&self) {
        self.meshes.reset_from_renderer();
        self.texts.reset_from_renderer();
    }

    /// Counters of the mesh and text channels.
    #[must_use]
    pub fn stats(&self) -> (RenderSyncStats, RenderSyncStats) {
        (self.meshes.stats(), self.texts.stats())
    }
}

/// All registries of one context.
pub struct ScriptRegistries {
    heap: Arc<ProxyHeap>,
    /// `vec2` pool
    pub vec2: ObjectRegistry<Vector2>,
    /// `vec3` pool
    pub vec3: ObjectRegistry<Vector3>,
    /// `quaternion` pool
    pub quaternion: ObjectRegistry<Quaternion>,
    /// `mesh` pool, announced to the renderer
    pub mesh: ObjectRegistry<DynamicMesh>,
    /// `text` pool, announced to the renderer
    pub text: ObjectRegistry<Text>,
    /// `entity` wrappers by entity id
    pub entities: KeyedObjectRegistry<EntityId, EntityObject>,
    /// `transform` components by entity id
    pub transforms: KeyedObjectRegistry<EntityId, TransformComponent>,
    /// `camera` components by entity id
    pub cameras: KeyedObjectRegistry<EntityId, CameraComponent>,
}

impl ScriptRegistries {
    /// Fresh, uninitialized registries on `heap`.
    #[must_use]
    pub fn new(heap: Arc<ProxyHeap>, render_sync: &RenderSync) -> Self {
        Self {
            vec2: ObjectRegistry::new(heap.clone()),
            vec3: ObjectRegistry::new(heap.clone()),
            quaternion: ObjectRegistry::new(heap.clone()),
            mesh: ObjectRegistry::with_render_sync(heap.clone(), render_sync.meshes.clone()),
            text: ObjectRegistry::with_render_sync(heap.clone(), render_sync.texts.clone()),
            entities: KeyedObjectRegistry::new(heap.clone()),
            transforms: KeyedObjectRegistry::new(heap.clone()),
            cameras: KeyedObjectRegistry::new(heap.clone()),
            heap,
        }
    }

    /// Heap the registries manufacture into.
    #[must_use]
    pub fn heap(&self) -> &Arc<ProxyHeap> {
        &self.heap
    }

    /// Registers every class template. Returns the number of classes.
    pub fn initialize_all(&mut self) -> usize {
        // leaves before the classes that hold them
        let order: [&mut dyn Registry; 8] = [
            &mut self.vec2,
            &mut self.vec3,
            &mut self.quaternion,
            &mut self.text,
            &mut self.mesh,
            &mut self.entities,
            &mut self.transforms,
            &mut self.cameras,
        ];
        let count = order.len();
        for registry in order {
            registry.initialize();
        }
        count
    }

    /// Purges finalized wrappers everywhere. Returns how many.
    pub fn purge_all(&mut self) -> usize {
        self.teardown_order().into_iter().map(|r| r.purge()).sum()
    }

    /// Invalidates and drops every wrapper, most dependent class first.
    pub fn clear_all(&mut self) -> usize {
        let mut cleared = 0;
        for registry in self.teardown_order() {
            let count = registry.clear();
            if count > 0 {
                tracing::debug!(class = registry.class_name(), count, "registry cleared");
            }
            cleared += count;
        }
        cleared
    }

    /// Total wrappers held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vec2.len()
            + self.vec3.len()
            + self.quaternion.len()
            + self.mesh.len()
            + self.text.len()
            + self.entities.len()
            + self.transforms.len()
            + self.cameras.len()
    }

    /// Whether no registry holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Transform component for `entity`, creating it (and its member
    /// vectors) from `initial` if the entity has none yet.
    ///
    /// # Errors
    ///
    /// `PreconditionViolation` before `initialize_all`.
    pub fn transform_component(
        &mut self,
        entity: EntityId,
        initial: Transform,
    ) -> ScriptingResult<Handle<TransformComponent>> {
        let vec3 = &mut self.vec3;
        let quaternion = &mut self.quaternion;
        self.transforms.get_or_create_with(entity, || {
            TransformComponent::new(
                vec3.create_from(initial.translate)?,
                quaternion.create_from(initial.rotate)?,
                vec3.create_from(initial.scale)?,
            )
        })
    }

    /// Entity wrapper for `entity`.
    ///
    /// # Errors
    ///
    /// `PreconditionViolation` before `initialize_all`.
    pub fn entity(&mut self, entity: EntityId) -> ScriptingResult<Handle<EntityObject>> {
        self.entities.create_from(entity, entity)
    }

    fn teardown_order(&mut self) -> [&mut dyn Registry; 8] {
        [
            &mut self.transforms,
            &mut self.cameras,
            &mut self.entities,
            &mut self.text,
            &mut self.mesh,
            &mut self.quaternion,
            &mut self.vec3,
            &mut self.vec2,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReclaimPolicy;
    use neko_shared::Vec3;

    fn registries() -> (Arc<ProxyHeap>, ScriptRegistries) {
        let heap = ProxyHeap::new(ReclaimPolicy::Collector);
        let mut regs = ScriptRegistries::new(heap.clone(), &RenderSync::new(16));
        regs.initialize_all();
        (heap, regs)
    }

    #[test]
    fn test_transform_component_created_once() {
        let (_heap, mut regs) = registries();
        let entity = EntityId::new(7, 0);
        let initial = Transform::new(Vec3::X, Default::default(), Vec3::ONE);

        let a = regs.transform_component(entity, initial).unwrap();
        let b = regs.transform_component(entity, Transform::IDENTITY).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(regs.vec3.len(), 2);
        assert_eq!(regs.quaternion.len(), 1);
        assert_eq!(a.read(|c| c.resolve()).unwrap().unwrap().translate, Vec3::X);
    }

    #[test]
    fn test_clear_all_releases_members_first() {
        let (heap, mut regs) = registries();
        let component = regs.transform_component(EntityId::new(1, 0), Transform::IDENTITY).unwrap();
        component.add_ref().unwrap();
        let translate = component.read(|c| c.translate().clone()).unwrap();

        assert_eq!(regs.clear_all(), 4);
        assert!(component.is_deleted());
        assert!(translate.is_deleted());
        assert!(regs.is_empty());
        assert_eq!(heap.strong_count(), 0);
    }

    #[test]
    fn test_collected_component_frees_members_on_next_pass() {
        let (heap, mut regs) = registries();
        let component = regs.transform_component(EntityId::new(1, 0), Transform::IDENTITY).unwrap();
        let translate = component.read(|c| c.translate().clone()).unwrap();

        // first pass: the unpinned component goes, which unpins its members
        assert_eq!(heap.collect(), 1);
        assert!(!translate.is_deleted());
        assert_eq!(heap.collect(), 3);
        assert!(translate.is_deleted());
        assert_eq!(regs.purge_all(), 4);
    }
}

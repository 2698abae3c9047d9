//! Entity-keyed payloads: `entity`, `transform` and `camera`.

use neko_core::EntityId;
use neko_shared::Transform;
use serde::{Deserialize, Serialize};

use crate::error::ScriptingResult;
use crate::objects::{Quaternion, Vector3};
use crate::wrapped::{Handle, Payload, WrappedKind};

/// Payload behind `entity`: the script's handle on a native entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EntityObject {
    /// Native entity id
    pub id: EntityId,
}

impl From<EntityId> for EntityObject {
    fn from(id: EntityId) -> Self {
        Self { id }
    }
}

impl Payload for EntityObject {
    const KIND: WrappedKind = WrappedKind::Entity;

    fn describe(&self) -> String {
        self.id.to_string()
    }
}

/// Payload behind `transform`.
///
/// Translation, rotation and scale are themselves wrappers, so script code
/// can hold `t.translate` and mutate it in place. The component counts one
/// reference on each member while it holds it.
#[derive(Debug)]
pub struct TransformComponent {
    translate: Handle<Vector3>,
    rotate: Handle<Quaternion>,
    scale: Handle<Vector3>,
}

impl TransformComponent {
    /// Takes the three members and pins them.
    ///
    /// # Errors
    ///
    /// `DanglingReference` if a member is already deleted.
    pub fn new(
        translate: Handle<Vector3>,
        rotate: Handle<Quaternion>,
        scale: Handle<Vector3>,
    ) -> ScriptingResult<Self> {
        // check all three first so a failure never leaves a partial pin
        translate.read(|_| ())?;
        rotate.read(|_| ())?;
        scale.read(|_| ())?;
        translate.add_ref()?;
        rotate.add_ref()?;
        scale.add_ref()?;
        Ok(Self {
            translate,
            rotate,
            scale,
        })
    }

    /// Translation member.
    #[must_use]
    pub fn translate(&self) -> &Handle<Vector3> {
        &self.translate
    }

    /// Rotation member.
    #[must_use]
    pub fn rotate(&self) -> &Handle<Quaternion> {
        &self.rotate
    }

    /// Scale member.
    #[must_use]
    pub fn scale(&self) -> &Handle<Vector3> {
        &self.scale
    }

    /// Swaps in a new translation wrapper.
    ///
    /// # Errors
    ///
    /// `DanglingReference` if `handle` is deleted.
    pub fn set_translate(&mut self, handle: Handle<Vector3>) -> ScriptingResult<()> {
        swap_member(&mut self.translate, handle)
    }

    /// Swaps in a new rotation wrapper.
    ///
    /// # Errors
    ///
    /// `DanglingReference` if `handle` is deleted.
    pub fn set_rotate(&mut self, handle: Handle<Quaternion>) -> ScriptingResult<()> {
        swap_member(&mut self.rotate, handle)
    }

    /// Swaps in a new scale wrapper.
    ///
    /// # Errors
    ///
    /// `DanglingReference` if `handle` is deleted.
    pub fn set_scale(&mut self, handle: Handle<Vector3>) -> ScriptingResult<()> {
        swap_member(&mut self.scale, handle)
    }

    /// Reads the current values of all three members.
    ///
    /// # Errors
    ///
    /// `DanglingReference` if a member was destroyed out from under us.
    pub fn resolve(&self) -> ScriptingResult<Transform> {
        Ok(Transform::new(
            self.translate.read(|v| v.value)?,
            self.rotate.read(|q| q.value)?,
            self.scale.read(|v| v.value)?,
        ))
    }

    /// Whether any member changed since the last sync.
    #[must_use]
    pub fn members_dirty(&self) -> bool {
        self.translate.is_dirty() || self.rotate.is_dirty() || self.scale.is_dirty()
    }

    /// Clears the change flag on all members.
    pub fn mark_members_clean(&self) {
        self.translate.mark_clean();
        self.rotate.mark_clean();
        self.scale.mark_clean();
    }
}

fn swap_member<T: Payload>(slot: &mut Handle<T>, handle: Handle<T>) -> ScriptingResult<()> {
    handle.add_ref()?;
    let old = std::mem::replace(slot, handle);
    // a member destroyed natively has nothing left to unpin
    if !old.is_deleted() {
        old.unref()?;
    }
    slot.mark_dirty();
    Ok(())
}

impl Payload for TransformComponent {
    const KIND: WrappedKind = WrappedKind::Transform;

    fn release(&mut self) {
        for result in [self.translate.unref(), self.rotate.unref(), self.scale.unref()] {
            if let Err(err) = result {
                tracing::debug!(%err, "transform member already gone on release");
            }
        }
    }

    fn describe(&self) -> String {
        match self.resolve() {
            Ok(t) => format!(
                "transform(translate=[{}, {}, {}], scale=[{}, {}, {}])",
                t.translate.x, t.translate.y, t.translate.z, t.scale.x, t.scale.y, t.scale.z
            ),
            Err(_) => "transform(<released>)".to_owned(),
        }
    }
}

/// Camera projection mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    /// Perspective with vertical field of view
    #[default]
    Perspective,
    /// Orthographic with a fixed radius
    Orthographic,
}

impl Projection {
    /// Name used by script.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Perspective => "perspective",
            Self::Orthographic => "orthographic",
        }
    }
}

/// Camera parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Projection mode
    pub projection: Projection,
    /// Vertical field of view in degrees (perspective)
    pub fov_y: f32,
    /// Half-height of the view volume (orthographic)
    pub ortho_radius: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
    /// Exposure multiplier
    pub exposure: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            projection: Projection::Perspective,
            fov_y: 60.0,
            ortho_radius: 10.0,
            near: 0.1,
            far: 1000.0,
            exposure: 1.0,
        }
    }
}

/// Payload behind `camera`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CameraComponent {
    /// Current settings
    pub settings: CameraSettings,
}

impl From<CameraSettings> for CameraComponent {
    fn from(settings: CameraSettings) -> Self {
        Self { settings }
    }
}

impl Payload for CameraComponent {
    const KIND: WrappedKind = WrappedKind::Camera;

    fn describe(&self) -> String {
        format!("camera({})", self.settings.projection.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReclaimPolicy;
    use crate::registry::{ObjectRegistry, Registry};
    use crate::runtime::ProxyHeap;
    use neko_shared::{Quat, Vec3};

    struct Members {
        vec3: ObjectRegistry<Vector3>,
        quat: ObjectRegistry<Quaternion>,
    }

    fn members(policy: ReclaimPolicy) -> Members {
        let heap = ProxyHeap::new(policy);
        let mut vec3 = ObjectRegistry::new(heap.clone());
        let mut quat = ObjectRegistry::new(heap);
        vec3.initialize();
        quat.initialize();
        Members { vec3, quat }
    }

    #[test]
    fn test_component_pins_members() {
        let mut m = members(ReclaimPolicy::Collector);
        let t = m.vec3.create_from(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        let r = m.quat.create_from(Quat::IDENTITY).unwrap();
        let s = m.vec3.create_from(Vec3::ONE).unwrap();

        let mut component = TransformComponent::new(t.clone(), r.clone(), s.clone()).unwrap();
        assert!(t.is_strong() && r.is_strong() && s.is_strong());
        assert_eq!(component.resolve().unwrap().translate, Vec3::new(1.0, 2.0, 3.0));

        component.release();
        assert_eq!(t.ref_count(), 0);
        assert!(!r.is_strong());
    }

    #[test]
    fn test_set_member_moves_the_pin() {
        let mut m = members(ReclaimPolicy::Immediate);
        let t = m.vec3.create_from(Vec3::ZERO).unwrap();
        let r = m.quat.create_from(Quat::IDENTITY).unwrap();
        let s = m.vec3.create_from(Vec3::ONE).unwrap();
        let mut component = TransformComponent::new(t.clone(), r, s).unwrap();
        component.mark_members_clean();

        let moved = m.vec3.create_from(Vec3::X).unwrap();
        component.set_translate(moved.clone()).unwrap();

        assert_eq!(moved.ref_count(), 1);
        // the old member lost its only pin and was reclaimed on the spot
        assert!(t.is_deleted());
        assert!(component.members_dirty());
        assert_eq!(component.resolve().unwrap().translate, Vec3::X);
    }

    #[test]
    fn test_deleted_member_rejected_without_partial_pin() {
        let mut m = members(ReclaimPolicy::Collector);
        let t = m.vec3.create_from(Vec3::ZERO).unwrap();
        let r = m.quat.create_from(Quat::IDENTITY).unwrap();
        let s = m.vec3.create_from(Vec3::ONE).unwrap();
        m.vec3.destroy(&s);

        assert!(TransformComponent::new(t.clone(), r.clone(), s).is_err());
        assert_eq!(t.ref_count(), 0);
        assert_eq!(r.ref_count(), 0);
    }

    #[test]
    fn test_camera_settings_from_toml() {
        let settings: CameraSettings = toml::from_str("projection = \"orthographic\"\nfar = 50.0\n").unwrap();
        assert_eq!(settings.projection, Projection::Orthographic);
        assert_eq!(settings.far, 50.0);
        assert_eq!(settings.near, 0.1);
    }
}

//! `vec2`, `vec3` and `quaternion` payloads.

use neko_shared::{Quat, Vec2, Vec3};

use crate::wrapped::{Payload, WrappedKind};

/// Payload behind `vec2`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector2 {
    /// Wrapped value
    pub value: Vec2,
}

impl From<Vec2> for Vector2 {
    fn from(value: Vec2) -> Self {
        Self { value }
    }
}

impl Payload for Vector2 {
    const KIND: WrappedKind = WrappedKind::Vector2;

    fn describe(&self) -> String {
        format!("vec2({}, {})", self.value.x, self.value.y)
    }
}

/// Payload behind `vec3`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector3 {
    /// Wrapped value
    pub value: Vec3,
}

impl From<Vec3> for Vector3 {
    fn from(value: Vec3) -> Self {
        Self { value }
    }
}

impl Payload for Vector3 {
    const KIND: WrappedKind = WrappedKind::Vector3;

    fn describe(&self) -> String {
        format!("vec3({}, {}, {})", self.value.x, self.value.y, self.value.z)
    }
}

/// Payload behind `quaternion`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Quaternion {
    /// Wrapped value
    pub value: Quat,
}

impl From<Quat> for Quaternion {
    fn from(value: Quat) -> Self {
        Self { value }
    }
}

impl Payload for Quaternion {
    const KIND: WrappedKind = WrappedKind::Quaternion;

    fn describe(&self) -> String {
        let q = self.value;
        format!("quaternion({}, {}, {}, {})", q.x, q.y, q.z, q.w)
    }
}

//! # Script Bindings
//!
//! [`ScriptScope`] is what a running script sees: constructors, property
//! access and method calls on wrapped objects, plus the reference counting
//! hooks (`retain` / `release`) and explicit `destroy`.
//!
//! Every failure surfaces as a [`ScriptException`] thrown into the script;
//! nothing here panics on bad script input.

use std::collections::BTreeMap;
use std::sync::Arc;

use neko_core::EntityId;
use neko_shared::{Quat, Vec2, Vec3};

use crate::context::ScriptRegistries;
use crate::objects::{
    CameraComponent, CameraSettings, DynamicMesh, EntityObject, MeshData, Projection, Quaternion, Text,
    TransformComponent, Vector2, Vector3, MAX_PLANE_SEGMENTS,
};
use crate::runtime::{ProxyHeap, ScriptException, ScriptValue};
use crate::wrapped::{Handle, Payload, WrappedKind};

/// Largest integer a script number holds exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// A wrapper of any class, resolved from a script value.
enum AnyHandle {
    Vector2(Handle<Vector2>),
    Vector3(Handle<Vector3>),
    Quaternion(Handle<Quaternion>),
    Mesh(Handle<DynamicMesh>),
    Text(Handle<Text>),
    Entity(Handle<EntityObject>),
    Transform(Handle<TransformComponent>),
    Camera(Handle<CameraComponent>),
}

/// Runs the same expression against whichever wrapper `$any` holds.
macro_rules! with_handle {
    ($any:expr, |$h:ident| $body:expr) => {
        match $any {
            AnyHandle::Vector2($h) => $body,
            AnyHandle::Vector3($h) => $body,
            AnyHandle::Quaternion($h) => $body,
            AnyHandle::Mesh($h) => $body,
            AnyHandle::Text($h) => $body,
            AnyHandle::Entity($h) => $body,
            AnyHandle::Transform($h) => $body,
            AnyHandle::Camera($h) => $body,
        }
    };
}

/// The script's view of the bridge during `initialize` or `update`.
pub struct ScriptScope<'a> {
    registries: &'a mut ScriptRegistries,
    globals: &'a BTreeMap<String, ScriptValue>,
    script: &'a str,
}

impl<'a> ScriptScope<'a> {
    pub(crate) fn new(
        registries: &'a mut ScriptRegistries,
        globals: &'a BTreeMap<String, ScriptValue>,
        script: &'a str,
    ) -> Self {
        Self {
            registries,
            globals,
            script,
        }
    }

    /// Name of the running script.
    #[must_use]
    pub fn script_name(&self) -> &str {
        self.script
    }

    /// A global installed by the host.
    #[must_use]
    pub fn global(&self, name: &str) -> Option<&ScriptValue> {
        self.globals.get(name)
    }

    /// Native access to the registries (for exposing native data).
    pub fn registries(&mut self) -> &mut ScriptRegistries {
        &mut *self.registries
    }

    /// The runtime's proxy heap.
    #[must_use]
    pub fn heap(&self) -> &Arc<ProxyHeap> {
        self.registries.heap()
    }

    /// Typed wrapper behind a script value.
    ///
    /// # Errors
    ///
    /// `TypeError` if the value is not a `T`, `ReferenceError` if its proxy
    /// was reclaimed or the wrapper destroyed.
    pub fn resolve<T: Payload>(&self, value: &ScriptValue) -> Result<Handle<T>, ScriptException> {
        let class = T::KIND.script_name();
        let obj = value
            .as_object()
            .filter(|obj| obj.kind == T::KIND)
            .ok_or_else(|| ScriptException::type_error(format!("Passed argument is not a {class}")))?;
        let handle = self
            .heap()
            .resolve::<T>(obj.id)
            .ok_or_else(|| ScriptException::reference_error(format!("{class} {} has been collected", obj.id)))?;
        if handle.is_deleted() {
            return Err(ScriptException::reference_error(format!(
                "{class} {} has been destroyed",
                obj.id
            )));
        }
        Ok(handle)
    }

    fn any_handle(&self, value: &ScriptValue) -> Result<AnyHandle, ScriptException> {
        let obj = value.as_object().ok_or_else(|| {
            ScriptException::type_error(format!("Expected an object, got {}", value.type_name()))
        })?;
        Ok(match obj.kind {
            WrappedKind::Vector2 => AnyHandle::Vector2(self.resolve(value)?),
            WrappedKind::Vector3 => AnyHandle::Vector3(self.resolve(value)?),
            WrappedKind::Quaternion => AnyHandle::Quaternion(self.resolve(value)?),
            WrappedKind::Mesh => AnyHandle::Mesh(self.resolve(value)?),
            WrappedKind::Text => AnyHandle::Text(self.resolve(value)?),
            WrappedKind::Entity => AnyHandle::Entity(self.resolve(value)?),
            WrappedKind::Transform => AnyHandle::Transform(self.resolve(value)?),
            WrappedKind::Camera => AnyHandle::Camera(self.resolve(value)?),
        })
    }

    // ------------------------------------------------------------------
    // Constructors
    // ------------------------------------------------------------------

    /// `new <class>(...args)`.
    ///
    /// # Errors
    ///
    /// `ReferenceError` for an unknown class, `TypeError` for arguments no
    /// overload accepts, `RangeError` for out-of-range values.
    pub fn construct(&mut self, class: &str, args: &[ScriptValue]) -> Result<ScriptValue, ScriptException> {
        let kind = WrappedKind::from_script_name(class)
            .ok_or_else(|| ScriptException::reference_error(format!("{class} is not defined")))?;
        let invalid = || ScriptException::type_error(format!("Invalid constructor call to {class}"));

        let value = match kind {
            WrappedKind::Vector2 => {
                let v = match args {
                    [] => Vec2::ZERO,
                    [obj @ ScriptValue::Object(_)] => self.resolve::<Vector2>(obj)?.read(|p| p.value)?,
                    _ => numbers::<2>(args).map(|[x, y]| Vec2::new(x, y)).ok_or_else(invalid)?,
                };
                ScriptValue::from_handle(&self.registries.vec2.create_from(v)?)
            }
            WrappedKind::Vector3 => {
                let v = match args {
                    [] => Vec3::ZERO,
                    [ScriptValue::Number(n)] => Vec3::splat(*n as f32),
                    [obj @ ScriptValue::Object(_)] => self.resolve::<Vector3>(obj)?.read(|p| p.value)?,
                    _ => numbers::<3>(args).map(Vec3::from_array).ok_or_else(invalid)?,
                };
                ScriptValue::from_handle(&self.registries.vec3.create_from(v)?)
            }
            WrappedKind::Quaternion => {
                let q = match args {
                    [] => Quat::IDENTITY,
                    [obj @ ScriptValue::Object(_)] => self.resolve::<Quaternion>(obj)?.read(|p| p.value)?,
                    _ => numbers::<4>(args)
                        .map(|[x, y, z, w]| Quat::new(x, y, z, w))
                        .ok_or_else(invalid)?,
                };
                ScriptValue::from_handle(&self.registries.quaternion.create_from(q)?)
            }
            WrappedKind::Mesh => {
                let mesh = match args {
                    [] => DynamicMesh::default(),
                    [ScriptValue::String(shape), rest @ ..] => DynamicMesh::from(self.mesh_shape(shape, rest)?),
                    _ => return Err(invalid()),
                };
                ScriptValue::from_handle(&self.registries.mesh.create(mesh)?)
            }
            WrappedKind::Text => {
                let text = match args {
                    [] => Text::default(),
                    [ScriptValue::String(content)] => Text::new(content.as_str()),
                    _ => return Err(invalid()),
                };
                ScriptValue::from_handle(&self.registries.text.create(text)?)
            }
            WrappedKind::Entity => {
                let [arg] = args else { return Err(invalid()) };
                let id = self.entity_id(arg)?;
                ScriptValue::from_handle(&self.registries.entity(id)?)
            }
            WrappedKind::Transform => {
                let [arg] = args else { return Err(invalid()) };
                let id = self.entity_id(arg)?;
                let initial = neko_shared::Transform::IDENTITY;
                ScriptValue::from_handle(&self.registries.transform_component(id, initial)?)
            }
            WrappedKind::Camera => {
                let [arg] = args else { return Err(invalid()) };
                let id = self.entity_id(arg)?;
                let camera = self.registries.cameras.create_from(id, CameraSettings::default())?;
                ScriptValue::from_handle(&camera)
            }
        };
        Ok(value)
    }

    fn mesh_shape(&self, shape: &str, args: &[ScriptValue]) -> Result<MeshData, ScriptException> {
        match shape {
            "plane" => {
                let usage =
                    || ScriptException::type_error("mesh('plane') expects (vec2 dimensions, vec2 segments, vec3 normal)");
                let [dimensions, segments, normal] = args else { return Err(usage()) };
                let dimensions = self.vec2_arg(dimensions).ok_or_else(usage)?;
                let segments = self.vec2_arg(segments).ok_or_else(usage)?;
                let normal = self.vec3_arg(normal).ok_or_else(usage)?;
                let max = MAX_PLANE_SEGMENTS as f32;
                if !(1.0..=max).contains(&segments.x) || !(1.0..=max).contains(&segments.y) {
                    return Err(ScriptException::range_error(format!(
                        "mesh segments must be between 1 and {MAX_PLANE_SEGMENTS}"
                    )));
                }
                Ok(MeshData::plane(
                    dimensions,
                    (segments.x as u32, segments.y as u32),
                    normal,
                ))
            }
            other => Err(ScriptException::range_error(format!("Unknown mesh shape '{other}'"))),
        }
    }

    /// Entity id from a number or an `entity` object.
    fn entity_id(&self, value: &ScriptValue) -> Result<EntityId, ScriptException> {
        match value {
            ScriptValue::Number(n) => {
                if !n.is_finite() || *n < 0.0 || n.fract() != 0.0 || *n > MAX_SAFE_INTEGER {
                    return Err(ScriptException::range_error(format!(
                        "Entity id must be a non-negative integer, got {n}"
                    )));
                }
                Ok(EntityId::from_bits(*n as u64))
            }
            ScriptValue::Object(_) => Ok(self.resolve::<EntityObject>(value)?.read(|e| e.id)?),
            other => Err(ScriptException::type_error(format!(
                "Expected an entity id, got {}",
                other.type_name()
            ))),
        }
    }

    fn vec2_arg(&self, value: &ScriptValue) -> Option<Vec2> {
        match value {
            ScriptValue::Object(_) => self.resolve::<Vector2>(value).ok()?.read(|p| p.value).ok(),
            _ => numbers::<2>(std::slice::from_ref(value)).map(|[x, y]| Vec2::new(x, y)),
        }
    }

    fn vec3_arg(&self, value: &ScriptValue) -> Option<Vec3> {
        match value {
            ScriptValue::Object(_) => self.resolve::<Vector3>(value).ok()?.read(|p| p.value).ok(),
            _ => numbers::<3>(std::slice::from_ref(value)).map(Vec3::from_array),
        }
    }

    fn quat_arg(&self, value: &ScriptValue) -> Option<Quat> {
        match value {
            ScriptValue::Object(_) => self.resolve::<Quaternion>(value).ok()?.read(|p| p.value).ok(),
            _ => numbers::<4>(std::slice::from_ref(value)).map(|[x, y, z, w]| Quat::new(x, y, z, w)),
        }
    }

    // ------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------

    /// `target[property]`. Unknown properties read as `undefined`.
    ///
    /// # Errors
    ///
    /// `TypeError` if `target` is not an object, `ReferenceError` if it is
    /// dead.
    pub fn get(&self, target: &ScriptValue, property: &str) -> Result<ScriptValue, ScriptException> {
        let value = match self.any_handle(target)? {
            AnyHandle::Vector2(h) => {
                let v = h.read(|p| p.value)?;
                component(&v.to_array(), property, &["x", "y"])
            }
            AnyHandle::Vector3(h) => {
                let v = h.read(|p| p.value)?;
                component(&v.to_array(), property, &["x", "y", "z"])
            }
            AnyHandle::Quaternion(h) => {
                let q = h.read(|p| p.value)?;
                component(&q.to_array(), property, &["x", "y", "z", "w"])
            }
            AnyHandle::Mesh(h) => match property {
                "vertexCount" => (h.read(DynamicMesh::vertex_count)? as f64).into(),
                "indexCount" => (h.read(DynamicMesh::index_count)? as f64).into(),
                "revision" => (h.read(DynamicMesh::revision)? as f64).into(),
                _ => ScriptValue::Undefined,
            },
            AnyHandle::Text(h) => {
                let text = h.read(Text::clone)?;
                match property {
                    "content" => text.content.into(),
                    "translate" => array(&text.transform.translate.to_array()),
                    "scale" => array(&text.transform.scale.to_array()),
                    "rotate" => array(&text.transform.rotate.to_array()),
                    _ => ScriptValue::Undefined,
                }
            }
            AnyHandle::Entity(h) => match property {
                "id" => (h.read(|e| e.id)?.to_bits() as f64).into(),
                _ => ScriptValue::Undefined,
            },
            AnyHandle::Transform(h) => match property {
                "translate" => ScriptValue::from_handle(&h.read(|c| c.translate().clone())?),
                "rotate" => ScriptValue::from_handle(&h.read(|c| c.rotate().clone())?),
                "scale" => ScriptValue::from_handle(&h.read(|c| c.scale().clone())?),
                _ => ScriptValue::Undefined,
            },
            AnyHandle::Camera(h) => {
                let settings = h.read(|c| c.settings)?;
                match property {
                    "projection" => settings.projection.as_str().into(),
                    "fov" => settings.fov_y.into(),
                    "orthoRadius" => settings.ortho_radius.into(),
                    "near" => settings.near.into(),
                    "far" => settings.far.into(),
                    "exposure" => settings.exposure.into(),
                    _ => ScriptValue::Undefined,
                }
            }
        };
        Ok(value)
    }

    /// `target[property] = value`.
    ///
    /// # Errors
    ///
    /// `TypeError` for read-only or unknown properties and wrongly typed
    /// values, `RangeError` for bad enum strings, `ReferenceError` if the
    /// target is dead.
    pub fn set(&mut self, target: &ScriptValue, property: &str, value: &ScriptValue) -> Result<(), ScriptException> {
        let class = target.type_name();
        let unknown = || ScriptException::type_error(format!("Cannot set property '{property}' on {class}"));
        let read_only = || ScriptException::type_error(format!("{class}.{property} is read-only"));

        match self.any_handle(target)? {
            AnyHandle::Vector2(h) => {
                let axis = axis(property, &["x", "y"]).ok_or_else(unknown)?;
                let n = number(value, class, property)?;
                h.write(|p| {
                    let mut a = p.value.to_array();
                    a[axis] = n;
                    p.value = Vec2::new(a[0], a[1]);
                })?;
            }
            AnyHandle::Vector3(h) => {
                let axis = axis(property, &["x", "y", "z"]).ok_or_else(unknown)?;
                let n = number(value, class, property)?;
                h.write(|p| {
                    let mut a = p.value.to_array();
                    a[axis] = n;
                    p.value = Vec3::from_array(a);
                })?;
            }
            AnyHandle::Quaternion(h) => {
                let axis = axis(property, &["x", "y", "z", "w"]).ok_or_else(unknown)?;
                let n = number(value, class, property)?;
                h.write(|p| {
                    let mut a = p.value.to_array();
                    a[axis] = n;
                    p.value = Quat::new(a[0], a[1], a[2], a[3]);
                })?;
            }
            AnyHandle::Mesh(_) => {
                return Err(match property {
                    "vertexCount" | "indexCount" | "revision" => read_only(),
                    _ => unknown(),
                })
            }
            AnyHandle::Entity(_) => return Err(if property == "id" { read_only() } else { unknown() }),
            AnyHandle::Text(h) => match property {
                "content" => {
                    let content = value
                        .as_str()
                        .ok_or_else(|| ScriptException::type_error("text.content expects a string"))?
                        .to_owned();
                    h.write(|t| t.content = content)?;
                }
                "translate" | "scale" => {
                    let v = self
                        .vec3_arg(value)
                        .ok_or_else(|| ScriptException::type_error("Passed argument is not a vec3"))?;
                    h.write(|t| {
                        if property == "translate" {
                            t.transform.translate = v;
                        } else {
                            t.transform.scale = v;
                        }
                    })?;
                }
                "rotate" => {
                    let q = self
                        .quat_arg(value)
                        .ok_or_else(|| ScriptException::type_error("Passed argument is not a quaternion"))?;
                    h.write(|t| t.transform.rotate = q)?;
                }
                _ => return Err(unknown()),
            },
            AnyHandle::Transform(h) => match property {
                "translate" => {
                    let v = self.resolve::<Vector3>(value)?;
                    h.write(|c| c.set_translate(v))??;
                }
                "scale" => {
                    let v = self.resolve::<Vector3>(value)?;
                    h.write(|c| c.set_scale(v))??;
                }
                "rotate" => {
                    let q = self.resolve::<Quaternion>(value)?;
                    h.write(|c| c.set_rotate(q))??;
                }
                _ => return Err(unknown()),
            },
            AnyHandle::Camera(h) => {
                let mut settings = h.read(|c| c.settings)?;
                match property {
                    "projection" => {
                        settings.projection = match value.as_str() {
                            Some("perspective") => Projection::Perspective,
                            Some("orthographic") => Projection::Orthographic,
                            Some(other) => {
                                return Err(ScriptException::range_error(format!(
                                    "Unknown projection '{other}'"
                                )))
                            }
                            None => return Err(ScriptException::type_error("camera.projection expects a string")),
                        };
                    }
                    "fov" => settings.fov_y = number(value, class, property)?,
                    "orthoRadius" => settings.ortho_radius = number(value, class, property)?,
                    "near" => settings.near = number(value, class, property)?,
                    "far" => settings.far = number(value, class, property)?,
                    "exposure" => settings.exposure = number(value, class, property)?,
                    _ => return Err(unknown()),
                }
                h.write(|c| c.settings = settings)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Methods
    // ------------------------------------------------------------------

    /// `target.method(...args)`.
    ///
    /// Every class has `toString()`. `vec2`, `vec3` and `quaternion` also
    /// have `equals(other)`.
    ///
    /// # Errors
    ///
    /// `TypeError` for unknown methods or bad arguments, `ReferenceError`
    /// if the target is dead.
    pub fn call(&mut self, target: &ScriptValue, method: &str, args: &[ScriptValue]) -> Result<ScriptValue, ScriptException> {
        let class = target.type_name();
        let handle = self.any_handle(target)?;
        match method {
            "toString" => Ok(with_handle!(handle, |h| h.read(|p| p.describe())?).into()),
            "equals" => {
                let [other] = args else {
                    return Err(ScriptException::type_error(format!("{class}.equals expects one argument")));
                };
                let equal = match handle {
                    AnyHandle::Vector2(h) => {
                        let b = self.resolve::<Vector2>(other)?.read(|p| p.value)?;
                        h.read(|p| p.value.approx_eq(b))?
                    }
                    AnyHandle::Vector3(h) => {
                        let b = self.resolve::<Vector3>(other)?.read(|p| p.value)?;
                        h.read(|p| p.value.approx_eq(b))?
                    }
                    AnyHandle::Quaternion(h) => {
                        let b = self.resolve::<Quaternion>(other)?.read(|p| p.value)?;
                        h.read(|p| p.value.approx_eq(b))?
                    }
                    _ => return Err(not_a_function(class, method)),
                };
                Ok(equal.into())
            }
            _ => Err(not_a_function(class, method)),
        }
    }

    // ------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------

    /// Counts a script-held reference; the object is pinned while any exist.
    ///
    /// # Errors
    ///
    /// `ReferenceError` if the object is dead.
    pub fn retain(&self, value: &ScriptValue) -> Result<u32, ScriptException> {
        let handle = self.any_handle(value)?;
        Ok(with_handle!(handle, |h| h.add_ref()?))
    }

    /// Drops a script-held reference.
    ///
    /// # Errors
    ///
    /// `ReferenceError` if the object is dead or was never retained.
    pub fn release(&self, value: &ScriptValue) -> Result<u32, ScriptException> {
        let handle = self.any_handle(value)?;
        Ok(with_handle!(handle, |h| h.unref()?))
    }

    /// Destroys an object now, whatever its reference count.
    ///
    /// Returns false if its registry no longer held it.
    ///
    /// # Errors
    ///
    /// `ReferenceError` if the object is already dead.
    pub fn destroy(&mut self, value: &ScriptValue) -> Result<bool, ScriptException> {
        let handle = self.any_handle(value)?;
        let regs = &mut *self.registries;
        Ok(match handle {
            AnyHandle::Vector2(h) => regs.vec2.destroy(&h),
            AnyHandle::Vector3(h) => regs.vec3.destroy(&h),
            AnyHandle::Quaternion(h) => regs.quaternion.destroy(&h),
            AnyHandle::Mesh(h) => regs.mesh.destroy(&h),
            AnyHandle::Text(h) => regs.text.destroy(&h),
            AnyHandle::Entity(h) => regs.entities.destroy_handle(&h),
            AnyHandle::Transform(h) => regs.transforms.destroy_handle(&h),
            AnyHandle::Camera(h) => regs.cameras.destroy_handle(&h),
        })
    }
}

fn not_a_function(class: &str, method: &str) -> ScriptException {
    ScriptException::type_error(format!("{class}.{method} is not a function"))
}

fn number(value: &ScriptValue, class: &str, property: &str) -> Result<f32, ScriptException> {
    value.as_number().map(|n| n as f32).ok_or_else(|| {
        ScriptException::type_error(format!(
            "{class}.{property} expects a number, got {}",
            value.type_name()
        ))
    })
}

/// `N` numbers, given either as `N` arguments or one array of `N`.
fn numbers<const N: usize>(args: &[ScriptValue]) -> Option<[f32; N]> {
    let items = match args {
        [ScriptValue::Array(items)] => items.as_slice(),
        _ => args,
    };
    if items.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_number()? as f32;
    }
    Some(out)
}

fn axis(property: &str, names: &[&str]) -> Option<usize> {
    names.iter().position(|name| *name == property)
}

fn component(values: &[f32], property: &str, names: &[&str]) -> ScriptValue {
    axis(property, names).map_or(ScriptValue::Undefined, |i| values[i].into())
}

fn array(values: &[f32]) -> ScriptValue {
    ScriptValue::Array(values.iter().map(|v| ScriptValue::from(*v)).collect())
}

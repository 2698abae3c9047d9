//! Payload types exposed to script.

mod components;
mod math;
mod mesh;
mod text;

pub use components::{CameraComponent, CameraSettings, EntityObject, Projection, TransformComponent};
pub use math::{Quaternion, Vector2, Vector3};
pub use mesh::{DynamicMesh, IndexBuffer, MeshData, Vertex, VertexBuffer, MAX_PLANE_SEGMENTS};
pub use text::Text;

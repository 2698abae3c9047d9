//! # Dynamic Meshes
//!
//! A `mesh` owns two GPU-bound sub-resources: a vertex buffer and an index
//! buffer. Ownership is unique: native data is *moved* into the wrapper, and
//! the buffers are dropped exactly once when the wrapper is deleted.

use bytemuck::{Pod, Zeroable};
use neko_shared::{Vec2, Vec3};

use crate::wrapped::{Payload, WrappedKind};

/// Interleaved vertex as uploaded to the GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Unit normal
    pub normal: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

/// Owned vertex data.
#[derive(Debug, Default, PartialEq)]
pub struct VertexBuffer(Vec<Vertex>);

impl VertexBuffer {
    /// Takes ownership of the vertices.
    #[must_use]
    pub fn new(vertices: Vec<Vertex>) -> Self {
        Self(vertices)
    }

    /// Vertex count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no vertices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Vertices as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Vertex] {
        &self.0
    }

    /// Raw bytes for upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.0)
    }
}

/// Owned index data.
#[derive(Debug, Default, PartialEq)]
pub struct IndexBuffer(Vec<u32>);

impl IndexBuffer {
    /// Takes ownership of the indices.
    #[must_use]
    pub fn new(indices: Vec<u32>) -> Self {
        Self(indices)
    }

    /// Index count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no indices.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Indices as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Raw bytes for upload.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.0)
    }
}

/// Most cells a generated plane has along one axis.
pub const MAX_PLANE_SEGMENTS: u32 = 1024;

/// Native mesh data. `Default` is the empty mesh, so a native owner can
/// hand its data over with `std::mem::take` and keep a valid, empty value.
#[derive(Debug, Default, PartialEq)]
pub struct MeshData {
    /// Vertex buffer
    pub vertices: VertexBuffer,
    /// Index buffer
    pub indices: IndexBuffer,
}

impl MeshData {
    /// Bundles the two buffers.
    #[must_use]
    pub fn new(vertices: VertexBuffer, indices: IndexBuffer) -> Self {
        Self { vertices, indices }
    }

    /// Flat plane centred on the origin, facing `normal`.
    ///
    /// `segments` is clamped to `1..=MAX_PLANE_SEGMENTS` cells per axis. A
    /// zero normal falls back to +Y.
    #[must_use]
    pub fn plane(dimensions: Vec2, segments: (u32, u32), normal: Vec3) -> Self {
        let sx = segments.0.clamp(1, MAX_PLANE_SEGMENTS);
        let sy = segments.1.clamp(1, MAX_PLANE_SEGMENTS);
        let n = match normal.normalize_or_zero() {
            n if n == Vec3::ZERO => Vec3::Y,
            n => n,
        };
        let helper = if n.y.abs() > 0.999 { Vec3::Z } else { Vec3::Y };
        let u = helper.cross(n).normalize_or_zero();
        let v = n.cross(u);

        let (cols, rows) = (sx as usize, sy as usize);
        let vertex_count = (cols + 1).checked_mul(rows + 1).unwrap_or(0);
        let mut vertices = Vec::with_capacity(vertex_count);
        for iy in 0..=sy {
            for ix in 0..=sx {
                let fx = ix as f32 / sx as f32;
                let fy = iy as f32 / sy as f32;
                let position = u * ((fx - 0.5) * dimensions.x) + v * ((fy - 0.5) * dimensions.y);
                vertices.push(Vertex {
                    position: position.to_array(),
                    normal: n.to_array(),
                    uv: [fx, fy],
                });
            }
        }

        let row = sx + 1;
        let index_count = cols.checked_mul(rows).and_then(|cells| cells.checked_mul(6)).unwrap_or(0);
        let mut indices = Vec::with_capacity(index_count);
        for iy in 0..sy {
            for ix in 0..sx {
                let a = iy * row + ix;
                let b = a + 1;
                let c = a + row;
                let d = c + 1;
                indices.extend_from_slice(&[a, c, b, b, c, d]);
            }
        }

        Self::new(VertexBuffer::new(vertices), IndexBuffer::new(indices))
    }

    /// Whether both buffers are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() && self.indices.is_empty()
    }

    fn byte_size(&self) -> usize {
        self.vertices.as_bytes().len() + self.indices.as_bytes().len()
    }
}

/// Payload behind `mesh`.
#[derive(Debug, Default)]
pub struct DynamicMesh {
    buffers: Option<MeshData>,
    revision: u64,
}

impl DynamicMesh {
    /// Current buffers, `None` once released.
    #[must_use]
    pub fn buffers(&self) -> Option<&MeshData> {
        self.buffers.as_ref()
    }

    /// Replaces the buffers, dropping the previous ones.
    pub fn replace(&mut self, data: MeshData) {
        self.buffers = Some(data);
        self.revision += 1;
    }

    /// Bumped on every [`DynamicMesh::replace`], so the renderer knows to
    /// re-upload.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Vertex count (0 once released).
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.buffers.as_ref().map_or(0, |b| b.vertices.len())
    }

    /// Index count (0 once released).
    #[must_use]
    pub fn index_count(&self) -> usize {
        self.buffers.as_ref().map_or(0, |b| b.indices.len())
    }

    /// Whether the sub-resources were dropped.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.buffers.is_none()
    }
}

impl From<MeshData> for DynamicMesh {
    fn from(data: MeshData) -> Self {
        Self {
            buffers: Some(data),
            revision: 0,
        }
    }
}

impl Payload for DynamicMesh {
    const KIND: WrappedKind = WrappedKind::Mesh;

    fn estimate_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.buffers.as_ref().map_or(0, MeshData::byte_size)
    }

    fn release(&mut self) {
        self.buffers = None;
    }

    fn describe(&self) -> String {
        format!("mesh(vertices={}, indices={})", self.vertex_count(), self.index_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_counts() {
        let plane = MeshData::plane(Vec2::new(2.0, 4.0), (3, 2), Vec3::Y);
        assert_eq!(plane.vertices.len(), 4 * 3);
        assert_eq!(plane.indices.len(), 3 * 2 * 6);
        let max = plane.indices.as_slice().iter().copied().max().unwrap();
        assert!((max as usize) < plane.vertices.len());
    }

    #[test]
    fn test_plane_lies_in_normal_plane() {
        let normal = Vec3::new(0.0, 0.0, 2.0);
        let plane = MeshData::plane(Vec2::new(1.0, 1.0), (0, 0), normal);
        assert_eq!(plane.vertices.len(), 4);
        for vertex in plane.vertices.as_slice() {
            let p = Vec3::from_array(vertex.position);
            assert!(p.dot(Vec3::Z).abs() < 1.0e-5);
            assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn test_plane_segments_are_capped() {
        let plane = MeshData::plane(Vec2::new(1.0, 1.0), (u32::MAX, 1), Vec3::Y);
        let cols = MAX_PLANE_SEGMENTS as usize;
        assert_eq!(plane.vertices.len(), (cols + 1) * 2);
        assert_eq!(plane.indices.len(), cols * 6);
        let max = plane.indices.as_slice().iter().copied().max().unwrap();
        assert_eq!(max as usize, plane.vertices.len() - 1);
    }

    #[test]
    fn test_take_leaves_empty_source() {
        let mut owner = MeshData::plane(Vec2::new(1.0, 1.0), (1, 1), Vec3::Y);
        let mesh = DynamicMesh::from(std::mem::take(&mut owner));
        assert!(owner.is_empty());
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.index_count(), 6);
    }

    #[test]
    fn test_release_drops_buffers() {
        let mut mesh = DynamicMesh::from(MeshData::plane(Vec2::new(1.0, 1.0), (1, 1), Vec3::Y));
        let before = mesh.estimate_size();
        mesh.release();
        assert!(mesh.is_released());
        assert_eq!(mesh.vertex_count(), 0);
        assert!(mesh.estimate_size() < before);
    }

    #[test]
    fn test_vertex_bytes() {
        let buffer = VertexBuffer::new(vec![Vertex::default(); 3]);
        assert_eq!(buffer.as_bytes().len(), 3 * 32);
    }
}

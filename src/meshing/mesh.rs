/// Mesh data structures consumed by the pipeline and the BVH builder
use anyhow::{bail, ensure, Result};
use glam::{Vec2, Vec3};

/// Input vertex layout shared by every mesh.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// Vertex with only a position; normal and texture coordinate are zero.
    #[inline]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            normal: Vec3::ZERO,
            tex_coord: Vec2::ZERO,
        }
    }
}

/// Vertex buffer plus an optional index buffer.
///
/// With indices, every 3 indices form one triangle; without, every 3
/// consecutive vertices do. Trailing elements that do not complete a
/// triangle are ignored.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl Mesh {
    /// Build an indexed mesh. Fails if any index points past the vertex buffer.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self> {
        let vertex_count = vertices.len();
        if let Some((slot, &bad)) = indices
            .iter()
            .enumerate()
            .find(|&(_, &i)| i as usize >= vertex_count)
        {
            bail!(
                "index buffer slot {} references vertex {} but the mesh has {} vertices",
                slot,
                bad,
                vertex_count
            );
        }
        ensure!(
            vertex_count <= u32::MAX as usize,
            "mesh has {} vertices, more than a u32 index can address",
            vertex_count
        );
        Ok(Self { vertices, indices })
    }

    /// For generators that produce indices in range by construction.
    pub(crate) fn from_parts_unchecked(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        debug_assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
        Self { vertices, indices }
    }

    /// Build a non-indexed mesh (triangle list).
    pub fn from_vertices(vertices: Vec<Vertex>) -> Self {
        Self {
            vertices,
            indices: Vec::new(),
        }
    }

    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    #[inline]
    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    /// Number of vertex shader invocations a draw of this mesh performs.
    #[inline]
    pub fn invocation_count(&self) -> usize {
        if self.is_indexed() {
            self.indices.len()
        } else {
            self.vertices.len()
        }
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.invocation_count() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.triangle_count() == 0
    }

    /// Vertex fed to invocation `i` of the vertex stage.
    #[inline]
    pub(crate) fn invocation_vertex(&self, i: usize) -> &Vertex {
        if self.is_indexed() {
            &self.vertices[self.indices[i] as usize]
        } else {
            &self.vertices[i]
        }
    }

    /// The three vertices of triangle `tri`, or `None` if out of range.
    pub fn triangle(&self, tri: usize) -> Option<[Vertex; 3]> {
        if tri >= self.triangle_count() {
            return None;
        }
        let base = tri * 3;
        Some([
            *self.invocation_vertex(base),
            *self.invocation_vertex(base + 1),
            *self.invocation_vertex(base + 2),
        ])
    }

    pub fn triangle_positions(&self, tri: usize) -> Option<[Vec3; 3]> {
        self.triangle(tri)
            .map(|[a, b, c]| [a.position, b.position, c.position])
    }
}

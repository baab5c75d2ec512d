/// Procedural meshes used by the demo, the benches and the tests.
/// Front faces wind counter-clockwise when seen from outside.
use super::mesh::{Mesh, Vertex};
use glam::{Vec2, Vec3};
use std::f32::consts::{PI, TAU};

/// UV sphere with `rings` latitude bands and `segments` longitude slices.
/// Pole bands produce zero-area triangles, which the pipeline culls.
pub fn uv_sphere(center: Vec3, radius: f32, rings: u32, segments: u32) -> Mesh {
    let rings = rings.max(2);
    let segments = segments.max(3);

    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    for i in 0..=rings {
        let theta = PI * i as f32 / rings as f32;
        for j in 0..=segments {
            let phi = TAU * j as f32 / segments as f32;
            let normal = Vec3::new(theta.sin() * phi.sin(), theta.cos(), theta.sin() * phi.cos());
            vertices.push(Vertex::new(
                center + normal * radius,
                normal,
                Vec2::new(j as f32 / segments as f32, i as f32 / rings as f32),
            ));
        }
    }

    let stride = segments + 1;
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
    for i in 0..rings {
        for j in 0..segments {
            let a = i * stride + j;
            let b = (i + 1) * stride + j;
            let c = (i + 1) * stride + j + 1;
            let d = i * stride + j + 1;
            indices.extend_from_slice(&[a, b, c, a, c, d]);
        }
    }

    Mesh::from_parts_unchecked(vertices, indices)
}

/// Axis-aligned square in the plane `z = center.z`, facing +Z.
pub fn quad(center: Vec3, half_extent: f32) -> Mesh {
    let corners = [
        Vec2::new(-1.0, -1.0),
        Vec2::new(1.0, -1.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(-1.0, 1.0),
    ];
    let vertices = corners
        .iter()
        .map(|c| {
            Vertex::new(
                center + (*c * half_extent).extend(0.0),
                Vec3::Z,
                *c * 0.5 + Vec2::splat(0.5),
            )
        })
        .collect();
    Mesh::from_parts_unchecked(vertices, vec![0, 1, 2, 0, 2, 3])
}

/// `count` small, non-overlapping triangles laid out on a row along X.
/// Useful for exercising the BVH with a known triangle count.
pub fn triangle_strip_row(count: usize, spacing: f32) -> Mesh {
    let mut vertices = Vec::with_capacity(count * 3);
    for i in 0..count {
        let x = i as f32 * spacing;
        vertices.push(Vertex::from_position(Vec3::new(x, 0.0, 0.0)));
        vertices.push(Vertex::from_position(Vec3::new(x + spacing * 0.5, 0.0, 0.0)));
        vertices.push(Vertex::from_position(Vec3::new(x, spacing * 0.5, 0.0)));
    }
    Mesh::from_vertices(vertices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sphere_indices_are_in_range() {
        let mesh = uv_sphere(Vec3::ZERO, 1.0, 8, 12);
        assert_eq!(mesh.triangle_count(), 8 * 12 * 2);
        assert!(Mesh::new(mesh.vertices().to_vec(), mesh.indices().to_vec()).is_ok());
    }

    #[test]
    fn quad_faces_positive_z() {
        let mesh = quad(Vec3::new(0.0, 0.0, -2.0), 1.0);
        let [a, b, c] = mesh.triangle_positions(0).unwrap();
        assert!((b - a).cross(c - a).z > 0.0);
    }
}

/// Stock shaders and shading helpers.
/// Kept separate from the rasterizer so shading can evolve independently of
/// the rasterization pipeline. Any closure with the right signature works as
/// a shader; these cover the common debug views.
use super::vertex::{FragmentContext, VertexOut};
use crate::meshing::Vertex;
use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

/// Stable, well-spread debug color for an integer id (alpha 1).
#[inline]
pub fn pseudo_color(v: u32) -> Vec4 {
    let seed = (v as u64)
        .wrapping_mul(9_386_983_906_464_221)
        .wrapping_add(2_504_963_420_354_851) as u32;
    let rgb = Vec3::new(
        (seed & 0xff) as f32,
        (seed >> 8 & 0xff) as f32,
        (seed >> 16 & 0xff) as f32,
    ) / 255.0;
    rgb.extend(1.0)
}

/// Model and combined projection-view transform applied by the stock vertex shader.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransformShader {
    pub model: Mat4,
    pub proj_view: Mat4,
    normal_matrix: Mat4,
}

impl TransformShader {
    pub fn new(model: Mat4, proj_view: Mat4) -> Self {
        Self {
            model,
            proj_view,
            normal_matrix: model.inverse().transpose(),
        }
    }

    /// Clip position, world position, world normal, pass-through texture coordinate.
    #[inline]
    pub fn shade(&self, vertex: &Vertex) -> VertexOut {
        let world = self.model * vertex.position.extend(1.0);
        VertexOut {
            raster_position: self.proj_view * world,
            position: world.xyz(),
            normal: (self.normal_matrix * vertex.normal.extend(0.0)).xyz(),
            tex_coord: vertex.tex_coord,
        }
    }
}

/// Vertex shader closure for a model and projection-view transform.
pub fn transform_vertex_shader(model: Mat4, proj_view: Mat4) -> impl Fn(&Vertex) -> VertexOut + Sync {
    let transform = TransformShader::new(model, proj_view);
    move |vertex| transform.shade(vertex)
}

/// Feeds vertex positions straight through as clip coordinates (`w = 1`),
/// so mesh positions are read as NDC.
#[inline]
pub fn ndc_vertex_shader(vertex: &Vertex) -> VertexOut {
    VertexOut {
        raster_position: vertex.position.extend(1.0),
        position: vertex.position,
        normal: vertex.normal,
        tex_coord: vertex.tex_coord,
    }
}

/// Normal visualization: `normal * 0.5 + 0.5`.
#[inline]
pub fn normal_shader(frag: &VertexOut, _: &FragmentContext) -> Vec4 {
    (frag.normal * 0.5 + Vec3::splat(0.5)).extend(1.0)
}

/// Per-primitive debug colors.
#[inline]
pub fn primitive_id_shader(_: &VertexOut, context: &FragmentContext) -> Vec4 {
    pseudo_color(context.primitive_id)
}

/// Clip plane distances of a right-handed, zero-to-one perspective projection.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DepthRange {
    pub near: f32,
    pub far: f32,
}

impl Default for DepthRange {
    fn default() -> Self {
        Self {
            near: 0.01,
            far: 10000.0,
        }
    }
}

impl DepthRange {
    /// Eye-space distance of an NDC depth in [0, 1].
    #[inline]
    pub fn linear_depth(&self, ndc_depth: f32) -> f32 {
        self.near * self.far / (self.far + ndc_depth * (self.near - self.far))
    }
}

/// Grey-scale linear depth view.
pub fn linear_depth_shader(range: DepthRange) -> impl Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync {
    move |frag, _| Vec3::splat(range.linear_depth(frag.raster_position.z)).extend(1.0)
}

/// Simple directional + ambient shading configuration.
#[derive(Copy, Clone, Debug)]
pub struct ShadingConfig {
    /// Direction the light is coming from (world space).
    pub light_dir: Vec3,
    /// Constant ambient term added to all fragments.
    pub ambient: f32,
    /// Strength of the directional (Lambert) term.
    pub diffuse: f32,
}

impl Default for ShadingConfig {
    fn default() -> Self {
        Self {
            // Slightly from +X/+Z and above
            light_dir: Vec3::new(0.4, 1.0, 0.3).normalize(),
            ambient: 0.35,
            diffuse: 0.65,
        }
    }
}

impl ShadingConfig {
    /// Scalar light intensity in [0, 1] for an (unnormalized) surface normal.
    #[inline]
    pub fn light(&self, normal: Vec3) -> f32 {
        let lambert = normal.normalize_or_zero().dot(self.light_dir).max(0.0);
        (self.ambient + self.diffuse * lambert).clamp(0.0, 1.0)
    }

    /// Lambert-lit fragment shader with a constant base color.
    pub fn lambert_shader(self, base: Vec3) -> impl Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync {
        move |frag, _| (base * self.light(frag.normal)).extend(1.0)
    }
}

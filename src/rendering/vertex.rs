/// Shaded vertex records, triangle primitives and the fragment context
use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use std::ops::{Add, Mul, Sub};

/// Vertex shader output, also the interpolated fragment input.
///
/// Out of the vertex shader `raster_position` is in clip space. After
/// interpolation its `xyz` hold normalized device coordinates and `w` keeps
/// the clip-space `w` (the depth before the homogeneous division).
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct VertexOut {
    pub raster_position: Vec4,
    /// User-defined position, typically world space.
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

pub type FragIn = VertexOut;

impl VertexOut {
    #[inline]
    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        *self + (*other - *self) * t
    }

    /// Normalized device coordinates of a clip-space `raster_position`.
    #[inline]
    pub fn ndc(&self) -> Vec3 {
        clip_to_ndc(self.raster_position)
    }
}

impl Add for VertexOut {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            raster_position: self.raster_position + rhs.raster_position,
            position: self.position + rhs.position,
            normal: self.normal + rhs.normal,
            tex_coord: self.tex_coord + rhs.tex_coord,
        }
    }
}

impl Sub for VertexOut {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            raster_position: self.raster_position - rhs.raster_position,
            position: self.position - rhs.position,
            normal: self.normal - rhs.normal,
            tex_coord: self.tex_coord - rhs.tex_coord,
        }
    }
}

impl Mul<f32> for VertexOut {
    type Output = Self;
    #[inline]
    fn mul(self, s: f32) -> Self {
        Self {
            raster_position: self.raster_position * s,
            position: self.position * s,
            normal: self.normal * s,
            tex_coord: self.tex_coord * s,
        }
    }
}

impl Mul<VertexOut> for f32 {
    type Output = VertexOut;
    #[inline]
    fn mul(self, v: VertexOut) -> VertexOut {
        v * self
    }
}

#[inline]
pub fn clip_to_ndc(clip: Vec4) -> Vec3 {
    clip.xyz() / clip.w
}

/// NDC ((-1, -1, 0)..(1, 1, 1)) to viewport pixels ((0, 0)..(width, height)).
/// Y is flipped so +Y NDC is the top row. Z passes through.
#[inline]
pub fn ndc_to_viewport(width: usize, height: usize, ndc: Vec3) -> Vec3 {
    let pixel = (Vec2::new(ndc.x, -ndc.y) * 0.5 + Vec2::splat(0.5)) * Vec2::new(width as f32, height as f32);
    pixel.extend(ndc.z)
}

/// One assembled triangle after the vertex stage.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrianglePrimitive {
    /// Index of the triangle in the draw's triangle list.
    pub id: u32,
    pub vertices: [VertexOut; 3],
}

impl TrianglePrimitive {
    /// Affine combination of the three vertices with weights `bary`.
    #[inline]
    pub fn interpolate(&self, bary: Vec3) -> VertexOut {
        let [v0, v1, v2] = self.vertices;
        v0 * bary.x + v1 * bary.y + v2 * bary.z
    }

    /// True if any vertex lies on or behind the eye plane (`w <= 0`). Such a
    /// triangle's projected bounds are not conservative.
    #[inline]
    pub fn crosses_eye_plane(&self) -> bool {
        self.vertices.iter().any(|v| !(v.raster_position.w > 0.0))
    }

    /// Viewport coordinates (pixels, NDC depth) of the three vertices.
    #[inline]
    pub fn viewport_coords(&self, width: usize, height: usize) -> [Vec3; 3] {
        self.vertices
            .map(|v| ndc_to_viewport(width, height, clip_to_ndc(v.raster_position)))
    }
}

/// One active edge of the scanline rasterizer, as seen by a fragment.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ScanlineEdge {
    /// X at the top of the current scanline.
    pub x0: f32,
    /// X per scanline (inverse slope).
    pub dx: f32,
    /// Scanlines left on this edge.
    pub dy: i32,
}

/// Per-fragment rasterization context handed to the fragment shader.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FragmentContext {
    pub primitive_id: u32,
    /// Sample position in pixels (pixel center).
    pub sample: Vec2,
    /// Active edge pair when produced by the scanline z-buffer.
    pub scanline_edges: Option<[ScanlineEdge; 2]>,
}

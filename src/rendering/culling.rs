/// Face culling and clipping for assembled primitives
use super::vertex::{clip_to_ndc, TrianglePrimitive};

/// Which faces are discarded before rasterization.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CullMode {
    None,
    FrontFace,
    #[default]
    BackFace,
}

impl CullMode {
    pub const ALL: [CullMode; 3] = [CullMode::None, CullMode::FrontFace, CullMode::BackFace];

    /// True if a primitive with the given facing survives this mode.
    #[inline]
    pub fn keeps(self, front_facing: bool) -> bool {
        match self {
            CullMode::None => true,
            CullMode::FrontFace => !front_facing,
            CullMode::BackFace => front_facing,
        }
    }
}

/// Twice the signed area of the primitive's NDC projection.
/// Positive means counter-clockwise.
#[inline]
pub fn signed_ndc_area(primitive: &TrianglePrimitive) -> f32 {
    let [a, b, c] = primitive
        .vertices
        .map(|v| clip_to_ndc(v.raster_position).truncate());
    (b - a).perp_dot(c - a)
}

/// Counter-clockwise in NDC is front facing. Zero-area (and NaN) triangles
/// are back facing.
#[inline]
pub fn is_front_facing(primitive: &TrianglePrimitive) -> bool {
    signed_ndc_area(primitive) > 0.0
}

/// View-volume clipping stage. Primitives currently pass through untouched;
/// out-of-range fragments are rejected per pixel instead.
#[inline]
pub fn clip_primitive(primitive: TrianglePrimitive) -> Option<TrianglePrimitive> {
    Some(primitive)
}

/// Per-triangle rasterization: the shared pixel stage plus the Naive and
/// BoundedNaive traversals, gated by the Hi-Z pyramid
///
/// Triangles are processed one at a time in submission order. The pixels of a
/// single triangle are shaded in parallel over disjoint row stripes, so the
/// final buffers do not depend on scheduling.
use super::framebuffer::Framebuffer;
use super::hiz_buffer::HiZPyramid;
use super::pipeline::RasterMode;
use super::surface::PixelRect;
use super::vertex::{clip_to_ndc, FragmentContext, ScanlineEdge, TrianglePrimitive, VertexOut};
use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;
use glam::{DVec2, DVec3, Vec2, Vec3, Vec4};
use rayon::prelude::*;

/// Edge length of the square tiles the Naive traversal is split into.
pub const TILE_SIZE: usize = 16;

/// Barycentric weights of `p` with respect to the 2D triangle (v0, v1, v2),
/// computed in f64 so samples stay distinct next to far-projected vertices.
/// Degenerate triangles yield non-finite weights.
#[inline]
pub fn barycentric(v0: Vec2, v1: Vec2, v2: Vec2, p: Vec2) -> DVec3 {
    let v0 = v0.as_dvec2();
    let v0v1 = v1.as_dvec2() - v0;
    let v0v2 = v2.as_dvec2() - v0;
    let v0p = p.as_dvec2() - v0;

    let det = v0v1.perp_dot(v0v2);
    let a = v0p.perp_dot(v0v2) / det;
    let b = v0v1.perp_dot(v0p) / det;
    DVec3::new(1.0 - a - b, a, b)
}

/// Sample lies inside (or on an edge of) the triangle. NaN weights are outside.
#[inline]
pub fn is_inside(bary: DVec3) -> bool {
    bary.x >= 0.0 && bary.y >= 0.0 && bary.z >= 0.0 && bary.z <= 1.0
}

/// A primitive together with its viewport coordinates (pixels, NDC depth).
#[derive(Copy, Clone, Debug)]
pub struct ScreenTriangle<'p> {
    pub primitive: &'p TrianglePrimitive,
    pub coords: [Vec3; 3],
}

impl<'p> ScreenTriangle<'p> {
    pub fn new(primitive: &'p TrianglePrimitive, width: usize, height: usize) -> Self {
        Self {
            primitive,
            coords: primitive.viewport_coords(width, height),
        }
    }

    #[inline]
    pub fn xy(&self) -> [Vec2; 3] {
        self.coords.map(|c| c.truncate())
    }

    /// Smallest vertex depth. Every fragment of a triangle in front of the
    /// eye lies at this depth or farther.
    #[inline]
    pub fn nearest_depth(&self) -> f32 {
        self.coords[0].z.min(self.coords[1].z).min(self.coords[2].z)
    }

    /// Pixels the triangle can touch, or `None` if it lies off screen.
    pub fn screen_rect(&self, width: usize, height: usize) -> Option<PixelRect> {
        let [a, b, c] = self.xy();
        PixelRect::covering(a.min(b).min(c), a.max(b).max(c), width, height)
    }

    /// Box and nearest depth for a Hi-Z query. `None` when the projected
    /// bounds are not conservative (a vertex at or behind the eye) or the
    /// triangle is off screen.
    pub fn occlusion_bounds(&self, width: usize, height: usize) -> Option<(PixelRect, f32)> {
        if self.primitive.crosses_eye_plane() {
            return None;
        }
        self.screen_rect(width, height)
            .map(|rect| (rect, self.nearest_depth()))
    }

    /// Region whose depth may change when this triangle is rasterized.
    pub fn touched_rect(&self, width: usize, height: usize) -> Option<PixelRect> {
        if self.primitive.crosses_eye_plane() {
            if width == 0 || height == 0 {
                return None;
            }
            return Some(PixelRect {
                x0: 0,
                y0: 0,
                x1: width - 1,
                y1: height - 1,
            });
        }
        self.screen_rect(width, height)
    }
}

/// Pixel stage: containment, interpolation, depth range and depth test, then
/// depth and color writes. Returns true if the fragment was written.
#[inline]
pub(crate) fn shade_pixel<F>(
    triangle: &ScreenTriangle<'_>,
    fragment_shader: &F,
    x: usize,
    y: usize,
    depth: &mut f32,
    color: &mut Vec4,
    scanline_edges: Option<[ScanlineEdge; 2]>,
) -> bool
where
    F: Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync,
{
    count_call!(FUNCTION_COUNTERS.pixels_tested);

    let sample = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
    let [v0, v1, v2] = triangle.xy();
    let bary = barycentric(v0, v1, v2, sample);
    if !is_inside(bary) {
        return false;
    }

    // Interpolated in clip space, then divided
    let mut frag = triangle.primitive.interpolate(bary.as_vec3());
    let ndc = clip_to_ndc(frag.raster_position);
    frag.raster_position = ndc.extend(frag.raster_position.w);

    if !(ndc.z > 0.0 && ndc.z <= 1.0) {
        return false;
    }
    if !(ndc.z < *depth) {
        count_call!(FUNCTION_COUNTERS.depth_test_failed);
        return false;
    }
    count_call!(FUNCTION_COUNTERS.depth_test_passed);

    *depth = ndc.z;
    let context = FragmentContext {
        primitive_id: triangle.primitive.id,
        sample,
        scanline_edges,
    };
    *color = fragment_shader(&frag, &context);
    true
}

/// Visit every pixel of the viewport, parallel over 16-row stripes that are
/// walked in 16-column tiles.
pub fn rasterize_naive<F>(framebuffer: &mut Framebuffer, triangle: &ScreenTriangle<'_>, fragment_shader: &F)
where
    F: Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync,
{
    let width = framebuffer.width();
    let height = framebuffer.height();

    framebuffer
        .par_stripes(0, height, TILE_SIZE)
        .for_each(|mut slice| {
            for tile_x0 in (0..width).step_by(TILE_SIZE) {
                let tile_x1 = (tile_x0 + TILE_SIZE).min(width);
                for y in slice.rows() {
                    for x in tile_x0..tile_x1 {
                        if let Some((depth, color)) = slice.texels_mut(x, y) {
                            shade_pixel(triangle, fragment_shader, x, y, depth, color, None);
                        }
                    }
                }
            }
        });
}

/// Inclusive pixel span `(x0, x1)` per row for rows `first_row..`, or `None`
/// when the triangle covers no row of the viewport.
///
/// The triangle is sorted by y and split at the middle vertex into an upper
/// and a lower part. Each row's span is bounded by the part's two edges
/// evaluated at the top and the bottom of the row (clamped to the part),
/// then padded by one pixel and one row. Edges are evaluated in f64 so
/// vertices projected far off screen (a vertex just in front of the eye)
/// keep the spans conservative.
pub(crate) fn bounded_spans(
    coords: [Vec2; 3],
    width: usize,
    height: usize,
) -> Option<(usize, Vec<Option<(usize, usize)>>)> {
    if width == 0 || height == 0 || !coords.iter().all(|p| p.is_finite()) {
        return None;
    }
    let mut v = coords.map(|p| p.as_dvec2());
    v.sort_by(|a, b| a.y.total_cmp(&b.y));
    if !(v[2].y > v[0].y) {
        return None;
    }
    let v_mid = DVec2::new(edge_x((v[0], v[2]), v[1].y), v[1].y);

    let first = (v[0].y.floor() - 1.0).max(0.0);
    let last = v[2].y.ceil().min(height as f64 - 1.0);
    if first > last {
        return None;
    }
    let first_row = first as usize;
    let mut spans = vec![None; last as usize - first_row + 1];

    // Upper part (v0, v1, v_mid), lower part (v1, v_mid, v2)
    sweep_part(&mut spans, first_row, (v[0], v[1]), (v[0], v_mid), width);
    sweep_part(&mut spans, first_row, (v[1], v[2]), (v_mid, v[2]), width);

    Some((first_row, spans))
}

/// X of the edge `a -> b` (`a.y <= b.y`) at `y`, clamped to its endpoints.
/// Measured from the nearer endpoint so a far-away vertex does not swamp it.
#[inline]
fn edge_x((a, b): (DVec2, DVec2), y: f64) -> f64 {
    if y <= a.y {
        return a.x;
    }
    if y >= b.y {
        return b.x;
    }
    let dx = (b.x - a.x) / (b.y - a.y);
    if y - a.y <= b.y - y {
        a.x + (y - a.y) * dx
    } else {
        b.x - (b.y - y) * dx
    }
}

/// Accumulate row spans of the trapezoid between `left` and `right`, two edges
/// spanning the same y range.
fn sweep_part(
    spans: &mut [Option<(usize, usize)>],
    first_row: usize,
    left: (DVec2, DVec2),
    right: (DVec2, DVec2),
    width: usize,
) {
    let (top, bottom) = (left.0.y, left.1.y);
    if !(bottom > top) {
        return;
    }
    let row_begin = (top.floor() - 1.0).max(first_row as f64) as usize;
    let row_end = (bottom.ceil() + 1.0).min((first_row + spans.len()) as f64) as usize;

    for row in row_begin..row_end {
        let y0 = (row as f64).clamp(top, bottom);
        let y1 = (row as f64 + 1.0).clamp(top, bottom);
        let xs = [edge_x(left, y0), edge_x(left, y1), edge_x(right, y0), edge_x(right, y1)];
        let x_min = xs.iter().copied().fold(f64::INFINITY, f64::min);
        let x_max = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        let lo = (x_min.floor() - 1.0).max(0.0);
        let hi = (x_max.ceil() + 1.0).min(width as f64 - 1.0);
        if !(lo <= hi) {
            continue;
        }
        let (lo, hi) = (lo as usize, hi as usize);
        let slot = &mut spans[row - first_row];
        *slot = Some(match *slot {
            Some((a, b)) => (a.min(lo), b.max(hi)),
            None => (lo, hi),
        });
    }
}

/// Visit only the pixels inside the per-row spans, parallel over rows.
pub fn rasterize_bounded<F>(framebuffer: &mut Framebuffer, triangle: &ScreenTriangle<'_>, fragment_shader: &F)
where
    F: Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync,
{
    let Some((first_row, spans)) = bounded_spans(triangle.xy(), framebuffer.width(), framebuffer.height()) else {
        return;
    };

    framebuffer
        .par_stripes(first_row, first_row + spans.len(), 1)
        .zip(spans.par_iter())
        .for_each(|(mut slice, span)| {
            let Some((x0, x1)) = *span else {
                return;
            };
            let y = slice.y0;
            for x in x0..=x1 {
                if let Some((depth, color)) = slice.texels_mut(x, y) {
                    shade_pixel(triangle, fragment_shader, x, y, depth, color, None);
                }
            }
        });
}

/// Rasterize one triangle with `mode` (Naive or BoundedNaive).
///
/// With a pyramid, the triangle is first tested against it and skipped when
/// occluded; after drawing, the pyramid is refined over the touched box.
/// Returns false if the triangle was rejected by Hi-Z.
pub(crate) fn rasterize_triangle<F>(
    framebuffer: &mut Framebuffer,
    triangle: &ScreenTriangle<'_>,
    mode: RasterMode,
    hiz: Option<&mut HiZPyramid>,
    fragment_shader: &F,
) -> bool
where
    F: Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync,
{
    count_call!(FUNCTION_COUNTERS.rasterize_triangle_calls);
    let (width, height) = (framebuffer.width(), framebuffer.height());

    if let Some(hiz) = hiz.as_deref() {
        if let Some((rect, near)) = triangle.occlusion_bounds(width, height) {
            if hiz.is_occluded(framebuffer.depth(), rect, near) {
                count_call!(FUNCTION_COUNTERS.hiz_rejected_triangles);
                return false;
            }
        }
    }

    match mode {
        RasterMode::Naive => rasterize_naive(framebuffer, triangle, fragment_shader),
        RasterMode::BoundedNaive => rasterize_bounded(framebuffer, triangle, fragment_shader),
        RasterMode::ScanLineZBuffer => {
            unreachable!("scanline primitives are rasterized as a batch")
        }
    }

    if let Some(hiz) = hiz {
        if let Some(rect) = triangle.touched_rect(width, height) {
            hiz.update_region(framebuffer.depth(), rect);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn primitive(points: [(f32, f32, f32); 3]) -> TrianglePrimitive {
        TrianglePrimitive {
            id: 7,
            vertices: points.map(|(x, y, z)| VertexOut {
                raster_position: Vec4::new(x, y, z, 1.0),
                ..VertexOut::default()
            }),
        }
    }

    fn red(_: &VertexOut, _: &FragmentContext) -> Vec4 {
        Vec4::new(1.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn barycentric_weights_sum_to_one() {
        let (a, b, c) = (Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(0.0, 4.0));
        let w = barycentric(a, b, c, Vec2::new(1.0, 1.0));
        assert!((w.x + w.y + w.z - 1.0).abs() < 1e-6);
        assert!(is_inside(w));
        assert!(!is_inside(barycentric(a, b, c, Vec2::new(3.0, 3.0))));
        assert!(!is_inside(barycentric(a, a, a, Vec2::ZERO)), "degenerate is never inside");
    }

    #[test]
    fn bounded_spans_cover_every_inside_center() {
        let coords = [Vec2::new(3.2, 1.7), Vec2::new(17.9, 9.1), Vec2::new(6.4, 19.6)];
        let (first_row, spans) = bounded_spans(coords, 24, 24).unwrap();
        for y in 0..24 {
            for x in 0..24 {
                let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
                if is_inside(barycentric(coords[0], coords[1], coords[2], p)) {
                    let span = spans[y - first_row].expect("row with coverage has a span");
                    assert!(span.0 <= x && x <= span.1, "pixel ({}, {}) outside span {:?}", x, y, span);
                }
            }
        }
    }

    #[test]
    fn bounded_spans_reject_flat_and_offscreen() {
        let flat = [Vec2::new(0.0, 2.0), Vec2::new(5.0, 2.0), Vec2::new(9.0, 2.0)];
        assert!(bounded_spans(flat, 10, 10).is_none());
        let below = [Vec2::new(0.0, 12.0), Vec2::new(5.0, 15.0), Vec2::new(9.0, 13.0)];
        assert!(bounded_spans(below, 10, 10).is_none());
    }

    #[test]
    fn naive_and_bounded_write_identical_pixels() {
        let prim = primitive([(0.1, 0.8, 0.4), (-0.7, -0.3, 0.6), (0.6, -0.9, 0.2)]);
        let mut naive = Framebuffer::new(40, 30);
        let mut bounded = Framebuffer::new(40, 30);

        let tri = ScreenTriangle::new(&prim, 40, 30);
        rasterize_naive(&mut naive, &tri, &red);
        rasterize_bounded(&mut bounded, &tri, &red);

        assert!(naive.covered_pixel_count(Vec4::ZERO) > 0);
        assert_eq!(naive.color(), bounded.color());
        assert_eq!(naive.depth(), bounded.depth());
    }

    #[test]
    fn near_eye_vertex_keeps_bounded_spans_conservative() {
        for w in [1.0e-3, 1.0e-6, 1.0e-9] {
            let mut prim = primitive([(0.0, 1.0, 0.0), (-0.5, -0.5, 0.5), (0.5, -0.5, 0.5)]);
            prim.vertices[0].raster_position.w = w;
            let tri = ScreenTriangle::new(&prim, 32, 32);

            let mut naive = Framebuffer::new(32, 32);
            let mut bounded = Framebuffer::new(32, 32);
            rasterize_naive(&mut naive, &tri, &red);
            rasterize_bounded(&mut bounded, &tri, &red);

            // The wedge below the far vertex fills rows 0..24 between x = 8 and 24
            assert_eq!(naive.covered_pixel_count(Vec4::ZERO), 24 * 16, "w = {}", w);
            assert_eq!(naive.color(), bounded.color(), "w = {}", w);
            assert_eq!(naive.depth(), bounded.depth(), "w = {}", w);
        }
    }

    #[test]
    fn fragments_outside_depth_range_are_rejected() {
        let prim = primitive([(-1.0, 1.0, -0.5), (-1.0, -3.0, -0.5), (3.0, 1.0, -0.5)]);
        let mut fb = Framebuffer::new(8, 8);
        rasterize_naive(&mut fb, &ScreenTriangle::new(&prim, 8, 8), &red);
        assert_eq!(fb.covered_pixel_count(Vec4::ZERO), 0);
    }

    #[test]
    fn hiz_rejects_fully_hidden_triangle() {
        let near = primitive([(-1.0, 1.0, 0.2), (-1.0, -3.0, 0.2), (3.0, 1.0, 0.2)]);
        let far = primitive([(-0.5, 0.5, 0.8), (-0.5, -0.5, 0.8), (0.5, -0.5, 0.8)]);
        let mut fb = Framebuffer::new(32, 32);
        let mut hiz = HiZPyramid::new();
        hiz.prepare(fb.depth());

        let near_tri = ScreenTriangle::new(&near, 32, 32);
        let far_tri = ScreenTriangle::new(&far, 32, 32);
        assert!(rasterize_triangle(&mut fb, &near_tri, RasterMode::BoundedNaive, Some(&mut hiz), &red));
        assert!(!rasterize_triangle(&mut fb, &far_tri, RasterMode::BoundedNaive, Some(&mut hiz), &red));
    }
}

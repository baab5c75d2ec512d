/// Scanline z-buffer rasterization
///
/// All primitives of a draw are swept together, top to bottom:
/// 1. A classified polygon table and a classified edge table bucket every
///    primitive and every non-horizontal edge by the scanline it starts on
/// 2. Entering a scanline activates its polygons and hands its edges to their
///    polygons; a new polygon picks its active edge pair (the tallest edge and
///    the shortest of the rest), the remaining edge waits
/// 3. Each active polygon shades the span bounded by its two edges on this
///    scanline and on the next one
/// 4. An expired edge is replaced by the waiting one, and a polygon whose
///    height is used up is removed
///
/// Edges are clipped to the viewport rows and evaluated per row in f64, so a
/// vertex projected far off screen (just in front of the eye) neither
/// overflows the row bookkeeping nor loses coverage.
///
/// The sweep is sequential and writes the caller's surfaces directly.
use super::framebuffer::Framebuffer;
use super::rasterizer::{shade_pixel, ScreenTriangle};
use super::vertex::{FragmentContext, ScanlineEdge, VertexOut};
use crate::count_call;
use crate::perf::FUNCTION_COUNTERS;
use glam::{DVec2, Vec4};

#[derive(Copy, Clone, Debug)]
struct PolygonEntry {
    triangle: usize,
    /// Scanlines from the start row to the bottom of the triangle.
    rows: usize,
}

/// Edge in viewport pixels, `top.y < bottom.y`.
#[derive(Copy, Clone, Debug)]
struct EdgeLine {
    top: DVec2,
    bottom: DVec2,
}

impl EdgeLine {
    #[inline]
    fn slope(&self) -> f64 {
        (self.bottom.x - self.top.x) / (self.bottom.y - self.top.y)
    }

    /// X at `y`, extrapolated past the endpoints. Measured from the nearer
    /// endpoint so a vertex projected far off screen keeps full precision.
    #[inline]
    fn x_at(&self, y: f64) -> f64 {
        let dx = self.slope();
        if (y - self.top.y).abs() <= (self.bottom.y - y).abs() {
            self.top.x + (y - self.top.y) * dx
        } else {
            self.bottom.x - (self.bottom.y - y) * dx
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct EdgeEntry {
    triangle: usize,
    /// The edge joining the topmost and bottommost vertices.
    long: bool,
    /// First scanline past the edge (clipped to the viewport).
    end_row: usize,
    line: EdgeLine,
}

impl EdgeEntry {
    #[inline]
    fn rows_left(&self, row: usize) -> usize {
        self.end_row.saturating_sub(row)
    }

    /// The edge as seen by fragments on scanline `row`.
    fn at_row(&self, row: usize) -> ScanlineEdge {
        let dx = self.line.slope() as f32;
        ScanlineEdge {
            x0: self.line.x_at(row as f64) as f32,
            dx: if dx.is_finite() { dx } else { 0.0 },
            dy: i32::try_from(self.rows_left(row)).unwrap_or(i32::MAX),
        }
    }
}

#[derive(Debug)]
struct ActivePolygon {
    triangle: usize,
    rows_left: usize,
    edges: Option<[EdgeEntry; 2]>,
    waiting: Vec<EdgeEntry>,
}

/// Edge from `p0` to `p1` (`p0.y < p1.y`) clipped to scanlines
/// `0..height`: its start row, end row (exclusive) and line. `None` when no
/// scanline of the viewport is left.
fn prepare_edge(p0: DVec2, p1: DVec2, height: usize) -> Option<(usize, usize, EdgeLine)> {
    let start = p0.y.floor().max(0.0);
    let end = p1.y.ceil().min(height as f64);
    if !(end > start) {
        return None;
    }
    Some((start as usize, end as usize, EdgeLine { top: p0, bottom: p1 }))
}

#[derive(Debug, Default)]
struct ClassifiedTables {
    polygons: Vec<Vec<PolygonEntry>>,
    edges: Vec<Vec<EdgeEntry>>,
}

impl ClassifiedTables {
    fn build(triangles: &[ScreenTriangle<'_>], height: usize) -> Self {
        let mut tables = Self {
            polygons: vec![Vec::new(); height],
            edges: vec![Vec::new(); height],
        };

        for (index, triangle) in triangles.iter().enumerate() {
            let xy = triangle.xy();
            if !xy.iter().all(|p| p.is_finite()) {
                continue;
            }
            let mut v = xy.map(|p| p.as_dvec2());
            v.sort_by(|a, b| a.y.total_cmp(&b.y));

            let Some((top, bottom, _)) = prepare_edge(v[0], v[2], height) else {
                continue;
            };
            tables.polygons[top].push(PolygonEntry {
                triangle: index,
                rows: bottom - top,
            });

            for (p0, p1, long) in [(v[0], v[2], true), (v[0], v[1], false), (v[1], v[2], false)] {
                if p0.y == p1.y {
                    continue;
                }
                if let Some((start_row, end_row, line)) = prepare_edge(p0, p1, height) {
                    tables.edges[start_row].push(EdgeEntry {
                        triangle: index,
                        long,
                        end_row,
                        line,
                    });
                }
            }
        }
        tables
    }
}

/// Pick the active pair from the edges a polygon starts with: the tallest
/// (the long edge wins ties) and the shortest of the others. Returns the
/// pair and leaves any remaining edge in `waiting`.
fn select_edge_pair(waiting: &mut Vec<EdgeEntry>, triangle: usize, row: usize) -> [EdgeEntry; 2] {
    if !(2..=3).contains(&waiting.len()) {
        log::error!(
            "scanline: triangle {} starts on row {} with {} edges",
            triangle,
            row,
            waiting.len()
        );
        panic!("scanline polygon must start with two or three edges");
    }
    let tallest = (0..waiting.len())
        .max_by_key(|&i| (waiting[i].end_row, waiting[i].long))
        .unwrap_or(0);
    let tall = waiting.remove(tallest);
    let shortest = (0..waiting.len())
        .min_by_key(|&i| waiting[i].end_row)
        .unwrap_or(0);
    let short = waiting.remove(shortest);
    [tall, short]
}

/// Rasterize every triangle with the scanline z-buffer sweep.
/// Returns the number of scanlines visited.
pub fn rasterize_scanline<F>(
    framebuffer: &mut Framebuffer,
    triangles: &[ScreenTriangle<'_>],
    fragment_shader: &F,
) -> usize
where
    F: Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync,
{
    let (width, height) = (framebuffer.width(), framebuffer.height());
    if width == 0 || height == 0 || triangles.is_empty() {
        return 0;
    }
    let mut tables = ClassifiedTables::build(triangles, height);
    let mut active: Vec<ActivePolygon> = Vec::new();
    let (color, depth) = framebuffer.surfaces_mut();
    let mut rows_visited = 0;

    for y in 0..height {
        for entry in std::mem::take(&mut tables.polygons[y]) {
            active.push(ActivePolygon {
                triangle: entry.triangle,
                rows_left: entry.rows,
                edges: None,
                waiting: Vec::with_capacity(3),
            });
        }
        for edge in std::mem::take(&mut tables.edges[y]) {
            match active.iter_mut().find(|p| p.triangle == edge.triangle) {
                Some(polygon) => polygon.waiting.push(edge),
                None => {
                    log::error!("scanline: edge of triangle {} on row {} has no active polygon", edge.triangle, y);
                    panic!("scanline edge table references an inactive polygon");
                }
            }
        }
        if active.is_empty() {
            continue;
        }
        rows_visited += 1;
        count_call!(FUNCTION_COUNTERS.scanline_rows);

        for polygon in active.iter_mut() {
            let pair = match polygon.edges {
                None => select_edge_pair(&mut polygon.waiting, polygon.triangle, y),
                Some(mut pair) => {
                    for slot in pair.iter_mut().filter(|e| e.end_row <= y) {
                        let Some(next) = polygon.waiting.pop() else {
                            log::error!(
                                "scanline: triangle {} ran out of edges on row {} with {} rows left",
                                polygon.triangle,
                                y,
                                polygon.rows_left
                            );
                            panic!("scanline polygon has no edge to continue with");
                        };
                        *slot = next;
                    }
                    pair
                }
            };
            polygon.edges = Some(pair);

            // Span of both edges over the whole row, one pixel of slack
            let (row_top, row_bottom) = (y as f64, y as f64 + 1.0);
            let [a, b] = pair.map(|e| e.line);
            let xs = [a.x_at(row_top), a.x_at(row_bottom), b.x_at(row_top), b.x_at(row_bottom)];
            let x_min = (xs.iter().copied().fold(f64::INFINITY, f64::min).floor() - 1.0).max(0.0);
            let x_max = (xs.iter().copied().fold(f64::NEG_INFINITY, f64::max).ceil() + 1.0).min(width as f64 - 1.0);
            if !(x_min <= x_max) {
                continue;
            }

            let triangle = &triangles[polygon.triangle];
            let edges = pair.map(|e| e.at_row(y));
            for x in x_min as usize..=x_max as usize {
                let mut d = depth.fetch(x, y);
                let mut c = color.fetch(x, y);
                if shade_pixel(triangle, fragment_shader, x, y, &mut d, &mut c, Some(edges)) {
                    *depth.fetch_mut(x, y) = d;
                    *color.fetch_mut(x, y) = c;
                }
            }
        }

        for polygon in active.iter_mut() {
            polygon.rows_left -= 1;
        }
        active.retain(|p| p.rows_left > 0);
    }
    rows_visited
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::rasterizer::rasterize_naive;
    use crate::rendering::vertex::TrianglePrimitive;
    use glam::{Vec2, Vec4};

    fn primitive(id: u32, points: [(f32, f32); 3], z: f32) -> TrianglePrimitive {
        TrianglePrimitive {
            id,
            vertices: points.map(|(x, y)| VertexOut {
                raster_position: Vec4::new(x, y, z, 1.0),
                ..VertexOut::default()
            }),
        }
    }

    fn white(_: &VertexOut, _: &FragmentContext) -> Vec4 {
        Vec4::ONE
    }

    #[test]
    fn edge_starts_at_top_of_first_scanline() {
        let (row, end, line) = prepare_edge(DVec2::new(2.0, 1.5), DVec2::new(6.0, 5.5), 12).unwrap();
        assert_eq!((row, end), (1, 6));
        let entry = EdgeEntry {
            triangle: 0,
            long: true,
            end_row: end,
            line,
        };
        let edge = entry.at_row(row);
        assert_eq!(edge.dx, 1.0);
        assert_eq!(edge.x0, 1.5);
        assert_eq!(edge.dy, 5);
    }

    #[test]
    fn edges_are_clipped_to_the_viewport_rows() {
        let (row, end, line) = prepare_edge(DVec2::new(3.0, -1.0e26), DVec2::new(8.0, 24.0), 32).unwrap();
        assert_eq!((row, end), (0, 24));
        assert!((line.x_at(24.0) - 8.0).abs() < 1e-9);
        assert!(prepare_edge(DVec2::new(0.0, -9.0), DVec2::new(1.0, -2.5), 32).is_none());
        assert!(prepare_edge(DVec2::new(0.0, 40.0), DVec2::new(1.0, 50.0), 32).is_none());
    }

    fn near_eye_triangle(w: f32) -> TrianglePrimitive {
        let clip = [
            Vec4::new(0.0, 1.0, 0.0, w),
            Vec4::new(-0.5, -0.5, 0.5, 1.0),
            Vec4::new(0.5, -0.5, 0.5, 1.0),
        ];
        TrianglePrimitive {
            id: 0,
            vertices: clip.map(|raster_position| VertexOut {
                raster_position,
                ..VertexOut::default()
            }),
        }
    }

    #[test]
    fn vertex_just_in_front_of_the_eye_matches_naive() {
        for w in [1.0e-3, 1.0e-6, 1.0e-9] {
            let prim = near_eye_triangle(w);
            let tri = ScreenTriangle::new(&prim, 32, 32);

            let mut scan = Framebuffer::new(32, 32);
            assert_eq!(rasterize_scanline(&mut scan, &[tri], &white), 24);
            let mut naive = Framebuffer::new(32, 32);
            rasterize_naive(&mut naive, &tri, &white);

            assert_eq!(naive.covered_pixel_count(Vec4::ZERO), 24 * 16, "w = {}", w);
            assert_eq!(scan.color(), naive.color(), "w = {}", w);
            assert_eq!(scan.depth(), naive.depth(), "w = {}", w);
        }
    }

    #[test]
    fn extreme_projection_does_not_overflow_row_bookkeeping() {
        // The far vertex lands near -1.6e26 pixels
        let prim = near_eye_triangle(1.0e-25);
        let tri = ScreenTriangle::new(&prim, 32, 32);
        let mut fb = Framebuffer::new(32, 32);
        assert_eq!(rasterize_scanline(&mut fb, &[tri], &white), 24);
    }

    #[test]
    fn shortest_and_tallest_edges_form_the_pair() {
        let coords = [Vec2::new(5.0, 2.2), Vec2::new(9.0, 2.6), Vec2::new(1.0, 9.5)];
        let prim = primitive(0, [(0.0, 0.0); 3], 0.5);
        let tri = ScreenTriangle {
            primitive: &prim,
            coords: coords.map(|c| c.extend(0.5)),
        };
        let mut tables = ClassifiedTables::build(&[tri], 12);
        assert_eq!(tables.polygons[2].len(), 1);
        assert_eq!(tables.polygons[2][0].rows, 8);

        let mut waiting = std::mem::take(&mut tables.edges[2]);
        assert_eq!(waiting.len(), 3);
        let [tall, short] = select_edge_pair(&mut waiting, 0, 2);
        assert!(tall.long);
        assert_eq!(short.rows_left(2), 1);
        assert_eq!(waiting.len(), 1);
    }

    #[test]
    fn overlapping_triangles_resolve_by_depth() {
        let far = primitive(0, [(-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)], 0.8);
        let near = primitive(1, [(-1.0, 1.0), (1.0, -1.0), (1.0, 1.0)], 0.3);
        let tris = [&far, &near].map(|p| ScreenTriangle::new(p, 16, 16));

        let mut fb = Framebuffer::new(16, 16);
        let rows = rasterize_scanline(&mut fb, &tris, &white);
        assert_eq!(rows, 16);
        assert_eq!(fb.covered_pixel_count(Vec4::ZERO), 16 * 16);
        assert!((fb.depth().fetch(15, 0) - 0.3).abs() < 1e-5);
        assert!((fb.depth().fetch(0, 15) - 0.8).abs() < 1e-5);
    }

    #[test]
    fn triangles_above_the_viewport_are_clipped() {
        let tall = primitive(0, [(0.0, 3.0), (-1.0, -1.0), (1.0, -1.0)], 0.5);
        let mut fb = Framebuffer::new(10, 10);
        rasterize_scanline(&mut fb, &[ScreenTriangle::new(&tall, 10, 10)], &white);
        assert!(fb.covered_pixel_count(Vec4::ZERO) > 0);
        assert_eq!(fb.color().get(5, 9), Some(Vec4::ONE));
    }
}

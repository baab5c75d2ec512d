/// Draw-call orchestration: vertex stage, primitive assembly and culling,
/// rasterization in the configured mode, Hi-Z upkeep and statistics
///
/// A frame is `begin_frame` followed by any number of `draw` calls. The caller
/// owns the framebuffer and clears it; the pipeline only reads and writes it.
use super::culling::{clip_primitive, is_front_facing, CullMode};
use super::framebuffer::Framebuffer;
use super::hiz_buffer::HiZPyramid;
use super::rasterizer::{rasterize_triangle, ScreenTriangle};
use super::scanline::rasterize_scanline;
use super::surface::{DepthSurface, PixelRect};
use super::vertex::{FragmentContext, TrianglePrimitive, VertexOut};
use crate::accel::Bvh;
use crate::geometry::Aabb;
use crate::meshing::{Mesh, Vertex};
use crate::perf::{PerfTimer, FUNCTION_COUNTERS};
use crate::{count_add, count_call, perf_scope};
use anyhow::{bail, ensure, Result};
use glam::Vec4;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// How covered pixels are found for each primitive.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum RasterMode {
    /// Test every pixel of the viewport.
    Naive,
    /// Test only pixels inside per-row bounds of the triangle.
    #[default]
    BoundedNaive,
    /// Sweep all primitives of the draw with a scanline edge table.
    ScanLineZBuffer,
}

impl RasterMode {
    pub const ALL: [RasterMode; 3] = [RasterMode::Naive, RasterMode::BoundedNaive, RasterMode::ScanLineZBuffer];

    pub fn name(self) -> &'static str {
        match self {
            RasterMode::Naive => "naive",
            RasterMode::BoundedNaive => "bounded",
            RasterMode::ScanLineZBuffer => "scanline",
        }
    }
}

impl fmt::Display for RasterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RasterMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "naive" => Ok(RasterMode::Naive),
            "bounded" | "boundednaive" | "bounded-naive" => Ok(RasterMode::BoundedNaive),
            "scanline" | "scanlinezbuffer" => Ok(RasterMode::ScanLineZBuffer),
            other => bail!("unknown raster mode '{}' (expected naive, bounded or scanline)", other),
        }
    }
}

/// Pipeline configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RasterDesc {
    /// Viewport size in pixels; must match the framebuffer passed to `draw`.
    pub width: usize,
    pub height: usize,
    pub cull_mode: CullMode,
    pub raster_mode: RasterMode,
    /// Reject triangles (and BVH subtrees) hidden behind already-written depth.
    pub use_hierarchical_z: bool,
    /// Traverse a caller-supplied BVH front-to-back.
    pub use_acceleration_structure: bool,
}

impl Default for RasterDesc {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            cull_mode: CullMode::BackFace,
            raster_mode: RasterMode::BoundedNaive,
            use_hierarchical_z: true,
            use_acceleration_structure: false,
        }
    }
}

/// Per-frame counters, reset by `begin_frame`.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RasterStats {
    /// Primitives that survived culling, summed over draws.
    pub triangle_count: u64,
    pub draw_call_count: u64,
    /// Wall time spent in rasterization.
    pub rasterize_time_ms: f32,
    /// Primitives skipped because the Hi-Z pyramid proved them hidden.
    pub hiz_cull_count: u64,
}

impl fmt::Display for RasterStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Statistics:")?;
        writeln!(f, "Rasterize time: {:.2}ms", self.rasterize_time_ms)?;
        writeln!(f, "Draw call count: {}", self.draw_call_count)?;
        writeln!(f, "Triangle count: {}", self.triangle_count)?;
        write!(f, "Hi-Z culled: {}", self.hiz_cull_count)
    }
}

pub struct RasterPipeline {
    desc: RasterDesc,
    stats: RasterStats,
    hiz: HiZPyramid,
}

impl RasterPipeline {
    pub fn new(desc: RasterDesc) -> Self {
        Self {
            desc,
            stats: RasterStats::default(),
            hiz: HiZPyramid::new(),
        }
    }

    #[inline]
    pub fn desc(&self) -> &RasterDesc {
        &self.desc
    }

    #[inline]
    pub fn stats(&self) -> RasterStats {
        self.stats
    }

    #[inline]
    pub fn raster_mode(&self) -> RasterMode {
        self.desc.raster_mode
    }

    pub fn set_raster_mode(&mut self, mode: RasterMode) {
        self.desc.raster_mode = mode;
    }

    #[inline]
    pub fn cull_mode(&self) -> CullMode {
        self.desc.cull_mode
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.desc.cull_mode = mode;
    }

    pub fn set_use_hierarchical_z(&mut self, enabled: bool) {
        self.desc.use_hierarchical_z = enabled;
    }

    pub fn set_use_acceleration_structure(&mut self, enabled: bool) {
        self.desc.use_acceleration_structure = enabled;
    }

    /// Change the viewport. The caller resizes its framebuffer to match.
    pub fn resize(&mut self, width: usize, height: usize) {
        self.desc.width = width;
        self.desc.height = height;
        self.hiz.mark_stale();
    }

    /// Start a new frame: statistics are reset and the Hi-Z pyramid will be
    /// re-seeded from the depth surface at the next draw.
    pub fn begin_frame(&mut self) {
        self.stats = RasterStats::default();
        self.hiz.mark_stale();
    }

    /// Draw every triangle of `mesh`.
    ///
    /// `bvh` is only used when `use_acceleration_structure` is set and it was
    /// built over this mesh; otherwise it is ignored.
    pub fn draw<V, F>(
        &mut self,
        framebuffer: &mut Framebuffer,
        mesh: &Mesh,
        bvh: Option<&mut Bvh>,
        vertex_shader: &V,
        fragment_shader: &F,
    ) -> Result<()>
    where
        V: Fn(&Vertex) -> VertexOut + Sync,
        F: Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync,
    {
        let (width, height) = (self.desc.width, self.desc.height);
        ensure!(
            (framebuffer.width(), framebuffer.height()) == (width, height),
            "framebuffer is {}x{} but the pipeline viewport is {}x{}",
            framebuffer.width(),
            framebuffer.height(),
            width,
            height
        );
        count_call!(FUNCTION_COUNTERS.draw_calls);

        let vertices = run_vertex_stage(mesh, vertex_shader);
        let primitives = assemble_primitives(&vertices, self.desc.cull_mode);
        count_add!(FUNCTION_COUNTERS.primitives_assembled, primitives.len());
        count_add!(FUNCTION_COUNTERS.primitives_culled, mesh.triangle_count() - primitives.len());

        let timer = PerfTimer::new("rasterize");
        let triangles: Vec<ScreenTriangle<'_>> = primitives
            .par_iter()
            .map(|p| ScreenTriangle::new(p, width, height))
            .collect();

        let mode = self.desc.raster_mode;
        let hiz_culled = match mode {
            RasterMode::ScanLineZBuffer => {
                rasterize_scanline(framebuffer, &triangles, fragment_shader);
                self.hiz.mark_stale();
                0
            }
            RasterMode::Naive | RasterMode::BoundedNaive => {
                let hiz = if self.desc.use_hierarchical_z {
                    self.hiz.prepare(framebuffer.depth());
                    Some(&mut self.hiz)
                } else {
                    self.hiz.mark_stale();
                    None
                };
                let bvh = if self.desc.use_acceleration_structure {
                    bvh.and_then(|bvh| matching_bvh(bvh, mesh.triangle_count()))
                } else {
                    None
                };
                match bvh {
                    Some(bvh) => draw_with_bvh(
                        framebuffer,
                        bvh,
                        hiz,
                        mesh.triangle_count(),
                        &triangles,
                        mode,
                        fragment_shader,
                    ),
                    None => draw_in_order(framebuffer, hiz, &triangles, mode, fragment_shader),
                }
            }
        };

        let elapsed_ms = timer.elapsed_ms();
        self.stats.draw_call_count += 1;
        self.stats.triangle_count += primitives.len() as u64;
        self.stats.rasterize_time_ms += elapsed_ms;
        self.stats.hiz_cull_count += hiz_culled as u64;

        log::debug!(
            "draw: {} mode, {} of {} triangles after culling, {} Hi-Z culled, {:.2}ms",
            mode,
            primitives.len(),
            mesh.triangle_count(),
            hiz_culled,
            elapsed_ms
        );
        Ok(())
    }
}

/// One shader invocation per vertex (non-indexed) or per index (indexed),
/// output in invocation order.
fn run_vertex_stage<V>(mesh: &Mesh, vertex_shader: &V) -> Vec<VertexOut>
where
    V: Fn(&Vertex) -> VertexOut + Sync,
{
    perf_scope!("vertex stage");
    count_add!(FUNCTION_COUNTERS.vertex_invocations, mesh.invocation_count());
    (0..mesh.invocation_count())
        .into_par_iter()
        .map(|i| vertex_shader(mesh.invocation_vertex(i)))
        .collect()
}

/// Group vertex outputs into triangles, drop culled faces and clip the rest.
/// Survivors keep their triangle index as id and stay in submission order.
fn assemble_primitives(vertices: &[VertexOut], cull_mode: CullMode) -> Vec<TrianglePrimitive> {
    perf_scope!("primitive assembly");
    vertices
        .par_chunks_exact(3)
        .enumerate()
        .filter_map(|(i, v)| {
            let primitive = TrianglePrimitive {
                id: i as u32,
                vertices: [v[0], v[1], v[2]],
            };
            if !cull_mode.keeps(is_front_facing(&primitive)) {
                return None;
            }
            clip_primitive(primitive)
        })
        .collect()
}

fn matching_bvh(bvh: &mut Bvh, triangle_count: usize) -> Option<&mut Bvh> {
    let leaves = bvh.root().map_or(0, |root| root.leaf_count as usize);
    if leaves != triangle_count || bvh.is_empty() {
        log::warn!(
            "ignoring BVH with {} leaves for a mesh with {} triangles",
            leaves,
            triangle_count
        );
        return None;
    }
    Some(bvh)
}

/// Rasterize triangles in submission order. Returns the Hi-Z cull count.
fn draw_in_order<F>(
    framebuffer: &mut Framebuffer,
    mut hiz: Option<&mut HiZPyramid>,
    triangles: &[ScreenTriangle<'_>],
    mode: RasterMode,
    fragment_shader: &F,
) -> usize
where
    F: Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync,
{
    let mut culled = 0;
    for triangle in triangles {
        if !rasterize_triangle(framebuffer, triangle, mode, hiz.as_deref_mut(), fragment_shader) {
            culled += 1;
        }
    }
    culled
}

/// Screen-space box of a triangle: viewport x/y and NDC depth. Unbounded when
/// a vertex is at or behind the eye.
fn viewport_aabb(triangle: &ScreenTriangle<'_>) -> Aabb {
    if triangle.primitive.crosses_eye_plane() {
        Aabb::EVERYTHING
    } else {
        Aabb::from_points(triangle.coords)
    }
}

fn bounds_occluded(hiz: &HiZPyramid, depth: &DepthSurface, bounds: &Aabb) -> bool {
    let Some(rect) = PixelRect::covering(
        bounds.min.truncate(),
        bounds.max.truncate(),
        depth.width(),
        depth.height(),
    ) else {
        return false;
    };
    hiz.is_occluded(depth, rect, bounds.min.z)
}

/// Refresh the BVH's screen-space boxes and walk it front-to-back, skipping
/// subtrees the Hi-Z pyramid proves hidden. Returns the Hi-Z cull count.
fn draw_with_bvh<F>(
    framebuffer: &mut Framebuffer,
    bvh: &mut Bvh,
    mut hiz: Option<&mut HiZPyramid>,
    triangle_count: usize,
    triangles: &[ScreenTriangle<'_>],
    mode: RasterMode,
    fragment_shader: &F,
) -> usize
where
    F: Fn(&VertexOut, &FragmentContext) -> Vec4 + Sync,
{
    // Triangle index -> position in `triangles`, `None` when culled
    let mut live = vec![None; triangle_count];
    for (i, triangle) in triangles.iter().enumerate() {
        live[triangle.primitive.id as usize] = Some(i);
    }
    for (triangle, slot) in live.iter().enumerate() {
        if let Some(leaf) = bvh.leaf_by_triangle_mut(triangle as u32) {
            leaf.viewport_aabb = slot.map_or(Aabb::EMPTY, |i| viewport_aabb(&triangles[i]));
        }
    }
    bvh.update_viewport_data();

    let mut culled = 0;
    let mut skipped = Vec::new();
    bvh.traverse(|index, node| {
        count_call!(FUNCTION_COUNTERS.bvh_nodes_visited);
        if node.viewport_aabb.is_empty() {
            node.culled_last_frame = false;
            return false;
        }
        let occluded = hiz
            .as_deref()
            .is_some_and(|hiz| bounds_occluded(hiz, framebuffer.depth(), &node.viewport_aabb));
        node.culled_last_frame = occluded;
        if occluded {
            skipped.push(index);
            return false;
        }
        if let Some(i) = node.triangle().and_then(|t| live[t as usize]) {
            if !rasterize_triangle(framebuffer, &triangles[i], mode, hiz.as_deref_mut(), fragment_shader) {
                culled += 1;
            }
        }
        true
    });

    for index in skipped {
        culled += live_triangles_under(bvh, index, &live);
    }
    culled
}

fn live_triangles_under(bvh: &Bvh, root: u32, live: &[Option<usize>]) -> usize {
    let mut count = 0;
    let mut stack = vec![root];
    while let Some(index) = stack.pop() {
        let Some(node) = bvh.node(index) else {
            continue;
        };
        match node.triangle() {
            Some(t) => count += usize::from(live.get(t as usize).is_some_and(Option::is_some)),
            None => stack.extend_from_slice(node.children()),
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::shading::ndc_vertex_shader;
    use glam::{Vec2, Vec3};

    fn triangle_mesh(points: &[[f32; 3]]) -> Mesh {
        Mesh::from_vertices(
            points
                .iter()
                .map(|p| Vertex::new(Vec3::from(*p), Vec3::Z, Vec2::ZERO))
                .collect(),
        )
    }

    fn red(_: &VertexOut, _: &FragmentContext) -> Vec4 {
        Vec4::new(1.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn defaults_follow_reference_configuration() {
        let desc = RasterDesc::default();
        assert_eq!(desc.cull_mode, CullMode::BackFace);
        assert_eq!(desc.raster_mode, RasterMode::BoundedNaive);
        assert!(desc.use_hierarchical_z);
        assert!(!desc.use_acceleration_structure);
    }

    #[test]
    fn raster_mode_parses_names() {
        for mode in RasterMode::ALL {
            assert_eq!(mode.name().parse::<RasterMode>().unwrap(), mode);
        }
        assert!("wireframe".parse::<RasterMode>().is_err());
    }

    #[test]
    fn assembly_keeps_ids_and_order() {
        // front, back, front
        let mesh = triangle_mesh(&[
            [0.0, 0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5],
            [0.0, 0.5, 0.5], [0.5, -0.5, 0.5], [-0.5, -0.5, 0.5],
            [0.0, 0.9, 0.5], [-0.9, 0.0, 0.5], [0.9, 0.0, 0.5],
        ]);
        let vertices = run_vertex_stage(&mesh, &ndc_vertex_shader);
        let ids: Vec<u32> = assemble_primitives(&vertices, CullMode::BackFace).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![0, 2]);
        let ids: Vec<u32> = assemble_primitives(&vertices, CullMode::FrontFace).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(assemble_primitives(&vertices, CullMode::None).len(), 3);
    }

    #[test]
    fn stats_accumulate_and_reset() {
        let mesh = triangle_mesh(&[[0.0, 0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5]]);
        let mut fb = Framebuffer::new(32, 32);
        let mut pipeline = RasterPipeline::new(RasterDesc {
            width: 32,
            height: 32,
            ..RasterDesc::default()
        });

        pipeline.begin_frame();
        pipeline.draw(&mut fb, &mesh, None, &ndc_vertex_shader, &red).unwrap();
        pipeline.draw(&mut fb, &mesh, None, &ndc_vertex_shader, &red).unwrap();
        let stats = pipeline.stats();
        assert_eq!(stats.draw_call_count, 2);
        assert_eq!(stats.triangle_count, 2);
        assert!(stats.to_string().contains("Draw call count: 2"));

        pipeline.begin_frame();
        assert_eq!(pipeline.stats().draw_call_count, 0);
        assert_eq!(pipeline.stats().triangle_count, 0);
    }

    #[test]
    fn mismatched_framebuffer_is_an_error() {
        let mesh = triangle_mesh(&[[0.0, 0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5]]);
        let mut fb = Framebuffer::new(16, 16);
        let mut pipeline = RasterPipeline::new(RasterDesc::default());
        assert!(pipeline.draw(&mut fb, &mesh, None, &ndc_vertex_shader, &red).is_err());

        pipeline.resize(16, 16);
        assert!(pipeline.draw(&mut fb, &mesh, None, &ndc_vertex_shader, &red).is_ok());
    }

    #[test]
    fn mismatched_bvh_is_ignored() {
        let mesh = triangle_mesh(&[[0.0, 0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5]]);
        let other = triangle_mesh(&[
            [0.0, 0.5, 0.5], [-0.5, -0.5, 0.5], [0.5, -0.5, 0.5],
            [0.0, 0.9, 0.5], [-0.9, 0.0, 0.5], [0.9, 0.0, 0.5],
        ]);
        let mut bvh = Bvh::from_mesh(&other).unwrap();
        assert!(matching_bvh(&mut bvh, mesh.triangle_count()).is_none());
        assert!(matching_bvh(&mut bvh, other.triangle_count()).is_some());
    }
}

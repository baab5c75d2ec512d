/// Headless demo: renders an orbiting sphere scene in every raster mode and
/// prints the per-frame statistics.
///
/// Usage: soft_raster [width] [height] [mode]
use anyhow::{Context, Result};
use glam::{Mat4, Vec3, Vec4};
use log::{info, warn};
use mimalloc::MiMalloc;
use soft_raster::meshing::primitives::{quad, uv_sphere};
use soft_raster::rendering::shading::{transform_vertex_shader, ShadingConfig};
use soft_raster::rendering::DEPTH_CLEAR;
use soft_raster::*;
use std::time::Instant;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const CLEAR_COLOR: Vec4 = Vec4::new(0.53, 0.81, 0.92, 1.0);
const FRAMES: usize = 8;

struct Options {
    width: usize,
    height: usize,
    mode: Option<RasterMode>,
}

fn parse_options() -> Result<Options> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let defaults = RasterDesc::default();
    let width = match args.first() {
        Some(w) => w.parse().with_context(|| format!("invalid width '{}'", w))?,
        None => defaults.width,
    };
    let height = match args.get(1) {
        Some(h) => h.parse().with_context(|| format!("invalid height '{}'", h))?,
        None => defaults.height,
    };
    let mode = args.get(2).map(|m| m.parse::<RasterMode>()).transpose()?;
    Ok(Options { width, height, mode })
}

/// Occluder in front, a large sphere behind it and a floor.
fn build_scene() -> Result<Mesh> {
    let parts = [
        uv_sphere(Vec3::new(0.0, 0.0, 0.0), 1.5, 48, 64),
        uv_sphere(Vec3::new(0.0, 0.0, -6.0), 3.0, 32, 48),
        quad(Vec3::new(0.0, -1.5, 0.0), 12.0),
    ];

    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for part in &parts {
        let base = vertices.len() as u32;
        vertices.extend_from_slice(part.vertices());
        if part.is_indexed() {
            indices.extend(part.indices().iter().map(|i| i + base));
        } else {
            indices.extend(base..base + part.vertices().len() as u32);
        }
    }
    Mesh::new(vertices, indices)
}

fn render_frames(
    pipeline: &mut RasterPipeline,
    framebuffer: &mut Framebuffer,
    mesh: &Mesh,
    mut bvh: Option<&mut Bvh>,
    camera: &mut Camera,
) -> Result<RasterStats> {
    let fragment_shader = ShadingConfig::default().lambert_shader(Vec3::new(0.9, 0.7, 0.5));
    let mut total = RasterStats::default();

    for frame in 0..FRAMES {
        camera.orbit(Vec3::ZERO, 8.0, 2.0, frame as f32 * 0.25);
        let vertex_shader = transform_vertex_shader(Mat4::IDENTITY, camera.view_projection_matrix());

        framebuffer.clear(CLEAR_COLOR, DEPTH_CLEAR);
        pipeline.begin_frame();
        pipeline.draw(framebuffer, mesh, bvh.as_deref_mut(), &vertex_shader, &fragment_shader)?;

        let stats = pipeline.stats();
        total.triangle_count += stats.triangle_count;
        total.draw_call_count += stats.draw_call_count;
        total.rasterize_time_ms += stats.rasterize_time_ms;
        total.hiz_cull_count += stats.hiz_cull_count;
    }
    Ok(total)
}

fn main() -> Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()?;

    let options = parse_options()?;
    println!("=== Soft Raster - Software Rasterizer ===");
    println!("Resolution: {}x{}", options.width, options.height);

    let build_start = Instant::now();
    let mesh = build_scene()?;
    let mut bvh = Bvh::new();
    let bvh_stats = bvh.build(&mesh)?;
    info!(
        "Scene: {} triangles, BVH {} nodes depth {} built in {:.2}ms",
        mesh.triangle_count(),
        bvh_stats.node_count,
        bvh_stats.max_depth,
        build_start.elapsed().as_secs_f32() * 1000.0
    );

    let modes: Vec<RasterMode> = match options.mode {
        Some(mode) => vec![mode],
        None => RasterMode::ALL.to_vec(),
    };

    let mut framebuffer = Framebuffer::new(options.width, options.height);
    let mut camera = Camera::new(Vec3::ZERO, options.width as f32 / options.height.max(1) as f32);
    let mut pipeline = RasterPipeline::new(RasterDesc {
        width: options.width,
        height: options.height,
        ..RasterDesc::default()
    });

    for mode in modes {
        pipeline.set_raster_mode(mode);
        for (use_hiz, use_bvh) in [(false, false), (true, false), (true, true)] {
            if use_bvh && mode == RasterMode::ScanLineZBuffer {
                continue;
            }
            pipeline.set_use_hierarchical_z(use_hiz);
            pipeline.set_use_acceleration_structure(use_bvh);

            let total = render_frames(
                &mut pipeline,
                &mut framebuffer,
                &mesh,
                use_bvh.then_some(&mut bvh),
                &mut camera,
            )?;
            let covered = framebuffer.covered_pixel_count(CLEAR_COLOR);
            if covered == 0 {
                warn!("{}: last frame covered no pixels", mode);
            }

            println!();
            println!("--- mode={} hiz={} bvh={} ({} frames) ---", mode, use_hiz, use_bvh, FRAMES);
            println!("{}", total);
            println!("Average: {:.2}ms/frame", total.rasterize_time_ms / FRAMES as f32);
            println!("Covered pixels (last frame): {}", covered);
        }
    }

    #[cfg(feature = "profiling")]
    FUNCTION_COUNTERS.snapshot().print_report();

    Ok(())
}

/// Benchmark suite for the raster pipeline
/// Compares the three rasterization strategies with and without Hi-Z culling.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::{Mat4, Vec3, Vec4};
use soft_raster::meshing::primitives::uv_sphere;
use soft_raster::rendering::shading::{transform_vertex_shader, ShadingConfig};
use soft_raster::rendering::{pseudo_color, DEPTH_CLEAR};
use soft_raster::{Bvh, Camera, FragmentContext, Framebuffer, Mesh, RasterDesc, RasterMode, RasterPipeline, VertexOut};

const WIDTH: usize = 1280;
const HEIGHT: usize = 720;

fn scene() -> (Mesh, Mat4) {
    let mesh = uv_sphere(Vec3::ZERO, 1.5, 48, 64);
    let mut camera = Camera::new(Vec3::ZERO, WIDTH as f32 / HEIGHT as f32);
    camera.orbit(Vec3::ZERO, 4.0, 1.0, 0.6);
    (mesh, camera.view_projection_matrix())
}

fn id_shader(_: &VertexOut, ctx: &FragmentContext) -> Vec4 {
    pseudo_color(ctx.primitive_id)
}

fn bench_draw_sphere(c: &mut Criterion) {
    let mut group = c.benchmark_group("draw_sphere");
    let (mesh, proj_view) = scene();
    let vertex_shader = transform_vertex_shader(Mat4::IDENTITY, proj_view);

    for mode in RasterMode::ALL {
        for hiz in [false, true] {
            let mut framebuffer = Framebuffer::new(WIDTH, HEIGHT);
            let mut pipeline = RasterPipeline::new(RasterDesc {
                raster_mode: mode,
                use_hierarchical_z: hiz,
                ..RasterDesc::default()
            });
            let id = format!("{}/hiz={}", mode, hiz);

            group.bench_with_input(BenchmarkId::from_parameter(id), &mode, |b, _| {
                b.iter(|| {
                    framebuffer.clear(Vec4::ZERO, DEPTH_CLEAR);
                    pipeline.begin_frame();
                    pipeline
                        .draw(&mut framebuffer, black_box(&mesh), None, &vertex_shader, &id_shader)
                        .unwrap();
                });
            });
        }
    }

    group.finish();
}

fn bench_draw_with_bvh(c: &mut Criterion) {
    c.bench_function("draw_sphere_bvh", |b| {
        let (mesh, proj_view) = scene();
        let vertex_shader = transform_vertex_shader(Mat4::IDENTITY, proj_view);
        let fragment_shader = ShadingConfig::default().lambert_shader(Vec3::new(0.8, 0.6, 0.4));
        let mut bvh = Bvh::from_mesh(&mesh).unwrap();
        let mut framebuffer = Framebuffer::new(WIDTH, HEIGHT);
        let mut pipeline = RasterPipeline::new(RasterDesc {
            use_acceleration_structure: true,
            ..RasterDesc::default()
        });

        b.iter(|| {
            framebuffer.clear(Vec4::ZERO, DEPTH_CLEAR);
            pipeline.begin_frame();
            pipeline
                .draw(&mut framebuffer, black_box(&mesh), Some(&mut bvh), &vertex_shader, &fragment_shader)
                .unwrap();
        });
    });
}

fn bench_framebuffer_clear(c: &mut Criterion) {
    c.bench_function("framebuffer_clear", |b| {
        let mut framebuffer = Framebuffer::new(WIDTH, HEIGHT);

        b.iter(|| {
            framebuffer.clear(black_box(Vec4::ZERO), black_box(DEPTH_CLEAR));
        });
    });
}

criterion_group!(benches, bench_draw_sphere, bench_draw_with_bvh, bench_framebuffer_clear);
criterion_main!(benches);

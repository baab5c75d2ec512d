pub mod accel;
pub mod camera;
pub mod geometry;
pub mod meshing;
pub mod perf;
/// Soft Raster - CPU triangle rasterization core
/// Scanline z-buffer, hierarchical-Z occlusion culling and a BVH, built as benchmarkable components
pub mod rendering;

pub use accel::{BuildStats, Bvh, BvhNode, BVH_FAN_OUT};
pub use camera::Camera;
pub use geometry::Aabb;
pub use meshing::{Mesh, Vertex};
pub use perf::{CounterSnapshot, FunctionCounters, PerfTimer, FUNCTION_COUNTERS};
pub use rendering::{
    CullMode, FragmentContext, Framebuffer, HiZPyramid, RasterDesc, RasterMode, RasterPipeline, RasterStats,
    TrianglePrimitive, VertexOut,
};

pub mod culling;
/// Software rasterization pipeline
/// Caller-owned surfaces, three rasterization strategies and Hi-Z occlusion culling
pub mod framebuffer;
pub mod hiz_buffer;
pub mod pipeline;
pub mod rasterizer;
pub mod scanline;
pub mod shading;
pub mod surface;
pub mod vertex;

pub use culling::CullMode;
pub use framebuffer::{Framebuffer, DEPTH_CLEAR};
pub use hiz_buffer::{HiZPyramid, HIZ_TEXEL_BUDGET};
pub use pipeline::{RasterDesc, RasterMode, RasterPipeline, RasterStats};
pub use shading::{pseudo_color, ShadingConfig};
pub use surface::{ColorSurface, DepthSurface, PixelRect, Surface};
pub use vertex::{FragIn, FragmentContext, ScanlineEdge, TrianglePrimitive, VertexOut};

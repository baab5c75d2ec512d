/// Mesh buffers handed to the pipeline and the BVH builder,
/// plus a few procedural generators
pub mod mesh;
pub mod primitives;

pub use mesh::{Mesh, Vertex};

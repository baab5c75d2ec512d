/// Spatial acceleration structures
pub mod bvh;

pub use bvh::{BuildStats, Bvh, BvhNode, BvhNodeKind, BVH_FAN_OUT};

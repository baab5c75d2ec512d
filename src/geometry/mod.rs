/// Geometric primitives shared by the acceleration structure and the pipeline
pub mod aabb;

pub use aabb::Aabb;

/// Perspective camera producing the projection-view matrix the stock vertex
/// shader consumes (right-handed, depth in [0, 1])
use crate::rendering::shading::DepthRange;
use glam::{Mat4, Quat, Vec3};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,   // Rotation around Y axis (radians)
    pub pitch: f32, // Rotation around X axis (radians)
    /// Vertical field of view (radians).
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub aspect_ratio: f32,
}

impl Camera {
    pub fn new(position: Vec3, aspect_ratio: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fov_y: 60.0f32.to_radians(),
            near: 0.01,
            far: 10000.0,
            aspect_ratio,
        }
    }

    /// Update camera orientation to look at a specific target point.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = (target - self.position).normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }
        self.yaw = (-dir.x).atan2(-dir.z);
        self.pitch = dir.y.clamp(-1.0, 1.0).asin();
    }

    /// Place the camera on a circle of `radius` around `target` at `height`
    /// and `angle` (radians), looking at the target.
    pub fn orbit(&mut self, target: Vec3, radius: f32, height: f32, angle: f32) {
        self.position = target + Vec3::new(angle.sin() * radius, height, angle.cos() * radius);
        self.look_at(target);
    }

    pub fn view_matrix(&self) -> Mat4 {
        let rotation = self.rotation_quat();
        let forward = rotation * Vec3::NEG_Z;
        let up = rotation * Vec3::Y;
        Mat4::look_at_rh(self.position, self.position + forward, up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect_ratio, self.near, self.far)
    }

    /// Get combined view-projection matrix
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation_quat() * Vec3::NEG_Z
    }

    pub fn depth_range(&self) -> DepthRange {
        DepthRange {
            near: self.near,
            far: self.far,
        }
    }

    /// Update aspect ratio (call when the viewport resizes)
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    fn rotation_quat(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }
}

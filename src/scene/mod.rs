pub mod camera;
pub mod transform;

pub use camera::Camera;
pub use transform::Transform;

use glam::{Quat, Vec3};
use std::f32::consts::TAU;

use crate::config::ViewerConfig;

pub struct Scene {
    pub camera: Camera,
    pub cube: Transform,
    pub spin_speed: f32,
    ambient_light: Vec3,
    directional_light: Vec3,
    light_direction: Vec3,
}

impl Scene {
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            cube: Transform::new(),
            spin_speed: 0.0,
            light_direction: Vec3::new(-1.0, -0.3, -1.0).normalize(),
            directional_light: Vec3::splat(0.5),
            ambient_light: Vec3::new(100.0, 50.0, 50.0) / 255.0,
        }
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        let mut camera = Camera::new(config.camera_offset, config.aspect_ratio());
        camera.fov = config.fov_degrees;
        camera.near = config.near;
        camera.far = config.far;
        camera.roll_correction = config.roll_correction_degrees;

        let mut scene = Self::new(camera);
        scene.spin_speed = config.spin_speed;
        scene
    }

    /// Spins the cube around Y; the angle stays in `[0, 2pi)`.
    pub fn update(&mut self, dt: f32) {
        if dt <= 0.0 || !dt.is_finite() {
            return;
        }
        self.cube.rotation.y = (self.cube.rotation.y + self.spin_speed * dt).rem_euclid(TAU);
    }

    pub fn set_head_orientation(&mut self, orientation: Quat) {
        self.camera.set_orientation(orientation);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.camera.aspect = width as f32 / height as f32;
        }
    }

    pub fn ambient_light(&self) -> Vec3 {
        self.ambient_light
    }

    pub fn directional_light(&self) -> Vec3 {
        self.directional_light
    }

    pub fn light_direction(&self) -> Vec3 {
        self.light_direction
    }
}

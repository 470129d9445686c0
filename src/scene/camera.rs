use glam::{Mat4, Quat, Vec3};

/// Fixed-position camera whose orientation comes from the head tracker.
///
/// The view is composed as translate, then un-rotate by the head orientation,
/// then roll by `roll_correction` degrees. The roll exists because the tracker's
/// axes do not line up with the screen's; 180 degrees fits the default headset.
pub struct Camera {
    pub position: Vec3,
    pub orientation: Quat,
    pub roll_correction: f32, // degrees
    pub fov: f32,             // vertical, degrees
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(position: Vec3, aspect: f32) -> Self {
        Self {
            position,
            orientation: Quat::IDENTITY,
            roll_correction: 180.0,
            fov: 45.0,
            aspect,
            near: 1.0,
            far: 100.0,
        }
    }

    pub fn set_orientation(&mut self, orientation: Quat) {
        // A bad sample must not poison the view matrix.
        if orientation.is_finite() && orientation.length_squared() > f32::EPSILON {
            self.orientation = orientation.normalize();
        }
    }

    pub fn build_view_matrix(&self) -> Mat4 {
        let translation = Mat4::from_translation(self.position);
        let head = Mat4::from_quat(self.orientation.conjugate());
        let roll = Mat4::from_rotation_z(self.roll_correction.to_radians());
        roll * head * translation
    }

    pub fn build_projection_matrix(&self) -> Mat4 {
        Mat4::perspective_lh(self.fov.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn build_view_projection_matrix(&self) -> Mat4 {
        self.build_projection_matrix() * self.build_view_matrix()
    }
}

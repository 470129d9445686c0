use anyhow::{bail, Result};
use clap::Parser;
use glam::Vec3;

use crate::tracking::FusionConfig;

/// Everything the viewer needs to know before it opens a window.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerConfig {
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Translation applied to world points before the head rotation.
    pub camera_offset: Vec3,
    /// Roll applied after the head rotation to line the sensor axes up with the screen.
    pub roll_correction_degrees: f32,
    /// Cube spin around Y in radians per second.
    pub spin_speed: f32,
    pub tracking: bool,
    pub fusion: FusionConfig,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            fullscreen: false,
            fov_degrees: 45.0,
            near: 1.0,
            far: 100.0,
            camera_offset: Vec3::new(0.0, 5.0, 15.0),
            roll_correction_degrees: 180.0,
            spin_speed: 1.0,
            tracking: true,
            fusion: FusionConfig::default(),
        }
    }
}

impl ViewerConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            bail!("window size must be non-zero, got {}x{}", self.width, self.height);
        }
        if !self.fov_degrees.is_finite() || self.fov_degrees <= 0.0 || self.fov_degrees >= 180.0 {
            bail!("field of view must be in (0, 180) degrees, got {}", self.fov_degrees);
        }
        if !self.near.is_finite() || self.near <= 0.0 {
            bail!("near plane must be positive, got {}", self.near);
        }
        if !self.far.is_finite() || self.far <= self.near {
            bail!("far plane ({}) must lie beyond the near plane ({})", self.far, self.near);
        }
        if !self.camera_offset.is_finite() {
            bail!("camera offset must be finite, got {}", self.camera_offset);
        }
        if !self.roll_correction_degrees.is_finite() || !self.spin_speed.is_finite() {
            bail!("roll correction and spin speed must be finite");
        }
        self.fusion.validate()
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Spinning cube viewed through a head-tracked camera", long_about = None)]
pub struct Args {
    /// Window width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 800)]
    pub height: u32,

    /// Borderless, always-on-top window at the top-left corner
    #[arg(long)]
    pub fullscreen: bool,

    /// Vertical field of view in degrees
    #[arg(long, default_value_t = 45.0)]
    pub fov: f32,

    /// Near clip plane
    #[arg(long, default_value_t = 1.0)]
    pub near: f32,

    /// Far clip plane
    #[arg(long, default_value_t = 100.0)]
    pub far: f32,

    /// View translation as x,y,z
    #[arg(long, value_delimiter = ',', default_values_t = [0.0, 5.0, 15.0], allow_negative_numbers = true)]
    pub camera_offset: Vec<f32>,

    /// Roll applied after the head orientation, in degrees
    #[arg(long, default_value_t = 180.0, allow_negative_numbers = true)]
    pub roll_correction: f32,

    /// Cube spin in radians per second (0 keeps it still)
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    pub spin_speed: f32,

    /// Do not look for a head-mounted display
    #[arg(long)]
    pub no_tracking: bool,

    /// Gyro samples averaged for bias before tracking starts
    #[arg(long, default_value_t = 0)]
    pub calibration_samples: u32,

    /// Madgwick filter gain (higher follows the accelerometer faster)
    #[arg(long, default_value_t = 0.1)]
    pub fusion_beta: f32,
}

impl Args {
    pub fn into_config(self) -> Result<ViewerConfig> {
        let offset = match self.camera_offset.as_slice() {
            [x, y, z] => Vec3::new(*x, *y, *z),
            other => bail!("--camera-offset takes three values, got {}", other.len()),
        };

        Ok(ViewerConfig {
            width: self.width,
            height: self.height,
            fullscreen: self.fullscreen,
            fov_degrees: self.fov,
            near: self.near,
            far: self.far,
            camera_offset: offset,
            roll_correction_degrees: self.roll_correction,
            spin_speed: self.spin_speed,
            tracking: !self.no_tracking,
            fusion: FusionConfig {
                beta: self.fusion_beta,
                calibration_samples: self.calibration_samples,
                ..Default::default()
            },
        })
    }
}

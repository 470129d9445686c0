use ahrs::{Ahrs, Madgwick};
use anyhow::{bail, Result};
use glam::{Quat, Vec3};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::f32::consts::FRAC_1_SQRT_2;

/// Raw inertial reading from the headset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Angular velocity (rad/s), device frame.
    pub gyro: Vec3,
    /// Specific force, device frame. Points up when at rest; only its direction is used.
    pub accel: Vec3,
    /// Device clock in microseconds.
    pub timestamp_us: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    /// Madgwick gain. Higher converges on the accelerometer faster but jitters more.
    pub beta: f32,
    /// Largest time step integrated at once, in seconds.
    pub max_dt: f32,
    /// Samples averaged for the gyro bias before any orientation is produced.
    pub calibration_samples: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            beta: 0.1,
            max_dt: 0.1,
            calibration_samples: 0,
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.beta.is_finite() || self.beta < 0.0 {
            bail!("fusion beta must be non-negative, got {}", self.beta);
        }
        if !self.max_dt.is_finite() || self.max_dt <= 0.0 {
            bail!("max dt must be positive, got {}", self.max_dt);
        }
        Ok(())
    }
}

// The viewer's world is Y-up; the filter's earth frame is Z-up.
// This is +90 degrees about X, taking +Y to +Z.
const Y_UP_TO_Z_UP: Quat = Quat::from_xyzw(FRAC_1_SQRT_2, 0.0, 0.0, FRAC_1_SQRT_2);

fn to_filter_vector(v: Vec3) -> Vector3<f64> {
    let v = Y_UP_TO_Z_UP * v;
    Vector3::new(v.x as f64, v.y as f64, v.z as f64)
}

fn to_filter_quat(q: Quat) -> UnitQuaternion<f64> {
    let q = Y_UP_TO_Z_UP * q * Y_UP_TO_Z_UP.conjugate();
    UnitQuaternion::from_quaternion(Quaternion::new(q.w as f64, q.x as f64, q.y as f64, q.z as f64))
}

fn from_filter_quat(q: &UnitQuaternion<f64>) -> Quat {
    let q = Quat::from_xyzw(
        q.coords[0] as f32,
        q.coords[1] as f32,
        q.coords[2] as f32,
        q.coords[3] as f32,
    );
    (Y_UP_TO_Z_UP.conjugate() * q * Y_UP_TO_Z_UP).normalize()
}

enum CalibrationState {
    Collecting { sum: Vec3, count: u32, target: u32 },
    Calibrated,
}

/// Madgwick AHRS filter with gyro-bias calibration and a zero reference.
///
/// World up is +Y. Yaw drifts freely; `recenter` resets it.
pub struct SensorFusion {
    config: FusionConfig,
    filter: Madgwick<f64>,
    gyro_bias: Vec3,
    calibration: CalibrationState,
    zero_ref: Quat,
    last_timestamp: Option<u64>,
    tilt_initialized: bool,
}

impl SensorFusion {
    pub fn new(config: FusionConfig) -> Self {
        let calibration = if config.calibration_samples > 0 {
            CalibrationState::Collecting {
                sum: Vec3::ZERO,
                count: 0,
                target: config.calibration_samples,
            }
        } else {
            CalibrationState::Calibrated
        };

        Self {
            config,
            filter: Madgwick::new(config.max_dt as f64, config.beta as f64),
            gyro_bias: Vec3::ZERO,
            calibration,
            zero_ref: Quat::IDENTITY,
            last_timestamp: None,
            tilt_initialized: false,
        }
    }

    /// Feeds one sample; returns the orientation relative to the zero reference
    /// once calibration is done.
    pub fn update(&mut self, sample: &ImuSample) -> Option<Quat> {
        if !sample.gyro.is_finite() || !sample.accel.is_finite() {
            log::trace!("Dropping non-finite IMU sample");
            return None;
        }
        if sample.accel.length_squared() <= f32::EPSILON {
            log::trace!("Dropping IMU sample without an accelerometer reading");
            return None;
        }

        if let CalibrationState::Collecting { sum, count, target } = &mut self.calibration {
            *sum += sample.gyro;
            *count += 1;
            if *count < *target {
                return None;
            }
            self.gyro_bias = *sum / *count as f32;
            self.calibration = CalibrationState::Calibrated;
            // Integration restarts from the sample that completed calibration.
            self.last_timestamp = None;
            log::info!(
                "IMU calibration complete, gyro bias ({:.5}, {:.5}, {:.5}) rad/s",
                self.gyro_bias.x,
                self.gyro_bias.y,
                self.gyro_bias.z
            );
        }

        match self.last_timestamp.replace(sample.timestamp_us) {
            None => {
                if !self.tilt_initialized {
                    // Start from the accelerometer's tilt instead of converging from level.
                    self.set_absolute(Quat::from_rotation_arc(sample.accel.normalize(), Vec3::Y));
                    self.tilt_initialized = true;
                }
            }
            Some(previous) => {
                let dt = sample.timestamp_us.saturating_sub(previous) as f32 * 1e-6;
                let dt = dt.min(self.config.max_dt);
                if dt > 0.0 {
                    self.step(dt, sample.gyro - self.gyro_bias, sample.accel);
                }
            }
        }

        Some(self.output())
    }

    fn step(&mut self, dt: f32, rate: Vec3, accel: Vec3) {
        // The filter integrates over a fixed period, so it is rebuilt around its
        // current state for each measured interval.
        let previous = self.filter.quat;
        let mut filter = Madgwick::new(dt as f64, self.config.beta as f64);
        filter.quat = previous;
        self.filter = filter;

        let accepted = self
            .filter
            .update_imu(&to_filter_vector(rate), &to_filter_vector(accel))
            .map(|q| q.coords.iter().all(|c| c.is_finite()))
            .unwrap_or(false);
        if !accepted {
            // The gradient step is undefined when the accelerometer already agrees
            // with the estimate; the gyro is then the whole update.
            log::trace!("Madgwick step undefined, integrating gyro only");
            self.filter.quat = previous;
            let q = self.absolute_orientation() * Quat::from_scaled_axis(rate * dt);
            self.set_absolute(q.normalize());
        }
    }

    fn set_absolute(&mut self, orientation: Quat) {
        self.filter.quat = to_filter_quat(orientation);
    }

    fn output(&self) -> Quat {
        (self.zero_ref.conjugate() * self.absolute_orientation()).normalize()
    }

    /// Makes the current heading the forward direction.
    ///
    /// Only yaw is captured so the horizon stays level after a recenter.
    pub fn recenter(&mut self) {
        let forward = self.absolute_orientation() * Vec3::Z;
        let yaw = forward.x.atan2(forward.z);
        self.zero_ref = Quat::from_rotation_y(yaw);
        log::info!("Head tracking recentered at yaw {:.1} degrees", yaw.to_degrees());
    }

    /// Throws away the bias estimate and collects `samples` new ones.
    pub fn recalibrate(&mut self, samples: u32) {
        self.gyro_bias = Vec3::ZERO;
        self.calibration = if samples > 0 {
            CalibrationState::Collecting {
                sum: Vec3::ZERO,
                count: 0,
                target: samples,
            }
        } else {
            CalibrationState::Calibrated
        };
        log::info!("IMU recalibration started ({} samples)", samples);
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.calibration, CalibrationState::Calibrated)
    }

    pub fn gyro_bias(&self) -> Vec3 {
        self.gyro_bias
    }

    /// Absolute orientation, ignoring the zero reference.
    pub fn absolute_orientation(&self) -> Quat {
        from_filter_quat(&self.filter.quat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const GRAVITY: f32 = 9.81;
    const STEP_US: u64 = 10_000; // 100 Hz

    fn at_rest(i: u64) -> ImuSample {
        ImuSample {
            gyro: Vec3::ZERO,
            accel: Vec3::new(0.0, GRAVITY, 0.0),
            timestamp_us: i * STEP_US,
        }
    }

    fn yaw_of(q: Quat) -> f32 {
        let forward = q * Vec3::Z;
        forward.x.atan2(forward.z)
    }

    #[test]
    fn test_frame_conversion_round_trips() {
        let q = Quat::from_rotation_y(0.7) * Quat::from_rotation_x(-0.4);
        assert!(from_filter_quat(&to_filter_quat(q)).abs_diff_eq(q, 1e-5));

        let up = to_filter_vector(Vec3::Y);
        assert_relative_eq!(up.z, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_at_rest_stays_level() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        let mut last = None;
        for i in 0..200 {
            last = fusion.update(&at_rest(i));
        }
        let q = last.unwrap();
        assert!(q.abs_diff_eq(Quat::IDENTITY, 1e-4), "drifted to {:?}", q);
    }

    #[test]
    fn test_initial_tilt_from_accelerometer() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        // Device tipped so its +Z axis points up.
        let sample = ImuSample {
            gyro: Vec3::ZERO,
            accel: Vec3::new(0.0, 0.0, GRAVITY),
            timestamp_us: 0,
        };
        let q = fusion.update(&sample).unwrap();
        let up = q * Vec3::Z;
        assert_relative_eq!(up.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_gyro_integration_yaw() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        fusion.update(&at_rest(0));
        for i in 1..=100 {
            let mut sample = at_rest(i);
            sample.gyro = Vec3::new(0.0, 1.0, 0.0);
            fusion.update(&sample);
        }
        // One second at 1 rad/s around the vertical axis.
        assert_relative_eq!(yaw_of(fusion.absolute_orientation()), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_accelerometer_pulls_tilt_back() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        fusion.update(&at_rest(0));

        // Pretend the gyro wrongly reported a pitch.
        fusion.set_absolute(Quat::from_rotation_x(0.3));
        let before = fusion.absolute_orientation().angle_between(Quat::IDENTITY);
        for i in 1..500 {
            fusion.update(&at_rest(i));
        }
        let after = fusion.absolute_orientation().angle_between(Quat::IDENTITY);
        assert!(after < before * 0.1, "tilt error {} -> {}", before, after);
    }

    #[test]
    fn test_zero_accelerometer_sample_is_skipped() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        assert!(fusion.update(&at_rest(0)).is_some());

        let mut empty = at_rest(1);
        empty.accel = Vec3::ZERO;
        assert!(fusion.update(&empty).is_none());

        let q = fusion.update(&at_rest(2)).unwrap();
        assert!(q.is_finite());
        assert!(q.abs_diff_eq(Quat::IDENTITY, 1e-4), "state damaged: {:?}", q);
    }

    #[test]
    fn test_timestamp_gap_is_clamped() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        fusion.update(&at_rest(0));
        let sample = ImuSample {
            gyro: Vec3::new(0.0, 1.0, 0.0),
            accel: Vec3::new(0.0, GRAVITY, 0.0),
            timestamp_us: 5_000_000,
        };
        fusion.update(&sample);
        assert_relative_eq!(yaw_of(fusion.absolute_orientation()), 0.1, epsilon = 1e-3);
    }

    #[test]
    fn test_backwards_timestamp_integrates_nothing() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        fusion.update(&at_rest(10));
        let sample = ImuSample {
            gyro: Vec3::new(0.0, 5.0, 0.0),
            accel: Vec3::new(0.0, GRAVITY, 0.0),
            timestamp_us: 0,
        };
        fusion.update(&sample);
        assert_relative_eq!(yaw_of(fusion.absolute_orientation()), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_calibration_removes_bias() {
        let config = FusionConfig {
            calibration_samples: 50,
            ..Default::default()
        };
        let mut fusion = SensorFusion::new(config);
        let bias = Vec3::new(0.0, 0.02, 0.0);

        for i in 0..49 {
            let mut sample = at_rest(i);
            sample.gyro = bias;
            assert!(fusion.update(&sample).is_none());
        }
        assert!(!fusion.is_calibrated());

        for i in 49..400 {
            let mut sample = at_rest(i);
            sample.gyro = bias;
            assert!(fusion.update(&sample).is_some());
        }
        assert!(fusion.is_calibrated());
        assert!(fusion.gyro_bias().abs_diff_eq(bias, 1e-6));
        assert_relative_eq!(yaw_of(fusion.absolute_orientation()), 0.0, epsilon = 1e-4);
    }

    #[test]
    fn test_recalibrate_restarts_collection() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        assert!(fusion.update(&at_rest(0)).is_some());
        fusion.recalibrate(3);
        assert!(!fusion.is_calibrated());
        assert!(fusion.update(&at_rest(1)).is_none());
        assert!(fusion.update(&at_rest(2)).is_none());
        assert!(fusion.update(&at_rest(3)).is_some());
    }

    #[test]
    fn test_completing_calibration_does_not_integrate_the_collection_window() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        fusion.update(&at_rest(0));
        fusion.recalibrate(3);

        // Bias averages to 1 rad/s; the last sample alone turns at 2 rad/s net.
        for (i, rate) in [(100, 0.0), (200, 0.0), (300, 3.0)] {
            let mut sample = at_rest(i);
            sample.gyro = Vec3::new(0.0, rate, 0.0);
            fusion.update(&sample);
        }
        assert!(fusion.is_calibrated());
        assert_relative_eq!(yaw_of(fusion.absolute_orientation()), 0.0, epsilon = 1e-6);

        // The next interval integrates from the completing sample.
        let mut sample = at_rest(301);
        sample.gyro = Vec3::new(0.0, 2.0, 0.0);
        fusion.update(&sample);
        assert_relative_eq!(yaw_of(fusion.absolute_orientation()), 0.01, epsilon = 1e-4);
    }

    #[test]
    fn test_recalibration_keeps_heading() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        fusion.update(&at_rest(0));
        fusion.set_absolute(Quat::from_rotation_y(0.8));
        fusion.recalibrate(1);
        fusion.update(&at_rest(1));
        assert_relative_eq!(yaw_of(fusion.absolute_orientation()), 0.8, epsilon = 1e-4);
    }

    #[test]
    fn test_recenter_removes_yaw_only() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        fusion.update(&at_rest(0));
        fusion.set_absolute(Quat::from_rotation_y(1.2) * Quat::from_rotation_x(0.2));
        fusion.recenter();

        let relative = fusion.update(&at_rest(1)).unwrap();
        assert_relative_eq!(yaw_of(relative), 0.0, epsilon = 1e-3);
        // Pitch survives the recenter.
        let forward = relative * Vec3::Z;
        assert!(forward.y.abs() > 0.1);
    }

    #[test]
    fn test_non_finite_sample_dropped() {
        let mut fusion = SensorFusion::new(FusionConfig::default());
        let mut sample = at_rest(0);
        sample.gyro.x = f32::NAN;
        assert!(fusion.update(&sample).is_none());
        assert!(fusion.update(&at_rest(1)).is_some());
    }

    #[test]
    fn test_config_validation() {
        assert!(FusionConfig::default().validate().is_ok());
        assert!(FusionConfig { beta: -0.1, ..Default::default() }.validate().is_err());
        assert!(FusionConfig { beta: f32::NAN, ..Default::default() }.validate().is_err());
        assert!(FusionConfig { max_dt: 0.0, ..Default::default() }.validate().is_err());
    }
}

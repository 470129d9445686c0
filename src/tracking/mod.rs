pub mod fusion;

pub use fusion::{FusionConfig, ImuSample, SensorFusion};

use anyhow::{anyhow, Context, Result};
use ar_drivers::{Glasses, GlassesEvent};
use glam::{Quat, Vec3};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

/// Anything that produces raw inertial samples.
pub trait ImuSource {
    /// Blocks until the next event. `Ok(None)` means the event carried no IMU data.
    fn read_sample(&mut self) -> Result<Option<ImuSample>>;
}

/// Joins separately reported accelerometer and gyroscope readings into samples.
///
/// Each gyroscope reading is paired with the most recent accelerometer reading;
/// gyroscope readings that arrive before any accelerometer data are dropped.
#[derive(Debug, Default)]
struct SamplePairer {
    latest_accel: Option<Vec3>,
}

impl SamplePairer {
    fn accelerometer(&mut self, accel: Vec3) {
        self.latest_accel = Some(accel);
    }

    fn gyroscope(&self, gyro: Vec3, timestamp_us: u64) -> Option<ImuSample> {
        self.latest_accel.map(|accel| ImuSample {
            gyro,
            accel,
            timestamp_us,
        })
    }
}

/// IMU stream of the headset found on USB.
pub struct GlassesSource {
    glasses: Glasses,
    pairer: SamplePairer,
}

impl GlassesSource {
    pub fn open() -> Result<Self> {
        let glasses = Glasses::new()
            .map_err(|e| anyhow!("no supported head-mounted display found: {:?}", e))?;
        match glasses.serial() {
            Ok(serial) => log::info!("Connected to head-mounted display, serial={}", serial),
            Err(e) => log::warn!("Connected to head-mounted display, serial unavailable: {:?}", e),
        }
        Ok(Self {
            glasses,
            pairer: SamplePairer::default(),
        })
    }
}

impl ImuSource for GlassesSource {
    fn read_sample(&mut self) -> Result<Option<ImuSample>> {
        let event = self
            .glasses
            .read_event()
            .map_err(|e| anyhow!("headset read failed: {:?}", e))?;
        match event {
            GlassesEvent::Accelerometer(data) => {
                self.pairer.accelerometer(Vec3::new(data.x, data.y, data.z));
                Ok(None)
            }
            GlassesEvent::Gyroscope(data) => Ok(self
                .pairer
                .gyroscope(Vec3::new(data.x, data.y, data.z), data.timestamp as u64)),
            _ => Ok(None),
        }
    }
}

enum TrackerCommand {
    Recenter,
    Recalibrate(u32),
}

/// Publishes the latest fused head orientation from a background reader thread.
///
/// A disabled tracker always reports identity, so the viewer keeps rendering
/// with a fixed camera when no headset is attached.
pub struct HeadTracker {
    orientation: Arc<Mutex<Quat>>,
    running: Arc<AtomicBool>,
    commands: Option<mpsc::Sender<TrackerCommand>>,
}

impl HeadTracker {
    pub fn disabled() -> Self {
        Self {
            orientation: Arc::new(Mutex::new(Quat::IDENTITY)),
            running: Arc::new(AtomicBool::new(false)),
            commands: None,
        }
    }

    /// Opens the headset and starts fusing its samples.
    pub fn connect(config: FusionConfig) -> Result<Self> {
        Self::spawn(GlassesSource::open, config)
    }

    /// Like [`HeadTracker::connect`], but falls back to a disabled tracker.
    pub fn connect_or_disabled(config: FusionConfig) -> Self {
        match Self::connect(config) {
            Ok(tracker) => tracker,
            Err(e) => {
                log::error!("Head tracking unavailable, continuing without it: {:#}", e);
                Self::disabled()
            }
        }
    }

    /// Runs `open` on a new thread and feeds whatever it returns through the fusion filter.
    ///
    /// The source is created on the reader thread so it never has to be `Send`.
    pub fn spawn<S, F>(open: F, config: FusionConfig) -> Result<Self>
    where
        S: ImuSource + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        config.validate()?;

        let orientation = Arc::new(Mutex::new(Quat::IDENTITY));
        let running = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let shared = orientation.clone();
        let flag = running.clone();
        thread::Builder::new()
            .name("head-tracker".into())
            .spawn(move || {
                let source = match open() {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        flag.store(false, Ordering::Release);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                tracker_loop(source, SensorFusion::new(config), shared, command_rx, &flag);
                flag.store(false, Ordering::Release);
            })
            .context("failed to start head tracker thread")?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("head tracker thread exited during start-up"))??;

        log::info!("Head tracking started");
        Ok(Self {
            orientation,
            running,
            commands: Some(command_tx),
        })
    }

    pub fn orientation(&self) -> Quat {
        self.orientation
            .lock()
            .map(|q| *q)
            .unwrap_or(Quat::IDENTITY)
    }

    pub fn is_active(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn recenter(&self) {
        self.send(TrackerCommand::Recenter);
    }

    pub fn recalibrate(&self, samples: u32) {
        self.send(TrackerCommand::Recalibrate(samples));
    }

    fn send(&self, command: TrackerCommand) {
        match &self.commands {
            Some(tx) if self.is_active() => {
                let _ = tx.send(command);
            }
            _ => log::warn!("Head tracker is not running"),
        }
    }
}

impl Drop for HeadTracker {
    fn drop(&mut self) {
        // The reader may be blocked inside the device read, so it is not joined;
        // it exits after its next sample.
        self.running.store(false, Ordering::Release);
    }
}

fn tracker_loop<S: ImuSource>(
    mut source: S,
    mut fusion: SensorFusion,
    orientation: Arc<Mutex<Quat>>,
    commands: mpsc::Receiver<TrackerCommand>,
    running: &AtomicBool,
) {
    let mut sample_count: u64 = 0;

    while running.load(Ordering::Acquire) {
        while let Ok(command) = commands.try_recv() {
            match command {
                TrackerCommand::Recenter => fusion.recenter(),
                TrackerCommand::Recalibrate(n) => fusion.recalibrate(n),
            }
        }

        match source.read_sample() {
            Ok(Some(sample)) => {
                if let Some(q) = fusion.update(&sample) {
                    if let Ok(mut latest) = orientation.lock() {
                        *latest = q;
                    }
                }
                sample_count += 1;
                if sample_count % 1000 == 0 {
                    log::debug!("{} IMU samples processed", sample_count);
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("Head tracker stopped: {:#}", e);
                break;
            }
        }
    }
}

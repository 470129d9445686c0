use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Instant;
use winit::dpi::PhysicalSize;
use winit::window::Window;

pub mod config;
pub mod model;
pub mod renderer;
pub mod scene;
pub mod timing;
pub mod tracking;

pub use config::ViewerConfig;
use renderer::Renderer;
use scene::Scene;
use timing::FrameTimer;
use tracking::HeadTracker;

/// Refresh rate the frame timer measures against.
const TARGET_FPS: u32 = 60;
/// Bias samples collected on a manual recalibration when none are configured.
const DEFAULT_RECALIBRATION_SAMPLES: u32 = 500;

/// One window, one device, one tracker, one cube.
pub struct State {
    window: Arc<Window>,
    pub scene: Scene,
    renderer: Renderer,
    tracker: HeadTracker,
    timer: FrameTimer,
    last_update: Instant,
    recalibration_samples: u32,
}

impl State {
    /// Sets up the graphics device first, then the head tracker.
    ///
    /// A missing headset is not an error: the tracker falls back to a fixed
    /// orientation and the cube is still drawn.
    pub fn new(window: Window, config: &ViewerConfig) -> Result<Self> {
        let window = Arc::new(window);
        let mut scene = Scene::from_config(config);
        let renderer = create_renderer(window.clone(), &scene)?;

        let size = renderer.size();
        scene.resize(size.width, size.height);

        let tracker = if config.tracking {
            HeadTracker::connect_or_disabled(config.fusion)
        } else {
            log::info!("Head tracking disabled");
            HeadTracker::disabled()
        };

        Ok(Self {
            window,
            scene,
            renderer,
            tracker,
            timer: FrameTimer::new(TARGET_FPS),
            last_update: Instant::now(),
            recalibration_samples: match config.fusion.calibration_samples {
                0 => DEFAULT_RECALIBRATION_SAMPLES,
                n => n,
            },
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn tracker(&self) -> &HeadTracker {
        &self.tracker
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.renderer.resize(new_size);
            self.scene.resize(new_size.width, new_size.height);
        }
    }

    /// Pulls the latest head orientation into the camera and advances the cube.
    pub fn update(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;

        self.scene.set_head_orientation(self.tracker.orientation());
        self.scene.update(dt);
    }

    /// Draws one frame. Only an out-of-memory surface is reported as an error.
    pub fn render(&mut self) -> Result<()> {
        match self.renderer.render(&self.scene) {
            Ok(()) => {
                self.timer.tick();
                Ok(())
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost or outdated, reconfiguring");
                let size = self.window.inner_size();
                self.resize(size);
                Ok(())
            }
            Err(wgpu::SurfaceError::OutOfMemory) => Err(anyhow!("graphics device is out of memory")),
            Err(e) => {
                log::warn!("Skipping frame: {}", e);
                Ok(())
            }
        }
    }

    pub fn recenter(&self) {
        self.tracker.recenter();
    }

    /// Re-estimates the gyro bias; the headset should be held still meanwhile.
    pub fn recalibrate(&self) {
        self.tracker.recalibrate(self.recalibration_samples);
    }
}

fn create_renderer(window: Arc<Window>, scene: &Scene) -> Result<Renderer> {
    let size = window.inner_size();

    log::info!("Creating WGPU instance...");
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        dx12_shader_compiler: Default::default(),
        flags: wgpu::InstanceFlags::from_build_config(),
        gles_minor_version: wgpu::Gles3MinorVersion::default(),
    });

    log::info!("Creating surface for {}x{} window", size.width, size.height);
    let surface = instance
        .create_surface(window)
        .context("failed to create surface")?;

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: Some(&surface),
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| anyhow!("no graphics adapter can present to this window"))?;

    let info = adapter.get_info();
    log::info!("Using adapter: {} ({:?})", info.name, info.backend);
    log::debug!("Adapter driver: {} {}", info.driver, info.driver_info);

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("Primary Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
            memory_hints: Default::default(),
        },
        None,
    ))
    .context("failed to create graphics device")?;

    let surface_caps = surface.get_capabilities(&adapter);
    let surface_format = preferred_surface_format(&surface_caps.formats)
        .ok_or_else(|| anyhow!("surface reports no supported formats"))?;
    log::info!("Selected surface format: {:?}", surface_format);

    // Fifo is always available and paces the loop to the display.
    let present_mode = wgpu::PresentMode::Fifo;
    let alpha_mode = surface_caps
        .alpha_modes
        .first()
        .copied()
        .unwrap_or(wgpu::CompositeAlphaMode::Auto);

    let config = wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: surface_format,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode,
        alpha_mode,
        view_formats: vec![],
        desired_maximum_frame_latency: 2,
    };
    surface.configure(&device, &config);

    Ok(Renderer::new(
        Arc::new(device),
        Arc::new(queue),
        &config,
        surface,
        scene,
    ))
}

/// Picks a linear (non-sRGB) format so the light colours reach the display unencoded.
fn preferred_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|f| !f.is_srgb())
        .or_else(|| formats.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::TextureFormat;

    #[test]
    fn test_surface_format_prefers_linear() {
        let formats = [TextureFormat::Bgra8UnormSrgb, TextureFormat::Bgra8Unorm];
        assert_eq!(preferred_surface_format(&formats), Some(TextureFormat::Bgra8Unorm));
    }

    #[test]
    fn test_surface_format_falls_back_to_first() {
        let formats = [TextureFormat::Rgba8UnormSrgb, TextureFormat::Bgra8UnormSrgb];
        assert_eq!(preferred_surface_format(&formats), Some(TextureFormat::Rgba8UnormSrgb));
        assert_eq!(preferred_surface_format(&[]), None);
    }
}

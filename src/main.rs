use anyhow::Result;
use clap::Parser;
use winit::{
    dpi::{PhysicalPosition, PhysicalSize},
    event::*,
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, WindowBuilder, WindowLevel},
};
use hmd_cube_viewer::{config::Args, State};

fn main() -> Result<()> {
    env_logger::init();
    let config = Args::parse().into_config()?;
    config.validate()?;

    let event_loop = winit::event_loop::EventLoop::new()?;

    let mut builder = WindowBuilder::new()
        .with_title("HMD Cube Viewer")
        .with_inner_size(PhysicalSize::new(config.width, config.height))
        .with_visible(true);
    if config.fullscreen {
        builder = builder
            .with_decorations(false)
            .with_position(PhysicalPosition::new(0, 0))
            .with_window_level(WindowLevel::AlwaysOnTop)
            .with_fullscreen(Some(Fullscreen::Borderless(None)));
    }
    let window = builder.build(&event_loop)?;

    let mut state = State::new(window, &config)?;
    log::info!(
        "Viewer running, head tracking {}",
        if state.tracker().is_active() { "active" } else { "off" }
    );

    event_loop.run(move |event, window_target| {
        match event {
            Event::WindowEvent { window_id, event } if window_id == state.window().id() => {
                match event {
                    WindowEvent::KeyboardInput {
                        event: KeyEvent {
                            physical_key: PhysicalKey::Code(key_code),
                            state: ElementState::Pressed,
                            repeat: false,
                            ..
                        },
                        ..
                    } => match key_code {
                        KeyCode::Escape => window_target.exit(),
                        KeyCode::KeyR => state.recenter(),
                        KeyCode::KeyC => state.recalibrate(),
                        _ => {}
                    },
                    WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        state.resize(new_size);
                    }
                    WindowEvent::RedrawRequested => {
                        if let Err(e) = state.render() {
                            log::error!("Render error: {:#}", e);
                            window_target.exit();
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                state.update();
                state.window().request_redraw();
            }
            _ => {}
        }
    })?;

    Ok(())
}

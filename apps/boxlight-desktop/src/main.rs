use anyhow::{Context, Result};
use boxlight_common::AppConfig;
use boxlight_input::{Action, KeyState};
use boxlight_render::{DemoScene, RenderDevice, RenderLoop};
use boxlight_render_wgpu::WgpuDevice;
use clap::Parser;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "boxlight-desktop", about = "Lit boxes with a free-fly camera")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Fixed key bindings.
fn action_for(key: KeyCode) -> Option<Action> {
    let action = match key {
        KeyCode::KeyW => Action::MoveForward,
        KeyCode::KeyS => Action::MoveBackward,
        KeyCode::KeyA => Action::MoveLeft,
        KeyCode::KeyD => Action::MoveRight,
        KeyCode::Space => Action::MoveUp,
        KeyCode::ShiftLeft => Action::MoveDown,
        KeyCode::ArrowUp => Action::RotateUp,
        KeyCode::ArrowDown => Action::RotateDown,
        KeyCode::ArrowLeft => Action::RotateLeft,
        KeyCode::ArrowRight => Action::RotateRight,
        KeyCode::KeyI => Action::LightUp,
        KeyCode::KeyK => Action::LightDown,
        KeyCode::KeyJ => Action::LightLeft,
        KeyCode::KeyL => Action::LightRight,
        _ => return None,
    };
    Some(action)
}

/// Everything that exists once the window is up. Field order is drop order:
/// the scene releases its resources before the device goes away.
struct Running {
    demo: DemoScene,
    render_loop: RenderLoop,
    window: Arc<Window>,
}

struct App {
    config: AppConfig,
    keys: KeyState,
    running: Option<Running>,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            keys: KeyState::new(),
            running: None,
            error: None,
        }
    }

    fn init(&self, event_loop: &ActiveEventLoop) -> Result<Running> {
        let attrs = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));
        let window = Arc::new(event_loop.create_window(attrs).context("create window")?);
        let size = window.inner_size();

        let device: Rc<dyn RenderDevice> = Rc::new(
            WgpuDevice::new(window.clone(), size.width, size.height)
                .context("initialize graphics")?,
        );
        let demo = DemoScene::build(&device, &self.config).context("build demo scene")?;
        let mut render_loop = RenderLoop::from_config(device, &self.config);
        render_loop.resize(size.width, size.height);

        Ok(Running {
            demo,
            render_loop,
            window,
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.running.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(running) => self.running = Some(running),
            Err(err) => {
                tracing::error!("startup failed: {err:#}");
                self.error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(running) = &mut self.running {
                    running.render_loop.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state,
                        ..
                    },
                ..
            } => {
                if let Some(action) = action_for(key) {
                    self.keys.set(action, state == ElementState::Pressed);
                }
            }
            WindowEvent::Focused(false) => {
                self.keys.clear();
            }
            WindowEvent::RedrawRequested => {
                let Some(running) = &mut self.running else {
                    return;
                };
                if let Err(err) = running.render_loop.frame(&running.demo.scene, &self.keys) {
                    tracing::error!("frame failed: {err}");
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(running) = &self.running {
            running.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("load config {}", path.display()))?,
        None => AppConfig::default(),
    };

    tracing::info!("boxlight-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_action_has_a_key() {
        let keys = [
            KeyCode::KeyW,
            KeyCode::KeyS,
            KeyCode::KeyA,
            KeyCode::KeyD,
            KeyCode::Space,
            KeyCode::ShiftLeft,
            KeyCode::ArrowUp,
            KeyCode::ArrowDown,
            KeyCode::ArrowLeft,
            KeyCode::ArrowRight,
            KeyCode::KeyI,
            KeyCode::KeyK,
            KeyCode::KeyJ,
            KeyCode::KeyL,
        ];
        let mapped: KeyState = keys.iter().filter_map(|k| action_for(*k)).collect();
        for action in Action::ALL {
            assert!(mapped.is_pressed(action), "{action} is unbound");
        }
    }

    #[test]
    fn unbound_keys_are_ignored() {
        assert_eq!(action_for(KeyCode::KeyQ), None);
        assert_eq!(action_for(KeyCode::ShiftRight), None);
        assert_eq!(action_for(KeyCode::KeyI), Some(Action::LightUp));
    }
}

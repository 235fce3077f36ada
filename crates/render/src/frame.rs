use crate::camera::{Camera, aspect_ratio};
use crate::device::RenderDevice;
use crate::error::RenderError;
use crate::light::DirectionalLight;
use crate::scene::Scene;
use crate::shaders::{LIGHT_DIRECTION, LIGHT_INTENSITY, VIEW_PROJ};
use boxlight_common::AppConfig;
use boxlight_input::KeyState;
use std::rc::Rc;

/// What happened during one call to [`RenderLoop::frame`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    pub draws: u32,
    pub triangles: u32,
    /// Draws that failed and were skipped.
    pub skipped: u32,
    /// Whether the frame reached the screen.
    pub presented: bool,
}

/// Drives the per-frame sequence over a scene.
///
/// Each frame runs, in order: begin (clear), camera and light update from
/// held input, per-program uniform upload, draws in scene order, present.
pub struct RenderLoop {
    device: Rc<dyn RenderDevice>,
    pub camera: Camera,
    pub light: DirectionalLight,
    pub clear_color: [f32; 4],
    width: u32,
    height: u32,
    minimized: bool,
    frame: u64,
}

impl RenderLoop {
    pub fn new(device: Rc<dyn RenderDevice>, width: u32, height: u32) -> Self {
        Self {
            device,
            camera: Camera::default(),
            light: DirectionalLight::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            width,
            height,
            minimized: false,
            frame: 0,
        }
    }

    pub fn from_config(device: Rc<dyn RenderDevice>, config: &AppConfig) -> Self {
        Self {
            camera: Camera::from_config(&config.camera),
            light: DirectionalLight::from_config(&config.light),
            clear_color: config.clear_color,
            ..Self::new(device, config.window.width, config.window.height)
        }
    }

    pub fn device(&self) -> &Rc<dyn RenderDevice> {
        &self.device
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn aspect(&self) -> f32 {
        aspect_ratio(self.width, self.height)
    }

    /// Frames started so far.
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Whether the last resize was zero-sized. No frames are drawn until a
    /// real size arrives.
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }

    /// Track a new framebuffer size. Zero-sized (minimized) surfaces keep
    /// the last real size and pause drawing.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            tracing::debug!(width, height, "empty viewport, pausing frames");
            self.minimized = true;
            return;
        }
        self.minimized = false;
        self.width = width;
        self.height = height;
        self.device.resize(width, height);
        tracing::debug!(width, height, "viewport resized");
    }

    /// Run one frame. Errors inside the frame are logged and skipped;
    /// only a failure to begin the frame is returned.
    pub fn frame(&mut self, scene: &Scene, keys: &KeyState) -> Result<FrameReport, RenderError> {
        self.frame += 1;
        let mut report = FrameReport {
            frame: self.frame,
            ..FrameReport::default()
        };
        if self.minimized {
            tracing::trace!(frame = self.frame, "minimized, frame skipped");
            return Ok(report);
        }

        self.device.begin_frame(self.clear_color)?;

        self.camera.apply_input(keys);
        self.light.apply_input(keys);

        let view_proj = self.camera.view_projection(self.aspect());
        let direction = self.light.direction();
        for program in scene.programs() {
            program.set_uniform(VIEW_PROJ, view_proj);
            program.set_uniform(LIGHT_DIRECTION, direction);
            program.set_uniform(LIGHT_INTENSITY, self.light.intensity);
        }

        for (index, drawable) in scene.drawables().iter().enumerate() {
            match drawable.draw(self.device.as_ref()) {
                Ok(()) => {
                    report.draws += 1;
                    report.triangles += drawable.triangles();
                }
                Err(err) => {
                    report.skipped += 1;
                    tracing::error!(frame = self.frame, drawable = index, "draw skipped: {err}");
                }
            }
        }

        match self.device.present() {
            Ok(()) => report.presented = true,
            Err(err) => tracing::error!(frame = self.frame, "frame skipped: {err}"),
        }
        tracing::trace!(?report, "frame done");
        Ok(report)
    }
}

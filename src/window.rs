use std::{sync::Arc, time::Instant};

use anyhow::{anyhow, Context};
use glam::Vec2;
use imgui::{FontConfig, FontSource};
use imgui_winit_support::WinitPlatform;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalPosition,
    event::{ElementState, Event, MouseButton, MouseScrollDelta, Touch, TouchPhase, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::Window,
};

use crate::{
    config::ViewerConfig,
    engine::{self, FrameLoop, FrameTarget, FrameTiming},
    orbit_controls::PointerButton,
    overlay,
    rendering::renderer::{FrameOutput, Renderer},
    viewer::ViewerState,
};

// Trackpads report pixels, the controls think in wheel lines
const PIXELS_PER_LINE: f32 = 50.0;

struct ImguiState {
    context: imgui::Context,
    platform: WinitPlatform,
}

/// One frame of the viewer: the engine update followed by the scene render.
struct ViewerFrame<'a> {
    state: &'a mut ViewerState,
    renderer: &'a mut Renderer,
}

impl FrameTarget for ViewerFrame<'_> {
    type Output = FrameOutput;
    type Error = wgpu::SurfaceError;

    fn update(&mut self, timing: &FrameTiming) {
        engine::update(self.state, timing);
    }

    fn render(&mut self, timing: &FrameTiming) -> Result<FrameOutput, wgpu::SurfaceError> {
        self.renderer.render(self.state, timing)
    }
}

struct App {
    state: ViewerState,
    renderer: Option<Renderer>,
    imgui: Option<ImguiState>,
    frame_loop: FrameLoop,
    last_frame: Instant,
    startup_error: Option<anyhow::Error>,
}

impl App {
    fn new(state: ViewerState) -> Self {
        Self {
            state,
            renderer: None,
            imgui: None,
            frame_loop: FrameLoop::new(),
            last_frame: Instant::now(),
            startup_error: None,
        }
    }

    fn setup_imgui(window: &Window) -> ImguiState {
        let mut context = imgui::Context::create();
        let mut platform = WinitPlatform::new(&mut context);
        platform.attach_window(
            context.io_mut(),
            window,
            imgui_winit_support::HiDpiMode::Default,
        );

        let font_size = 14.0;
        context.fonts().add_font(&[FontSource::DefaultFontData {
            config: Some(FontConfig {
                oversample_h: 1,
                pixel_snap_h: true,
                size_pixels: font_size,
                ..Default::default()
            }),
        }]);

        // Disable INI support because it's broken in the published version of imgui
        context.set_ini_filename(None);

        ImguiState { context, platform }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window_attributes =
            Window::default_attributes().with_title(self.state.config.window_title.clone());
        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .context("Failed to create window")?,
        );

        let mut imgui = Self::setup_imgui(&window);
        let renderer = pollster::block_on(Renderer::new(
            window.clone(),
            &self.state,
            &mut imgui.context,
        ))?;

        self.state
            .controls
            .set_viewport_height(renderer.size.height as f32);

        window.request_redraw();

        self.imgui = Some(imgui);
        self.renderer = Some(renderer);

        Ok(())
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let (Some(renderer), Some(imgui)) = (self.renderer.as_mut(), self.imgui.as_mut()) else {
            return Ok(());
        };

        let now = Instant::now();
        imgui
            .context
            .io_mut()
            .update_delta_time(now.saturating_duration_since(self.last_frame));
        self.last_frame = now;

        renderer.window.request_redraw();

        imgui
            .platform
            .prepare_frame(imgui.context.io_mut(), &renderer.window)
            .map_err(|e| anyhow!("Failed to prepare Imgui frame: {e:?}"))?;

        let ui = imgui.context.new_frame();
        overlay::draw(ui, &mut self.state);
        imgui.platform.prepare_render(ui, &renderer.window);

        let mut frame = ViewerFrame {
            state: &mut self.state,
            renderer: &mut *renderer,
        };

        match self.frame_loop.tick(&mut frame) {
            Ok(output) => renderer.finish_frame(output, &mut imgui.context)?,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                renderer.resize(renderer.size);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Out of memory");
                event_loop.exit();
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("Timeout");
            }
            Err(other) => {
                log::error!("Unexpected error: {:?}", other);
            }
        }

        Ok(())
    }

    fn handle_input(&mut self, event: &WindowEvent) {
        let captured = self
            .imgui
            .as_ref()
            .is_some_and(|imgui| imgui.context.io().want_capture_mouse);

        let controls = &mut self.state.controls;
        let camera = &self.state.camera;

        match event {
            WindowEvent::CursorMoved { position, .. } => {
                controls.pointer_moved(to_vec2(*position), camera);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let Some(button) = pointer_button(*button) else {
                    return;
                };

                match state {
                    ElementState::Pressed if !captured => controls.pointer_down(button),
                    ElementState::Released => controls.pointer_up(button),
                    _ => {}
                }
            }
            WindowEvent::MouseWheel { delta, .. } if !captured => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32 / PIXELS_PER_LINE,
                };
                controls.wheel(lines);
            }
            WindowEvent::Touch(Touch {
                phase,
                location,
                id,
                ..
            }) => match phase {
                TouchPhase::Started if !captured => controls.touch_start(*id, to_vec2(*location)),
                TouchPhase::Moved => controls.touch_moved(*id, to_vec2(*location), camera),
                TouchPhase::Ended | TouchPhase::Cancelled => controls.touch_end(*id),
                _ => {}
            },
            _ => {}
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }

        if let Err(e) = self.init(event_loop) {
            self.startup_error = Some(e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if let (Some(imgui), Some(renderer)) = (self.imgui.as_mut(), self.renderer.as_ref()) {
            imgui.platform.handle_event::<()>(
                imgui.context.io_mut(),
                &renderer.window,
                &Event::WindowEvent {
                    window_id,
                    event: event.clone(),
                },
            );
        }

        self.handle_input(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(new_size);
                }
                self.state
                    .controls
                    .set_viewport_height(new_size.height as f32);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw(event_loop) {
                    log::error!("Frame failed: {e:#}");
                }
            }
            _ => (),
        }
    }
}

fn pointer_button(button: MouseButton) -> Option<PointerButton> {
    match button {
        MouseButton::Left => Some(PointerButton::Primary),
        MouseButton::Right => Some(PointerButton::Secondary),
        MouseButton::Middle => Some(PointerButton::Middle),
        _ => None,
    }
}

fn to_vec2(position: PhysicalPosition<f64>) -> Vec2 {
    Vec2::new(position.x as f32, position.y as f32)
}

pub async fn run() -> anyhow::Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let state =
        ViewerState::new(ViewerConfig::default()).context("Failed to create viewer state")?;
    let mut app = App::new(state);
    event_loop.run_app(&mut app)?;

    match app.startup_error.take() {
        Some(e) => Err(e.context("Failed to start the viewer")),
        None => Ok(()),
    }
}

use std::{
    ops::Range,
    process,
    sync::Arc,
    time::{Duration, Instant},
};

use wgpu::{Backends, Color, InstanceDescriptor, Surface, SurfaceError};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::WindowEvent,
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use crate::{
    camera::Camera,
    canvas::{Canvas, DrawState, ToolState},
    cmd::Cmd,
    config::{BrushConfig, Config},
    input::InputState,
    math::{vec2, vec3, Transform2, Vec3f},
    render::{Drawable, Gpu, Layer, Pass, QuadBatch, QuadInstance, QuadKind, Space, Uniforms},
    stroke::Stroke,
    ui::{build_toolbar, Fill, Icon, UiAction, UiElement, UiIndex, TOOL_BUTTON},
};

const BACKGROUND: Color = Color {
    r: 0.08,
    g: 0.08,
    b: 0.09,
    a: 1.0,
};
const GRID_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 0.06];
const BUTTON_COLOR: [f32; 4] = [0.25, 0.25, 0.27, 1.0];
const RING_COLOR: [f32; 4] = [0.9, 0.9, 0.9, 1.0];
/// The brush cursor never shrinks below this radius, in pixels.
const MIN_CURSOR_PX: f64 = 2.0;
/// Longest step the camera animation takes in one frame.
const MAX_FRAME_TIME: Duration = Duration::from_millis(50);

pub struct App {
    instance: wgpu::Instance,
    config: Config,
    win: Option<Win>,
}

struct Win {
    window: Arc<Window>,
    surface: Surface<'static>,
    gpu: Gpu,
    layer: Layer,
    quads: QuadBatch,

    canvas: Canvas,
    camera: Camera,
    ui: UiIndex<UiAction>,
    input: InputState,
    brush: BrushConfig,

    last_frame: Instant,
    last_visible: usize,
}

/// One entry of the stroke layer, in paint order.
enum LayerItem<'a> {
    Ribbon(&'a Stroke),
    Dot { quad: Range<u32>, erase: bool },
}

impl Win {
    fn recreate_swapchain(&mut self) {
        let Some((width, height)) = surface_size(self.window.inner_size()) else {
            // Minimized.
            return;
        };

        let Some(config) = self
            .surface
            .get_default_config(&self.gpu.adapter, width, height)
        else {
            log::warn!("adapter does not support a {width}x{height} surface");
            return;
        };

        log::debug!(
            "configuring window surface for {}x{} (format: {:?}, present mode: {:?}, alpha mode: {:?})",
            width,
            height,
            config.format,
            config.present_mode,
            config.alpha_mode,
        );

        self.surface.configure(&self.gpu.device, &config);
        self.camera.resize(width, height);
        if self.layer.size() != (width, height) {
            self.layer = Layer::new(&self.gpu, width, height);
        }
    }

    fn apply(&mut self, cmd: Cmd, event_loop: &ActiveEventLoop) {
        match cmd {
            Cmd::PointerDown { position } => {
                let mut clicked = None;
                if self
                    .ui
                    .handle_click(position.x(), position.y(), |action| clicked = Some(*action))
                {
                    if let Some(action) = clicked {
                        self.apply_ui_action(action);
                    }
                } else {
                    let world = self.camera.screen_to_world(position);
                    self.canvas.start_drawing(world);
                }
            }
            Cmd::PointerMove { position } => {
                if self.canvas.state() == DrawState::Drawing {
                    let world = self.camera.screen_to_world(position);
                    self.canvas.on_drawing(world);
                }
            }
            Cmd::PointerUp => self.canvas.end_drawing(),
            Cmd::BeginPan => self.canvas.cancel_drawing(),
            Cmd::PanBy { delta } => self.camera.drag(delta),
            Cmd::Scroll { delta } => self.camera.scroll(delta),
            Cmd::Zoom { anchor, direction } => self.camera.zoom_at(anchor, direction),
            Cmd::ResetView => self.camera.reset(),
            Cmd::Undo => {
                if self.canvas.undo() {
                    log::info!(
                        "undo ({} strokes left, {} to redo)",
                        self.canvas.strokes().len(),
                        self.canvas.redo_len(),
                    );
                }
            }
            Cmd::Redo => {
                if self.canvas.redo() {
                    log::info!("redo ({} strokes)", self.canvas.strokes().len());
                }
            }
            Cmd::Clear => {
                log::info!("clearing canvas");
                self.canvas.clear();
            }
            Cmd::ToggleEraser => self.apply_ui_action(UiAction::ToggleEraser),
            Cmd::Thicker => self.scale_thickness(self.brush.grow),
            Cmd::Thinner => self.scale_thickness(self.brush.shrink),
            Cmd::Quit => event_loop.exit(),
        }
        self.window.request_redraw();
    }

    fn apply_ui_action(&mut self, action: UiAction) {
        match action {
            UiAction::SetColor(color) => {
                self.canvas.set_color(color);
                self.set_eraser(false);
            }
            UiAction::ToggleEraser => self.set_eraser(!self.canvas.tool().eraser),
        }
    }

    fn set_eraser(&mut self, eraser: bool) {
        if self.canvas.tool().eraser != eraser {
            log::info!("switched to {}", if eraser { "eraser" } else { "pen" });
        }
        self.canvas.set_eraser(eraser);
        if let Some(button) = self.ui.get_mut(TOOL_BUTTON) {
            button.fill = Fill::Icon(if eraser { Icon::Eraser } else { Icon::Pen });
        }
    }

    fn scale_thickness(&mut self, factor: f64) {
        let thickness = (self.canvas.tool().thickness * factor)
            .clamp(self.brush.min_thickness, self.brush.max_thickness);
        log::info!("brush thickness: {thickness:.4}");
        self.canvas.set_thickness(thickness);
    }

    fn redraw(&mut self) {
        if surface_size(self.window.inner_size()).is_none() {
            // Nothing to present into while minimized.
            return;
        }

        let st = match self.surface.get_current_texture() {
            Ok(st) => st,
            Err(err @ (SurfaceError::Outdated | SurfaceError::Lost)) => {
                log::debug!("surface error: {}", err);
                self.recreate_swapchain();
                match self.surface.get_current_texture() {
                    Ok(st) => st,
                    Err(e) => {
                        log::warn!("failed to acquire frame after recreating swapchain: {}", e);
                        return;
                    }
                }
            }
            Err(e) => {
                log::warn!("failed to acquire frame: {}", e);
                return;
            }
        };

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).min(MAX_FRAME_TIME);
        self.last_frame = now;
        let animating = self.camera.update(dt.as_secs_f64());

        for stroke in self.canvas.strokes_mut() {
            stroke.upload(&self.gpu);
        }
        self.canvas.current_mut().upload(&self.gpu);

        let viewport = self.camera.viewport();
        let world_per_px = 2.0 * self.camera.zoom() / viewport.y();
        let screen = Transform2::ortho(vec2(0.0, viewport.y()), vec2(viewport.x(), 0.0));
        self.gpu.write_uniforms(&Uniforms {
            world: self.camera.projection().to_mat4(),
            screen: screen.to_mat4(),
            params: [
                viewport.x() as f32,
                viewport.y() as f32,
                world_per_px as f32,
                self.camera.grid_spacing() as f32,
            ],
        });

        // Collect every quad of the frame up front so they upload together.
        self.quads.clear();
        let view = self.camera.view_box();
        let grid = self.quads.push([QuadInstance::new(
            QuadKind::Grid,
            Space::World,
            view.min.to_f32(),
            (view.max - view.min).to_f32(),
            GRID_COLOR,
        )]);

        let mut items = Vec::new();
        for stroke in self.canvas.visible(view) {
            if stroke.is_dot() {
                items.push(LayerItem::Dot {
                    quad: self.quads.push([dot(stroke)]),
                    erase: stroke.is_eraser(),
                });
            } else {
                items.push(LayerItem::Ribbon(stroke));
            }
        }
        if items.len() != self.last_visible {
            log::debug!(
                "{} of {} strokes visible",
                items.len(),
                self.canvas.strokes().len()
            );
            self.last_visible = items.len();
        }

        let current = self.canvas.current();
        let start_cap = if self.canvas.state() == DrawState::Drawing && !current.is_empty() {
            self.quads.push([dot(current)])
        } else {
            0..0
        };

        let tool = self.canvas.tool();
        let cursor_world = self.camera.screen_to_world(self.input.cursor());
        let cursor_radius = (tool.thickness / 2.0).max(MIN_CURSOR_PX * world_per_px);
        let cursor = if self.input.is_panning() {
            0..0
        } else {
            let (kind, color) = if tool.eraser {
                (QuadKind::Ring, RING_COLOR)
            } else {
                (QuadKind::Disc, rgba(tool.color))
            };
            self.quads.push([QuadInstance::circle(
                kind,
                Space::World,
                cursor_world.to_f32(),
                cursor_radius as f32,
                color,
            )])
        };

        let toolbar = self.quads.push(self.ui.iter().flat_map(|el| toolbar_quads(el, &tool)));

        self.quads.upload(&self.gpu);

        let mut enc = self.gpu.device.create_command_encoder(&Default::default());

        // Strokes go to their own layer so the eraser cannot punch through the background.
        let mut pass = Pass::layer(&self.gpu, &mut enc, &self.layer);
        for item in &items {
            match item {
                LayerItem::Ribbon(stroke) => stroke.draw(&mut pass),
                LayerItem::Dot { quad, erase } => pass.draw_quads(&self.quads, quad.clone(), *erase),
            }
        }
        current.draw(&mut pass);
        pass.draw_quads(&self.quads, start_cap, current.is_eraser());
        drop(pass);

        let view = st.texture.create_view(&Default::default());
        let mut pass = Pass::new(&self.gpu, &mut enc, &view, Some(BACKGROUND));
        pass.draw_quads(&self.quads, grid, false);
        pass.composite(&self.layer);
        pass.draw_quads(&self.quads, cursor, false);
        pass.draw_quads(&self.quads, toolbar, false);
        drop(pass);

        self.gpu.queue.submit([enc.finish()]);
        self.window.pre_present_notify();
        st.present();

        if animating {
            self.window.request_redraw();
        }
    }
}

/// The window's size in pixels, or `None` when it has no area to render into.
fn surface_size(res: PhysicalSize<u32>) -> Option<(u32, u32)> {
    (res.width > 0 && res.height > 0).then_some((res.width, res.height))
}

fn rgba(color: Vec3f) -> [f32; 4] {
    let [r, g, b]: [f32; 3] = color.into();
    [r, g, b, 1.0]
}

/// Single-point strokes and the live start cap are drawn as discs.
fn dot(stroke: &Stroke) -> QuadInstance {
    let center = stroke.raw_points()[0];
    QuadInstance::circle(
        QuadKind::Disc,
        Space::World,
        center.to_f32(),
        (stroke.thickness() / 2.0) as f32,
        rgba(stroke.color()),
    )
}

fn toolbar_quads(
    element: &UiElement<UiAction>,
    tool: &ToolState,
) -> impl Iterator<Item = QuadInstance> {
    let r = element.region;
    let min = vec2(r.x, r.y).to_f32();
    let size = vec2(r.w, r.h).to_f32();
    let center = vec2(r.x + r.w / 2.0, r.y + r.h / 2.0).to_f32();
    let icon_radius = (r.w.min(r.h) / 4.0) as f32;

    let (background, icon) = match element.fill {
        Fill::Color(color) => (rgba(color), None),
        Fill::Icon(Icon::Pen) => (
            BUTTON_COLOR,
            Some(QuadInstance::circle(
                QuadKind::Disc,
                Space::Screen,
                center,
                icon_radius,
                rgba(tool.color),
            )),
        ),
        Fill::Icon(Icon::Eraser) => (
            BUTTON_COLOR,
            Some(QuadInstance::circle(
                QuadKind::Ring,
                Space::Screen,
                center,
                icon_radius,
                RING_COLOR,
            )),
        ),
    };

    [QuadInstance::new(QuadKind::Rect, Space::Screen, min, size, background)]
        .into_iter()
        .chain(icon)
}

impl App {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        Ok(Self {
            instance: wgpu::Instance::new(&InstanceDescriptor {
                backends: Backends::PRIMARY,
                ..Default::default()
            }),
            config,
            win: None,
        })
    }

    fn create_win(&self, event_loop: &ActiveEventLoop) -> anyhow::Result<Win> {
        let window = Arc::new(
            event_loop.create_window(
                Window::default_attributes()
                    .with_title(self.config.window.title.clone())
                    .with_inner_size(LogicalSize::new(
                        self.config.window.width,
                        self.config.window.height,
                    )),
            )?,
        );

        let surface = self.instance.create_surface(window.clone())?;
        let res = window.inner_size();
        let (gpu, surface_config) = Gpu::new(&self.instance, &surface, res.width, res.height)?;
        surface.configure(&gpu.device, &surface_config);

        log::debug!(
            "creating canvas at {}x{}, format={:?}",
            res.width,
            res.height,
            gpu.format
        );
        let layer = Layer::new(&gpu, res.width, res.height);
        let quads = QuadBatch::new(&gpu);

        let ui = build_toolbar(&self.config.toolbar);
        log::debug!("toolbar with {} elements", ui.len());

        let brush = self.config.brush.clone();
        let [r, g, b] = brush.color;
        let canvas = Canvas::new(ToolState {
            color: vec3(r, g, b),
            thickness: brush.thickness,
            eraser: false,
        });

        Ok(Win {
            window,
            surface,
            gpu,
            layer,
            quads,
            canvas,
            camera: Camera::new(self.config.camera.clone(), res.width, res.height),
            ui,
            input: InputState::new(),
            brush,
            last_frame: Instant::now(),
            last_visible: 0,
        })
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.win.is_none() {
            let win = match self.create_win(event_loop) {
                Ok(win) => win,
                Err(e) => {
                    eprintln!("could not create window: {e:#}");
                    process::exit(1);
                }
            };
            self.win = Some(win);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(win) = &mut self.win else { return };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::RedrawRequested => win.redraw(),
            WindowEvent::Resized(_) => {
                win.recreate_swapchain();
                win.window.request_redraw();
            }
            event => {
                let mut cmds = Vec::new();
                win.input
                    .handle_window_event(&event, &self.config.bind, |cmd| cmds.push(cmd));
                for cmd in cmds {
                    win.apply(cmd, event_loop);
                }
            }
        }
    }
}

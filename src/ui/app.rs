use std::sync::{Arc, Mutex};

use eframe::egui;
use egui::{Color32, ColorImage, Pos2, Rect, Stroke, TextureHandle, TextureOptions};

use crate::config::field::FieldConfig;
use crate::core::geometry::{FieldPoint, to_screen_coord};
use crate::core::view::{ViewMessage, ZoomDirection};
use crate::rendering::export::export_png;
use crate::rendering::field::CpuFieldRenderer;
use crate::rendering::gl_field::{GlFieldState, make_field_callback};
use crate::rendering::viewport::{FrameDecision, ViewportController};
use crate::ui::canvas_view::{CanvasFrame, CanvasInput};
use crate::ui::control_panel::{ViewReadout, show_control_panel};
use crate::ui::status_bar::show_status_bar;

/// 求值后端：优先 GPU，GL 不可用时回退到 CPU
enum Backend {
    Gpu(Arc<Mutex<GlFieldState>>),
    Cpu {
        renderer: CpuFieldRenderer,
        texture: Option<TextureHandle>,
        uploaded: u64,
    },
}

impl Backend {
    fn cpu(field: &FieldConfig) -> Self {
        Self::Cpu {
            renderer: CpuFieldRenderer::new(field.clone()),
            texture: None,
            uploaded: 0,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Gpu(_) => "GPU (OpenGL)",
            Self::Cpu { .. } => "CPU",
        }
    }

    fn evaluations(&self) -> u64 {
        match self {
            Self::Gpu(state) => state.lock().map(|st| st.evaluations()).unwrap_or(0),
            Self::Cpu { renderer, .. } => renderer.generation(),
        }
    }

    fn presented(&self) -> u64 {
        match self {
            Self::Gpu(state) => state.lock().map(|st| st.presented()).unwrap_or(0),
            Self::Cpu { renderer, .. } => renderer.generation(),
        }
    }

    fn is_broken(&self) -> bool {
        match self {
            Self::Gpu(state) => state.lock().map(|st| st.is_broken()).unwrap_or(true),
            Self::Cpu { .. } => false,
        }
    }
}

pub struct FieldViewerApp {
    field: FieldConfig,
    controller: ViewportController,
    input: CanvasInput,
    backend: Backend,
    hover: Option<FieldPoint>,
    last_status: String,
}

impl FieldViewerApp {
    pub fn new(cc: &eframe::CreationContext<'_>, field: FieldConfig, controller: ViewportController) -> Self {
        let backend = if cc.gl.is_some() {
            Backend::Gpu(Arc::new(Mutex::new(GlFieldState::new(field.clone()))))
        } else {
            log::warn!("没有可用的 GL 上下文，使用 CPU 求值");
            Backend::cpu(&field)
        };
        log::info!("求值后端: {}", backend.name());

        Self {
            field,
            controller,
            input: CanvasInput::new(),
            backend,
            hover: None,
            last_status: "就绪".to_string(),
        }
    }

    fn apply_action(&mut self, zoom: Option<ZoomDirection>, reset: bool, export: bool) {
        if let Some(direction) = zoom {
            // 按钮缩放以视图中心为锚点
            let anchor = self.controller.view().offset;
            self.controller.apply(ViewMessage::ZoomRequested { anchor, direction });
        }
        if reset {
            self.controller.apply(ViewMessage::Reset);
            self.last_status = "视图已重置".to_string();
        }
        if export {
            self.last_status = match export_png(&self.controller.params(), &self.field) {
                Ok(Some(path)) => format!("已导出: {}", path.display()),
                Ok(None) => "导出已取消".to_string(),
                Err(e) => {
                    log::warn!("{e}");
                    e.to_string()
                }
            };
        }
    }

    /// 帧 tick：推进控制器，必要时向后端登记一次求值
    fn tick(&mut self) -> FrameDecision {
        if self.backend.is_broken() {
            log::warn!("GPU 求值器不可用，切换到 CPU 求值");
            self.backend = Backend::cpu(&self.field);
            self.controller.invalidate();
            self.last_status = "已回退到 CPU 求值".to_string();
        }

        match &mut self.backend {
            Backend::Gpu(state) => match state.lock() {
                Ok(mut st) => self.controller.drive(&mut *st),
                Err(_) => FrameDecision::Settled,
            },
            Backend::Cpu { renderer, .. } => self.controller.drive(renderer),
        }
    }

    fn paint(&mut self, ui: &mut egui::Ui, frame: &CanvasFrame) {
        match &mut self.backend {
            Backend::Gpu(state) => {
                ui.painter_at(frame.rect)
                    .add(make_field_callback(state.clone(), frame.rect));
            }
            Backend::Cpu {
                renderer,
                texture,
                uploaded,
            } => {
                if renderer.generation() != *uploaded {
                    if let Some(image) = renderer.image() {
                        let size = [image.width() as usize, image.height() as usize];
                        let color = ColorImage::from_rgba_unmultiplied(size, image.as_raw());
                        match texture {
                            Some(handle) => handle.set(color, TextureOptions::NEAREST),
                            None => {
                                *texture = Some(ui.ctx().load_texture("field", color, TextureOptions::NEAREST));
                            }
                        }
                    }
                    *uploaded = renderer.generation();
                }
                if let Some(handle) = texture {
                    ui.painter_at(frame.rect).image(
                        handle.id(),
                        frame.rect,
                        Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
            }
        }
    }

    /// 缩放收敛期间标出锚点，它在屏幕上应保持不动
    fn paint_zoom_anchor(&self, ui: &egui::Ui, frame: &CanvasFrame) {
        let params = self.controller.params();
        if params.size.is_empty() {
            return;
        }
        let anchor = self.controller.target().zoom_anchor;
        let screen = to_screen_coord(anchor, params.size, self.controller.view());
        let ppp = ui.ctx().pixels_per_point();
        let pos = frame.rect.min + egui::vec2(screen.x as f32 / ppp, screen.y as f32 / ppp);
        if frame.rect.contains(pos) {
            let stroke = Stroke::new(1.0, Color32::from_rgb(220, 60, 60));
            ui.painter_at(frame.rect).circle_stroke(pos, 6.0, stroke);
        }
    }
}

impl eframe::App for FieldViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let action = egui::SidePanel::left("control_panel")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                let readout = ViewReadout {
                    view: self.controller.view(),
                    target: self.controller.target(),
                    velocity: self.controller.velocity(),
                    settled: self.controller.is_settled(),
                    backend: self.backend.name(),
                    evaluations: self.backend.evaluations(),
                    presented: self.backend.presented(),
                };
                show_control_panel(ui, &readout)
            })
            .inner;

        let zoom = match (action.zoom_in, action.zoom_out) {
            (true, false) => Some(ZoomDirection::In),
            (false, true) => Some(ZoomDirection::Out),
            _ => None,
        };
        self.apply_action(zoom, action.reset, action.export_png);

        egui::TopBottomPanel::bottom("status_bar")
            .resizable(false)
            .min_height(28.0)
            .show(ctx, |ui| {
                let fps = ctx.input(|i| {
                    if i.stable_dt > 0.0 {
                        1.0 / i.stable_dt
                    } else {
                        0.0
                    }
                });
                show_status_bar(ui, fps, self.hover, &self.last_status);
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(Color32::WHITE))
            .show(ctx, |ui| {
                let canvas = self.input.handle(ui, &mut self.controller);
                self.hover = canvas.hover;

                let decision = self.tick();
                self.paint(ui, &canvas);
                if !self.controller.is_settled() {
                    self.paint_zoom_anchor(ui, &canvas);
                }

                // 静止后不再主动重绘，直到下一次输入
                if matches!(decision, FrameDecision::Evaluate(_)) {
                    ctx.request_repaint();
                }
            });
    }

    fn on_exit(&mut self, gl: Option<&eframe::glow::Context>) {
        if let (Backend::Gpu(state), Some(gl)) = (&self.backend, gl) {
            if let Ok(mut st) = state.lock() {
                st.destroy(gl);
            }
        }
    }
}

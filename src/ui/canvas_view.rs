use std::time::Instant;

use egui::{Event, PointerButton, Pos2, Rect, Sense, TouchId, TouchPhase, Ui};

use crate::core::geometry::{FieldPoint, ScreenPoint, ViewportSize};
use crate::core::input::{InputTranslator, TouchPoint};
use crate::rendering::viewport::ViewportController;

/// 本帧画布的布局结果
#[derive(Debug, Clone, Copy)]
pub struct CanvasFrame {
    pub rect: Rect,
    /// 指针下的场坐标
    pub hover: Option<FieldPoint>,
}

/// egui 原始事件 → [`InputTranslator`] → 控制器消息
pub struct CanvasInput {
    translator: InputTranslator,
    /// 按落下顺序排列的活动触点
    touches: Vec<(TouchId, Pos2)>,
}

impl Default for CanvasInput {
    fn default() -> Self {
        Self::new()
    }
}

impl CanvasInput {
    pub fn new() -> Self {
        Self {
            translator: InputTranslator::new(ViewportSize::default()),
            touches: Vec::new(),
        }
    }

    /// 分配画布区域并消费本帧输入。只产生状态增量，求值由随后的帧 tick 决定。
    pub fn handle(&mut self, ui: &mut Ui, controller: &mut ViewportController) -> CanvasFrame {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let ppp = ui.ctx().pixels_per_point();

        // ── 尺寸（设备像素）──────────────────────────────────
        let size = ViewportSize::new(
            (rect.width() * ppp).round().max(0.0) as u32,
            (rect.height() * ppp).round().max(0.0) as u32,
        );
        if let Some(msg) = self.translator.on_resize(size) {
            controller.apply(msg);
        }

        let to_screen = |pos: Pos2| {
            ScreenPoint::new(
                ((pos.x - rect.min.x) * ppp) as f64,
                ((pos.y - rect.min.y) * ppp) as f64,
            )
        };

        let (events, any_touches, latest_pos) =
            ui.input(|i| (i.events.clone(), i.any_touches(), i.pointer.latest_pos()));

        // ── 触摸 ──────────────────────────────────────────────
        let mut touch_moved = false;
        for event in &events {
            let Event::Touch { id, phase, pos, .. } = event else {
                continue;
            };
            match phase {
                TouchPhase::Start => {
                    if rect.contains(*pos) {
                        self.touches.push((*id, *pos));
                        let points = self.touch_points(&to_screen);
                        self.translator.on_touch_start(&points, controller.view());
                    }
                }
                TouchPhase::Move => {
                    if let Some(entry) = self.touches.iter_mut().find(|(tid, _)| tid == id) {
                        entry.1 = *pos;
                        touch_moved = true;
                    }
                }
                TouchPhase::End | TouchPhase::Cancel => {
                    let before = self.touches.len();
                    self.touches.retain(|(tid, _)| tid != id);
                    if self.touches.len() != before {
                        let points = self.touch_points(&to_screen);
                        self.translator.on_touch_end(&points, controller.view());
                    }
                }
            }
        }
        if touch_moved {
            // 一帧内的多个触点移动合并为一次采样
            let points = self.touch_points(&to_screen);
            let msg = self.translator.on_touch_move(&points, Instant::now(), controller.view());
            if let Some(msg) = msg {
                controller.apply(msg);
            }
        }

        // ── 鼠标（触摸时 egui 会模拟指针事件，跳过）─────────────
        if self.touches.is_empty() && !any_touches {
            for event in &events {
                let msg = match event {
                    Event::PointerButton {
                        pos,
                        button: PointerButton::Primary,
                        pressed: true,
                        ..
                    } if rect.contains(*pos) => self.translator.on_pointer_down(to_screen(*pos), controller.view()),
                    Event::PointerMoved(pos) => self.translator.on_pointer_move(to_screen(*pos), controller.view()),
                    Event::PointerButton {
                        button: PointerButton::Primary,
                        pressed: false,
                        ..
                    } => {
                        self.translator.on_pointer_up();
                        None
                    }
                    _ => None,
                };
                if let Some(msg) = msg {
                    controller.apply(msg);
                }
            }
        }

        // ── 滚轮：每个事件一步，连续刻度按几何级数叠加 ─────────
        if let Some(pos) = latest_pos.filter(|pos| rect.contains(*pos)) {
            let screen = to_screen(pos);
            for delta in wheel_steps(&events) {
                if let Some(msg) = self.translator.on_wheel(screen, delta, controller.view()) {
                    controller.apply(msg);
                }
            }
        }

        let hover = response
            .hover_pos()
            .map(|pos| self.translator.to_field_coord(to_screen(pos), controller.view()));

        CanvasFrame { rect, hover }
    }

    fn touch_points(&self, to_screen: &impl Fn(Pos2) -> ScreenPoint) -> Vec<TouchPoint> {
        self.touches.iter().map(|(_, pos)| to_screen(*pos)).collect()
    }
}

/// 本帧的滚轮刻度，每个事件一项，正值 = 缩小。
///
/// egui-winit 对同一次滚动同时发出 `MouseWheel` 和 `Scroll` / `Zoom`，有 `MouseWheel`
/// 时只取它；没有时（其他后端、触控板捏合）退回到 `Scroll` / `Zoom`。
/// egui 的 y 向上为正，所以取反。
fn wheel_steps(events: &[Event]) -> Vec<f64> {
    let raw: Vec<f64> = events
        .iter()
        .filter_map(|event| match event {
            Event::MouseWheel { delta, .. } => Some(-delta.y as f64),
            _ => None,
        })
        .collect();
    if !raw.is_empty() {
        return raw;
    }

    events
        .iter()
        .filter_map(|event| match event {
            Event::Scroll(delta) => Some(-delta.y as f64),
            // factor > 1 为张开（放大）
            Event::Zoom(factor) => Some(1.0 - *factor as f64),
            _ => None,
        })
        .collect()
}

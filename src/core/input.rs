//! # 输入换算
//!
//! 把设备事件（指针、滚轮、触摸，屏幕像素坐标）换算成场坐标，并产出 [`ViewMessage`]。
//! 除手势会话外不持有状态；视图状态由调用方以只读引用传入。
//!
//! 触摸约定：
//! - 单指移动等同拖拽，但在最近一次双指采样后的 [`PINCH_SUPPRESSION`] 内被忽略，
//!   那是抬起手指时残留的单指事件，不是用户意图。
//! - 双指：`sign(上次距离 - 本次距离)` 决定缩放方向，手指张开 → 放大；
//!   缩放锚点取两指中点。

use std::time::{Duration, Instant};

use super::geometry::{FieldPoint, ScreenPoint, ViewportSize, to_field_coord};
use super::view::{PINCH_SUPPRESSION, ViewMessage, ViewState, ZoomDirection};

/// 一次按下 → 抬起之间的手势会话
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerSession {
    /// 手势开始时指针下的场坐标
    pub anchor: FieldPoint,
    /// 双指手势的上一次指间距离（像素）
    pub previous_distance: Option<f64>,
}

/// 单个触点（屏幕像素）
pub type TouchPoint = ScreenPoint;

#[derive(Debug, Clone)]
pub struct InputTranslator {
    size: ViewportSize,
    pub(crate) session: Option<PointerSession>,
    last_pinch_at: Option<Instant>,
    suppression: Duration,
}

impl InputTranslator {
    pub fn new(size: ViewportSize) -> Self {
        Self {
            size,
            session: None,
            last_pinch_at: None,
            suppression: PINCH_SUPPRESSION,
        }
    }

    pub fn to_field_coord(&self, screen: ScreenPoint, view: &ViewState) -> FieldPoint {
        to_field_coord(screen, self.size, view)
    }

    /// 尺寸未变化时返回 `None`
    pub fn on_resize(&mut self, size: ViewportSize) -> Option<ViewMessage> {
        if size == self.size {
            return None;
        }
        self.size = size;
        Some(ViewMessage::Resized {
            width: size.width,
            height: size.height,
        })
    }

    // ── 滚轮 ──────────────────────────────────────────────

    /// `delta_y > 0` 缩小，`< 0` 放大，`0` 忽略
    pub fn on_wheel(&self, position: ScreenPoint, delta_y: f64, view: &ViewState) -> Option<ViewMessage> {
        let direction = ZoomDirection::from_sign(delta_y)?;
        if self.size.is_empty() {
            return None;
        }
        Some(ViewMessage::ZoomRequested {
            anchor: self.to_field_coord(position, view),
            direction,
        })
    }

    // ── 鼠标 / 触控笔 ────────────────────────────────────

    /// 开启会话，同时清零平移速度（抓住画面即停止滑行）
    pub fn on_pointer_down(&mut self, position: ScreenPoint, view: &ViewState) -> Option<ViewMessage> {
        if self.size.is_empty() {
            return None;
        }
        self.session = Some(PointerSession {
            anchor: self.to_field_coord(position, view),
            previous_distance: None,
        });
        Some(ViewMessage::PanDelta { dx: 0.0, dy: 0.0 })
    }

    /// 拖拽方向与 offset 移动方向相反
    pub fn on_pointer_move(&self, position: ScreenPoint, view: &ViewState) -> Option<ViewMessage> {
        let session = self.session.as_ref()?;
        let delta = self.to_field_coord(position, view) - session.anchor;
        if !delta.is_finite() {
            return None;
        }
        Some(ViewMessage::PanDelta {
            dx: -delta.x,
            dy: -delta.y,
        })
    }

    pub fn on_pointer_up(&mut self) {
        self.session = None;
    }

    // ── 触摸 ──────────────────────────────────────────────

    pub fn on_touch_start(&mut self, touches: &[TouchPoint], view: &ViewState) {
        match touches {
            [only] => {
                self.session = Some(PointerSession {
                    anchor: self.to_field_coord(*only, view),
                    previous_distance: None,
                });
            }
            [_, _] => {
                // 第二根手指落下：距离从下一次采样开始记录
                let anchor = self.session.map_or(view.offset, |s| s.anchor);
                self.session = Some(PointerSession {
                    anchor,
                    previous_distance: None,
                });
            }
            _ => {}
        }
    }

    pub fn on_touch_move(
        &mut self,
        touches: &[TouchPoint],
        now: Instant,
        view: &ViewState,
    ) -> Option<ViewMessage> {
        if self.size.is_empty() {
            return None;
        }
        match touches {
            [only] => {
                if self.within_pinch_window(now) {
                    return None;
                }
                self.on_pointer_move(*only, view)
            }
            [first, second] => {
                self.last_pinch_at = Some(now);
                let distance = first.distance(*second);
                let anchor = self.to_field_coord(first.midpoint(*second), view);

                let session = self.session.get_or_insert(PointerSession {
                    anchor,
                    previous_distance: None,
                });
                let previous = session.previous_distance.replace(distance);

                // 上次距离缺失或为 0 时只记录，不缩放
                let direction = previous
                    .filter(|d| *d > 0.0)
                    .and_then(|d| ZoomDirection::from_sign(d - distance));

                Some(match direction {
                    Some(direction) => ViewMessage::ZoomRequested { anchor, direction },
                    None => ViewMessage::AnchorMoved { anchor },
                })
            }
            _ => None,
        }
    }

    /// `remaining` 为抬起后仍在屏幕上的触点
    pub fn on_touch_end(&mut self, remaining: &[TouchPoint], view: &ViewState) {
        match remaining {
            [] => self.session = None,
            [only] => {
                // 捏合收拢为单指：清掉旧距离，在剩余触点处重新取锚点
                self.session = Some(PointerSession {
                    anchor: self.to_field_coord(*only, view),
                    previous_distance: None,
                });
            }
            _ => {}
        }
    }

    fn within_pinch_window(&self, now: Instant) -> bool {
        self.last_pinch_at
            .is_some_and(|at| now.saturating_duration_since(at) <= self.suppression)
    }
}

//! # 坐标系
//!
//! 屏幕坐标（设备像素，原点左上，Y 向下）与场坐标（求值空间，Y 向上）之间的换算。
//!
//! 归一化统一以短边 `min(width, height)` 为基准：短边映射到 `[-1, 1]`，
//! 长边映射到 `[-aspect, aspect]`，因此非正方形视口下场不会被拉伸。
//! GPU 着色器与 CPU 求值器使用同一推导，输入与画面才不会错位。

use std::ops::{Add, Mul, Sub};

use super::view::ViewState;

// ═══════════════════════════════════════════════════════════
// 点类型
// ═══════════════════════════════════════════════════════════

/// 场空间中的点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldPoint {
    pub x: f64,
    pub y: f64,
}

impl FieldPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for FieldPoint {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for FieldPoint {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for FieldPoint {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// 视口内的屏幕点（设备像素，相对视口左上角）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }
}

// ═══════════════════════════════════════════════════════════
// 视口尺寸与平移边界
// ═══════════════════════════════════════════════════════════

/// 视口尺寸（设备像素），只在窗口缩放时改变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// 归一化基准边长。零尺寸视口按 1 处理，避免除零。
    pub fn shorter_side(&self) -> f64 {
        self.width.min(self.height).max(1) as f64
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// 平移边界矩形，offset 每帧按分量夹紧到其中
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetBounds {
    pub min: FieldPoint,
    pub max: FieldPoint,
}

impl OffsetBounds {
    pub const fn new(min: FieldPoint, max: FieldPoint) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.x <= self.max.x && self.min.y <= self.max.y
    }

    pub fn clamp(&self, p: FieldPoint) -> FieldPoint {
        FieldPoint::new(
            p.x.clamp(self.min.x, self.max.x),
            p.y.clamp(self.min.y, self.max.y),
        )
    }

    pub fn contains(&self, p: FieldPoint) -> bool {
        (self.min.x..=self.max.x).contains(&p.x) && (self.min.y..=self.max.y).contains(&p.y)
    }
}

// ═══════════════════════════════════════════════════════════
// 坐标换算
// ═══════════════════════════════════════════════════════════

/// 屏幕点 → 归一化坐标 `[-aspect, aspect] × [-1, 1]`，Y 轴翻转为向上。
///
/// 等价于 `(w / s) * (2x / w - 1)`，但不对宽高单独做除法，零尺寸视口也不会产生 NaN。
pub fn normalize(screen: ScreenPoint, size: ViewportSize) -> FieldPoint {
    let s = size.shorter_side();
    FieldPoint::new(
        (2.0 * screen.x - size.width as f64) / s,
        -(2.0 * screen.y - size.height as f64) / s,
    )
}

/// [`normalize`] 的逆
pub fn denormalize(n: FieldPoint, size: ViewportSize) -> ScreenPoint {
    let s = size.shorter_side();
    ScreenPoint::new(
        (n.x * s + size.width as f64) / 2.0,
        (size.height as f64 - n.y * s) / 2.0,
    )
}

/// `field = scale * normalized + offset`
pub fn to_field_coord(screen: ScreenPoint, size: ViewportSize, view: &ViewState) -> FieldPoint {
    normalize(screen, size) * view.scale + view.offset
}

/// [`to_field_coord`] 的逆。`view.scale` 恒为正，见 [`crate::core::view::ViewConfig::validate`]。
pub fn to_screen_coord(field: FieldPoint, size: ViewportSize, view: &ViewState) -> ScreenPoint {
    denormalize((field - view.offset) * (1.0 / view.scale), size)
}

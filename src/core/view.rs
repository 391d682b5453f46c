//! # 视图状态与调参常量
//!
//! [`ViewState`] 是画面的权威状态，只由 [`crate::rendering::viewport::ViewportController`]
//! 在每帧 tick 中修改；[`TargetState`] 与 [`PanVelocity`] 由输入消息更新。
//! 输入与控制器之间只通过 [`ViewMessage`] 交互。

use std::time::Duration;

use super::geometry::{FieldPoint, OffsetBounds};
use crate::config::ConfigError;

// ═══════════════════════════════════════════════════════════
// 常量
// ═══════════════════════════════════════════════════════════

/// 目标缩放上限（最远视野）
pub const MAX_SCALE: f64 = 1.5;
/// 目标缩放下限（最深放大），必须严格大于 0
pub const MIN_SCALE: f64 = 0.001;
/// 每次滚轮 / 捏合刻度对目标缩放的乘性步长
pub const SCALE_DIFF: f64 = 0.05;
/// 缩放趋近系数：每帧剩余差距乘以该值
pub const MOMENTUM: f64 = 0.9;
/// 平移速度每帧衰减系数
pub const VELOCITY_MOMENTUM: f64 = 0.95;
/// 静止判定的速度阈值（相对当前 scale）
pub const MIN_VELOCITY: f64 = 0.001;
/// 捏合采样后屏蔽单指平移的时间窗口
pub const PINCH_SUPPRESSION: Duration = Duration::from_millis(100);
/// offset 可达范围
pub const OFFSET_BOUNDS: OffsetBounds =
    OffsetBounds::new(FieldPoint::new(-2.0, -1.0), FieldPoint::new(1.0, 1.0));

/// 启动时的视图中心
pub const START_OFFSET: FieldPoint = FieldPoint::new(-0.75, 0.0);
/// 启动时的缩放（远景），随后缓入到 [`START_TARGET_SCALE`]
pub const START_SCALE: f64 = 100.0;
pub const START_TARGET_SCALE: f64 = 1.5;

// ═══════════════════════════════════════════════════════════
// 配置
// ═══════════════════════════════════════════════════════════

/// 控制器调参，默认值即上面的常量。
#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    pub min_scale: f64,
    pub max_scale: f64,
    pub scale_diff: f64,
    pub momentum: f64,
    pub velocity_momentum: f64,
    pub min_velocity: f64,
    pub offset_bounds: OffsetBounds,
    pub start_offset: FieldPoint,
    pub start_scale: f64,
    pub start_target_scale: f64,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
            scale_diff: SCALE_DIFF,
            momentum: MOMENTUM,
            velocity_momentum: VELOCITY_MOMENTUM,
            min_velocity: MIN_VELOCITY,
            offset_bounds: OFFSET_BOUNDS,
            start_offset: START_OFFSET,
            start_scale: START_SCALE,
            start_target_scale: START_TARGET_SCALE,
        }
    }
}

impl ViewConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: &str| Err(ConfigError::InvalidView(reason.to_string()));

        if !(self.min_scale > 0.0) {
            return fail("min_scale 必须大于 0");
        }
        if !(self.min_scale <= self.max_scale) || !self.max_scale.is_finite() {
            return fail("要求 min_scale <= max_scale 且为有限值");
        }
        if !(0.0..1.0).contains(&self.momentum) {
            return fail("momentum 必须位于 [0, 1)");
        }
        if !(0.0..1.0).contains(&self.velocity_momentum) {
            return fail("velocity_momentum 必须位于 [0, 1)");
        }
        if !(self.min_velocity >= 0.0) {
            return fail("min_velocity 不能为负");
        }
        if !(self.scale_diff > 0.0 && self.scale_diff < 1.0) {
            return fail("scale_diff 必须位于 (0, 1)");
        }
        if !self.offset_bounds.is_valid() {
            return fail("offset 边界矩形非法");
        }
        if !(self.start_scale >= self.min_scale) || !self.start_scale.is_finite() {
            return fail("start_scale 必须不小于 min_scale");
        }
        if !self.start_target_scale.is_finite() {
            return fail("start_target_scale 必须为有限值");
        }
        if !self.start_offset.is_finite() {
            return fail("start_offset 必须为有限值");
        }
        Ok(())
    }

    pub fn clamp_target(&self, scale: f64) -> f64 {
        scale.clamp(self.min_scale, self.max_scale)
    }
}

// ═══════════════════════════════════════════════════════════
// 状态
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub scale: f64,
    pub offset: FieldPoint,
}

/// 缩放缓动的目标
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetState {
    pub target_scale: f64,
    /// 收敛期间保持在屏幕上不动的场坐标
    pub zoom_anchor: FieldPoint,
}

impl TargetState {
    /// 乘性调整目标缩放；连续刻度按几何级数叠加。
    pub fn step(&mut self, direction: ZoomDirection, config: &ViewConfig) {
        self.target_scale = config.clamp_target(self.target_scale * direction.factor(config.scale_diff));
    }
}

/// 平移速度（场坐标 / 帧）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PanVelocity {
    pub dx: f64,
    pub dy: f64,
}

impl PanVelocity {
    pub const ZERO: Self = Self { dx: 0.0, dy: 0.0 };

    pub fn as_delta(self) -> FieldPoint {
        FieldPoint::new(self.dx, self.dy)
    }

    pub fn length_squared(self) -> f64 {
        self.dx * self.dx + self.dy * self.dy
    }

    pub fn decay(&mut self, factor: f64) {
        self.dx *= factor;
        self.dy *= factor;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomDirection {
    /// scale 变小，画面放大
    In,
    /// scale 变大，画面缩小
    Out,
}

impl ZoomDirection {
    /// 正号 → 缩小，负号 → 放大，零或 NaN → 无方向
    pub fn from_sign(value: f64) -> Option<Self> {
        if value > 0.0 {
            Some(Self::Out)
        } else if value < 0.0 {
            Some(Self::In)
        } else {
            None
        }
    }

    pub fn factor(self, scale_diff: f64) -> f64 {
        match self {
            Self::In => 1.0 - scale_diff,
            Self::Out => 1.0 + scale_diff,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// 消息
// ═══════════════════════════════════════════════════════════

/// 输入层产生、控制器消费的状态增量。消息本身从不触发求值。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewMessage {
    ZoomRequested {
        anchor: FieldPoint,
        direction: ZoomDirection,
    },
    /// 只移动缩放锚点（首个捏合采样）
    AnchorMoved { anchor: FieldPoint },
    /// 覆盖（而非累加）当前平移速度
    PanDelta { dx: f64, dy: f64 },
    Resized { width: u32, height: u32 },
    /// 回到启动状态
    Reset,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ViewConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_config() {
        let bad = [
            ViewConfig { min_scale: 0.0, ..ViewConfig::default() },
            ViewConfig { min_scale: -1.0, ..ViewConfig::default() },
            ViewConfig { max_scale: 0.0001, ..ViewConfig::default() },
            ViewConfig { momentum: 1.0, ..ViewConfig::default() },
            ViewConfig { velocity_momentum: 1.5, ..ViewConfig::default() },
            ViewConfig { scale_diff: 0.0, ..ViewConfig::default() },
            ViewConfig { min_velocity: f64::NAN, ..ViewConfig::default() },
            ViewConfig { start_target_scale: f64::NAN, ..ViewConfig::default() },
            ViewConfig { start_target_scale: f64::INFINITY, ..ViewConfig::default() },
        ];
        for cfg in bad {
            assert!(matches!(cfg.validate(), Err(ConfigError::InvalidView(_))), "{cfg:?}");
        }
    }

    #[test]
    fn zoom_direction_follows_sign() {
        assert_eq!(ZoomDirection::from_sign(3.0), Some(ZoomDirection::Out));
        assert_eq!(ZoomDirection::from_sign(-0.1), Some(ZoomDirection::In));
        assert_eq!(ZoomDirection::from_sign(0.0), None);
        assert_eq!(ZoomDirection::from_sign(f64::NAN), None);
    }

    #[test]
    fn target_steps_compound_and_clamp() {
        let cfg = ViewConfig::default();
        let mut target = TargetState {
            target_scale: 1.0,
            zoom_anchor: FieldPoint::new(0.0, 0.0),
        };
        target.step(ZoomDirection::In, &cfg);
        target.step(ZoomDirection::In, &cfg);
        assert!((target.target_scale - 0.95 * 0.95).abs() < 1e-12);

        for _ in 0..100 {
            target.step(ZoomDirection::Out, &cfg);
        }
        assert_eq!(target.target_scale, MAX_SCALE);
    }

    #[test]
    fn velocity_decays_geometrically() {
        let mut v = PanVelocity { dx: 1.0, dy: -2.0 };
        v.decay(0.5);
        assert_eq!(v, PanVelocity { dx: 0.5, dy: -1.0 });
        assert_eq!(v.length_squared(), 1.25);
    }
}

//! # 视口控制器
//!
//! 持有视图的权威状态，每帧按阻尼递推推进一次，并决定本帧是否需要重新求值。
//!
//! 每帧（未静止时）：
//! 1. `new_scale = m * scale + (1 - m) * target_scale`，指数逼近，不会越过目标；
//! 2. 锚点修正 `offset += (1 - new_scale / scale) * (anchor - offset)`，锚点在屏幕上不动；
//! 3. `offset += velocity`，然后按分量夹紧到边界矩形。
//!
//! 无论是否静止，速度每帧都乘以 `velocity_momentum`。

use crate::config::ConfigError;
use crate::core::geometry::ViewportSize;
use crate::core::view::{PanVelocity, TargetState, ViewConfig, ViewMessage, ViewState};
use crate::rendering::{FieldEvaluator, FieldParams};

/// 单帧的决策结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameDecision {
    /// 画面无可感知的变化，跳过求值与重绘
    Settled,
    Evaluate(FieldParams),
}

#[derive(Debug, Clone)]
pub struct ViewportController {
    config: ViewConfig,
    view: ViewState,
    target: TargetState,
    velocity: PanVelocity,
    size: ViewportSize,
    pending_resize: Option<ViewportSize>,
    /// 当前图像已过期（首帧 / 尺寸变化 / 重置），即使静止也要求值一次
    stale: bool,
}

impl ViewportController {
    pub fn new(config: ViewConfig, size: ViewportSize) -> Result<Self, ConfigError> {
        config.validate()?;
        let (view, target) = Self::launch_state(&config);
        Ok(Self {
            config,
            view,
            target,
            velocity: PanVelocity::ZERO,
            size,
            pending_resize: Some(size),
            stale: true,
        })
    }

    fn launch_state(config: &ViewConfig) -> (ViewState, TargetState) {
        let view = ViewState {
            scale: config.start_scale,
            offset: config.offset_bounds.clamp(config.start_offset),
        };
        let target = TargetState {
            target_scale: config.clamp_target(config.start_target_scale),
            zoom_anchor: view.offset,
        };
        (view, target)
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn target(&self) -> &TargetState {
        &self.target
    }

    pub fn velocity(&self) -> PanVelocity {
        self.velocity
    }

    pub fn params(&self) -> FieldParams {
        FieldParams {
            scale: self.view.scale,
            offset: self.view.offset,
            size: self.size,
        }
    }

    /// 速度相对当前 scale 可忽略，且缩放已逼近目标
    pub fn is_settled(&self) -> bool {
        let scale = self.view.scale;
        let min_v = self.config.min_velocity;
        self.velocity.length_squared() <= min_v * min_v * scale * scale
            && (scale - self.target.target_scale).abs() <= self.config.min_scale / 10.0
    }

    // ── 输入消息 ──────────────────────────────────────────

    /// 只更新目标 / 速度 / 尺寸，从不直接求值
    pub fn apply(&mut self, message: ViewMessage) {
        match message {
            ViewMessage::ZoomRequested { anchor, direction } => {
                if !anchor.is_finite() {
                    return;
                }
                self.target.zoom_anchor = anchor;
                self.target.step(direction, &self.config);
            }
            ViewMessage::AnchorMoved { anchor } => {
                if anchor.is_finite() {
                    self.target.zoom_anchor = anchor;
                }
            }
            ViewMessage::PanDelta { dx, dy } => {
                if dx.is_finite() && dy.is_finite() {
                    self.velocity = PanVelocity { dx, dy };
                }
            }
            ViewMessage::Resized { width, height } => {
                let size = ViewportSize::new(width, height);
                if size != self.size {
                    log::debug!("视口尺寸变化: {width}x{height}");
                    self.size = size;
                    self.pending_resize = Some(size);
                    self.stale = true;
                }
            }
            ViewMessage::Reset => {
                let (view, target) = Self::launch_state(&self.config);
                self.view = view;
                self.target = target;
                self.velocity = PanVelocity::ZERO;
                self.stale = true;
            }
        }
    }

    /// 求值后端更换后调用：重新下发尺寸，下一帧强制求值
    pub fn invalidate(&mut self) {
        self.pending_resize = Some(self.size);
        self.stale = true;
    }

    // ── 帧推进 ────────────────────────────────────────────

    pub fn tick(&mut self) -> FrameDecision {
        let moving = !self.is_settled();
        if moving {
            self.advance();
        }
        self.velocity.decay(self.config.velocity_momentum);

        let stale = std::mem::take(&mut self.stale);
        if (moving || stale) && !self.size.is_empty() {
            FrameDecision::Evaluate(self.params())
        } else {
            if stale && self.size.is_empty() {
                // 等尺寸有效后再求值
                self.stale = true;
            }
            FrameDecision::Settled
        }
    }

    fn advance(&mut self) {
        let cfg = &self.config;
        let scale = self.view.scale;
        let m = cfg.momentum;

        // 启动时 scale 可能高于 max_scale，此时只允许单调回落
        let new_scale = (m * scale + (1.0 - m) * self.target.target_scale)
            .max(cfg.min_scale)
            .min(cfg.max_scale.max(scale));

        let anchor = self.target.zoom_anchor;
        let mut offset = self.view.offset;
        offset = offset + (anchor - offset) * (1.0 - new_scale / scale);
        offset = offset + self.velocity.as_delta();

        self.view = ViewState {
            scale: new_scale,
            offset: cfg.offset_bounds.clamp(offset),
        };
        debug_assert!(cfg.offset_bounds.contains(self.view.offset));
    }

    /// 推进一帧并把决策交给求值后端。
    ///
    /// 求值失败只记录日志：视图状态不受影响，也不会 `present`，屏幕保留上一帧。
    pub fn drive<E: FieldEvaluator + ?Sized>(&mut self, evaluator: &mut E) -> FrameDecision {
        if let Some(size) = self.pending_resize.take() {
            evaluator.resize(size);
        }

        let decision = self.tick();
        if let FrameDecision::Evaluate(params) = &decision {
            match evaluator.evaluate(params) {
                Ok(()) => evaluator.present(),
                Err(e) => log::warn!("求值失败，保留上一帧: {e}"),
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::core::geometry::{FieldPoint, ScreenPoint, to_field_coord};
    use crate::core::input::InputTranslator;
    use crate::core::view::{MAX_SCALE, MIN_SCALE, START_SCALE, ZoomDirection};
    use crate::rendering::RenderError;

    const SIZE: ViewportSize = ViewportSize::new(800, 600);

    #[derive(Default)]
    struct Recorder {
        evaluated: Vec<FieldParams>,
        presented: usize,
        resized: Vec<ViewportSize>,
        fail: bool,
    }

    impl FieldEvaluator for Recorder {
        fn evaluate(&mut self, params: &FieldParams) -> Result<(), RenderError> {
            self.evaluated.push(*params);
            if self.fail {
                Err(RenderError::Resource("test".into()))
            } else {
                Ok(())
            }
        }

        fn present(&mut self) {
            self.presented += 1;
        }

        fn resize(&mut self, size: ViewportSize) {
            self.resized.push(size);
        }
    }

    fn controller(config: ViewConfig) -> ViewportController {
        ViewportController::new(config, SIZE).unwrap()
    }

    /// 起始即处于目标缩放，不带启动缓入
    fn at_rest(scale: f64, offset: FieldPoint) -> ViewConfig {
        ViewConfig {
            start_scale: scale,
            start_target_scale: scale,
            start_offset: offset,
            ..ViewConfig::default()
        }
    }

    fn settle(c: &mut ViewportController) -> usize {
        for n in 0..100_000 {
            if c.tick() == FrameDecision::Settled {
                return n;
            }
        }
        panic!("controller never settled");
    }

    #[test]
    fn rejects_invalid_config() {
        let cfg = ViewConfig {
            min_scale: 0.0,
            ..ViewConfig::default()
        };
        assert!(ViewportController::new(cfg, SIZE).is_err());

        // NaN 目标会让 scale 一帧跌到下限且永不静止
        let cfg = ViewConfig {
            start_target_scale: f64::NAN,
            ..ViewConfig::default()
        };
        assert!(matches!(
            ViewportController::new(cfg, SIZE),
            Err(ConfigError::InvalidView(_))
        ));
    }

    #[test]
    fn launch_eases_in_from_far_out() {
        let mut c = controller(ViewConfig::default());
        assert_eq!(c.view().scale, START_SCALE);
        assert_eq!(c.target().target_scale, MAX_SCALE);
        assert!(matches!(c.tick(), FrameDecision::Evaluate(_)));
        assert!(c.view().scale < START_SCALE);
    }

    #[test]
    fn wheel_scenario_converges_to_new_target() {
        let cfg = ViewConfig {
            max_scale: 200.0,
            ..at_rest(100.0, FieldPoint::new(-0.75, 0.0))
        };
        let mut c = controller(cfg);
        let t = InputTranslator::new(SIZE);
        settle(&mut c);

        let msg = t.on_wheel(ScreenPoint::new(400.0, 300.0), -1.0, c.view()).unwrap();
        c.apply(msg);
        assert!((c.target().target_scale - 95.0).abs() < 1e-9);
        assert_eq!(c.target().zoom_anchor, FieldPoint::new(-0.75, 0.0));

        let ticks = settle(&mut c);
        assert!(ticks > 0);
        assert!((c.view().scale - 95.0).abs() <= MIN_SCALE / 10.0);
        assert_eq!(c.tick(), FrameDecision::Settled);
    }

    #[test]
    fn drag_scenario_decays_velocity() {
        let mut c = controller(at_rest(1.0, FieldPoint::new(-0.5, 0.0)));
        settle(&mut c);
        let mut t = InputTranslator::new(SIZE);
        let a = ScreenPoint::new(300.0, 300.0);
        let b = ScreenPoint::new(360.0, 280.0);

        let fa = to_field_coord(a, SIZE, c.view());
        let fb = to_field_coord(b, SIZE, c.view());
        c.apply(t.on_pointer_down(a, c.view()).unwrap());
        c.apply(t.on_pointer_move(b, c.view()).unwrap());
        t.on_pointer_up();

        let v = c.velocity();
        assert!((v.dx + (fb.x - fa.x)).abs() < 1e-12);
        assert!((v.dy + (fb.y - fa.y)).abs() < 1e-12);

        let momentum = c.config.velocity_momentum;
        loop {
            let before = c.velocity();
            let decision = c.tick();
            let after = c.velocity();
            assert!((after.dx - before.dx * momentum).abs() < 1e-15);
            assert!((after.dy - before.dy * momentum).abs() < 1e-15);
            if decision == FrameDecision::Settled {
                let (min_v, scale) = (c.config.min_velocity, c.view().scale);
                assert!(before.length_squared() <= min_v * min_v * scale * scale);
                break;
            }
        }
    }

    #[test]
    fn pan_delta_overwrites_velocity() {
        let mut c = controller(ViewConfig::default());
        c.apply(ViewMessage::PanDelta { dx: 1.0, dy: 1.0 });
        c.apply(ViewMessage::PanDelta { dx: -0.2, dy: 0.1 });
        assert_eq!(c.velocity(), PanVelocity { dx: -0.2, dy: 0.1 });
        c.apply(ViewMessage::PanDelta { dx: f64::NAN, dy: 0.0 });
        assert_eq!(c.velocity(), PanVelocity { dx: -0.2, dy: 0.1 });
    }

    #[test]
    fn idle_gap_shrinks_monotonically() {
        for momentum in [0.5, 0.9, 0.99] {
            let mut c = controller(ViewConfig {
                momentum,
                ..ViewConfig::default()
            });
            let mut gap = (c.view().scale - c.target().target_scale).abs();
            let mut ticks = 0;
            while c.tick() != FrameDecision::Settled {
                let next = (c.view().scale - c.target().target_scale).abs();
                assert!(next < gap, "gap must shrink every tick");
                gap = next;
                ticks += 1;
                assert!(ticks < 100_000);
            }
            assert!(gap <= MIN_SCALE / 10.0);
        }
    }

    #[test]
    fn zoom_anchor_stays_under_cursor() {
        let mut c = controller(at_rest(1.0, FieldPoint::new(-0.5, 0.2)));
        settle(&mut c);
        let cursor = ScreenPoint::new(600.0, 150.0);
        let anchor = to_field_coord(cursor, SIZE, c.view());
        for _ in 0..5 {
            c.apply(ViewMessage::ZoomRequested {
                anchor,
                direction: ZoomDirection::In,
            });
        }
        for _ in 0..30 {
            assert!(matches!(c.tick(), FrameDecision::Evaluate(_)));
            let under = to_field_coord(cursor, SIZE, c.view());
            assert!((under.x - anchor.x).abs() < 1e-9);
            assert!((under.y - anchor.y).abs() < 1e-9);
        }
    }

    #[test]
    fn random_input_keeps_invariants() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for start_scale in [1.0, START_SCALE] {
            let mut c = controller(ViewConfig {
                start_scale,
                ..ViewConfig::default()
            });
            let bounds = c.config.offset_bounds;
            let mut t = InputTranslator::new(SIZE);
            let now = Instant::now();

            for step in 0..5_000u64 {
                let p = ScreenPoint::new(rng.gen_range(-50.0..850.0), rng.gen_range(-50.0..650.0));
                let msg = match rng.gen_range(0..5) {
                    0 => t.on_wheel(p, rng.gen_range(-3.0..3.0), c.view()),
                    1 => t.on_pointer_down(p, c.view()),
                    2 => t.on_pointer_move(p, c.view()),
                    3 => {
                        let q = ScreenPoint::new(p.x + rng.gen_range(1.0..200.0), p.y);
                        t.on_touch_move(&[p, q], now + Duration::from_millis(step), c.view())
                    }
                    _ => Some(ViewMessage::PanDelta {
                        dx: rng.gen_range(-5.0..5.0),
                        dy: rng.gen_range(-5.0..5.0),
                    }),
                };
                if let Some(msg) = msg {
                    c.apply(msg);
                }
                if rng.gen_bool(0.1) {
                    t.on_pointer_up();
                }
                c.tick();

                let target = c.target().target_scale;
                assert!((MIN_SCALE..=MAX_SCALE).contains(&target));
                assert!(c.view().scale >= MIN_SCALE);
                assert!(c.view().scale <= MAX_SCALE.max(start_scale));
                assert!(bounds.contains(c.view().offset), "{:?}", c.view());
            }
        }
    }

    #[test]
    fn scale_never_leaves_limits_once_inside() {
        let mut c = controller(at_rest(1.0, FieldPoint::new(-0.75, 0.0)));
        let anchor = c.view().offset;
        for direction in [ZoomDirection::In, ZoomDirection::Out] {
            for _ in 0..400 {
                c.apply(ViewMessage::ZoomRequested { anchor, direction });
                c.tick();
                assert!((MIN_SCALE..=MAX_SCALE).contains(&c.view().scale));
            }
        }
    }

    #[test]
    fn settled_view_skips_evaluation() {
        let mut c = controller(ViewConfig::default());
        let mut r = Recorder::default();
        while c.drive(&mut r) != FrameDecision::Settled {}
        let evaluated = r.evaluated.len();
        let presented = r.presented;
        assert!(evaluated > 0);

        for _ in 0..50 {
            assert_eq!(c.drive(&mut r), FrameDecision::Settled);
        }
        assert_eq!(r.evaluated.len(), evaluated);
        assert_eq!(r.presented, presented);

        c.apply(ViewMessage::ZoomRequested {
            anchor: c.view().offset,
            direction: ZoomDirection::In,
        });
        // 同一帧内多个消息只触发一次求值
        c.apply(ViewMessage::PanDelta { dx: 0.01, dy: 0.0 });
        c.drive(&mut r);
        assert_eq!(r.evaluated.len(), evaluated + 1);
        assert_eq!(r.presented, presented + 1);
    }

    #[test]
    fn failed_evaluation_keeps_view_and_skips_present() {
        let mut ok = controller(ViewConfig::default());
        let mut failing = controller(ViewConfig::default());
        let mut good = Recorder::default();
        let mut bad = Recorder {
            fail: true,
            ..Recorder::default()
        };
        for _ in 0..10 {
            ok.drive(&mut good);
            failing.drive(&mut bad);
        }
        assert_eq!(ok.view(), failing.view());
        assert_eq!(bad.evaluated.len(), 10);
        assert_eq!(bad.presented, 0);
    }

    #[test]
    fn resize_forces_one_evaluation() {
        let mut c = controller(at_rest(1.0, FieldPoint::new(-0.75, 0.0)));
        let mut r = Recorder::default();
        while c.drive(&mut r) != FrameDecision::Settled {}
        assert_eq!(r.resized, vec![SIZE]);
        let view = *c.view();

        c.apply(ViewMessage::Resized { width: 1024, height: 768 });
        let decision = c.drive(&mut r);
        assert_eq!(r.resized, vec![SIZE, ViewportSize::new(1024, 768)]);
        let FrameDecision::Evaluate(params) = decision else {
            panic!("resize must re-evaluate");
        };
        assert_eq!(params.size, ViewportSize::new(1024, 768));
        assert_eq!(*c.view(), view);
        assert_eq!(c.drive(&mut r), FrameDecision::Settled);
    }

    #[test]
    fn invalidate_hands_size_to_new_backend() {
        let mut c = controller(at_rest(1.0, FieldPoint::new(-0.75, 0.0)));
        let mut first = Recorder::default();
        while c.drive(&mut first) != FrameDecision::Settled {}

        let mut second = Recorder::default();
        c.invalidate();
        assert!(matches!(c.drive(&mut second), FrameDecision::Evaluate(_)));
        assert_eq!(second.resized, vec![SIZE]);
        assert_eq!(second.presented, 1);
    }

    #[test]
    fn empty_viewport_defers_evaluation() {
        let mut c = ViewportController::new(
            at_rest(1.0, FieldPoint::new(-0.75, 0.0)),
            ViewportSize::new(0, 0),
        )
        .unwrap();
        assert_eq!(c.tick(), FrameDecision::Settled);
        c.apply(ViewMessage::Resized { width: 10, height: 10 });
        assert!(matches!(c.tick(), FrameDecision::Evaluate(_)));
    }

    #[test]
    fn reset_restores_launch_state() {
        let mut c = controller(ViewConfig::default());
        settle(&mut c);
        c.apply(ViewMessage::PanDelta { dx: 0.3, dy: 0.3 });
        c.apply(ViewMessage::ZoomRequested {
            anchor: FieldPoint::new(0.2, 0.1),
            direction: ZoomDirection::In,
        });
        c.tick();
        c.apply(ViewMessage::Reset);
        assert_eq!(c.view().scale, START_SCALE);
        assert_eq!(c.view().offset, FieldPoint::new(-0.75, 0.0));
        assert_eq!(c.velocity(), PanVelocity::ZERO);
        assert!(matches!(c.tick(), FrameDecision::Evaluate(_)));
    }
}

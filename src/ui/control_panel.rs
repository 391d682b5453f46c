use egui::Ui;

use crate::core::view::{PanVelocity, TargetState, ViewState};

// ── action returned to the app ──────────────────────────────

#[derive(Debug, Clone)]
pub struct ControlAction {
    pub zoom_in: bool,
    pub zoom_out: bool,
    pub reset: bool,
    pub export_png: bool,
}

impl ControlAction {
    pub fn none() -> Self {
        Self {
            zoom_in: false,
            zoom_out: false,
            reset: false,
            export_png: false,
        }
    }
}

/// 面板只读展示的视图数据
pub struct ViewReadout<'a> {
    pub view: &'a ViewState,
    pub target: &'a TargetState,
    pub velocity: PanVelocity,
    pub settled: bool,
    pub backend: &'static str,
    pub evaluations: u64,
    pub presented: u64,
}

// ── panel rendering ─────────────────────────────────────────

pub fn show_control_panel(ui: &mut Ui, readout: &ViewReadout<'_>) -> ControlAction {
    let mut action = ControlAction::none();

    ui.heading("控制面板");
    ui.separator();

    // ── zoom ──
    ui.label("缩放");
    ui.horizontal(|ui| {
        if ui.button("+").clicked() {
            action.zoom_in = true;
        }
        if ui.button("-").clicked() {
            action.zoom_out = true;
        }
        if ui.button("重置").clicked() {
            action.reset = true;
        }
    });

    ui.separator();

    // ── view readout ──
    let view = readout.view;
    ui.label(format!("scale: {:.6e}", view.scale));
    ui.label(format!("目标: {:.6e}", readout.target.target_scale));
    ui.label(format!("中心: ({:.8}, {:.8})", view.offset.x, view.offset.y));
    ui.label(format!(
        "速度: ({:.2e}, {:.2e})",
        readout.velocity.dx, readout.velocity.dy
    ));
    ui.label(if readout.settled { "静止" } else { "运动中" });

    ui.separator();

    ui.label(format!("求值后端: {}", readout.backend));
    ui.label(format!("已求值: {} 次", readout.evaluations));
    ui.label(format!("已提交: {} 帧", readout.presented));

    ui.separator();

    // ── actions ──
    if ui.button("📸 导出 PNG").clicked() {
        action.export_png = true;
    }

    ui.separator();
    ui.small("拖拽平移，滚轮 / 双指捏合缩放");

    action
}

use egui::Ui;

use crate::core::geometry::FieldPoint;

pub fn show_status_bar(ui: &mut Ui, fps: f32, hover: Option<FieldPoint>, message: &str) {
    ui.horizontal_wrapped(|ui| {
        ui.label(format!("状态: {message}"));
        ui.separator();
        ui.label(format!("FPS: {:.0}", fps));
        if let Some(p) = hover {
            ui.separator();
            ui.label(format!("指针: ({:.6}, {:.6})", p.x, p.y));
        }
    });
}

mod config;
mod core;
mod rendering;
mod ui;

use crate::config::field::load_field_config;
use crate::core::geometry::ViewportSize;
use crate::core::view::ViewConfig;
use crate::rendering::viewport::ViewportController;
use crate::ui::app::FieldViewerApp;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let field = load_field_config()?;
    // 尺寸在第一帧布局后由画布下发
    let controller = ViewportController::new(ViewConfig::default(), ViewportSize::default())?;
    log::info!(
        "启动: 最大迭代 {}，逃逸半径 {}",
        field.max_iterations,
        field.escape_radius
    );

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Escape Field Viewer")
            .with_inner_size([1280.0, 800.0])
            .with_app_id("fieldview"),
        ..Default::default()
    };

    eframe::run_native(
        "Escape Field Viewer",
        options,
        Box::new(move |cc| Box::new(FieldViewerApp::new(cc, field, controller))),
    )?;
    Ok(())
}

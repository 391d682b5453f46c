//! # PNG 导出
//!
//! 用 CPU 求值器按当前视图参数（可超采样）重新生成一幅图像，经 rfd 保存对话框写出。
//! 导出只读取参数，从不修改视图状态。

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use image::RgbaImage;

use crate::config::field::FieldConfig;
use crate::core::geometry::ViewportSize;
use crate::rendering::field::CpuFieldRenderer;
use crate::rendering::{FieldEvaluator, FieldParams, RenderError};

#[derive(Debug)]
pub enum ExportError {
    Render(RenderError),
    Image(image::ImageError),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Render(error) => write!(f, "导出渲染失败: {error}"),
            Self::Image(error) => write!(f, "PNG 写入失败: {error}"),
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Render(error) => Some(error),
            Self::Image(error) => Some(error),
        }
    }
}

impl From<RenderError> for ExportError {
    fn from(value: RenderError) -> Self {
        Self::Render(value)
    }
}

impl From<image::ImageError> for ExportError {
    fn from(value: image::ImageError) -> Self {
        Self::Image(value)
    }
}

/// 按 `export_supersample` 放大尺寸后渲染；归一化与尺寸无关，画面取景不变
pub fn render_snapshot(params: &FieldParams, config: &FieldConfig) -> Result<RgbaImage, ExportError> {
    let factor = config.export_supersample.max(1);
    let size = ViewportSize::new(
        params.size.width.saturating_mul(factor),
        params.size.height.saturating_mul(factor),
    );
    let params = FieldParams { size, ..*params };

    let mut renderer = CpuFieldRenderer::new(config.clone());
    renderer.resize(size);
    renderer.evaluate(&params)?;
    renderer.present();
    renderer
        .take_image()
        .ok_or_else(|| ExportError::Render(RenderError::Resource("导出图像为空".to_string())))
}

pub fn save_png(image: &RgbaImage, path: &Path) -> Result<(), ExportError> {
    image.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

pub fn default_file_name(params: &FieldParams) -> String {
    format!(
        "field_{:.6}_{:.6}_{:.3e}.png",
        params.offset.x, params.offset.y, params.scale
    )
}

/// 弹出保存对话框并导出；用户取消时返回 `Ok(None)`
pub fn export_png(params: &FieldParams, config: &FieldConfig) -> Result<Option<PathBuf>, ExportError> {
    let Some(path) = rfd::FileDialog::new()
        .add_filter("PNG", &["png"])
        .set_file_name(default_file_name(params))
        .save_file()
    else {
        return Ok(None);
    };

    let image = render_snapshot(params, config)?;
    save_png(&image, &path)?;
    log::info!(
        "已导出 {}x{} → {}",
        image.width(),
        image.height(),
        path.display()
    );
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::field::load_field_config;
    use crate::core::geometry::FieldPoint;

    fn params() -> FieldParams {
        FieldParams {
            scale: 1.5,
            offset: FieldPoint::new(-0.75, 0.0),
            size: ViewportSize::new(24, 16),
        }
    }

    #[test]
    fn snapshot_honours_supersample() {
        let mut cfg = load_field_config().unwrap();
        cfg.max_iterations = 50;
        assert_eq!(render_snapshot(&params(), &cfg).unwrap().dimensions(), (24, 16));
        cfg.export_supersample = 2;
        assert_eq!(render_snapshot(&params(), &cfg).unwrap().dimensions(), (48, 32));
    }

    #[test]
    fn empty_viewport_fails_cleanly() {
        let cfg = load_field_config().unwrap();
        let p = FieldParams {
            size: ViewportSize::new(0, 0),
            ..params()
        };
        assert!(matches!(
            render_snapshot(&p, &cfg),
            Err(ExportError::Render(RenderError::EmptyViewport))
        ));
    }

    #[test]
    fn png_round_trips_through_disk() {
        let mut cfg = load_field_config().unwrap();
        cfg.max_iterations = 30;
        let image = render_snapshot(&params(), &cfg).unwrap();
        let path = std::env::temp_dir().join(format!("fieldview_export_{}.png", std::process::id()));
        save_png(&image, &path).unwrap();
        let back = image::open(&path).unwrap().to_rgba8();
        let _ = std::fs::remove_file(&path);
        assert_eq!(back, image);
    }

    #[test]
    fn file_name_encodes_view() {
        assert_eq!(default_file_name(&params()), "field_-0.750000_0.000000_1.500e0.png");
    }
}

//! # CPU 逃逸时间求值
//!
//! 与 GPU 着色器逐像素一致的参考实现（f64），用于 PNG 导出和无 GL 环境下的回退显示。
//! 像素中心 `(px + 0.5, py + 0.5)` 经 [`to_field_coord`] 换算，与着色器里
//! `gl_FragCoord` 的推导相同（图像第 0 行是屏幕顶部）。

use image::RgbaImage;
use rayon::prelude::*;

use crate::config::field::FieldConfig;
use crate::core::geometry::{FieldPoint, ScreenPoint, ViewportSize, to_field_coord};
use crate::core::view::ViewState;
use crate::rendering::{FieldEvaluator, FieldParams, RenderError};

/// `z ← z² + c` 迭代，返回模长平方超过 `squared_radius` 之前的迭代次数
pub fn escape_iterations(c: FieldPoint, max_iterations: u32, squared_radius: f64) -> u32 {
    let (mut x, mut y) = (0.0f64, 0.0f64);
    let mut i = 0;
    while i < max_iterations {
        if x * x + y * y > squared_radius {
            break;
        }
        let nx = x * x - y * y + c.x;
        y = 2.0 * x * y + c.y;
        x = nx;
        i += 1;
    }
    i
}

/// 白底黑墨：`alpha = min_intensity * (i / max)^gamma`，灰度 `1 - alpha`
pub fn shade(iterations: u32, config: &FieldConfig) -> u8 {
    let intensity = iterations as f64 / config.max_iterations.max(1) as f64;
    let alpha = config.min_intensity * intensity.powf(config.intensity_gamma);
    ((1.0 - alpha).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// 按行并行求值整幅图像
pub fn evaluate_image(params: &FieldParams, config: &FieldConfig) -> Result<RgbaImage, RenderError> {
    let size = params.size;
    if size.is_empty() {
        return Err(RenderError::EmptyViewport);
    }
    let view = ViewState {
        scale: params.scale,
        offset: params.offset,
    };
    let w = size.width as usize;
    let squared_radius = config.squared_radius();

    let mut rgba = vec![0u8; size.pixel_count() * 4];
    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(py, row)| {
        for (px, pixel) in row.chunks_exact_mut(4).enumerate() {
            let screen = ScreenPoint::new(px as f64 + 0.5, py as f64 + 0.5);
            let c = to_field_coord(screen, size, &view);
            let g = shade(escape_iterations(c, config.max_iterations, squared_radius), config);
            pixel.copy_from_slice(&[g, g, g, 255]);
        }
    });

    RgbaImage::from_raw(size.width, size.height, rgba)
        .ok_or_else(|| RenderError::Resource("图像缓冲尺寸不匹配".to_string()))
}

// ═══════════════════════════════════════════════════════════
// 求值后端
// ═══════════════════════════════════════════════════════════

/// CPU 求值后端。`evaluate` 写入待显示图像，`present` 才替换已显示图像。
pub struct CpuFieldRenderer {
    config: FieldConfig,
    pending: Option<RgbaImage>,
    shown: Option<RgbaImage>,
    /// 每次 present 加一，供 UI 判断是否需要重新上传纹理
    generation: u64,
}

impl CpuFieldRenderer {
    pub fn new(config: FieldConfig) -> Self {
        Self {
            config,
            pending: None,
            shown: None,
            generation: 0,
        }
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.shown.as_ref()
    }

    pub fn take_image(&mut self) -> Option<RgbaImage> {
        self.shown.take()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl FieldEvaluator for CpuFieldRenderer {
    fn evaluate(&mut self, params: &FieldParams) -> Result<(), RenderError> {
        self.pending = Some(evaluate_image(params, &self.config)?);
        Ok(())
    }

    fn present(&mut self) {
        if let Some(image) = self.pending.take() {
            self.shown = Some(image);
            self.generation += 1;
        }
    }

    /// 尺寸不符的待显示图像已过期，直接丢弃
    fn resize(&mut self, size: ViewportSize) {
        let stale = self
            .pending
            .as_ref()
            .is_some_and(|img| img.dimensions() != (size.width, size.height));
        if stale {
            self.pending = None;
        }
    }
}

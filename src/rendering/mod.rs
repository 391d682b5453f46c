pub mod export;
pub mod field;
pub mod gl_field;
pub mod viewport;

use std::error::Error;
use std::fmt::{Display, Formatter};

use crate::core::geometry::{FieldPoint, ViewportSize};

/// 一次求值所需的全部参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldParams {
    pub scale: f64,
    pub offset: FieldPoint,
    pub size: ViewportSize,
}

/// 求值 / 显示后端。
///
/// 控制器每帧最多调用一次 `evaluate`；求值失败时不得调用 `present`，
/// 屏幕上保留上一帧成功的图像。
pub trait FieldEvaluator {
    /// 为 `params` 生成新图像（或登记一次待执行的求值，新的请求覆盖旧的）
    fn evaluate(&mut self, params: &FieldParams) -> Result<(), RenderError>;
    /// 把最近一次成功的求值结果交给显示
    fn present(&mut self);
    fn resize(&mut self, size: ViewportSize);
}

#[derive(Debug)]
pub enum RenderError {
    Shader(String),
    /// `glCheckFramebufferStatus` 的返回值
    Framebuffer(u32),
    Resource(String),
    EmptyViewport,
}

impl Display for RenderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shader(log) => write!(f, "着色器编译失败: {log}"),
            Self::Framebuffer(status) => write!(f, "离屏帧缓冲不完整: 0x{status:x}"),
            Self::Resource(what) => write!(f, "资源不可用: {what}"),
            Self::EmptyViewport => write!(f, "视口尺寸为零"),
        }
    }
}

impl Error for RenderError {}

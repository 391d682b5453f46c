use serde::Deserialize;

use crate::config::ConfigError;

const FIELD_JSON: &str = include_str!("../assets/field.json");

/// 逃逸时间求值常量。GPU 与 CPU 两个求值器共用同一份。
#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    pub max_iterations: u32,
    pub escape_radius: f64,
    pub min_intensity: f64,
    pub intensity_gamma: f64,
    /// 导出 PNG 时相对视口的超采样倍数
    #[serde(default = "default_supersample")]
    pub export_supersample: u32,
}

fn default_supersample() -> u32 {
    1
}

impl FieldConfig {
    pub fn squared_radius(&self) -> f64 {
        self.escape_radius * self.escape_radius
    }
}

pub fn load_field_config() -> Result<FieldConfig, ConfigError> {
    let config: FieldConfig = serde_json::from_str(FIELD_JSON)?;
    Ok(config)
}

//! 配置管理模块
//!
//! 提供绑定层配置的加载、解析和管理功能。
//! 支持从 TOML 配置文件加载，也支持命令行参数覆盖。
//!
//! # 配置文件格式 (config.toml)
//!
//! ```toml
//! [graphics]
//! backend = "headless"   # headless, vulkan, dawn, metal
//! device_label = "dist-bridge"
//! high_performance = true
//!
//! [context]
//! max_pending_recordings = 64
//! require_ordered_recordings = false
//!
//! [recorder]
//! gpu_budget_bytes = 268435456   # 省略表示不限制
//!
//! [surface]
//! width = 800
//! height = 600
//! color_type = "rgba8888"
//! frames = 3
//! sync = true
//!
//! [logging]
//! level = "info"      # trace, debug, info, warn, error
//! file_output = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::{ConfigError, Result};
use crate::gpu::{BackendApi, ColorType};

/// 绑定层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// 图形后端配置
    #[serde(default)]
    pub graphics: GraphicsConfig,

    /// Context 选项
    #[serde(default)]
    pub context: ContextConfig,

    /// Recorder 选项
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// 演示程序使用的渲染目标
    #[serde(default)]
    pub surface: SurfaceConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 图形后端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphicsConfig {
    /// 后端选择
    #[serde(default = "default_backend")]
    pub backend: BackendApi,

    /// 设备标签（用于日志和 wgpu 调试名）
    #[serde(default = "default_device_label")]
    pub device_label: String,

    /// 优先选择高性能 GPU
    #[serde(default = "default_high_performance")]
    pub high_performance: bool,
}

/// Context 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// 待提交 Recording 队列容量
    #[serde(default = "default_max_pending")]
    pub max_pending_recordings: usize,

    /// 是否要求同一 Recorder 的 Recording 按 snap 顺序插入
    #[serde(default)]
    pub require_ordered_recordings: bool,
}

/// Recorder 配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// 渲染目标的 GPU 内存预算（字节）
    #[serde(default)]
    pub gpu_budget_bytes: Option<u64>,
}

/// 演示程序的渲染目标配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurfaceConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_color_type")]
    pub color_type: ColorType,

    /// 录制并提交的帧数
    #[serde(default = "default_frames")]
    pub frames: u32,

    /// 每帧是否同步等待 GPU 完成
    #[serde(default = "default_sync")]
    pub sync: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// 是否输出到文件
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// 日志文件路径
    #[serde(default = "default_log_file")]
    pub log_file: String,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

// 默认值函数
fn default_backend() -> BackendApi { BackendApi::Headless }
fn default_device_label() -> String { "dist-bridge".to_string() }
fn default_high_performance() -> bool { true }
fn default_max_pending() -> usize { 64 }
fn default_width() -> u32 { 800 }
fn default_height() -> u32 { 600 }
fn default_color_type() -> ColorType { ColorType::Rgba8888 }
fn default_frames() -> u32 { 3 }
fn default_sync() -> bool { true }
fn default_log_level() -> LogLevel { LogLevel::Info }
fn default_file_output() -> bool { false }
fn default_log_file() -> String { "dist_bridge.log".to_string() }

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            device_label: default_device_label(),
            high_performance: default_high_performance(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_pending_recordings: default_max_pending(),
            require_ordered_recordings: false,
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            color_type: default_color_type(),
            frames: default_frames(),
            sync: default_sync(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            log_file: default_log_file(),
        }
    }
}

impl Config {
    /// 从配置文件加载
    ///
    /// # 示例
    ///
    /// ```no_run
    /// use dist_bridge::core::Config;
    ///
    /// let config = Config::from_file("config.toml")?;
    /// # Ok::<(), dist_bridge::core::BridgeError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let contents = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound(path_str.clone()))?;

        Self::from_toml_str(&contents)
    }

    /// 从 TOML 字符串解析
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()).into())
    }

    /// 从配置文件加载，如果文件不存在则使用默认配置
    pub fn from_file_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_default()
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// 从命令行参数覆盖配置
    ///
    /// 支持的参数：
    /// - `--backend <headless|vulkan|dawn|metal>`
    /// - `--frames <value>`
    /// - `--width <value>` / `--height <value>`
    /// - `--async`: 每帧不等待 GPU 完成
    pub fn apply_args<I>(&mut self, args: I)
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let args: Vec<String> = args.into_iter().map(|s| s.as_ref().to_string()).collect();

        let value_of = |flag: &str| -> Option<&String> {
            args.iter()
                .position(|a| a == flag)
                .and_then(|idx| args.get(idx + 1))
        };

        if let Some(name) = value_of("--backend") {
            if let Some(backend) = BackendApi::from_name(name) {
                self.graphics.backend = backend;
            }
        }

        if let Some(frames) = value_of("--frames").and_then(|v| v.parse().ok()) {
            self.surface.frames = frames;
        }

        if let Some(width) = value_of("--width").and_then(|v| v.parse().ok()) {
            self.surface.width = width;
        }

        if let Some(height) = value_of("--height").and_then(|v| v.parse().ok()) {
            self.surface.height = height;
        }

        if args.iter().any(|a| a == "--async") {
            self.surface.sync = false;
        }
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.surface.width == 0 || self.surface.height == 0 {
            return Err(ConfigError::InvalidValue {
                field: "surface.width/height".to_string(),
                reason: "Surface dimensions must be greater than 0".to_string(),
            }
            .into());
        }

        if self.surface.width > i32::MAX as u32 || self.surface.height > i32::MAX as u32 {
            return Err(ConfigError::InvalidValue {
                field: "surface.width/height".to_string(),
                reason: "Surface dimensions must fit in a signed 32-bit integer".to_string(),
            }
            .into());
        }

        if self.surface.color_type == ColorType::Unknown {
            return Err(ConfigError::InvalidValue {
                field: "surface.color_type".to_string(),
                reason: "A concrete color type is required".to_string(),
            }
            .into());
        }

        if self.context.max_pending_recordings == 0 {
            return Err(ConfigError::InvalidValue {
                field: "context.max_pending_recordings".to_string(),
                reason: "At least one pending recording must be allowed".to_string(),
            }
            .into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.graphics.backend, BackendApi::Headless);
        assert_eq!(config.context.max_pending_recordings, 64);
        assert_eq!(config.recorder.gpu_budget_bytes, None);
        assert_eq!(config.surface.width, 800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::from_toml_str(
            r#"
            [graphics]
            backend = "vulkan"

            [recorder]
            gpu_budget_bytes = 1024

            [surface]
            color_type = "bgra8888"
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, BackendApi::Vulkan);
        assert_eq!(config.recorder.gpu_budget_bytes, Some(1024));
        assert_eq!(config.surface.color_type, ColorType::Bgra8888);
        assert_eq!(config.surface.height, 600);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(["dist_bridge", "--backend", "dawn", "--frames", "7", "--async"]);

        assert_eq!(config.graphics.backend, BackendApi::Dawn);
        assert_eq!(config.surface.frames, 7);
        assert!(!config.surface.sync);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.surface.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.context.max_pending_recordings = 0;
        assert!(config.validate().is_err());
    }
}

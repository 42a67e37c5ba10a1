//! 核心功能模块
//!
//! 本模块提供绑定层的环境性功能：日志、配置管理和错误处理。
//! 这些模块独立于具体的图形 API。
//!
//! # 模块组织
//!
//! - `log`：日志系统，基于 `tracing` 的结构化日志
//! - `config`：配置管理，支持从 TOML 配置文件加载
//! - `error`：错误处理，定义统一的错误类型

pub mod log;
pub mod config;
pub mod error;

// 重新导出常用类型，方便使用
pub use error::{
    BridgeError, ConfigError, ConstructionError, DescriptorError, ErrorKind, Result, StateError,
};
pub use config::{Config, ContextConfig, GraphicsConfig, LogLevel, RecorderConfig};

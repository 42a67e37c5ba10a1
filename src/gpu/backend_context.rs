//! 后端上下文适配器
//!
//! `BackendContext` 是对原生设备 / 队列句柄的带标签封装，每个值恰好属于一个后端。
//! `Context::make` 按标签分派，为对应后端创建设备驱动。
//!
//! 设备选择总是显式的：调用者注入设备（或通过 `from_config` 显式请求默认设备），
//! 不存在进程级的隐式单例设备。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::driver::DeviceDriver;
use crate::core::config::GraphicsConfig;
use crate::core::error::{BridgeError, Result};
use crate::gfx::dawn::{DawnBackendContext, DawnDriver};
use crate::gfx::headless::{HeadlessBackendContext, HeadlessDevice, HeadlessDriver};
#[cfg(target_os = "macos")]
use crate::gfx::metal::{MetalDriver, MtlBackendContext};
use crate::gfx::vulkan::{VulkanBackendContext, VulkanDriver};

/// 原生后端标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum BackendApi {
    /// CPU 参考设备
    Headless = 0,
    Vulkan = 1,
    /// WebGPU（Dawn / wgpu）
    Dawn = 2,
    Metal = 3,
}

impl BackendApi {
    pub const ALL: [BackendApi; 4] = [
        BackendApi::Headless,
        BackendApi::Vulkan,
        BackendApi::Dawn,
        BackendApi::Metal,
    ];

    /// 获取后端名称
    pub fn name(&self) -> &'static str {
        match self {
            BackendApi::Headless => "Headless",
            BackendApi::Vulkan => "Vulkan",
            BackendApi::Dawn => "Dawn",
            BackendApi::Metal => "Metal",
        }
    }

    /// 解析小写后端名
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "headless" => Some(BackendApi::Headless),
            "vulkan" => Some(BackendApi::Vulkan),
            "dawn" | "wgpu" | "webgpu" => Some(BackendApi::Dawn),
            "metal" => Some(BackendApi::Metal),
            _ => None,
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        BackendApi::ALL.into_iter().find(|api| *api as u32 == raw)
    }

    /// 当前平台是否编译了该后端
    pub fn is_compiled(&self) -> bool {
        match self {
            BackendApi::Metal => cfg!(target_os = "macos"),
            _ => true,
        }
    }
}

/// 后端上下文
#[derive(Debug, Clone)]
pub enum BackendContext {
    Headless(HeadlessBackendContext),
    Vulkan(VulkanBackendContext),
    Dawn(DawnBackendContext),
    #[cfg(target_os = "macos")]
    Metal(MtlBackendContext),
}

impl BackendContext {
    /// 后端标签
    pub fn api(&self) -> BackendApi {
        match self {
            BackendContext::Headless(_) => BackendApi::Headless,
            BackendContext::Vulkan(_) => BackendApi::Vulkan,
            BackendContext::Dawn(_) => BackendApi::Dawn,
            #[cfg(target_os = "macos")]
            BackendContext::Metal(_) => BackendApi::Metal,
        }
    }

    /// 按配置显式请求一个默认设备
    ///
    /// Vulkan 需要调用者提供 instance / device / queue 句柄，不能由配置创建。
    pub fn from_config(config: &GraphicsConfig) -> Result<Self> {
        match config.backend {
            BackendApi::Headless => Ok(BackendContext::Headless(HeadlessBackendContext::new(
                HeadlessDevice::new(&config.device_label),
            ))),
            BackendApi::Dawn => Ok(BackendContext::Dawn(DawnBackendContext::request_default(
                config.high_performance,
                &config.device_label,
            )?)),
            #[cfg(target_os = "macos")]
            BackendApi::Metal => Ok(BackendContext::Metal(MtlBackendContext::system_default()?)),
            #[cfg(not(target_os = "macos"))]
            BackendApi::Metal => Err(BridgeError::Unsupported(
                "the Metal backend is only available on macOS".into(),
            )),
            BackendApi::Vulkan => Err(BridgeError::Unsupported(
                "Vulkan contexts require caller-supplied instance, device and queue handles".into(),
            )),
        }
    }

    /// 为该后端创建设备驱动
    pub(crate) fn create_driver(&self) -> Result<Arc<dyn DeviceDriver>> {
        let driver: Arc<dyn DeviceDriver> = match self {
            BackendContext::Headless(ctx) => Arc::new(HeadlessDriver::new(ctx)?),
            BackendContext::Vulkan(ctx) => Arc::new(VulkanDriver::new(ctx)?),
            BackendContext::Dawn(ctx) => Arc::new(DawnDriver::new(ctx)?),
            #[cfg(target_os = "macos")]
            BackendContext::Metal(ctx) => Arc::new(MetalDriver::new(ctx)?),
        };
        Ok(driver)
    }
}

impl From<HeadlessBackendContext> for BackendContext {
    fn from(ctx: HeadlessBackendContext) -> Self {
        BackendContext::Headless(ctx)
    }
}

impl From<VulkanBackendContext> for BackendContext {
    fn from(ctx: VulkanBackendContext) -> Self {
        BackendContext::Vulkan(ctx)
    }
}

impl From<DawnBackendContext> for BackendContext {
    fn from(ctx: DawnBackendContext) -> Self {
        BackendContext::Dawn(ctx)
    }
}

#[cfg(target_os = "macos")]
impl From<MtlBackendContext> for BackendContext {
    fn from(ctx: MtlBackendContext) -> Self {
        BackendContext::Metal(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_names_round_trip() {
        for api in BackendApi::ALL {
            assert_eq!(BackendApi::from_name(api.name()), Some(api));
            assert_eq!(BackendApi::from_raw(api as u32), Some(api));
        }
        assert_eq!(BackendApi::from_name("wgpu"), Some(BackendApi::Dawn));
        assert_eq!(BackendApi::from_name("dx12"), None);
        assert_eq!(BackendApi::from_raw(42), None);
    }

    #[test]
    fn test_headless_from_config() {
        let config = GraphicsConfig::default();
        let ctx = BackendContext::from_config(&config).unwrap();
        assert_eq!(ctx.api(), BackendApi::Headless);
    }

    #[test]
    fn test_vulkan_from_config_is_rejected() {
        let config = GraphicsConfig {
            backend: BackendApi::Vulkan,
            ..GraphicsConfig::default()
        };
        let err = BackendContext::from_config(&config).unwrap_err();
        assert!(matches!(err, BridgeError::Unsupported(_)));
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_metal_unsupported_off_macos() {
        assert!(!BackendApi::Metal.is_compiled());
        let config = GraphicsConfig {
            backend: BackendApi::Metal,
            ..GraphicsConfig::default()
        };
        assert!(matches!(
            BackendContext::from_config(&config),
            Err(BridgeError::Unsupported(_))
        ));
    }
}

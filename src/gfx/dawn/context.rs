//! WebGPU（Dawn / wgpu）后端上下文
//!
//! 设备与队列总是由调用者显式注入，不存在隐式的全局设备。
//! `request_default` 只是一个显式请求默认适配器的便捷函数。

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::error::{BridgeError, Result};
use crate::gpu::types::ColorType;

/// WebGPU 后端上下文
#[derive(Debug, Clone)]
pub struct DawnBackendContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    /// 设备描述，用于日志输出
    pub label: String,
}

impl DawnBackendContext {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self {
            device,
            queue,
            label: "wgpu device".to_string(),
        }
    }

    /// 请求一个默认适配器并创建设备
    ///
    /// 找不到适配器或设备创建失败时返回 `Construction(DeviceInit)`。
    pub fn request_default(high_performance: bool, label: &str) -> Result<Self> {
        debug!("Creating wgpu instance");
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = if high_performance {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::LowPower
        };
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| BridgeError::device_init("no suitable wgpu adapter found"))?;

        let adapter_info = adapter.get_info();
        info!("Selected adapter: {} ({:?})", adapter_info.name, adapter_info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some(label),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
            },
            None,
        ))
        .map_err(|e| BridgeError::device_init(format!("failed to create wgpu device: {}", e)))?;

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            label: format!("{} [{}]", label, adapter_info.name),
        })
    }
}

/// WebGPU 纹理描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DawnTextureInfo {
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
}

impl DawnTextureInfo {
    pub fn is_valid(&self) -> bool {
        !self.usage.is_empty()
    }

    pub fn is_compatible_with(&self, color_type: ColorType) -> bool {
        match self.format {
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Rgba8UnormSrgb => {
                color_type == ColorType::Rgba8888
            }
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb => {
                color_type == ColorType::Bgra8888
            }
            wgpu::TextureFormat::R8Unorm => {
                matches!(color_type, ColorType::Alpha8 | ColorType::Gray8)
            }
            _ => false,
        }
    }
}

/// 颜色类型对应的纹理格式
pub(crate) fn format_for(color_type: ColorType) -> Option<wgpu::TextureFormat> {
    match color_type {
        ColorType::Rgba8888 => Some(wgpu::TextureFormat::Rgba8Unorm),
        ColorType::Bgra8888 => Some(wgpu::TextureFormat::Bgra8Unorm),
        ColorType::Alpha8 | ColorType::Gray8 => Some(wgpu::TextureFormat::R8Unorm),
        ColorType::Unknown => None,
    }
}

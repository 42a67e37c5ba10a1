//! Vulkan 后端模块
//!
//! 本模块包含了所有 Vulkan 相关的代码，包括：
//! - Context: 调用者提供的 instance / device / queue 句柄
//! - Texture: `VkImage` 的描述类型（格式、usage、YCbCr 转换、内存绑定）
//! - Driver: 基于 ash 的设备驱动

pub mod context;
pub mod driver;
pub mod texture;

// 重新导出常用类型
pub use context::VulkanBackendContext;
pub use driver::VulkanDriver;
pub use texture::{VulkanAlloc, VulkanImageHandle, VulkanTextureInfo, YcbcrConversionInfo};

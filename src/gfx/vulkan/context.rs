//! Vulkan 后端上下文
//!
//! 调用者自行创建 instance / device / queue，这里只按值保存这些句柄。
//! 绑定层从不销毁它们。

use std::fmt;

use ash::vk;

/// Vulkan 后端上下文
///
/// # 字段说明
///
/// - `instance` / `physical_device` / `device`：调用者创建的 Vulkan 对象
/// - `queue`：提交工作用的队列，必须属于 `graphics_queue_index` 队列族
/// - `get_instance_proc_addr`：加载 instance / device 函数表的入口
#[derive(Clone, Copy)]
pub struct VulkanBackendContext {
    pub instance: vk::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: vk::Device,
    pub queue: vk::Queue,
    pub graphics_queue_index: u32,
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
}

impl VulkanBackendContext {
    /// 所有句柄是否非空
    pub fn has_handles(&self) -> bool {
        self.instance != vk::Instance::null()
            && self.physical_device != vk::PhysicalDevice::null()
            && self.device != vk::Device::null()
            && self.queue != vk::Queue::null()
    }
}

impl fmt::Debug for VulkanBackendContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VulkanBackendContext")
            .field("instance", &self.instance)
            .field("physical_device", &self.physical_device)
            .field("device", &self.device)
            .field("queue", &self.queue)
            .field("graphics_queue_index", &self.graphics_queue_index)
            .finish()
    }
}

//! 后端纹理
//!
//! `BackendTexture` 把尺寸、`TextureInfo` 与后端原生纹理句柄组合为一个值。
//! 它只描述外部分配的 GPU 内存，从不拥有这块内存：真实图像的生命周期由调用者负责，
//! 且在包装它的 Surface 销毁、引用它的 GPU 工作完成之前不得释放。

use std::sync::Arc;

use super::backend_context::BackendApi;
use super::texture_info::TextureInfo;
use super::types::ISize;
use crate::gfx::headless::HeadlessTextureRef;
use crate::gfx::metal::MtlHandle;
use crate::gfx::vulkan::{VulkanAlloc, VulkanImageHandle, VulkanTextureInfo};

use ash::vk;

/// 后端原生纹理句柄
#[derive(Debug, Clone, Default)]
pub(crate) enum BackendTextureHandle {
    #[default]
    None,
    Headless(HeadlessTextureRef),
    Vulkan(VulkanImageHandle),
    Dawn(Arc<wgpu::Texture>),
    // 仅在 macOS 上构造
    #[allow(dead_code)]
    Metal(MtlHandle),
}

/// 后端纹理描述
#[derive(Debug, Clone, Default)]
pub struct BackendTexture {
    dimensions: ISize,
    info: TextureInfo,
    handle: BackendTextureHandle,
}

impl BackendTexture {
    pub(crate) fn from_parts(
        dimensions: ISize,
        info: TextureInfo,
        handle: BackendTextureHandle,
    ) -> Self {
        Self {
            dimensions,
            info,
            handle,
        }
    }

    /// 包装一个调用者分配的 Vulkan 图像
    ///
    /// # Safety
    ///
    /// `image` 与 `alloc` 必须是有效的句柄，`layout` 必须是图像当前的布局；
    /// 在包装它的所有 Surface 销毁且相关 GPU 工作完成前，调用者不得释放图像。
    pub unsafe fn new_vulkan(
        dimensions: impl Into<ISize>,
        texture_info: &VulkanTextureInfo,
        layout: vk::ImageLayout,
        queue_family_index: u32,
        image: vk::Image,
        alloc: VulkanAlloc,
    ) -> Self {
        Self::from_parts(
            dimensions.into(),
            TextureInfo::from(texture_info.clone()),
            BackendTextureHandle::Vulkan(VulkanImageHandle {
                image,
                layout,
                queue_family_index,
                alloc,
            }),
        )
    }

    /// 包装一个 wgpu 纹理
    ///
    /// 这里共享纹理对象的引用，纹理内容仍由调用者管理。
    pub fn new_dawn(texture: Arc<wgpu::Texture>) -> Self {
        let size = texture.size();
        let info = TextureInfo::new_dawn(&texture);
        Self::from_parts(
            ISize::new(size.width as i32, size.height as i32),
            info,
            BackendTextureHandle::Dawn(texture),
        )
    }

    /// 包装一个 Metal 纹理
    ///
    /// # Safety
    ///
    /// `texture` 必须指向一个存活的 `MTLTexture`，生命周期要求同 `new_vulkan`。
    #[cfg(target_os = "macos")]
    pub unsafe fn new_metal(dimensions: impl Into<ISize>, texture: MtlHandle) -> Self {
        Self::from_parts(
            dimensions.into(),
            TextureInfo::new_metal(texture),
            BackendTextureHandle::Metal(texture),
        )
    }

    pub fn dimensions(&self) -> ISize {
        self.dimensions
    }

    /// 返回描述的副本，修改副本不影响本纹理
    pub fn info(&self) -> TextureInfo {
        self.info.clone()
    }

    pub fn backend(&self) -> Option<BackendApi> {
        match &self.handle {
            BackendTextureHandle::None => None,
            BackendTextureHandle::Headless(_) => Some(BackendApi::Headless),
            BackendTextureHandle::Vulkan(_) => Some(BackendApi::Vulkan),
            BackendTextureHandle::Dawn(_) => Some(BackendApi::Dawn),
            BackendTextureHandle::Metal(_) => Some(BackendApi::Metal),
        }
    }

    pub(crate) fn handle(&self) -> &BackendTextureHandle {
        &self.handle
    }

    /// 尺寸为正、描述有效、句柄与描述属于同一后端且句柄仍然可用
    pub fn is_valid(&self) -> bool {
        if !self.dimensions.is_positive() || !self.info.is_valid() {
            return false;
        }
        if self.backend() != self.info.backend() {
            return false;
        }
        match &self.handle {
            BackendTextureHandle::None => false,
            BackendTextureHandle::Headless(texture) => texture.is_alive(),
            BackendTextureHandle::Vulkan(handle) => handle.image != vk::Image::null(),
            BackendTextureHandle::Dawn(_) => true,
            BackendTextureHandle::Metal(handle) => !handle.is_null(),
        }
    }
}

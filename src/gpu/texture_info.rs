//! 纹理描述信息
//!
//! `TextureInfo` 描述 GPU 纹理的格式、采样数、mip 与用途，本身不拥有任何 GPU 内存。
//! 每个有效的 `TextureInfo` 恰好携带一个后端的专用描述。

use super::backend_context::BackendApi;
use super::types::{ColorType, Mipmapped};
use crate::gfx::dawn::DawnTextureInfo;
use crate::gfx::headless::HeadlessTextureInfo;
use crate::gfx::metal::MtlTextureInfo;
use crate::gfx::vulkan::VulkanTextureInfo;

/// 后端专用的纹理描述
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TextureInfoData {
    /// 默认构造的描述，不属于任何后端
    #[default]
    None,
    Headless(HeadlessTextureInfo),
    Vulkan(VulkanTextureInfo),
    Dawn(DawnTextureInfo),
    Metal(MtlTextureInfo),
}

/// 纹理描述
#[derive(Debug, Clone, PartialEq)]
pub struct TextureInfo {
    sample_count: u32,
    mipmapped: Mipmapped,
    data: TextureInfoData,
}

impl Default for TextureInfo {
    fn default() -> Self {
        Self {
            sample_count: 1,
            mipmapped: Mipmapped::No,
            data: TextureInfoData::None,
        }
    }
}

impl TextureInfo {
    pub fn new(sample_count: u32, mipmapped: Mipmapped, data: TextureInfoData) -> Self {
        Self {
            sample_count,
            mipmapped,
            data,
        }
    }

    pub fn new_headless(color_type: ColorType, mipmapped: Mipmapped) -> Self {
        Self::new(1, mipmapped, TextureInfoData::Headless(HeadlessTextureInfo { color_type }))
    }

    /// 从一个已存在的 wgpu 纹理推导描述
    pub fn new_dawn(texture: &wgpu::Texture) -> Self {
        Self::new(
            texture.sample_count(),
            Mipmapped::from(texture.mip_level_count() > 1),
            TextureInfoData::Dawn(DawnTextureInfo {
                format: texture.format(),
                usage: texture.usage(),
            }),
        )
    }

    /// 从 Metal 纹理句柄推导描述
    ///
    /// # Safety
    ///
    /// `texture` 必须指向一个存活的 `MTLTexture`。
    #[cfg(target_os = "macos")]
    pub unsafe fn new_metal(texture: crate::gfx::metal::MtlHandle) -> Self {
        crate::gfx::metal::texture_info_from_handle(texture)
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn set_sample_count(&mut self, sample_count: u32) {
        self.sample_count = sample_count;
    }

    pub fn mipmapped(&self) -> Mipmapped {
        self.mipmapped
    }

    pub fn set_mipmapped(&mut self, mipmapped: Mipmapped) {
        self.mipmapped = mipmapped;
    }

    pub fn data(&self) -> &TextureInfoData {
        &self.data
    }

    /// 所属后端，默认构造的描述返回 None
    pub fn backend(&self) -> Option<BackendApi> {
        match &self.data {
            TextureInfoData::None => None,
            TextureInfoData::Headless(_) => Some(BackendApi::Headless),
            TextureInfoData::Vulkan(_) => Some(BackendApi::Vulkan),
            TextureInfoData::Dawn(_) => Some(BackendApi::Dawn),
            TextureInfoData::Metal(_) => Some(BackendApi::Metal),
        }
    }

    /// 重新组合出完整的 Vulkan 描述
    pub fn vulkan_texture_info(&self) -> Option<VulkanTextureInfo> {
        match &self.data {
            TextureInfoData::Vulkan(info) => Some(VulkanTextureInfo {
                sample_count: self.sample_count,
                mipmapped: self.mipmapped,
                ..info.clone()
            }),
            _ => None,
        }
    }

    /// 是否携带可识别的后端标签且参数一致
    pub fn is_valid(&self) -> bool {
        if !matches!(self.sample_count, 1 | 2 | 4 | 8 | 16) {
            return false;
        }
        match &self.data {
            TextureInfoData::None => false,
            TextureInfoData::Headless(info) => info.is_valid(),
            TextureInfoData::Vulkan(info) => info.is_valid(),
            TextureInfoData::Dawn(info) => info.is_valid(),
            TextureInfoData::Metal(info) => info.is_valid(),
        }
    }

    /// 纹理格式能否按 `color_type` 解释
    pub fn is_compatible_with(&self, color_type: ColorType) -> bool {
        if color_type == ColorType::Unknown {
            return false;
        }
        match &self.data {
            TextureInfoData::None => false,
            TextureInfoData::Headless(info) => info.color_type == color_type,
            TextureInfoData::Vulkan(info) => info.is_compatible_with(color_type),
            TextureInfoData::Dawn(info) => info.is_compatible_with(color_type),
            TextureInfoData::Metal(info) => info.is_compatible_with(color_type),
        }
    }
}

impl From<VulkanTextureInfo> for TextureInfo {
    fn from(info: VulkanTextureInfo) -> Self {
        Self::new(info.sample_count, info.mipmapped, TextureInfoData::Vulkan(info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_default_is_invalid() {
        let info = TextureInfo::default();
        assert!(!info.is_valid());
        assert_eq!(info.backend(), None);
    }

    #[test]
    fn test_headless_validity() {
        assert!(TextureInfo::new_headless(ColorType::Rgba8888, Mipmapped::No).is_valid());
        assert!(!TextureInfo::new_headless(ColorType::Unknown, Mipmapped::No).is_valid());

        let mut info = TextureInfo::new_headless(ColorType::Rgba8888, Mipmapped::No);
        info.set_sample_count(3);
        assert!(!info.is_valid());
    }

    #[test]
    fn test_vulkan_round_trip_keeps_sample_count() {
        let vk_info = VulkanTextureInfo {
            sample_count: 4,
            format: vk::Format::R8G8B8A8_UNORM,
            ..VulkanTextureInfo::default()
        };
        let info = TextureInfo::from(vk_info.clone());
        assert_eq!(info.sample_count(), 4);
        assert_eq!(info.backend(), Some(BackendApi::Vulkan));
        assert_eq!(info.vulkan_texture_info(), Some(vk_info));
    }

    #[test]
    fn test_color_type_compatibility() {
        let info = TextureInfo::new_headless(ColorType::Bgra8888, Mipmapped::No);
        assert!(info.is_compatible_with(ColorType::Bgra8888));
        assert!(!info.is_compatible_with(ColorType::Rgba8888));
        assert!(!info.is_compatible_with(ColorType::Unknown));
    }
}

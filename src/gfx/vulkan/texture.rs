//! Vulkan 纹理描述
//!
//! 这些类型只是对调用者分配的 `VkImage` 的描述，本身不拥有任何 Vulkan 对象。

use ash::vk;

use crate::gpu::types::{ColorType, Mipmapped};

/// YCbCr 采样转换参数
///
/// `format` 或 `external_format` 非零时视为有效；有效的转换意味着纹理只能被采样，
/// 不能作为渲染目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct YcbcrConversionInfo {
    pub format: vk::Format,
    pub external_format: u64,
    pub ycbcr_model: vk::SamplerYcbcrModelConversion,
    pub ycbcr_range: vk::SamplerYcbcrRange,
    pub x_chroma_offset: vk::ChromaLocation,
    pub y_chroma_offset: vk::ChromaLocation,
    pub chroma_filter: vk::Filter,
    pub force_explicit_reconstruction: vk::Bool32,
    pub format_features: vk::FormatFeatureFlags,
}

impl YcbcrConversionInfo {
    pub fn is_valid(&self) -> bool {
        self.format != vk::Format::UNDEFINED || self.external_format != 0
    }
}

/// Vulkan 纹理描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VulkanTextureInfo {
    pub sample_count: u32,
    pub mipmapped: Mipmapped,
    pub flags: vk::ImageCreateFlags,
    pub format: vk::Format,
    pub image_tiling: vk::ImageTiling,
    pub image_usage_flags: vk::ImageUsageFlags,
    pub sharing_mode: vk::SharingMode,
    pub aspect_mask: vk::ImageAspectFlags,
    pub ycbcr_conversion_info: YcbcrConversionInfo,
}

impl Default for VulkanTextureInfo {
    fn default() -> Self {
        Self {
            sample_count: 1,
            mipmapped: Mipmapped::No,
            flags: vk::ImageCreateFlags::empty(),
            format: vk::Format::UNDEFINED,
            image_tiling: vk::ImageTiling::OPTIMAL,
            image_usage_flags: vk::ImageUsageFlags::empty(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            aspect_mask: vk::ImageAspectFlags::COLOR,
            ycbcr_conversion_info: YcbcrConversionInfo::default(),
        }
    }
}

impl VulkanTextureInfo {
    /// 驱动为渲染目标分配图像时使用的描述
    pub(crate) fn for_render_target(format: vk::Format, mipmapped: Mipmapped) -> Self {
        Self {
            mipmapped,
            format,
            image_usage_flags: render_target_usage(),
            ..Self::default()
        }
    }

    pub fn is_ycbcr(&self) -> bool {
        self.ycbcr_conversion_info.is_valid()
    }

    pub fn is_valid(&self) -> bool {
        self.format != vk::Format::UNDEFINED || self.is_ycbcr()
    }

    pub fn is_compatible_with(&self, color_type: ColorType) -> bool {
        !self.is_ycbcr() && color_type_of(self.format).iter().any(|ct| *ct == color_type)
    }
}

/// 渲染目标需要的 usage：可作为附件、可被清除 / 拷贝、可被采样
pub(crate) fn render_target_usage() -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::COLOR_ATTACHMENT
        | vk::ImageUsageFlags::TRANSFER_SRC
        | vk::ImageUsageFlags::TRANSFER_DST
        | vk::ImageUsageFlags::SAMPLED
}

/// 颜色类型对应的图像格式
pub(crate) fn format_for(color_type: ColorType) -> Option<vk::Format> {
    match color_type {
        ColorType::Rgba8888 => Some(vk::Format::R8G8B8A8_UNORM),
        ColorType::Bgra8888 => Some(vk::Format::B8G8R8A8_UNORM),
        ColorType::Alpha8 | ColorType::Gray8 => Some(vk::Format::R8_UNORM),
        ColorType::Unknown => None,
    }
}

fn color_type_of(format: vk::Format) -> &'static [ColorType] {
    match format {
        vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB => &[ColorType::Rgba8888],
        vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB => &[ColorType::Bgra8888],
        vk::Format::R8_UNORM => &[ColorType::Alpha8, ColorType::Gray8],
        _ => &[],
    }
}

/// 图像绑定的设备内存
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VulkanAlloc {
    pub memory: vk::DeviceMemory,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

/// 原生图像句柄及其当前布局
#[derive(Debug, Clone)]
pub struct VulkanImageHandle {
    pub image: vk::Image,
    pub layout: vk::ImageLayout,
    pub queue_family_index: u32,
    pub alloc: VulkanAlloc,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_format_is_invalid() {
        assert!(!VulkanTextureInfo::default().is_valid());
        let info = VulkanTextureInfo {
            format: vk::Format::R8G8B8A8_UNORM,
            ..Default::default()
        };
        assert!(info.is_valid());
        assert!(info.is_compatible_with(ColorType::Rgba8888));
        assert!(!info.is_compatible_with(ColorType::Bgra8888));
    }

    #[test]
    fn test_ycbcr_texture_is_valid_but_not_renderable() {
        let info = VulkanTextureInfo {
            ycbcr_conversion_info: YcbcrConversionInfo {
                external_format: 0x2000,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(info.is_ycbcr());
        assert!(info.is_valid());
        assert!(!info.is_compatible_with(ColorType::Rgba8888));
    }

    #[test]
    fn test_render_target_formats() {
        for ct in [ColorType::Alpha8, ColorType::Gray8, ColorType::Rgba8888, ColorType::Bgra8888] {
            let format = format_for(ct).unwrap();
            assert!(VulkanTextureInfo::for_render_target(format, Mipmapped::No).is_compatible_with(ct));
        }
        assert_eq!(format_for(ColorType::Unknown), None);
    }
}

//! Metal 纹理描述
//!
//! 描述类型在所有平台上都可用（只是数值），从原生纹理推导描述则仅限 macOS。

use std::ffi::c_void;

use crate::gpu::types::ColorType;

/// `MTLPixelFormat` 原始值
pub mod pixel_format {
    pub const INVALID: u64 = 0;
    pub const R8_UNORM: u64 = 10;
    pub const RGBA8_UNORM: u64 = 70;
    pub const RGBA8_UNORM_SRGB: u64 = 71;
    pub const BGRA8_UNORM: u64 = 80;
    pub const BGRA8_UNORM_SRGB: u64 = 81;
}

/// `MTLTextureUsage` 位
pub mod texture_usage {
    pub const SHADER_READ: u64 = 0x1;
    pub const SHADER_WRITE: u64 = 0x2;
    pub const RENDER_TARGET: u64 = 0x4;
}

/// 不透明的 `id<MTLTexture>` 指针
///
/// 只是借用，不持有引用计数。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtlHandle(pub *const c_void);

// Metal 纹理对象可以跨线程引用
unsafe impl Send for MtlHandle {}
unsafe impl Sync for MtlHandle {}

impl MtlHandle {
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }
}

/// Metal 纹理描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MtlTextureInfo {
    pub pixel_format: u64,
    pub usage: u64,
    pub storage_mode: u64,
    pub framebuffer_only: bool,
}

impl MtlTextureInfo {
    pub fn is_valid(&self) -> bool {
        self.pixel_format != pixel_format::INVALID
    }

    pub fn is_renderable(&self) -> bool {
        self.usage & texture_usage::RENDER_TARGET != 0 && !self.framebuffer_only
    }

    pub fn is_compatible_with(&self, color_type: ColorType) -> bool {
        match self.pixel_format {
            pixel_format::RGBA8_UNORM | pixel_format::RGBA8_UNORM_SRGB => color_type == ColorType::Rgba8888,
            pixel_format::BGRA8_UNORM | pixel_format::BGRA8_UNORM_SRGB => color_type == ColorType::Bgra8888,
            pixel_format::R8_UNORM => matches!(color_type, ColorType::Alpha8 | ColorType::Gray8),
            _ => false,
        }
    }
}

/// 颜色类型对应的像素格式
pub(crate) fn pixel_format_for(color_type: ColorType) -> Option<u64> {
    match color_type {
        ColorType::Rgba8888 => Some(pixel_format::RGBA8_UNORM),
        ColorType::Bgra8888 => Some(pixel_format::BGRA8_UNORM),
        ColorType::Alpha8 | ColorType::Gray8 => Some(pixel_format::R8_UNORM),
        ColorType::Unknown => None,
    }
}

/// 读取原生纹理的属性
///
/// # Safety
///
/// `texture` 必须指向一个存活的 `MTLTexture`。
#[cfg(target_os = "macos")]
pub unsafe fn texture_info_from_handle(texture: MtlHandle) -> crate::gpu::texture_info::TextureInfo {
    use crate::gpu::texture_info::{TextureInfo, TextureInfoData};
    use crate::gpu::types::Mipmapped;
    use foreign_types::ForeignTypeRef;

    if texture.is_null() {
        return TextureInfo::default();
    }
    let raw = metal::TextureRef::from_ptr(texture.0 as *mut _);
    TextureInfo::new(
        raw.sample_count() as u32,
        Mipmapped::from(raw.mipmap_level_count() > 1),
        TextureInfoData::Metal(MtlTextureInfo {
            pixel_format: raw.pixel_format() as u64,
            usage: raw.usage().bits(),
            storage_mode: raw.storage_mode() as u64,
            framebuffer_only: raw.framebuffer_only(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_format_mapping() {
        for ct in [ColorType::Alpha8, ColorType::Gray8, ColorType::Rgba8888, ColorType::Bgra8888] {
            let info = MtlTextureInfo {
                pixel_format: pixel_format_for(ct).unwrap(),
                usage: texture_usage::RENDER_TARGET | texture_usage::SHADER_READ,
                ..Default::default()
            };
            assert!(info.is_valid());
            assert!(info.is_compatible_with(ct));
            assert!(info.is_renderable());
        }
        assert!(!MtlTextureInfo::default().is_valid());
    }

    #[test]
    fn test_framebuffer_only_is_not_renderable() {
        let info = MtlTextureInfo {
            pixel_format: pixel_format::BGRA8_UNORM,
            usage: texture_usage::RENDER_TARGET,
            framebuffer_only: true,
            ..Default::default()
        };
        assert!(!info.is_renderable());
        assert!(MtlHandle(std::ptr::null()).is_null());
    }
}

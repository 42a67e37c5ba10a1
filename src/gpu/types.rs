//! 基础值类型
//!
//! 尺寸、颜色类型、图像描述、颜色与矩形等纯值类型，所有后端共用。
//! 这里不涉及真正的颜色管理，颜色空间只作为标签随描述符传递。

use serde::{Deserialize, Serialize};

use crate::core::error::{DescriptorError, Result};

/// 整数尺寸
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ISize {
    pub width: i32,
    pub height: i32,
}

impl ISize {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// 宽高都大于 0
    pub fn is_positive(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn area(&self) -> u64 {
        if self.is_positive() {
            self.width as u64 * self.height as u64
        } else {
            0
        }
    }
}

impl From<(i32, i32)> for ISize {
    fn from((width, height): (i32, i32)) -> Self {
        Self::new(width, height)
    }
}

/// 是否分配完整的 mip 链
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Mipmapped {
    #[default]
    No,
    Yes,
}

impl From<bool> for Mipmapped {
    fn from(value: bool) -> Self {
        if value { Mipmapped::Yes } else { Mipmapped::No }
    }
}

impl Mipmapped {
    /// 给定尺寸下的 mip 层数
    pub fn level_count(self, dimensions: ISize) -> u32 {
        match self {
            Mipmapped::No => 1,
            Mipmapped::Yes => {
                let largest = dimensions.width.max(dimensions.height).max(1) as u32;
                32 - largest.leading_zeros()
            }
        }
    }
}

/// 像素颜色类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum ColorType {
    #[default]
    Unknown = 0,
    Alpha8 = 1,
    Gray8 = 2,
    Rgba8888 = 3,
    Bgra8888 = 4,
}

impl ColorType {
    /// 每像素字节数
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorType::Unknown => 0,
            ColorType::Alpha8 | ColorType::Gray8 => 1,
            ColorType::Rgba8888 | ColorType::Bgra8888 => 4,
        }
    }

    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => ColorType::Alpha8,
            2 => ColorType::Gray8,
            3 => ColorType::Rgba8888,
            4 => ColorType::Bgra8888,
            _ => ColorType::Unknown,
        }
    }
}

/// Alpha 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AlphaType {
    #[default]
    Unknown,
    Opaque,
    Premul,
    Unpremul,
}

/// 颜色空间标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    SrgbLinear,
    DisplayP3,
}

/// 像素排列方式（用于文字次像素渲染，这里只随描述符传递）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelGeometry {
    #[default]
    Unknown,
    RgbH,
    BgrH,
    RgbV,
    BgrV,
}

/// Surface 属性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceProps {
    pub pixel_geometry: PixelGeometry,
    pub use_device_independent_fonts: bool,
}

/// 图像描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    dimensions: ISize,
    color_type: ColorType,
    alpha_type: AlphaType,
    color_space: Option<ColorSpace>,
}

impl ImageInfo {
    pub fn new(
        dimensions: impl Into<ISize>,
        color_type: ColorType,
        alpha_type: AlphaType,
        color_space: Option<ColorSpace>,
    ) -> Self {
        Self {
            dimensions: dimensions.into(),
            color_type,
            alpha_type,
            color_space,
        }
    }

    /// RGBA8888 预乘 alpha
    pub fn new_n32_premul(dimensions: impl Into<ISize>, color_space: Option<ColorSpace>) -> Self {
        Self::new(dimensions, ColorType::Rgba8888, AlphaType::Premul, color_space)
    }

    pub fn dimensions(&self) -> ISize {
        self.dimensions
    }

    pub fn width(&self) -> i32 {
        self.dimensions.width
    }

    pub fn height(&self) -> i32 {
        self.dimensions.height
    }

    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    pub fn alpha_type(&self) -> AlphaType {
        self.alpha_type
    }

    pub fn color_space(&self) -> Option<ColorSpace> {
        self.color_space
    }

    pub fn with_color_type(mut self, color_type: ColorType) -> Self {
        self.color_type = color_type;
        self
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.color_type.bytes_per_pixel()
    }

    /// 紧密排列时每行字节数
    pub fn min_row_bytes(&self) -> usize {
        self.dimensions.width.max(0) as usize * self.bytes_per_pixel()
    }

    /// 给定行字节数时整张图所需字节数，溢出时返回 None
    pub fn checked_byte_size(&self, row_bytes: usize) -> Option<usize> {
        if self.dimensions.height <= 0 {
            return Some(0);
        }
        row_bytes
            .checked_mul(self.dimensions.height as usize - 1)?
            .checked_add(self.min_row_bytes())
    }

    /// 给定行字节数时整张图所需字节数，溢出时返回 `usize::MAX`
    pub fn compute_byte_size(&self, row_bytes: usize) -> usize {
        self.checked_byte_size(row_bytes).unwrap_or(usize::MAX)
    }

    /// 检查读回目标：行步长不小于紧密行宽，缓冲能容纳整张图
    pub fn validate_read_destination(&self, dst_len: usize, row_bytes: usize) -> Result<()> {
        let min_row = self.min_row_bytes();
        let needed = self.checked_byte_size(row_bytes);
        match needed {
            Some(needed) if row_bytes >= min_row && dst_len >= needed => Ok(()),
            _ => Err(DescriptorError::InvalidImageInfo(format!(
                "destination of {} bytes with row stride {} cannot hold {}x{} pixels (stride >= {})",
                dst_len, row_bytes, self.dimensions.width, self.dimensions.height, min_row
            ))
            .into()),
        }
    }

    /// 校验尺寸与颜色类型
    pub fn validate(&self) -> Result<()> {
        if !self.dimensions.is_positive() {
            return Err(DescriptorError::InvalidImageInfo(format!(
                "dimensions must be positive, got {}x{}",
                self.dimensions.width, self.dimensions.height
            ))
            .into());
        }
        if self.color_type == ColorType::Unknown {
            return Err(DescriptorError::InvalidImageInfo("unknown color type".into()).into());
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// GPU 上该图像（含 mip 链）占用的字节数估算
    pub fn gpu_byte_size(&self, mipmapped: Mipmapped) -> u64 {
        let base = self.dimensions.area() * self.bytes_per_pixel() as u64;
        match mipmapped {
            Mipmapped::No => base,
            // 完整 mip 链约为基础层的 4/3
            Mipmapped::Yes => base + base / 3,
        }
    }
}

/// 浮点 RGBA 颜色（非预乘）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Color4f {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color4f {
    pub const TRANSPARENT: Self = Self::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Self = Self::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);
    pub const RED: Self = Self::new(1.0, 0.0, 0.0, 1.0);
    pub const GREEN: Self = Self::new(0.0, 1.0, 0.0, 1.0);
    pub const BLUE: Self = Self::new(0.0, 0.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    fn unorm8(value: f32) -> u8 {
        (value.clamp(0.0, 1.0) * 255.0 + 0.5) as u8
    }

    /// 按颜色类型编码为一个像素
    pub fn to_pixel(&self, color_type: ColorType) -> Vec<u8> {
        let (r, g, b, a) = (
            Self::unorm8(self.r),
            Self::unorm8(self.g),
            Self::unorm8(self.b),
            Self::unorm8(self.a),
        );
        match color_type {
            ColorType::Unknown => Vec::new(),
            ColorType::Alpha8 => vec![a],
            ColorType::Gray8 => vec![Self::unorm8(self.luminance())],
            ColorType::Rgba8888 => vec![r, g, b, a],
            ColorType::Bgra8888 => vec![b, g, r, a],
        }
    }

    /// 单通道格式下写入 R 通道的值，按 RGBA 顺序返回清除值
    pub fn clear_channels(&self, color_type: ColorType) -> [f32; 4] {
        match color_type {
            ColorType::Alpha8 => [self.a, 0.0, 0.0, 0.0],
            ColorType::Gray8 => [self.luminance(), 0.0, 0.0, 0.0],
            _ => [self.r, self.g, self.b, self.a],
        }
    }

    fn luminance(&self) -> f32 {
        0.2126 * self.r + 0.7152 * self.g + 0.0722 * self.b
    }
}

/// 整数矩形（右、下边界不包含）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl IRect {
    pub const fn from_ltrb(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::from_ltrb(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    /// 超出 i32 范围时饱和
    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// 与 `(0, 0, size)` 求交，空交集返回 None
    pub fn clip_to(&self, size: ISize) -> Option<IRect> {
        let clipped = IRect::from_ltrb(
            self.left.max(0),
            self.top.max(0),
            self.right.min(size.width),
            self.bottom.min(size.height),
        );
        if clipped.is_empty() { None } else { Some(clipped) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(Mipmapped::No.level_count(ISize::new(256, 256)), 1);
        assert_eq!(Mipmapped::Yes.level_count(ISize::new(256, 256)), 9);
        assert_eq!(Mipmapped::Yes.level_count(ISize::new(300, 20)), 9);
        assert_eq!(Mipmapped::Yes.level_count(ISize::new(1, 1)), 1);
    }

    #[test]
    fn test_image_info_validation() {
        assert!(ImageInfo::new_n32_premul((4, 4), None).is_valid());
        assert!(!ImageInfo::new_n32_premul((0, 4), None).is_valid());
        assert!(!ImageInfo::new((4, 4), ColorType::Unknown, AlphaType::Premul, None).is_valid());
    }

    #[test]
    fn test_byte_sizes() {
        let info = ImageInfo::new_n32_premul((10, 3), None);
        assert_eq!(info.min_row_bytes(), 40);
        assert_eq!(info.compute_byte_size(64), 64 * 2 + 40);
        assert_eq!(info.gpu_byte_size(Mipmapped::No), 120);
        assert_eq!(info.gpu_byte_size(Mipmapped::Yes), 160);
    }

    #[test]
    fn test_pixel_encoding() {
        let color = Color4f::new(1.0, 0.5, 0.0, 1.0);
        assert_eq!(color.to_pixel(ColorType::Rgba8888), vec![255, 128, 0, 255]);
        assert_eq!(color.to_pixel(ColorType::Bgra8888), vec![0, 128, 255, 255]);
        assert_eq!(color.to_pixel(ColorType::Alpha8), vec![255]);
    }

    #[test]
    fn test_extreme_rects_do_not_overflow() {
        let inverted = IRect::from_ltrb(i32::MAX, 0, i32::MIN, 1);
        assert!(inverted.is_empty());
        assert_eq!(inverted.width(), i32::MIN);
        assert_eq!(inverted.clip_to(ISize::new(4, 4)), None);

        let huge = IRect::from_ltrb(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(huge.width(), i32::MAX);
        assert_eq!(huge.clip_to(ISize::new(4, 4)), Some(IRect::from_ltrb(0, 0, 4, 4)));
        assert_eq!(IRect::from_xywh(i32::MAX, 0, 10, 1).right, i32::MAX);
    }

    #[test]
    fn test_read_destination_checks_overflow() {
        let info = ImageInfo::new_n32_premul((2, 2), None);
        assert!(info.validate_read_destination(16, 8).is_ok());
        assert!(info.validate_read_destination(15, 8).is_err());
        assert!(info.validate_read_destination(64, 4).is_err());
        assert!(info.validate_read_destination(16, usize::MAX).is_err());
        assert_eq!(info.checked_byte_size(usize::MAX), None);
        assert_eq!(info.compute_byte_size(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_rect_clip() {
        let rect = IRect::from_xywh(-2, 1, 5, 10);
        assert_eq!(rect.clip_to(ISize::new(4, 4)), Some(IRect::from_ltrb(0, 1, 3, 4)));
        assert_eq!(IRect::from_xywh(5, 5, 2, 2).clip_to(ISize::new(4, 4)), None);
    }
}

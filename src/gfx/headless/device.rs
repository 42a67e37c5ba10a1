//! Headless 设备
//!
//! 一个纯 CPU 的参考设备：图像是内存中的像素缓冲，命令在 CPU 上执行。
//! 它让整个记录 / 提交协议可以在没有 GPU 的环境中运行和测试。

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::error::{BridgeError, Result};
use crate::gpu::backend_texture::{BackendTexture, BackendTextureHandle};
use crate::gpu::texture_info::TextureInfo;
use crate::gpu::types::{Color4f, ColorType, IRect, ISize, ImageInfo, Mipmapped};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_IMAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Headless 设备句柄（可克隆，共享同一设备）
#[derive(Clone)]
pub struct HeadlessDevice {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    id: u64,
    name: String,
    lost: AtomicBool,
}

impl HeadlessDevice {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(DeviceInner {
                id: NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed),
                name: name.to_string(),
                lost: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn is_lost(&self) -> bool {
        self.inner.lost.load(Ordering::Acquire)
    }

    /// 模拟设备丢失，之后所有提交都会失败
    pub fn mark_lost(&self) {
        self.inner.lost.store(true, Ordering::Release);
    }

    /// 分配一张清零的图像，所有权归调用者
    pub fn create_image(&self, dimensions: impl Into<ISize>, color_type: ColorType) -> Result<HeadlessImage> {
        let dimensions = dimensions.into();
        ImageInfo::new(dimensions, color_type, Default::default(), None).validate()?;
        if self.is_lost() {
            return Err(BridgeError::allocation(format!(
                "headless device '{}' is lost",
                self.name()
            )));
        }

        let len = dimensions.area() as usize * color_type.bytes_per_pixel();
        Ok(HeadlessImage {
            store: Arc::new(ImageStore {
                id: NEXT_IMAGE_ID.fetch_add(1, Ordering::Relaxed),
                device_id: self.id(),
                dimensions,
                color_type,
                pixels: Mutex::new(vec![0; len]),
            }),
        })
    }
}

impl fmt::Debug for HeadlessDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessDevice")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("lost", &self.is_lost())
            .finish()
    }
}

/// 图像像素存储
pub(crate) struct ImageStore {
    id: u64,
    device_id: u64,
    dimensions: ISize,
    color_type: ColorType,
    pixels: Mutex<Vec<u8>>,
}

impl ImageStore {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn device_id(&self) -> u64 {
        self.device_id
    }

    pub(crate) fn color_type(&self) -> ColorType {
        self.color_type
    }

    fn row_bytes(&self) -> usize {
        self.dimensions.width as usize * self.color_type.bytes_per_pixel()
    }

    pub(crate) fn clear(&self, color: Color4f) {
        let pixel = color.to_pixel(self.color_type);
        let mut pixels = self.pixels.lock();
        for chunk in pixels.chunks_exact_mut(pixel.len()) {
            chunk.copy_from_slice(&pixel);
        }
    }

    pub(crate) fn fill_rect(&self, rect: IRect, color: Color4f) {
        let Some(rect) = rect.clip_to(self.dimensions) else {
            return;
        };
        let pixel = color.to_pixel(self.color_type);
        let bpp = pixel.len();
        let row_bytes = self.row_bytes();
        let mut pixels = self.pixels.lock();
        for y in rect.top..rect.bottom {
            let start = y as usize * row_bytes + rect.left as usize * bpp;
            let end = start + rect.width() as usize * bpp;
            for chunk in pixels[start..end].chunks_exact_mut(bpp) {
                chunk.copy_from_slice(&pixel);
            }
        }
    }

    /// 按 `row_bytes` 步长把像素拷贝到 `dst`
    pub(crate) fn read_into(&self, dst: &mut [u8], row_bytes: usize) -> Result<()> {
        let src_row = self.row_bytes();
        ImageInfo::new(self.dimensions, self.color_type, Default::default(), None)
            .validate_read_destination(dst.len(), row_bytes)?;
        let pixels = self.pixels.lock();
        for (y, row) in pixels.chunks_exact(src_row).enumerate() {
            let start = y * row_bytes;
            dst[start..start + src_row].copy_from_slice(row);
        }
        Ok(())
    }

    fn to_backend_texture(self: &Arc<Self>) -> BackendTexture {
        BackendTexture::from_parts(
            self.dimensions,
            TextureInfo::new_headless(self.color_type, Mipmapped::No),
            BackendTextureHandle::Headless(HeadlessTextureRef {
                id: self.id,
                store: Arc::downgrade(self),
            }),
        )
    }
}

/// 调用者拥有的 Headless 图像
///
/// 它扮演"外部分配的 GPU 内存"的角色：`backend_texture()` 产生的描述只持有弱引用，
/// 图像释放后描述随即失效。
pub struct HeadlessImage {
    store: Arc<ImageStore>,
}

impl HeadlessImage {
    pub fn dimensions(&self) -> ISize {
        self.store.dimensions
    }

    pub fn color_type(&self) -> ColorType {
        self.store.color_type
    }

    pub fn backend_texture(&self) -> BackendTexture {
        self.store.to_backend_texture()
    }

    /// 紧密排列的像素副本
    pub fn read_pixels(&self) -> Vec<u8> {
        self.store.pixels.lock().clone()
    }

    /// 读取单个像素
    pub fn pixel(&self, x: i32, y: i32) -> Option<Vec<u8>> {
        let dims = self.store.dimensions;
        if x < 0 || y < 0 || x >= dims.width || y >= dims.height {
            return None;
        }
        let bpp = self.store.color_type.bytes_per_pixel();
        let start = y as usize * self.store.row_bytes() + x as usize * bpp;
        Some(self.store.pixels.lock()[start..start + bpp].to_vec())
    }
}

impl fmt::Debug for HeadlessImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessImage")
            .field("id", &self.store.id)
            .field("dimensions", &self.store.dimensions)
            .field("color_type", &self.store.color_type)
            .finish()
    }
}

/// 指向 Headless 图像的弱引用
#[derive(Clone)]
pub struct HeadlessTextureRef {
    id: u64,
    store: Weak<ImageStore>,
}

impl HeadlessTextureRef {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.store.strong_count() > 0
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<ImageStore>> {
        self.store.upgrade()
    }

    pub(crate) fn downgrade(&self) -> Weak<ImageStore> {
        self.store.clone()
    }
}

impl fmt::Debug for HeadlessTextureRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadlessTextureRef")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// Headless 纹理描述
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadlessTextureInfo {
    pub color_type: ColorType,
}

impl HeadlessTextureInfo {
    pub fn is_valid(&self) -> bool {
        self.color_type != ColorType::Unknown
    }
}

/// Headless 后端上下文
#[derive(Debug, Clone)]
pub struct HeadlessBackendContext {
    device: HeadlessDevice,
}

impl HeadlessBackendContext {
    pub fn new(device: HeadlessDevice) -> Self {
        Self { device }
    }

    pub fn device(&self) -> &HeadlessDevice {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_image_rejects_bad_descriptors() {
        let device = HeadlessDevice::new("images");
        assert!(device.create_image((0, 4), ColorType::Rgba8888).is_err());
        assert!(device.create_image((4, 4), ColorType::Unknown).is_err());

        device.mark_lost();
        let err = device.create_image((4, 4), ColorType::Rgba8888).unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::ConstructionFailure);
    }

    #[test]
    fn test_clear_and_fill_rect() {
        let device = HeadlessDevice::new("pixels");
        let image = device.create_image((4, 4), ColorType::Bgra8888).unwrap();

        image.store.clear(Color4f::RED);
        image.store.fill_rect(IRect::from_xywh(2, 2, 8, 8), Color4f::BLUE);

        assert_eq!(image.pixel(0, 0), Some(vec![0, 0, 255, 255]));
        assert_eq!(image.pixel(3, 3), Some(vec![255, 0, 0, 255]));
        assert_eq!(image.pixel(4, 0), None);
    }

    #[test]
    fn test_read_into_honours_row_stride() {
        let device = HeadlessDevice::new("stride");
        let image = device.create_image((2, 2), ColorType::Gray8).unwrap();
        image.store.clear(Color4f::WHITE);

        let mut dst = vec![7u8; 7];
        image.store.read_into(&mut dst, 4).unwrap();
        assert_eq!(dst, vec![255, 255, 7, 7, 255, 255, 7]);

        let mut small = vec![0u8; 3];
        assert!(image.store.read_into(&mut small, 2).is_err());
    }
}

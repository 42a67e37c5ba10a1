//! 命令记录模块
//!
//! Surface 上的绘制调用被记录为 `DrawCommand`，按渲染目标分组为 `RecordedPass`，
//! 暂存在所属 Recorder（或立即模式 DirectContext）的 `CommandSink` 中，
//! 直到 `snap` 把它们整体移交给一个 Recording。
//!
//! 真正的光栅化在外部设备中完成，这里只保留设备需要执行的最小命令集。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::backend_texture::BackendTexture;
use super::driver::DeviceDriver;
use super::recorder::GpuBudget;
use super::tracker::{ResourceKind, ResourceToken, ResourceTracker};
use super::types::{Color4f, ISize, IRect, ImageInfo};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// 进程内唯一的对象 ID
pub(crate) fn next_object_id() -> u64 {
    NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed)
}

/// 绘制命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawCommand {
    /// 用颜色清空整个渲染目标
    Clear(Color4f),
    /// 用颜色填充矩形（已裁剪到渲染目标范围内）
    FillRect { rect: IRect, color: Color4f },
}

/// 渲染目标
///
/// 由驱动分配（owned，最后一个引用释放时销毁并归还预算），
/// 或包装调用者的纹理（wrapped，从不释放底层内存）。
pub struct RenderTarget {
    id: u64,
    texture: BackendTexture,
    image_info: ImageInfo,
    ownership: Ownership,
    _token: ResourceToken,
}

enum Ownership {
    Owned {
        driver: Arc<dyn DeviceDriver>,
        budget: Arc<GpuBudget>,
        bytes: u64,
    },
    /// 释放时通知驱动丢弃它为该纹理保存的状态
    Wrapped { driver: Option<Arc<dyn DeviceDriver>> },
}

impl RenderTarget {
    pub(crate) fn owned(
        texture: BackendTexture,
        image_info: ImageInfo,
        driver: Arc<dyn DeviceDriver>,
        budget: Arc<GpuBudget>,
        bytes: u64,
        tracker: Option<&Arc<ResourceTracker>>,
    ) -> Self {
        Self {
            id: next_object_id(),
            texture,
            image_info,
            ownership: Ownership::Owned {
                driver,
                budget,
                bytes,
            },
            _token: ResourceToken::new(tracker, ResourceKind::RenderTarget),
        }
    }

    pub(crate) fn wrapped(
        texture: BackendTexture,
        image_info: ImageInfo,
        tracker: Option<&Arc<ResourceTracker>>,
    ) -> Self {
        Self {
            id: next_object_id(),
            texture,
            image_info,
            ownership: Ownership::Wrapped { driver: None },
            _token: ResourceToken::new(tracker, ResourceKind::RenderTarget),
        }
    }

    /// 释放时调用 `DeviceDriver::forget_wrapped`
    pub(crate) fn with_release_notice(mut self, driver: Arc<dyn DeviceDriver>) -> Self {
        if let Ownership::Wrapped { driver: slot } = &mut self.ownership {
            *slot = Some(driver);
        }
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn backend_texture(&self) -> &BackendTexture {
        &self.texture
    }

    pub fn image_info(&self) -> &ImageInfo {
        &self.image_info
    }

    pub fn dimensions(&self) -> ISize {
        self.image_info.dimensions()
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(self.ownership, Ownership::Wrapped { .. })
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        match &self.ownership {
            Ownership::Owned { driver, budget, bytes } => {
                driver.destroy_render_target(&self.texture);
                budget.release(*bytes);
            }
            Ownership::Wrapped { driver: Some(driver) } => driver.forget_wrapped(&self.texture),
            Ownership::Wrapped { driver: None } => {}
        }
    }
}

impl fmt::Debug for RenderTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderTarget")
            .field("id", &self.id)
            .field("image_info", &self.image_info)
            .field("wrapped", &self.is_wrapped())
            .finish()
    }
}

/// 针对同一渲染目标的一组连续命令
#[derive(Debug, Clone)]
pub struct RecordedPass {
    target: Arc<RenderTarget>,
    commands: Vec<DrawCommand>,
}

impl RecordedPass {
    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }
}

/// 待 snap 的命令缓冲
#[derive(Debug, Default)]
pub(crate) struct CommandSink {
    passes: Vec<RecordedPass>,
}

impl CommandSink {
    /// 追加一条命令；与上一条命令目标相同时并入同一个 pass
    pub(crate) fn record(&mut self, target: &Arc<RenderTarget>, command: DrawCommand) {
        match self.passes.last_mut() {
            Some(pass) if Arc::ptr_eq(&pass.target, target) => {
                // 整体清空会覆盖此前对同一目标的所有绘制
                if matches!(command, DrawCommand::Clear(_)) {
                    pass.commands.clear();
                }
                pass.commands.push(command);
            }
            _ => self.passes.push(RecordedPass {
                target: Arc::clone(target),
                commands: vec![command],
            }),
        }
    }

    /// 取走所有 pass，留下空缓冲
    pub(crate) fn take(&mut self) -> Vec<RecordedPass> {
        std::mem::take(&mut self.passes)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::headless::HeadlessDevice;
    use crate::gpu::types::ColorType;

    fn wrapped_target(device: &HeadlessDevice) -> (crate::gfx::headless::HeadlessImage, Arc<RenderTarget>) {
        let image = device.create_image((4, 4), ColorType::Rgba8888).unwrap();
        let info = ImageInfo::new_n32_premul((4, 4), None);
        let target = Arc::new(RenderTarget::wrapped(image.backend_texture(), info, None));
        (image, target)
    }

    #[test]
    fn test_commands_merge_per_target() {
        let device = HeadlessDevice::new("sink-test");
        let (_a_image, a) = wrapped_target(&device);
        let (_b_image, b) = wrapped_target(&device);

        let mut sink = CommandSink::default();
        sink.record(&a, DrawCommand::Clear(Color4f::RED));
        sink.record(&a, DrawCommand::FillRect { rect: IRect::from_xywh(0, 0, 1, 1), color: Color4f::BLUE });
        sink.record(&b, DrawCommand::Clear(Color4f::GREEN));
        sink.record(&a, DrawCommand::Clear(Color4f::WHITE));

        let passes = sink.take();
        assert_eq!(passes.len(), 3);
        assert_eq!(passes[0].commands().len(), 2);
        assert_eq!(passes[1].target().id(), b.id());
        assert!(sink.is_empty());
    }

    #[test]
    fn test_clear_discards_earlier_commands_in_pass() {
        let device = HeadlessDevice::new("sink-clear");
        let (_image, target) = wrapped_target(&device);

        let mut sink = CommandSink::default();
        sink.record(&target, DrawCommand::FillRect { rect: IRect::from_xywh(0, 0, 2, 2), color: Color4f::BLUE });
        sink.record(&target, DrawCommand::Clear(Color4f::BLACK));

        let passes = sink.take();
        assert_eq!(passes[0].commands(), &[DrawCommand::Clear(Color4f::BLACK)]);
    }
}

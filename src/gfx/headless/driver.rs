//! Headless 设备驱动
//!
//! 提交的批次先进入待执行队列，在下一次 `poll` / `wait_for` 时按提交顺序在 CPU 上执行。
//! 这让"异步提交、稍后完成"的语义在没有 GPU 的情况下也可以被观察到。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::device::{HeadlessBackendContext, HeadlessDevice, ImageStore};
use crate::core::error::{BridgeError, DescriptorError, Result};
use crate::gpu::backend_context::BackendApi;
use crate::gpu::backend_texture::{BackendTexture, BackendTextureHandle};
use crate::gpu::command::{DrawCommand, RecordedPass};
use crate::gpu::driver::{check_wrappable, DeviceDriver};
use crate::gpu::sync::FenceValue;
use crate::gpu::types::{ColorType, ImageInfo, Mipmapped};

/// 待执行的一批工作
struct PendingBatch {
    fence: FenceValue,
    ops: Vec<(Weak<ImageStore>, Vec<DrawCommand>)>,
}

#[derive(Default)]
struct DriverState {
    /// 驱动分配的渲染目标，按图像 ID 索引
    owned: HashMap<u64, Arc<ImageStore>>,
    pending: VecDeque<PendingBatch>,
    completed: FenceValue,
}

/// Headless 设备驱动
pub struct HeadlessDriver {
    device: HeadlessDevice,
    state: Mutex<DriverState>,
}

impl HeadlessDriver {
    pub fn new(ctx: &HeadlessBackendContext) -> Result<Self> {
        let device = ctx.device().clone();
        if device.is_lost() {
            return Err(BridgeError::device_init(format!(
                "headless device '{}' is lost",
                device.name()
            )));
        }
        debug!(device = device.name(), "Headless driver created");
        Ok(Self {
            device,
            state: Mutex::new(DriverState::default()),
        })
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.device.is_lost() {
            Err(BridgeError::device(format!("headless device '{}' is lost", self.device.name())))
        } else {
            Ok(())
        }
    }

    fn store_of(texture: &BackendTexture) -> Option<Arc<ImageStore>> {
        match texture.handle() {
            BackendTextureHandle::Headless(texture) => texture.upgrade(),
            _ => None,
        }
    }

    /// 执行栅栏值不超过 `target` 的所有批次
    fn execute_until(&self, state: &mut DriverState, target: FenceValue) -> Result<()> {
        while let Some(batch) = state.pending.front() {
            if batch.fence > target {
                break;
            }
            let Some(batch) = state.pending.pop_front() else {
                break;
            };
            // 无论执行是否出错，该批次都视为已完成
            state.completed = batch.fence;
            for (store, commands) in batch.ops {
                let Some(store) = store.upgrade() else {
                    warn!(fence = batch.fence.value(), "Render target released before execution");
                    return Err(BridgeError::device(
                        "render target memory was released before the work executed",
                    ));
                };
                for command in commands {
                    match command {
                        DrawCommand::Clear(color) => store.clear(color),
                        DrawCommand::FillRect { rect, color } => store.fill_rect(rect, color),
                    }
                }
            }
        }
        Ok(())
    }
}

impl DeviceDriver for HeadlessDriver {
    fn api(&self) -> BackendApi {
        BackendApi::Headless
    }

    fn device_name(&self) -> String {
        self.device.name().to_string()
    }

    fn is_device_lost(&self) -> bool {
        self.device.is_lost()
    }

    fn create_render_target(&self, info: &ImageInfo, mipmapped: Mipmapped) -> Result<BackendTexture> {
        self.ensure_alive()?;
        // CPU 图像只保存基础层
        let _ = mipmapped;
        let image = self.device.create_image(info.dimensions(), info.color_type())?;
        let texture = image.backend_texture();
        if let Some(store) = Self::store_of(&texture) {
            self.state.lock().owned.insert(store.id(), store);
        }
        Ok(texture)
    }

    fn destroy_render_target(&self, texture: &BackendTexture) {
        if let BackendTextureHandle::Headless(texture) = texture.handle() {
            self.state.lock().owned.remove(&texture.id());
        }
    }

    fn validate_wrap(&self, texture: &BackendTexture, color_type: ColorType) -> Result<()> {
        if let Some(store) = Self::store_of(texture) {
            if store.device_id() != self.device.id() {
                return Err(BridgeError::InvalidDescriptor(DescriptorError::InvalidBackendTexture(
                    "image belongs to another headless device".into(),
                )));
            }
        }
        check_wrappable(BackendApi::Headless, texture, color_type)
    }

    fn submit(&self, passes: &[&RecordedPass], fence: FenceValue) -> Result<()> {
        self.ensure_alive()?;
        let mut ops = Vec::with_capacity(passes.len());
        for pass in passes {
            let target = match pass.target().backend_texture().handle() {
                BackendTextureHandle::Headless(texture) => texture.downgrade(),
                _ => {
                    // 空批次让栅栏照常按顺序到达
                    self.state.lock().pending.push_back(PendingBatch { fence, ops: Vec::new() });
                    return Err(BridgeError::device("pass targets a non-headless texture"));
                }
            };
            ops.push((target, pass.commands().to_vec()));
        }
        self.state.lock().pending.push_back(PendingBatch { fence, ops });
        debug!(fence = fence.value(), passes = passes.len(), "Headless batch queued");
        Ok(())
    }

    fn wait_for(&self, fence: FenceValue) -> Result<()> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        self.execute_until(&mut state, fence)
    }

    fn poll(&self) -> Result<FenceValue> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        let latest = state.pending.back().map(|b| b.fence);
        if let Some(latest) = latest {
            self.execute_until(&mut state, latest)?;
        }
        Ok(state.completed)
    }

    fn read_pixels(
        &self,
        texture: &BackendTexture,
        info: &ImageInfo,
        dst: &mut [u8],
        row_bytes: usize,
    ) -> Result<()> {
        let store = Self::store_of(texture).ok_or_else(|| {
            BridgeError::InvalidDescriptor(DescriptorError::InvalidBackendTexture(
                "headless image was released".into(),
            ))
        })?;
        if store.color_type() != info.color_type() {
            return Err(BridgeError::Unsupported(format!(
                "color conversion from {:?} to {:?} is not supported",
                store.color_type(),
                info.color_type()
            )));
        }
        store.read_into(dst, row_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::command::{CommandSink, RenderTarget};
    use crate::gpu::types::Color4f;

    fn driver(name: &str) -> (HeadlessDevice, HeadlessDriver) {
        let device = HeadlessDevice::new(name);
        let driver = HeadlessDriver::new(&HeadlessBackendContext::new(device.clone())).unwrap();
        (device, driver)
    }

    #[test]
    fn test_lost_device_fails_construction() {
        let device = HeadlessDevice::new("lost");
        device.mark_lost();
        let err = HeadlessDriver::new(&HeadlessBackendContext::new(device)).err().unwrap();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::ConstructionFailure);
    }

    #[test]
    fn test_owned_targets_are_released() {
        let (_device, driver) = driver("owned");
        let info = ImageInfo::new_n32_premul((8, 8), None);
        let texture = driver.create_render_target(&info, Mipmapped::No).unwrap();
        assert!(texture.is_valid());

        driver.destroy_render_target(&texture);
        assert!(!texture.is_valid());
    }

    #[test]
    fn test_wrap_rejects_foreign_device_and_color_mismatch() {
        let (device, driver) = driver("wrap");
        let other = HeadlessDevice::new("other");

        let foreign = other.create_image((4, 4), ColorType::Rgba8888).unwrap();
        assert!(driver.validate_wrap(&foreign.backend_texture(), ColorType::Rgba8888).is_err());

        let local = device.create_image((4, 4), ColorType::Rgba8888).unwrap();
        assert!(driver.validate_wrap(&local.backend_texture(), ColorType::Rgba8888).is_ok());
        assert!(matches!(
            driver.validate_wrap(&local.backend_texture(), ColorType::Bgra8888),
            Err(BridgeError::InvalidDescriptor(DescriptorError::ColorTypeMismatch(_)))
        ));
        assert!(driver.validate_wrap(&BackendTexture::default(), ColorType::Rgba8888).is_err());
    }

    #[test]
    fn test_read_pixels_of_owned_target() {
        let (_device, driver) = driver("read");
        let info = ImageInfo::new_n32_premul((2, 1), None);
        let texture = driver.create_render_target(&info, Mipmapped::No).unwrap();
        if let Some(store) = HeadlessDriver::store_of(&texture) {
            store.clear(Color4f::GREEN);
        }

        let mut dst = vec![0u8; 8];
        driver.read_pixels(&texture, &info, &mut dst, 8).unwrap();
        assert_eq!(dst, vec![0, 255, 0, 255, 0, 255, 0, 255]);

        let bgra = info.with_color_type(ColorType::Bgra8888);
        assert!(matches!(
            driver.read_pixels(&texture, &bgra, &mut dst, 8),
            Err(BridgeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_failed_submit_still_signals_fence() {
        let (_device, driver) = driver("failed-submit");
        let info = ImageInfo::new_n32_premul((1, 1), None);
        let target = Arc::new(RenderTarget::wrapped(BackendTexture::default(), info, None));
        let mut sink = CommandSink::default();
        sink.record(&target, DrawCommand::Clear(Color4f::RED));
        let passes = sink.take();
        let refs: Vec<&RecordedPass> = passes.iter().collect();

        assert!(driver.submit(&refs, FenceValue::new(1)).is_err());
        assert_eq!(driver.poll().unwrap(), FenceValue::new(1));
    }
}

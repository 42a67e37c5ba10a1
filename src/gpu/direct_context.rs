//! DirectContext
//!
//! 立即模式的图形上下文：内部持有一个 Context 与一个隐式 Recorder。
//! 在 `render_target` Surface 上的绘制直接进入隐式 Recorder，
//! `flush_and_submit` 一步完成 snap、插入与提交。
//!
//! 设备总是显式注入，不存在进程级的默认设备。

use std::sync::Arc;

use super::backend_context::{BackendApi, BackendContext};
use super::context::Context;
use super::options::{ContextOptions, RecorderOptions};
use super::recorder::Recorder;
use super::surface::Surface;
use super::sync::SyncToCpu;
use crate::core::error::Result;
use crate::gfx::dawn::DawnBackendContext;
use crate::gfx::headless::{HeadlessBackendContext, HeadlessDevice};

/// 立即模式上下文
///
/// 字段顺序保证隐式 Recorder 先于 Context 释放。
pub struct DirectContext {
    recorder: Recorder,
    context: Context,
}

impl DirectContext {
    pub fn make(backend: &BackendContext, options: Option<&ContextOptions>) -> Result<Self> {
        let context = Context::make(backend, options)?;
        let recorder = context.make_recorder(Some(&RecorderOptions {
            label: Some("direct".into()),
            ..RecorderOptions::default()
        }))?;
        Ok(Self { recorder, context })
    }

    pub fn make_headless(device: &HeadlessDevice, options: Option<&ContextOptions>) -> Result<Self> {
        Self::make(&BackendContext::from(HeadlessBackendContext::new(device.clone())), options)
    }

    /// 使用调用者注入的 wgpu 设备与队列
    pub fn make_dawn(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        options: Option<&ContextOptions>,
    ) -> Result<Self> {
        Self::make(&BackendContext::from(DawnBackendContext::new(device, queue)), options)
    }

    pub fn backend(&self) -> BackendApi {
        self.context.backend()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub(crate) fn recorder_mut(&mut self) -> &mut Recorder {
        &mut self.recorder
    }

    /// 把隐式 Recorder 中的命令插入 Context，但不提交
    pub fn flush(&mut self) -> bool {
        if !self.recorder.has_pending_work() {
            return true;
        }
        match self.recorder.snap() {
            Ok(recording) => self.context.insert_recording(recording),
            Err(_) => false,
        }
    }

    pub fn submit(&mut self, sync: Option<SyncToCpu>) -> bool {
        self.context.submit(sync)
    }

    pub fn flush_and_submit(&mut self, sync: SyncToCpu) -> bool {
        self.flush() && self.submit(Some(sync))
    }

    /// 刷新并同步提交后读回像素
    pub fn read_pixels(&mut self, surface: &Surface, dst: &mut [u8], row_bytes: usize) -> bool {
        self.flush_and_submit(SyncToCpu::Yes) && self.context.read_pixels(surface, dst, row_bytes)
    }

    pub fn check_async_work_completion(&mut self) {
        self.context.check_async_work_completion();
    }

    pub fn abandon(&mut self) {
        self.context.abandon();
    }

    pub fn is_abandoned(&self) -> bool {
        self.context.is_abandoned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::surface;
    use crate::gpu::tracker::ResourceTracker;
    use crate::gpu::types::{Color4f, IRect, ImageInfo};

    #[test]
    fn test_immediate_mode_renders() {
        let device = HeadlessDevice::new("direct");
        let mut direct = DirectContext::make_headless(&device, None).unwrap();
        assert_eq!(direct.backend(), BackendApi::Headless);

        let info = ImageInfo::new_n32_premul((3, 3), None);
        let mut surface = surface::render_target(&mut direct, &info, None, None).unwrap();
        let mut canvas = surface.canvas();
        canvas.clear(Color4f::WHITE).unwrap();
        canvas.draw_rect(IRect::from_xywh(2, 2, 5, 5), Color4f::BLACK).unwrap();

        let mut pixels = vec![0u8; 3 * 3 * 4];
        assert!(direct.read_pixels(&surface, &mut pixels, 12));
        assert_eq!(&pixels[0..4], &[255, 255, 255, 255]);
        assert_eq!(&pixels[32..36], &[0, 0, 0, 255]);
        assert!(!direct.context().has_unfinished_work());
    }

    #[test]
    fn test_flush_without_work_is_noop() {
        let device = HeadlessDevice::new("direct-empty");
        let mut direct = DirectContext::make_headless(&device, None).unwrap();
        assert!(direct.flush_and_submit(SyncToCpu::Yes));
        assert_eq!(direct.context().pending_recordings(), 0);
    }

    #[test]
    fn test_abandoned_direct_context_rejects_flush() {
        let tracker = ResourceTracker::new();
        let device = HeadlessDevice::new("direct-abandon");
        let options = ContextOptions::default().with_tracker(Arc::clone(&tracker));
        let mut direct = DirectContext::make_headless(&device, Some(&options)).unwrap();
        let mut surface =
            surface::render_target(&mut direct, &ImageInfo::new_n32_premul((2, 2), None), None, None).unwrap();
        surface.canvas().clear(Color4f::RED).unwrap();

        direct.abandon();
        assert!(direct.is_abandoned());
        assert!(!direct.flush_and_submit(SyncToCpu::No));

        drop(surface);
        drop(direct);
        assert!(tracker.all_released());
    }
}

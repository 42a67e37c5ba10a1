//! Context
//!
//! 延迟模式的图形上下文。Context 拥有与设备的连接（`DeviceDriver`），
//! 维护待提交的 Recording 队列与已提交未完成的工作列表。
//!
//! # 提交协议
//!
//! ```text
//! Recorder::snap ──► Recording(Snapped)
//!                         │ insert_recording
//!                         ▼
//!                    Inserted（待提交队列）
//!                         │ submit
//!                         ▼
//!                    Submitted（飞行中，持有渲染目标）
//!                         │ 栅栏完成
//!                         ▼
//!                    Consumed（释放）
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::backend_context::{BackendApi, BackendContext};
use super::command::{next_object_id, RecordedPass};
use super::driver::DeviceDriver;
use super::options::{ContextOptions, RecorderOptions};
use super::recorder::Recorder;
use super::recording::{Recording, RecordingState};
use super::surface::Surface;
use super::sync::{FenceManager, FenceValue, SyncToCpu};
use super::tracker::{ResourceKind, ResourceToken, ResourceTracker};
use crate::core::error::{BridgeError, Result, StateError};
use crate::{bridge_debug, bridge_error, bridge_info, bridge_warn};

/// Context 与其派生对象共享的状态
pub(crate) struct ContextShared {
    pub(crate) id: u64,
    pub(crate) api: BackendApi,
    pub(crate) driver: Arc<dyn DeviceDriver>,
    pub(crate) options: ContextOptions,
    abandoned: AtomicBool,
}

impl ContextShared {
    pub(crate) fn tracker(&self) -> Option<&Arc<ResourceTracker>> {
        self.options.resource_tracker.as_ref()
    }

    /// 未被放弃且设备未丢失
    pub(crate) fn is_usable(&self) -> bool {
        !self.abandoned.load(Ordering::Acquire) && !self.driver.is_device_lost()
    }
}

/// 一次提交
struct Submission {
    fence: FenceValue,
    recordings: Vec<Recording>,
}

/// 图形上下文
pub struct Context {
    shared: Arc<ContextShared>,
    queue: VecDeque<Recording>,
    in_flight: VecDeque<Submission>,
    fences: FenceManager,
    last_error: Option<BridgeError>,
    _token: ResourceToken,
}

impl Context {
    /// 为后端上下文创建 Context
    ///
    /// `options` 为 None 时使用默认选项。原生设备不可用时返回 `Construction(DeviceInit)`。
    pub fn make(backend: &BackendContext, options: Option<&ContextOptions>) -> Result<Self> {
        let options = options.cloned().unwrap_or_default();
        let api = backend.api();
        if !api.is_compiled() {
            return Err(BridgeError::Unsupported(format!(
                "the {} backend is not available on this platform",
                api.name()
            )));
        }

        let driver = backend.create_driver().map_err(|err| {
            bridge_error!(backend = api.name(), error = %err, "Failed to create device driver");
            err
        })?;
        Ok(Self::with_driver(driver, options))
    }

    pub(crate) fn with_driver(driver: Arc<dyn DeviceDriver>, options: ContextOptions) -> Self {
        let shared = Arc::new(ContextShared {
            id: next_object_id(),
            api: driver.api(),
            driver,
            options,
            abandoned: AtomicBool::new(false),
        });
        let token = ResourceToken::new(shared.tracker(), ResourceKind::Context);

        bridge_info!(
            context = shared.id,
            backend = shared.api.name(),
            device = %shared.driver.device_name(),
            label = ?shared.options.label,
            "Context created"
        );
        Self {
            shared,
            queue: VecDeque::new(),
            in_flight: VecDeque::new(),
            fences: FenceManager::new(),
            last_error: None,
            _token: token,
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn backend(&self) -> BackendApi {
        self.shared.api
    }

    pub fn options(&self) -> &ContextOptions {
        &self.shared.options
    }

    /// 创建一个录制会话
    pub fn make_recorder(&self, options: Option<&RecorderOptions>) -> Result<Recorder> {
        self.ensure_usable()?;
        Ok(Recorder::new(&self.shared, options.cloned().unwrap_or_default()))
    }

    /// 插入一个 Recording，失败原因见 `last_error`
    ///
    /// 无论成功与否，Recording 都被消费。
    pub fn insert_recording(&mut self, recording: Recording) -> bool {
        match self.try_insert_recording(recording) {
            Ok(()) => true,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    /// 插入一个 Recording 并返回失败原因
    pub fn try_insert_recording(&mut self, mut recording: Recording) -> Result<()> {
        self.ensure_usable()?;

        if recording.context_id() != self.id() {
            return Err(StateError::ForeignRecording {
                expected: self.id(),
                found: recording.context_id(),
            }
            .into());
        }
        if recording.state() != RecordingState::Snapped {
            return Err(StateError::RecordingConsumed.into());
        }

        let capacity = self.shared.options.max_pending_recordings;
        if self.queue.len() >= capacity {
            return Err(StateError::QueueFull(capacity).into());
        }

        if self.shared.options.require_ordered_recordings {
            let cursor = recording.cursor();
            if let Some(last) = cursor.last_inserted() {
                if recording.sequence() <= last {
                    return Err(StateError::OutOfOrder {
                        expected: last + 1,
                        found: recording.sequence(),
                    }
                    .into());
                }
            }
            cursor.mark_inserted(recording.sequence());
        }

        bridge_debug!(
            context = self.id(),
            recorder = recording.recorder_id(),
            sequence = recording.sequence(),
            passes = recording.pass_count(),
            "Recording inserted"
        );
        // 空 Recording 没有需要设备执行的内容
        if recording.is_empty() {
            return Ok(());
        }
        recording.set_state(RecordingState::Inserted);
        self.queue.push_back(recording);
        Ok(())
    }

    /// 提交所有已插入的 Recording
    ///
    /// `SyncToCpu::Yes` 阻塞到此前插入的所有工作执行完毕。失败原因见 `last_error`。
    pub fn submit(&mut self, sync: Option<SyncToCpu>) -> bool {
        match self.try_submit(sync.unwrap_or_default()) {
            Ok(()) => true,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    /// 提交所有已插入的 Recording 并返回失败原因
    pub fn try_submit(&mut self, sync: SyncToCpu) -> Result<()> {
        let _span = crate::span_trace!("submit").entered();
        self.ensure_usable()?;
        self.reap()?;

        if !self.queue.is_empty() {
            let fence = self.fences.next_value();
            let mut recordings: Vec<Recording> = self.queue.drain(..).collect();
            let passes: Vec<&RecordedPass> = recordings
                .iter()
                .flat_map(|recording| recording.passes().iter())
                .collect();

            let result = self.shared.driver.submit(&passes, fence);
            let pass_count = passes.len();
            for recording in &mut recordings {
                recording.set_state(RecordingState::Submitted);
            }
            // 失败的批次可能已部分进入设备队列，渲染目标保留到它的栅栏到达
            self.in_flight.push_back(Submission { fence, recordings });

            if let Err(err) = result {
                bridge_error!(context = self.id(), fence = fence.value(), error = %err, "Submit failed");
                return Err(err);
            }
            bridge_debug!(
                context = self.id(),
                fence = fence.value(),
                passes = pass_count,
                "Recordings submitted"
            );
        }

        if sync == SyncToCpu::Yes {
            self.wait_for_all()?;
        }
        Ok(())
    }

    /// 非阻塞地回收已完成的工作
    pub fn check_async_work_completion(&mut self) {
        if let Err(err) = self.reap() {
            self.report(err);
        }
    }

    /// 是否还有已提交但未回收的工作
    pub fn has_unfinished_work(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// 已插入尚未提交的 Recording 数量
    pub fn pending_recordings(&self) -> usize {
        self.queue.len()
    }

    /// 最近提交的栅栏值
    pub fn submitted_fence(&self) -> FenceValue {
        self.fences.current_value()
    }

    /// 已完成的栅栏值
    pub fn completed_fence(&self) -> FenceValue {
        self.fences.completed_value()
    }

    /// 放弃 Context
    ///
    /// 此后所有操作都返回 `InvalidState(ContextInvalid)`，销毁时不再等待 GPU。
    pub fn abandon(&mut self) {
        if self.shared.abandoned.swap(true, Ordering::AcqRel) {
            return;
        }
        let dropped = self.queue.len();
        self.queue.clear();
        bridge_warn!(context = self.id(), dropped_recordings = dropped, "Context abandoned");
    }

    pub fn is_abandoned(&self) -> bool {
        self.shared.abandoned.load(Ordering::Acquire)
    }

    pub fn is_device_lost(&self) -> bool {
        self.shared.driver.is_device_lost()
    }

    /// 最近一次失败的原因
    pub fn last_error(&self) -> Option<&BridgeError> {
        self.last_error.as_ref()
    }

    /// 读回 Surface 的像素，失败原因见 `last_error`
    pub fn read_pixels(&mut self, surface: &Surface, dst: &mut [u8], row_bytes: usize) -> bool {
        match self.try_read_pixels(surface, dst, row_bytes) {
            Ok(()) => true,
            Err(err) => {
                self.report(err);
                false
            }
        }
    }

    /// 等待所有已提交的工作完成后读回 Surface 的像素
    pub fn try_read_pixels(&mut self, surface: &Surface, dst: &mut [u8], row_bytes: usize) -> Result<()> {
        self.ensure_usable()?;
        if surface.context_id() != self.id() {
            return Err(StateError::ForeignSurface {
                expected: self.id(),
                found: surface.context_id(),
            }
            .into());
        }
        self.wait_for_all()?;

        let target = surface.target();
        self.shared
            .driver
            .read_pixels(target.backend_texture(), target.image_info(), dst, row_bytes)
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.shared.is_usable() {
            Ok(())
        } else {
            Err(StateError::ContextInvalid.into())
        }
    }

    fn report(&mut self, err: BridgeError) {
        bridge_warn!(context = self.id(), error = %err, "Context operation failed");
        self.last_error = Some(err);
    }

    /// 阻塞到最近一次提交完成
    fn wait_for_all(&mut self) -> Result<()> {
        let target = self.fences.current_value();
        if !self.fences.is_completed(target) {
            self.shared.driver.wait_for(target)?;
            self.fences.update_completed_value(target);
        }
        self.release_completed();
        Ok(())
    }

    /// 查询设备并释放已完成的提交
    fn reap(&mut self) -> Result<()> {
        if !self.in_flight.is_empty() {
            let completed = self.shared.driver.poll()?;
            self.fences.update_completed_value(completed);
        }
        self.release_completed();
        Ok(())
    }

    fn release_completed(&mut self) {
        while let Some(submission) = self.in_flight.front() {
            if !self.fences.is_completed(submission.fence) {
                break;
            }
            let Some(mut submission) = self.in_flight.pop_front() else {
                break;
            };
            for recording in &mut submission.recordings {
                recording.set_state(RecordingState::Consumed);
            }
            bridge_debug!(
                context = self.shared.id,
                fence = submission.fence.value(),
                "Submission completed"
            );
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !self.in_flight.is_empty() && !self.is_abandoned() {
            if let Err(err) = self.wait_for_all() {
                bridge_error!(context = self.id(), error = %err, "Outstanding work failed during teardown");
            }
        }
        self.queue.clear();
        self.in_flight.clear();
        bridge_info!(context = self.id(), "Context destroyed");
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.shared.id)
            .field("backend", &self.shared.api)
            .field("pending", &self.queue.len())
            .field("in_flight", &self.in_flight.len())
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::gfx::headless::{HeadlessBackendContext, HeadlessDevice};
    use crate::gpu::surface;
    use crate::gpu::types::{Color4f, ColorType, IRect, ImageInfo};

    fn headless(device: &HeadlessDevice, options: Option<&ContextOptions>) -> Context {
        let backend = BackendContext::from(HeadlessBackendContext::new(device.clone()));
        Context::make(&backend, options).unwrap()
    }

    #[test]
    fn test_make_dispatches_on_backend_tag() {
        let device = HeadlessDevice::new("dispatch");
        let context = headless(&device, None);
        assert_eq!(context.backend(), BackendApi::Headless);
        assert_eq!(context.options().max_pending_recordings, 64);
    }

    #[test]
    fn test_make_fails_for_lost_device() {
        let device = HeadlessDevice::new("lost");
        device.mark_lost();
        let backend = BackendContext::from(HeadlessBackendContext::new(device));
        let err = Context::make(&backend, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstructionFailure);
    }

    unsafe extern "system" fn null_proc_addr(
        _instance: ash::vk::Instance,
        _name: *const std::os::raw::c_char,
    ) -> ash::vk::PFN_vkVoidFunction {
        None
    }

    #[test]
    fn test_make_fails_for_vulkan_without_handles() {
        use ash::vk;
        let backend = BackendContext::Vulkan(crate::gfx::vulkan::VulkanBackendContext {
            instance: vk::Instance::null(),
            physical_device: vk::PhysicalDevice::null(),
            device: vk::Device::null(),
            queue: vk::Queue::null(),
            graphics_queue_index: 0,
            get_instance_proc_addr: null_proc_addr,
        });
        let err = Context::make(&backend, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstructionFailure);
    }

    #[test]
    fn test_snap_twice_yields_second_empty_recording() {
        let device = HeadlessDevice::new("double-snap");
        let context = headless(&device, None);
        let mut recorder = context.make_recorder(None).unwrap();
        let mut surface =
            surface::make(&mut recorder, &ImageInfo::new_n32_premul((4, 4), None), None, None).unwrap();
        surface.canvas().clear(Color4f::RED).unwrap();

        let first = recorder.snap().unwrap();
        let second = recorder.snap().unwrap();
        assert_eq!(first.command_count(), 1);
        assert!(second.is_empty());
        assert_eq!(second.sequence(), first.sequence() + 1);
        assert_eq!(second.state(), RecordingState::Snapped);
    }

    #[test]
    fn test_foreign_recording_is_rejected() {
        let device = HeadlessDevice::new("foreign");
        let mut a = headless(&device, None);
        let b = headless(&device, None);
        let mut recorder = b.make_recorder(None).unwrap();
        let recording = recorder.snap().unwrap();

        assert!(!a.insert_recording(recording));
        assert!(matches!(
            a.last_error(),
            Some(BridgeError::InvalidState(StateError::ForeignRecording { .. }))
        ));
    }

    #[test]
    fn test_queue_capacity() {
        let device = HeadlessDevice::new("capacity");
        let options = ContextOptions {
            max_pending_recordings: 1,
            ..ContextOptions::default()
        };
        let mut context = headless(&device, Some(&options));
        let mut recorder = context.make_recorder(None).unwrap();
        let mut surface =
            surface::make(&mut recorder, &ImageInfo::new_n32_premul((2, 2), None), None, None).unwrap();

        surface.canvas().clear(Color4f::RED).unwrap();
        let first = recorder.snap().unwrap();
        surface.canvas().clear(Color4f::BLUE).unwrap();
        let second = recorder.snap().unwrap();

        assert!(context.insert_recording(first));
        assert!(!context.insert_recording(second));
        assert!(matches!(
            context.last_error(),
            Some(BridgeError::InvalidState(StateError::QueueFull(1)))
        ));
        assert_eq!(context.pending_recordings(), 1);
    }

    #[test]
    fn test_ordered_mode_rejects_out_of_order() {
        let device = HeadlessDevice::new("ordered");
        let options = ContextOptions {
            require_ordered_recordings: true,
            ..ContextOptions::default()
        };
        let mut context = headless(&device, Some(&options));
        let mut recorder = context.make_recorder(None).unwrap();

        let first = recorder.snap().unwrap();
        let second = recorder.snap().unwrap();
        assert!(context.insert_recording(second));
        assert!(!context.insert_recording(first));
        assert!(matches!(
            context.last_error(),
            Some(BridgeError::InvalidState(StateError::OutOfOrder { expected: 2, found: 0 }))
        ));
    }

    #[test]
    fn test_async_submit_completes_on_poll() {
        let device = HeadlessDevice::new("async");
        let mut context = headless(&device, None);
        let mut recorder = context.make_recorder(None).unwrap();
        let image = device.create_image((2, 2), ColorType::Rgba8888).unwrap();
        let mut surface = surface::wrap_backend_texture(
            &mut recorder,
            &image.backend_texture(),
            ColorType::Rgba8888,
            None,
            None,
        )
        .unwrap();

        surface.canvas().clear(Color4f::GREEN).unwrap();
        assert!(context.insert_recording(recorder.snap().unwrap()));
        assert!(context.submit(None));
        assert!(context.has_unfinished_work());
        assert_eq!(image.pixel(0, 0), Some(vec![0, 0, 0, 0]));

        context.check_async_work_completion();
        assert!(!context.has_unfinished_work());
        assert_eq!(image.pixel(0, 0), Some(vec![0, 255, 0, 255]));
        assert_eq!(context.completed_fence(), context.submitted_fence());
    }

    #[test]
    fn test_abandon_invalidates_context_and_recorders() {
        let device = HeadlessDevice::new("abandon");
        let mut context = headless(&device, None);
        let mut recorder = context.make_recorder(None).unwrap();

        context.abandon();
        assert!(context.is_abandoned());
        assert!(!recorder.is_valid());
        assert!(matches!(
            recorder.snap(),
            Err(BridgeError::InvalidState(StateError::ContextInvalid))
        ));
        assert!(context.make_recorder(None).is_err());
        assert!(!context.submit(Some(SyncToCpu::Yes)));
    }

    #[test]
    fn test_recorder_outliving_context_is_checked() {
        let device = HeadlessDevice::new("outlive");
        let context = headless(&device, None);
        let mut recorder = context.make_recorder(None).unwrap();
        drop(context);

        assert!(!recorder.is_valid());
        assert_eq!(recorder.backend(), None);
        assert!(recorder.snap().is_err());
    }

    #[test]
    fn test_released_wrapped_memory_reports_device_error() {
        let device = HeadlessDevice::new("released");
        let mut context = headless(&device, None);
        let mut recorder = context.make_recorder(None).unwrap();
        let image = device.create_image((2, 2), ColorType::Rgba8888).unwrap();
        let mut surface = surface::wrap_backend_texture(
            &mut recorder,
            &image.backend_texture(),
            ColorType::Rgba8888,
            None,
            None,
        )
        .unwrap();

        surface.canvas().clear(Color4f::WHITE).unwrap();
        assert!(context.insert_recording(recorder.snap().unwrap()));
        drop(image);

        assert!(!context.submit(Some(SyncToCpu::Yes)));
        assert_eq!(context.last_error().map(|e| e.kind()), Some(ErrorKind::Device));
    }

    #[test]
    fn test_read_pixels_rejects_foreign_surface() {
        let device = HeadlessDevice::new("foreign-read");
        let mut a = headless(&device, None);
        let b = headless(&device, None);
        let mut recorder = b.make_recorder(None).unwrap();
        let surface =
            surface::make(&mut recorder, &ImageInfo::new_n32_premul((1, 1), None), None, None).unwrap();

        let mut dst = [0u8; 4];
        assert!(!a.read_pixels(&surface, &mut dst, 4));
        assert!(matches!(
            a.last_error(),
            Some(BridgeError::InvalidState(StateError::ForeignSurface { .. }))
        ));
    }

    #[test]
    fn test_end_to_end_releases_every_object() {
        let tracker = ResourceTracker::new();
        let device = HeadlessDevice::new("e2e");
        let options = ContextOptions::default().with_tracker(Arc::clone(&tracker));

        {
            let mut context = headless(&device, Some(&options));
            let mut recorder = context.make_recorder(None).unwrap();
            let info = ImageInfo::new_n32_premul((4, 4), None);
            let mut surface = surface::make(&mut recorder, &info, None, None).unwrap();

            let mut canvas = surface.canvas();
            canvas.clear(Color4f::RED).unwrap();
            canvas.draw_rect(IRect::from_xywh(1, 1, 2, 2), Color4f::BLUE).unwrap();

            let recording = recorder.snap().unwrap();
            assert_eq!(tracker.live(ResourceKind::Recording), 1);
            assert!(context.insert_recording(recording));
            assert!(context.submit(Some(SyncToCpu::Yes)));
            assert!(!context.has_unfinished_work());
            assert_eq!(tracker.live(ResourceKind::Recording), 0);

            let mut pixels = vec![0u8; 4 * 4 * 4];
            assert!(context.read_pixels(&surface, &mut pixels, 16));
            assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
            assert_eq!(&pixels[20..24], &[0, 0, 255, 255]);

            assert_eq!(tracker.live(ResourceKind::Context), 1);
            assert_eq!(tracker.live(ResourceKind::Recorder), 1);
            assert_eq!(tracker.live(ResourceKind::Surface), 1);
            assert_eq!(tracker.live(ResourceKind::RenderTarget), 1);
            drop(surface);
            drop(recorder);
        }

        assert!(tracker.all_released(), "leaked objects: {:?}", tracker);
        assert_eq!(tracker.created(ResourceKind::Context), 1);
    }

    #[test]
    fn test_surface_dropped_before_completion_stays_alive() {
        let tracker = ResourceTracker::new();
        let device = HeadlessDevice::new("keep-alive");
        let options = ContextOptions::default().with_tracker(Arc::clone(&tracker));
        let mut context = headless(&device, Some(&options));
        let mut recorder = context.make_recorder(None).unwrap();
        let mut surface =
            surface::make(&mut recorder, &ImageInfo::new_n32_premul((2, 2), None), None, None).unwrap();

        surface.canvas().clear(Color4f::BLACK).unwrap();
        assert!(context.insert_recording(recorder.snap().unwrap()));
        assert!(context.submit(None));
        drop(surface);

        // 飞行中的提交仍持有渲染目标
        assert_eq!(tracker.live(ResourceKind::RenderTarget), 1);
        context.check_async_work_completion();
        assert_eq!(tracker.live(ResourceKind::RenderTarget), 0);
        assert!(context.last_error().is_none());
    }

    /// 第 `fail_on` 次提交失败，`poll` 只报告 `wait_for` 推进过的栅栏
    struct FlakyDriver {
        fail_on: u32,
        submits: parking_lot::Mutex<u32>,
        completed: parking_lot::Mutex<FenceValue>,
        waited: parking_lot::Mutex<Vec<u64>>,
    }

    impl FlakyDriver {
        fn new(fail_on: u32) -> Self {
            Self {
                fail_on,
                submits: parking_lot::Mutex::new(0),
                completed: parking_lot::Mutex::new(FenceValue::ZERO),
                waited: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    impl DeviceDriver for FlakyDriver {
        fn api(&self) -> BackendApi {
            BackendApi::Headless
        }

        fn device_name(&self) -> String {
            "flaky".into()
        }

        fn is_device_lost(&self) -> bool {
            false
        }

        fn create_render_target(
            &self,
            _info: &ImageInfo,
            _mipmapped: crate::gpu::types::Mipmapped,
        ) -> Result<crate::gpu::BackendTexture> {
            Err(BridgeError::Unsupported("flaky driver has no memory".into()))
        }

        fn destroy_render_target(&self, _texture: &crate::gpu::BackendTexture) {}

        fn submit(&self, _passes: &[&RecordedPass], _fence: FenceValue) -> Result<()> {
            let mut submits = self.submits.lock();
            *submits += 1;
            if *submits == self.fail_on {
                Err(BridgeError::device("validation error after queue submission"))
            } else {
                Ok(())
            }
        }

        fn wait_for(&self, fence: FenceValue) -> Result<()> {
            self.waited.lock().push(fence.value());
            let mut completed = self.completed.lock();
            *completed = (*completed).max(fence);
            Ok(())
        }

        fn poll(&self) -> Result<FenceValue> {
            Ok(*self.completed.lock())
        }
    }

    #[test]
    fn test_failed_submit_keeps_earlier_work_in_flight() {
        let tracker = ResourceTracker::new();
        let driver = Arc::new(FlakyDriver::new(2));
        let options = ContextOptions::default().with_tracker(Arc::clone(&tracker));
        let mut context = Context::with_driver(driver.clone(), options);
        let mut recorder = context.make_recorder(None).unwrap();

        let device = HeadlessDevice::new("flaky-images");
        let image = device.create_image((2, 2), ColorType::Rgba8888).unwrap();
        let mut surface = surface::wrap_backend_texture(
            &mut recorder,
            &image.backend_texture(),
            ColorType::Rgba8888,
            None,
            None,
        )
        .unwrap();

        surface.canvas().clear(Color4f::RED).unwrap();
        assert!(context.insert_recording(recorder.snap().unwrap()));
        assert!(context.submit(None));

        surface.canvas().clear(Color4f::BLUE).unwrap();
        assert!(context.insert_recording(recorder.snap().unwrap()));
        assert!(!context.submit(None));
        assert_eq!(context.last_error().map(|e| e.kind()), Some(ErrorKind::Device));
        drop(surface);

        // 设备尚未报告任何栅栏，两个批次都仍持有渲染目标
        context.check_async_work_completion();
        assert!(context.has_unfinished_work());
        assert_eq!(context.completed_fence(), FenceValue::ZERO);
        assert_eq!(tracker.live(ResourceKind::RenderTarget), 1);

        assert!(context.submit(Some(SyncToCpu::Yes)));
        assert_eq!(*driver.waited.lock(), vec![2]);
        assert!(!context.has_unfinished_work());
        assert_eq!(tracker.live(ResourceKind::RenderTarget), 0);
    }

    #[test]
    fn test_unordered_mode_does_not_track_sequences() {
        let device = HeadlessDevice::new("unordered");
        let mut context = headless(&device, None);
        let mut recorder = context.make_recorder(None).unwrap();

        let first = recorder.snap().unwrap();
        let second = recorder.snap().unwrap();
        assert!(context.insert_recording(second));
        assert_eq!(first.cursor().last_inserted(), None);
        assert!(context.insert_recording(first));
    }

    #[test]
    fn test_ordering_survives_recorder_drop() {
        let device = HeadlessDevice::new("ordered-drop");
        let options = ContextOptions {
            require_ordered_recordings: true,
            ..ContextOptions::default()
        };
        let mut context = headless(&device, Some(&options));
        let mut recorder = context.make_recorder(None).unwrap();

        let first = recorder.snap().unwrap();
        let second = recorder.snap().unwrap();
        drop(recorder);

        assert!(context.insert_recording(second));
        assert!(!context.insert_recording(first));
        assert!(matches!(
            context.last_error(),
            Some(BridgeError::InvalidState(StateError::OutOfOrder { expected: 2, found: 0 }))
        ));
    }

    #[test]
    fn test_read_pixels_rejects_overflowing_stride() {
        let device = HeadlessDevice::new("huge-stride");
        let mut context = headless(&device, None);
        let mut recorder = context.make_recorder(None).unwrap();
        let surface =
            surface::make(&mut recorder, &ImageInfo::new_n32_premul((2, 2), None), None, None).unwrap();

        let mut dst = [0u8; 16];
        assert!(!context.read_pixels(&surface, &mut dst, usize::MAX));
        assert_eq!(context.last_error().map(|e| e.kind()), Some(ErrorKind::InvalidDescriptor));
    }
}


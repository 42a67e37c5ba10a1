//! Surface
//!
//! Surface 是绑定到某个 Recorder 的渲染目标。绘制调用通过 `Canvas` 追加到
//! Recorder 的命令缓冲，直到 `snap` 时整体移交给 Recording。
//!
//! 渲染目标有两种来源：
//!
//! - `make`：由设备驱动分配，计入 Recorder 的 GPU 预算，最后一个引用释放时销毁
//! - `wrap_backend_texture`：包装调用者的纹理，绑定层从不释放这块内存
//!
//! 已提交但尚未完成的工作持有渲染目标的引用，因此在 GPU 完成前销毁 Surface 是安全的。

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use super::backend_texture::BackendTexture;
use super::command::{next_object_id, CommandSink, DrawCommand, RenderTarget};
use super::direct_context::DirectContext;
use super::recorder::Recorder;
use super::tracker::{ResourceKind, ResourceToken};
use super::types::{AlphaType, Color4f, ColorSpace, ColorType, IRect, ISize, ImageInfo, Mipmapped, SurfaceProps};
use crate::core::error::{BridgeError, Result, StateError};
use crate::{bridge_debug, bridge_warn};

/// 渲染表面
pub struct Surface {
    id: u64,
    target: Arc<RenderTarget>,
    sink: Weak<RefCell<CommandSink>>,
    props: SurfaceProps,
    context_id: u64,
    _token: ResourceToken,
}

impl Surface {
    fn new(recorder: &Recorder, context_id: u64, target: RenderTarget, props: Option<&SurfaceProps>) -> Self {
        Self {
            id: next_object_id(),
            target: Arc::new(target),
            sink: Rc::downgrade(recorder.sink()),
            props: props.copied().unwrap_or_default(),
            context_id,
            _token: ResourceToken::new(recorder.tracker(), ResourceKind::Surface),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> i32 {
        self.target.dimensions().width
    }

    pub fn height(&self) -> i32 {
        self.target.dimensions().height
    }

    pub fn dimensions(&self) -> ISize {
        self.target.dimensions()
    }

    pub fn image_info(&self) -> &ImageInfo {
        self.target.image_info()
    }

    pub fn props(&self) -> &SurfaceProps {
        &self.props
    }

    /// 渲染目标的纹理描述（副本）
    pub fn backend_texture(&self) -> BackendTexture {
        self.target.backend_texture().clone()
    }

    /// 是否包装的是调用者的纹理
    pub fn is_wrapped(&self) -> bool {
        self.target.is_wrapped()
    }

    pub fn context_id(&self) -> u64 {
        self.context_id
    }

    pub fn canvas(&mut self) -> Canvas<'_> {
        Canvas { surface: self }
    }

    pub(crate) fn target(&self) -> &RenderTarget {
        &self.target
    }

    fn record(&self, command: DrawCommand) -> Result<()> {
        let Some(sink) = self.sink.upgrade() else {
            bridge_warn!(surface = self.id, "Draw on a surface whose recorder was dropped");
            return Err(BridgeError::InvalidState(StateError::ContextInvalid));
        };
        sink.borrow_mut().record(&self.target, command);
        Ok(())
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.id)
            .field("context_id", &self.context_id)
            .field("target", &self.target)
            .finish()
    }
}

/// 绘制接口
///
/// 只录制命令，真正的光栅化在设备执行 Recording 时发生。
pub struct Canvas<'a> {
    surface: &'a mut Surface,
}

impl Canvas<'_> {
    /// 清空整个表面
    pub fn clear(&mut self, color: Color4f) -> Result<()> {
        self.surface.record(DrawCommand::Clear(color))
    }

    /// 填充矩形，超出表面的部分被裁掉，完全落在表面外时不录制任何命令
    pub fn draw_rect(&mut self, rect: IRect, color: Color4f) -> Result<()> {
        match rect.clip_to(self.surface.dimensions()) {
            Some(rect) => self.surface.record(DrawCommand::FillRect { rect, color }),
            None => Ok(()),
        }
    }
}

/// 分配一个新的渲染目标并创建 Surface
///
/// 失败时不占用任何预算，也不留下任何设备分配。
pub fn make(
    recorder: &mut Recorder,
    image_info: &ImageInfo,
    mipmapped: Option<Mipmapped>,
    props: Option<&SurfaceProps>,
) -> Result<Surface> {
    let shared = recorder.shared()?;
    image_info.validate()?;

    let mipmapped = mipmapped.unwrap_or_default();
    let bytes = image_info.gpu_byte_size(mipmapped);
    recorder.budget().try_reserve(bytes)?;

    let texture = match shared.driver.create_render_target(image_info, mipmapped) {
        Ok(texture) => texture,
        Err(err) => {
            recorder.budget().release(bytes);
            bridge_warn!(recorder = recorder.id(), error = %err, "Render target allocation failed");
            return Err(err);
        }
    };

    let target = RenderTarget::owned(
        texture,
        *image_info,
        Arc::clone(&shared.driver),
        Arc::clone(recorder.budget()),
        bytes,
        recorder.tracker(),
    );
    let surface = Surface::new(recorder, shared.id, target, props);
    bridge_debug!(
        surface = surface.id,
        recorder = recorder.id(),
        width = image_info.width(),
        height = image_info.height(),
        color_type = ?image_info.color_type(),
        bytes,
        "Surface made"
    );
    Ok(surface)
}

/// 把调用者的纹理包装为 Surface
///
/// 纹理无效、属于其他后端或格式与 `color_type` 不符时返回 `InvalidDescriptor`。
/// 包装不复制也不接管纹理内存。
pub fn wrap_backend_texture(
    recorder: &mut Recorder,
    texture: &BackendTexture,
    color_type: ColorType,
    color_space: Option<ColorSpace>,
    props: Option<&SurfaceProps>,
) -> Result<Surface> {
    let shared = recorder.shared()?;
    if let Err(err) = shared.driver.validate_wrap(texture, color_type) {
        bridge_warn!(recorder = recorder.id(), error = %err, "Backend texture rejected");
        return Err(err);
    }

    let image_info = ImageInfo::new(texture.dimensions(), color_type, AlphaType::Premul, color_space);
    image_info.validate()?;

    let target = RenderTarget::wrapped(texture.clone(), image_info, recorder.tracker())
        .with_release_notice(Arc::clone(&shared.driver));
    let surface = Surface::new(recorder, shared.id, target, props);
    bridge_debug!(
        surface = surface.id,
        recorder = recorder.id(),
        width = image_info.width(),
        height = image_info.height(),
        "Backend texture wrapped"
    );
    Ok(surface)
}

/// 立即模式：在 DirectContext 上分配渲染目标
pub fn render_target(
    context: &mut DirectContext,
    image_info: &ImageInfo,
    mipmapped: Option<Mipmapped>,
    props: Option<&SurfaceProps>,
) -> Result<Surface> {
    make(context.recorder_mut(), image_info, mipmapped, props)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{ConstructionError, DescriptorError};
    use crate::gfx::headless::{HeadlessBackendContext, HeadlessDevice};
    use crate::gpu::backend_context::BackendContext;
    use crate::gpu::context::Context;
    use crate::gpu::options::RecorderOptions;

    fn headless_context(device: &HeadlessDevice) -> Context {
        let backend = BackendContext::from(HeadlessBackendContext::new(device.clone()));
        Context::make(&backend, None).unwrap()
    }

    #[test]
    fn test_make_counts_against_budget() {
        let device = HeadlessDevice::new("budget");
        let context = headless_context(&device);
        let options = RecorderOptions {
            gpu_budget_bytes: Some(100),
            ..RecorderOptions::default()
        };
        let mut recorder = context.make_recorder(Some(&options)).unwrap();

        // 4x4 RGBA = 64 字节
        let info = ImageInfo::new_n32_premul((4, 4), None);
        let surface = make(&mut recorder, &info, None, None).unwrap();
        assert_eq!(recorder.gpu_budget_used(), 64);

        let err = make(&mut recorder, &info, None, None).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Construction(ConstructionError::BudgetExceeded { requested: 64, available: 36 })
        ));
        assert_eq!(recorder.gpu_budget_used(), 64);

        drop(surface);
        assert_eq!(recorder.gpu_budget_used(), 0);
    }

    #[test]
    fn test_make_rejects_invalid_image_info() {
        let device = HeadlessDevice::new("bad-info");
        let context = headless_context(&device);
        let mut recorder = context.make_recorder(None).unwrap();

        let info = ImageInfo::new_n32_premul((0, 4), None);
        let err = make(&mut recorder, &info, None, None).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidDescriptor(DescriptorError::InvalidImageInfo(_))));
        assert_eq!(recorder.gpu_budget_used(), 0);
    }

    #[test]
    fn test_wrap_invalid_texture_fails() {
        let device = HeadlessDevice::new("wrap-invalid");
        let context = headless_context(&device);
        let mut recorder = context.make_recorder(None).unwrap();

        let err = wrap_backend_texture(&mut recorder, &BackendTexture::default(), ColorType::Rgba8888, None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::InvalidDescriptor(DescriptorError::InvalidBackendTexture(_))
        ));
    }

    #[test]
    fn test_wrap_does_not_take_ownership() {
        let device = HeadlessDevice::new("wrap-owned");
        let context = headless_context(&device);
        let mut recorder = context.make_recorder(None).unwrap();

        let image = device.create_image((8, 8), ColorType::Bgra8888).unwrap();
        let texture = image.backend_texture();
        let surface = wrap_backend_texture(&mut recorder, &texture, ColorType::Bgra8888, None, None).unwrap();
        assert!(surface.is_wrapped());
        assert_eq!(surface.dimensions(), ISize::new(8, 8));
        assert_eq!(recorder.gpu_budget_used(), 0);

        drop(surface);
        assert!(texture.is_valid());
    }

    #[test]
    fn test_canvas_clips_and_skips_empty_rects() {
        let device = HeadlessDevice::new("canvas");
        let context = headless_context(&device);
        let mut recorder = context.make_recorder(None).unwrap();
        let info = ImageInfo::new_n32_premul((4, 4), None);
        let mut surface = make(&mut recorder, &info, None, None).unwrap();

        let mut canvas = surface.canvas();
        canvas.draw_rect(IRect::from_xywh(10, 10, 2, 2), Color4f::RED).unwrap();
        assert!(!recorder.has_pending_work());

        let mut canvas = surface.canvas();
        canvas.draw_rect(IRect::from_xywh(-1, -1, 3, 3), Color4f::RED).unwrap();
        assert!(recorder.has_pending_work());

        let recording = recorder.snap().unwrap();
        assert_eq!(recording.command_count(), 1);
        assert_eq!(
            recording.passes()[0].commands(),
            &[DrawCommand::FillRect { rect: IRect::from_ltrb(0, 0, 2, 2), color: Color4f::RED }]
        );
    }

    #[test]
    fn test_draw_after_recorder_dropped_fails() {
        let device = HeadlessDevice::new("orphan");
        let context = headless_context(&device);
        let mut recorder = context.make_recorder(None).unwrap();
        let mut surface = make(&mut recorder, &ImageInfo::new_n32_premul((2, 2), None), None, None).unwrap();

        drop(recorder);
        assert!(matches!(
            surface.canvas().clear(Color4f::BLACK),
            Err(BridgeError::InvalidState(StateError::ContextInvalid))
        ));
    }

    #[test]
    fn test_draw_rect_with_extreme_coordinates() {
        let device = HeadlessDevice::new("extreme-rect");
        let context = headless_context(&device);
        let mut recorder = context.make_recorder(None).unwrap();
        let mut surface =
            make(&mut recorder, &ImageInfo::new_n32_premul((4, 4), None), None, None).unwrap();

        let mut canvas = surface.canvas();
        canvas
            .draw_rect(IRect::from_ltrb(i32::MAX, 0, i32::MIN, 1), Color4f::RED)
            .unwrap();
        assert!(!recorder.has_pending_work());

        surface
            .canvas()
            .draw_rect(IRect::from_ltrb(i32::MIN, i32::MIN, i32::MAX, i32::MAX), Color4f::RED)
            .unwrap();
        assert_eq!(recorder.snap().unwrap().command_count(), 1);
    }
}


//! 设备驱动的统一抽象接口
//!
//! 本模块定义了所有原生后端（Headless、Vulkan、Dawn、Metal）必须实现的设备接口。
//! Context / Recorder / Surface 只通过这个 trait 与设备交互，
//! 从而与具体的图形 API 解耦。

use super::backend_context::BackendApi;
use super::backend_texture::BackendTexture;
use super::command::RecordedPass;
use super::sync::FenceValue;
use super::types::{ColorType, ImageInfo, Mipmapped};
use crate::core::error::{BridgeError, DescriptorError, Result};

/// 设备驱动接口
///
/// 驱动可能被多个 Context 引用、在 Surface 的 `Drop` 中被调用，
/// 因此必须是 `Send + Sync` 的，内部状态自行加锁。
///
/// # 栅栏语义
///
/// `submit` 传入的栅栏值严格递增。`poll` 返回已完成的最大栅栏值，
/// `wait_for` 阻塞到指定栅栏完成（或设备报告错误）为止。
///
/// `submit` 返回错误时，传入的栅栏仍须在此前接受的工作全部完成后按顺序到达，
/// 调用者据此决定何时释放该批次引用的资源。
pub trait DeviceDriver: Send + Sync {
    /// 后端标签
    fn api(&self) -> BackendApi;

    /// 设备名称，用于日志输出
    fn device_name(&self) -> String;

    /// 设备是否已丢失
    fn is_device_lost(&self) -> bool;

    /// 分配一个可渲染的纹理
    ///
    /// 返回的 `BackendTexture` 由驱动拥有，必须通过 `destroy_render_target` 释放。
    fn create_render_target(&self, info: &ImageInfo, mipmapped: Mipmapped) -> Result<BackendTexture>;

    /// 释放由 `create_render_target` 分配的纹理
    fn destroy_render_target(&self, texture: &BackendTexture);

    /// 包装的外部纹理不再被引用，丢弃驱动为它保存的状态
    fn forget_wrapped(&self, _texture: &BackendTexture) {}

    /// 检查外部纹理能否被包装为指定颜色类型的渲染目标
    fn validate_wrap(&self, texture: &BackendTexture, color_type: ColorType) -> Result<()> {
        check_wrappable(self.api(), texture, color_type)
    }

    /// 提交一批 pass，完成后栅栏到达 `fence`
    fn submit(&self, passes: &[&RecordedPass], fence: FenceValue) -> Result<()>;

    /// 阻塞等待 `fence` 完成
    fn wait_for(&self, fence: FenceValue) -> Result<()>;

    /// 非阻塞查询已完成的栅栏值
    fn poll(&self) -> Result<FenceValue>;

    /// 把纹理内容读回到 CPU
    ///
    /// 调用前 Context 已等待所有引用该纹理的工作完成。
    fn read_pixels(
        &self,
        _texture: &BackendTexture,
        _info: &ImageInfo,
        _dst: &mut [u8],
        _row_bytes: usize,
    ) -> Result<()> {
        Err(BridgeError::Unsupported(format!(
            "{} backend does not support pixel read-back",
            self.api().name()
        )))
    }
}

/// 所有后端共有的包装检查：纹理有效、属于 `api`、格式能按 `color_type` 解释
pub(crate) fn check_wrappable(api: BackendApi, texture: &BackendTexture, color_type: ColorType) -> Result<()> {
    if !texture.is_valid() {
        return Err(BridgeError::InvalidDescriptor(DescriptorError::InvalidBackendTexture(
            "backend texture is not valid".into(),
        )));
    }
    if let Some(found) = texture.backend() {
        if found != api {
            return Err(BridgeError::InvalidDescriptor(DescriptorError::BackendMismatch {
                expected: api,
                found,
            }));
        }
    }
    if !texture.info().is_compatible_with(color_type) {
        return Err(BridgeError::InvalidDescriptor(DescriptorError::ColorTypeMismatch(format!(
            "texture format cannot be interpreted as {:?}",
            color_type
        ))));
    }
    Ok(())
}

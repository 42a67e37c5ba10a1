//! Metal 设备驱动
//!
//! 每次提交使用一个命令缓冲：清除通过 `MTLLoadActionClear` 的渲染通道完成，
//! 矩形填充通过 blit 拷贝完成。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use foreign_types::ForeignType;
use metal::{MTLBlitOption, MTLClearColor, MTLCommandBufferStatus, MTLLoadAction, MTLOrigin, MTLPixelFormat,
    MTLResourceOptions, MTLSize, MTLStorageMode, MTLStoreAction, MTLTextureUsage};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::context::MtlBackendContext;
use super::texture::{pixel_format, MtlHandle, MtlTextureInfo};
use crate::core::error::{BridgeError, DescriptorError, Result};
use crate::gpu::backend_context::BackendApi;
use crate::gpu::backend_texture::{BackendTexture, BackendTextureHandle};
use crate::gpu::command::{DrawCommand, RecordedPass};
use crate::gpu::driver::{check_wrappable, DeviceDriver};
use crate::gpu::sync::FenceValue;
use crate::gpu::texture_info::{TextureInfo, TextureInfoData};
use crate::gpu::types::{ColorType, ImageInfo, Mipmapped};

#[derive(Default)]
struct MetalState {
    /// 驱动分配的纹理，按对象指针索引
    owned: HashMap<usize, metal::Texture>,
    in_flight: VecDeque<(FenceValue, metal::CommandBuffer)>,
    completed: FenceValue,
}

/// Metal 设备驱动
pub struct MetalDriver {
    ctx: MtlBackendContext,
    name: String,
    /// 命令缓冲报告错误后置位
    failed: AtomicBool,
    state: Mutex<MetalState>,
}

fn metal_pixel_format(color_type: ColorType) -> Option<MTLPixelFormat> {
    match color_type {
        ColorType::Rgba8888 => Some(MTLPixelFormat::RGBA8Unorm),
        ColorType::Bgra8888 => Some(MTLPixelFormat::BGRA8Unorm),
        ColorType::Alpha8 | ColorType::Gray8 => Some(MTLPixelFormat::R8Unorm),
        ColorType::Unknown => None,
    }
}

impl MetalDriver {
    pub fn new(ctx: &MtlBackendContext) -> Result<Self> {
        let name = ctx.device().name().to_string();
        info!(device = %name, "Metal driver created");
        Ok(Self {
            ctx: ctx.clone(),
            name,
            failed: AtomicBool::new(false),
            state: Mutex::new(MetalState::default()),
        })
    }

    fn texture_ref(texture: &BackendTexture) -> Result<&metal::TextureRef> {
        use foreign_types::ForeignTypeRef;
        match texture.handle() {
            BackendTextureHandle::Metal(handle) if !handle.is_null() => {
                Ok(unsafe { metal::TextureRef::from_ptr(handle.0 as *mut _) })
            }
            _ => Err(BridgeError::device("pass targets a non-Metal texture")),
        }
    }

    /// 把一批 pass 编码进命令缓冲
    fn encode(&self, command_buffer: &metal::CommandBufferRef, passes: &[&RecordedPass]) -> Result<()> {
        for pass in passes {
            let target = pass.target();
            let texture = Self::texture_ref(target.backend_texture())?;
            let color_type = target.image_info().color_type();

            for command in pass.commands() {
                match *command {
                    DrawCommand::Clear(color) => {
                        let [r, g, b, a] = color.clear_channels(color_type);
                        let desc = metal::RenderPassDescriptor::new();
                        let attachment = desc
                            .color_attachments()
                            .object_at(0)
                            .ok_or_else(|| BridgeError::device("render pass has no color attachment"))?;
                        attachment.set_texture(Some(texture));
                        attachment.set_load_action(MTLLoadAction::Clear);
                        attachment.set_store_action(MTLStoreAction::Store);
                        attachment.set_clear_color(MTLClearColor::new(r as f64, g as f64, b as f64, a as f64));
                        command_buffer.new_render_command_encoder(desc).end_encoding();
                    }
                    DrawCommand::FillRect { rect, color } => {
                        let pixel = color.to_pixel(color_type);
                        let row_bytes = rect.width() as usize * pixel.len();
                        let data = pixel.repeat(rect.width() as usize * rect.height() as usize);
                        let buffer = self.ctx.device().new_buffer_with_data(
                            data.as_ptr() as *const _,
                            data.len() as u64,
                            MTLResourceOptions::StorageModeShared,
                        );
                        let blit = command_buffer.new_blit_command_encoder();
                        blit.copy_from_buffer_to_texture(
                            &buffer,
                            0,
                            row_bytes as u64,
                            data.len() as u64,
                            MTLSize::new(rect.width() as u64, rect.height() as u64, 1),
                            texture,
                            0,
                            0,
                            MTLOrigin {
                                x: rect.left as u64,
                                y: rect.top as u64,
                                z: 0,
                            },
                            MTLBlitOption::empty(),
                        );
                        blit.end_encoding();
                    }
                }
            }
        }
        Ok(())
    }

    /// 回收已完成的命令缓冲
    fn reap(&self, state: &mut MetalState) -> Result<()> {
        while let Some((value, buffer)) = state.in_flight.front() {
            match buffer.status() {
                MTLCommandBufferStatus::Completed => {
                    state.completed = *value;
                    state.in_flight.pop_front();
                }
                MTLCommandBufferStatus::Error => {
                    let value = *value;
                    state.completed = value;
                    state.in_flight.pop_front();
                    self.failed.store(true, Ordering::Release);
                    error!(device = %self.name, fence = value.value(), "Metal command buffer failed");
                    return Err(BridgeError::device("Metal command buffer reported an error"));
                }
                _ => break,
            }
        }
        Ok(())
    }
}

impl DeviceDriver for MetalDriver {
    fn api(&self) -> BackendApi {
        BackendApi::Metal
    }

    fn device_name(&self) -> String {
        self.name.clone()
    }

    fn is_device_lost(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    fn create_render_target(&self, info: &ImageInfo, mipmapped: Mipmapped) -> Result<BackendTexture> {
        let format = metal_pixel_format(info.color_type()).ok_or_else(|| {
            BridgeError::InvalidDescriptor(DescriptorError::InvalidImageInfo(format!(
                "no Metal pixel format for {:?}",
                info.color_type()
            )))
        })?;
        let dims = info.dimensions();
        let levels = mipmapped.level_count(dims);

        let desc = metal::TextureDescriptor::new();
        desc.set_pixel_format(format);
        desc.set_width(dims.width as u64);
        desc.set_height(dims.height as u64);
        desc.set_mipmap_level_count(levels as u64);
        desc.set_usage(MTLTextureUsage::RenderTarget | MTLTextureUsage::ShaderRead);
        desc.set_storage_mode(MTLStorageMode::Private);
        let texture = self.ctx.device().new_texture(&desc);

        let handle = MtlHandle(texture.as_ptr() as *const _);
        let info_data = MtlTextureInfo {
            pixel_format: format as u64,
            usage: (MTLTextureUsage::RenderTarget | MTLTextureUsage::ShaderRead).bits(),
            storage_mode: MTLStorageMode::Private as u64,
            framebuffer_only: false,
        };
        self.state.lock().owned.insert(handle.0 as usize, texture);
        debug!(width = dims.width, height = dims.height, levels, "Metal render target allocated");

        Ok(BackendTexture::from_parts(
            dims,
            TextureInfo::new(1, mipmapped, TextureInfoData::Metal(info_data)),
            BackendTextureHandle::Metal(handle),
        ))
    }

    fn destroy_render_target(&self, texture: &BackendTexture) {
        if let BackendTextureHandle::Metal(handle) = texture.handle() {
            self.state.lock().owned.remove(&(handle.0 as usize));
        }
    }

    fn validate_wrap(&self, texture: &BackendTexture, color_type: ColorType) -> Result<()> {
        if let TextureInfoData::Metal(info) = texture.info().data() {
            if !info.is_renderable() {
                return Err(BridgeError::InvalidDescriptor(DescriptorError::InvalidTextureInfo(
                    "Metal texture must have render-target usage and not be framebuffer-only".into(),
                )));
            }
        }
        check_wrappable(BackendApi::Metal, texture, color_type)
    }

    fn submit(&self, passes: &[&RecordedPass], fence: FenceValue) -> Result<()> {
        if self.is_device_lost() {
            return Err(BridgeError::device("Metal device reported an unrecoverable error"));
        }
        let command_buffer = self.ctx.queue().new_command_buffer().to_owned();
        let encoded = self.encode(&command_buffer, passes);
        let command_buffer = match &encoded {
            Ok(()) => command_buffer,
            // 丢弃部分编码的命令，提交空缓冲让栅栏按顺序到达
            Err(_) => self.ctx.queue().new_command_buffer().to_owned(),
        };
        command_buffer.commit();
        self.state.lock().in_flight.push_back((fence, command_buffer));
        encoded?;
        debug!(fence = fence.value(), passes = passes.len(), "Metal batch committed");
        Ok(())
    }

    fn wait_for(&self, fence: FenceValue) -> Result<()> {
        let pending: Vec<metal::CommandBuffer> = self
            .state
            .lock()
            .in_flight
            .iter()
            .filter(|(value, _)| *value <= fence)
            .map(|(_, buffer)| buffer.clone())
            .collect();
        for buffer in &pending {
            buffer.wait_until_completed();
        }
        let mut state = self.state.lock();
        self.reap(&mut state)
    }

    fn poll(&self) -> Result<FenceValue> {
        let mut state = self.state.lock();
        self.reap(&mut state)?;
        Ok(state.completed)
    }
}

impl Drop for MetalDriver {
    fn drop(&mut self) {
        for (_, buffer) in self.state.get_mut().in_flight.drain(..) {
            buffer.wait_until_completed();
        }
        debug!(device = %self.name, "Metal driver destroyed");
    }
}

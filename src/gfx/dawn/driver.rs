//! WebGPU 设备驱动
//!
//! - 清除通过 `LoadOp::Clear` 的渲染通道完成
//! - 矩形填充通过暂存缓冲 `copy_buffer_to_texture` 完成，与清除保持命令顺序
//! - 完成情况由 `on_submitted_work_done` 回调推进，`device.poll` 驱动回调
//! - 验证错误通过 error scope 收集，作为设备错误返回

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};
use wgpu::util::DeviceExt;

use super::context::{format_for, DawnBackendContext};
use crate::core::error::{BridgeError, DescriptorError, Result};
use crate::gpu::backend_context::BackendApi;
use crate::gpu::backend_texture::{BackendTexture, BackendTextureHandle};
use crate::gpu::command::{DrawCommand, RecordedPass};
use crate::gpu::driver::{check_wrappable, DeviceDriver};
use crate::gpu::sync::FenceValue;
use crate::gpu::types::{ColorType, IRect, ImageInfo, Mipmapped};

const ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

fn padded_row_bytes(unpadded: u32) -> u32 {
    (unpadded + ROW_ALIGNMENT - 1) / ROW_ALIGNMENT * ROW_ALIGNMENT
}

/// WebGPU 设备驱动
pub struct DawnDriver {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    label: String,
    completed: Arc<AtomicU64>,
    submissions: Mutex<VecDeque<(FenceValue, wgpu::SubmissionIndex)>>,
    lost: AtomicBool,
}

impl DawnDriver {
    pub fn new(ctx: &DawnBackendContext) -> Result<Self> {
        info!(device = %ctx.label, "WebGPU driver created");
        Ok(Self {
            device: Arc::clone(&ctx.device),
            queue: Arc::clone(&ctx.queue),
            label: ctx.label.clone(),
            completed: Arc::new(AtomicU64::new(0)),
            submissions: Mutex::new(VecDeque::new()),
            lost: AtomicBool::new(false),
        })
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            Err(BridgeError::device("WebGPU device is out of memory"))
        } else {
            Ok(())
        }
    }

    /// 弹出 error scope，把捕获的错误转换为设备错误
    fn pop_errors(&self, what: &str) -> Result<()> {
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Ok(()),
            Some(err) => {
                if matches!(err, wgpu::Error::OutOfMemory { .. }) {
                    self.lost.store(true, Ordering::Release);
                }
                error!(device = %self.label, "WebGPU error during {}: {}", what, err);
                Err(BridgeError::device(format!("{} failed: {}", what, err)))
            }
        }
    }

    /// 队列中已提交的工作全部完成后把栅栏推进到 `fence`
    fn signal_when_done(&self, fence: FenceValue) {
        let completed = Arc::clone(&self.completed);
        let value = fence.value();
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(value, Ordering::AcqRel);
        });
    }

    fn texture_of(texture: &BackendTexture) -> Result<&Arc<wgpu::Texture>> {
        match texture.handle() {
            BackendTextureHandle::Dawn(texture) => Ok(texture),
            _ => Err(BridgeError::device("pass targets a non-WebGPU texture")),
        }
    }

    fn encode_fill(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        rect: IRect,
        pixel: &[u8],
    ) {
        let width = rect.width() as u32;
        let height = rect.height() as u32;
        let unpadded = width * pixel.len() as u32;
        let padded = padded_row_bytes(unpadded);

        let mut data = vec![0u8; (padded * height) as usize];
        for row in data.chunks_exact_mut(padded as usize) {
            for chunk in row[..unpadded as usize].chunks_exact_mut(pixel.len()) {
                chunk.copy_from_slice(pixel);
            }
        }
        let staging = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fill Rect Staging"),
            contents: &data,
            usage: wgpu::BufferUsages::COPY_SRC,
        });

        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &staging,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.left as u32,
                    y: rect.top as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl DeviceDriver for DawnDriver {
    fn api(&self) -> BackendApi {
        BackendApi::Dawn
    }

    fn device_name(&self) -> String {
        self.label.clone()
    }

    fn is_device_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn create_render_target(&self, info: &ImageInfo, mipmapped: Mipmapped) -> Result<BackendTexture> {
        self.ensure_alive()?;
        let format = format_for(info.color_type()).ok_or_else(|| {
            BridgeError::InvalidDescriptor(DescriptorError::InvalidImageInfo(format!(
                "no WebGPU format for {:?}",
                info.color_type()
            )))
        })?;
        let dims = info.dimensions();

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Render Target"),
            size: wgpu::Extent3d {
                width: dims.width as u32,
                height: dims.height as u32,
                depth_or_array_layers: 1,
            },
            mip_level_count: mipmapped.level_count(dims),
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let validation = self.pop_errors("texture creation");
        let memory = self.pop_errors("texture allocation");
        if let Err(e) = validation.and(memory) {
            texture.destroy();
            return Err(BridgeError::allocation(e.to_string()));
        }

        debug!(width = dims.width, height = dims.height, "WebGPU render target allocated");
        Ok(BackendTexture::new_dawn(Arc::new(texture)))
    }

    fn destroy_render_target(&self, texture: &BackendTexture) {
        if let BackendTextureHandle::Dawn(texture) = texture.handle() {
            texture.destroy();
        }
    }

    fn validate_wrap(&self, texture: &BackendTexture, color_type: ColorType) -> Result<()> {
        if let BackendTextureHandle::Dawn(raw) = texture.handle() {
            let required = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST;
            if !raw.usage().contains(required) {
                return Err(BridgeError::InvalidDescriptor(DescriptorError::InvalidTextureInfo(
                    "wrapped texture must allow RENDER_ATTACHMENT and COPY_DST usage".into(),
                )));
            }
        }
        check_wrappable(BackendApi::Dawn, texture, color_type)
    }

    fn submit(&self, passes: &[&RecordedPass], fence: FenceValue) -> Result<()> {
        self.ensure_alive()?;
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Recording Batch"),
        });
        for pass in passes {
            let target = pass.target();
            let texture = match Self::texture_of(target.backend_texture()) {
                Ok(texture) => texture,
                Err(e) => {
                    let _ = pollster::block_on(self.device.pop_error_scope());
                    self.signal_when_done(fence);
                    return Err(e);
                }
            };
            let color_type = target.image_info().color_type();
            let view = texture.create_view(&wgpu::TextureViewDescriptor {
                base_mip_level: 0,
                mip_level_count: Some(1),
                ..Default::default()
            });

            for command in pass.commands() {
                match *command {
                    DrawCommand::Clear(color) => {
                        let [r, g, b, a] = color.clear_channels(color_type);
                        let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: Some("Clear Pass"),
                            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                view: &view,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(wgpu::Color {
                                        r: r as f64,
                                        g: g as f64,
                                        b: b as f64,
                                        a: a as f64,
                                    }),
                                    store: wgpu::StoreOp::Store,
                                },
                            })],
                            depth_stencil_attachment: None,
                            timestamp_writes: None,
                            occlusion_query_set: None,
                        });
                    }
                    DrawCommand::FillRect { rect, color } => {
                        self.encode_fill(&mut encoder, texture, rect, &color.to_pixel(color_type));
                    }
                }
            }
        }

        let index = self.queue.submit(Some(encoder.finish()));
        self.signal_when_done(fence);
        self.submissions.lock().push_back((fence, index));
        self.pop_errors("submission")?;
        debug!(fence = fence.value(), passes = passes.len(), "WebGPU batch submitted");
        Ok(())
    }

    fn wait_for(&self, fence: FenceValue) -> Result<()> {
        self.ensure_alive()?;
        let index = {
            let submissions = self.submissions.lock();
            submissions
                .iter()
                .filter(|(value, _)| *value <= fence)
                .last()
                .map(|(_, index)| index.clone())
        };
        if let Some(index) = index {
            let _ = self.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        }
        self.poll().map(|_| ())
    }

    fn poll(&self) -> Result<FenceValue> {
        self.ensure_alive()?;
        let _ = self.device.poll(wgpu::Maintain::Poll);
        let completed = FenceValue::new(self.completed.load(Ordering::Acquire));
        self.submissions.lock().retain(|(value, _)| *value > completed);
        Ok(completed)
    }

    fn read_pixels(
        &self,
        texture: &BackendTexture,
        info: &ImageInfo,
        dst: &mut [u8],
        row_bytes: usize,
    ) -> Result<()> {
        let raw = Self::texture_of(texture)?;
        let dawn_info = match texture.info().data() {
            crate::gpu::texture_info::TextureInfoData::Dawn(info) => *info,
            _ => return Err(BridgeError::device("texture carries no WebGPU description")),
        };
        if !dawn_info.is_compatible_with(info.color_type()) {
            return Err(BridgeError::Unsupported(format!(
                "read-back of {:?} as {:?} is not supported",
                dawn_info.format,
                info.color_type()
            )));
        }
        let dims = texture.dimensions();
        let width = dims.width as u32;
        let height = dims.height as u32;
        let unpadded = width * info.bytes_per_pixel() as u32;
        ImageInfo::new(dims, info.color_type(), info.alpha_type(), info.color_space())
            .validate_read_destination(dst.len(), row_bytes)?;
        let padded = padded_row_bytes(unpadded);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Read-back Buffer"),
            size: (padded * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Read-back"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: raw,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let mapped = Arc::new(Mutex::new(None));
        let result = Arc::clone(&mapped);
        slice.map_async(wgpu::MapMode::Read, move |res| {
            *result.lock() = Some(res);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);

        match mapped.lock().take() {
            Some(Ok(())) => {}
            Some(Err(e)) => return Err(BridgeError::device(format!("buffer map failed: {}", e))),
            None => return Err(BridgeError::device("buffer map did not complete")),
        }
        {
            let data = slice.get_mapped_range();
            for (y, row) in data.chunks_exact(padded as usize).enumerate() {
                let start = y * row_bytes;
                dst[start..start + unpadded as usize].copy_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::command::{CommandSink, RenderTarget};
    use crate::gpu::types::Color4f;

    #[test]
    fn test_row_padding() {
        assert_eq!(padded_row_bytes(4), 256);
        assert_eq!(padded_row_bytes(256), 256);
        assert_eq!(padded_row_bytes(257), 512);
    }

    /// 没有可用适配器时跳过
    #[test]
    fn test_clear_fill_and_read_back() {
        let Ok(ctx) = DawnBackendContext::request_default(false, "dawn-test") else {
            return;
        };
        let driver = DawnDriver::new(&ctx).unwrap();
        let info = ImageInfo::new_n32_premul((4, 4), None);
        let texture = driver.create_render_target(&info, Mipmapped::No).unwrap();
        let target = Arc::new(RenderTarget::wrapped(texture.clone(), info, None));

        let mut sink = CommandSink::default();
        sink.record(&target, DrawCommand::Clear(Color4f::RED));
        sink.record(&target, DrawCommand::FillRect { rect: IRect::from_xywh(2, 2, 2, 2), color: Color4f::BLUE });
        let passes = sink.take();
        let refs: Vec<&RecordedPass> = passes.iter().collect();

        driver.submit(&refs, FenceValue::new(1)).unwrap();
        driver.wait_for(FenceValue::new(1)).unwrap();

        let mut pixels = vec![0u8; 4 * 4 * 4];
        driver.read_pixels(&texture, &info, &mut pixels, 16).unwrap();
        assert_eq!(&pixels[0..4], &[255, 0, 0, 255]);
        assert_eq!(&pixels[60..64], &[0, 0, 255, 255]);

        drop(passes);
        drop(target);
        driver.destroy_render_target(&texture);
    }
}

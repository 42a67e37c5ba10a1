//! Vulkan 设备驱动
//!
//! 基于 `ash` 直接调用 Vulkan：
//! - 函数表从调用者提供的 `vkGetInstanceProcAddr` 加载
//! - 渲染目标是绑定了独立设备内存的 `VkImage`
//! - 清除使用 `vkCmdClearColorImage`，矩形填充通过暂存缓冲拷贝完成
//! - 每次提交使用独立的命令缓冲和 `VkFence`

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use ash::vk;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::context::VulkanBackendContext;
use super::texture::{format_for, render_target_usage, VulkanAlloc, VulkanTextureInfo};
use crate::core::error::{BridgeError, DescriptorError, Result};
use crate::gpu::backend_context::BackendApi;
use crate::gpu::backend_texture::{BackendTexture, BackendTextureHandle};
use crate::gpu::command::{DrawCommand, RecordedPass};
use crate::gpu::driver::{check_wrappable, DeviceDriver};
use crate::gpu::sync::FenceValue;
use crate::gpu::types::{ColorType, ImageInfo, Mipmapped};

/// 一次已提交、尚未回收的工作
struct InFlight {
    value: FenceValue,
    fence: vk::Fence,
    command_buffer: vk::CommandBuffer,
    staging: Option<(vk::Buffer, vk::DeviceMemory)>,
}

struct VulkanState {
    command_pool: vk::CommandPool,
    /// 驱动分配的图像及其内存
    owned: HashMap<vk::Image, vk::DeviceMemory>,
    /// 驱动最后一次把图像转换到的布局
    layouts: HashMap<vk::Image, vk::ImageLayout>,
    in_flight: VecDeque<InFlight>,
    completed: FenceValue,
}

impl VulkanState {
    /// 丢弃包装图像的布局记录，驱动自己分配的图像不受影响
    fn forget_layout(&mut self, image: vk::Image) {
        if !self.owned.contains_key(&image) {
            self.layouts.remove(&image);
        }
    }
}

/// Vulkan 设备驱动
pub struct VulkanDriver {
    #[allow(dead_code)]
    instance: ash::Instance,
    device: ash::Device,
    queue: vk::Queue,
    queue_family_index: u32,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    device_name: String,
    lost: AtomicBool,
    state: Mutex<VulkanState>,
}

/// 在 `type_bits` 允许的内存类型中查找具备 `flags` 的一个
pub(crate) fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..properties.memory_type_count).find(|&i| {
        type_bits & (1 << i) != 0 && properties.memory_types[i as usize].property_flags.contains(flags)
    })
}

fn color_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// 需要转换到 `TRANSFER_DST_OPTIMAL` 时返回当前布局，并把新布局记入 `staged`
fn stage_transfer_dst(
    known: &HashMap<vk::Image, vk::ImageLayout>,
    staged: &mut HashMap<vk::Image, vk::ImageLayout>,
    image: vk::Image,
    initial: vk::ImageLayout,
) -> Option<vk::ImageLayout> {
    let current = staged
        .get(&image)
        .or_else(|| known.get(&image))
        .copied()
        .unwrap_or(initial);
    if current == vk::ImageLayout::TRANSFER_DST_OPTIMAL {
        return None;
    }
    staged.insert(image, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    Some(current)
}

fn align_to(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) / alignment * alignment
}

impl VulkanDriver {
    pub fn new(ctx: &VulkanBackendContext) -> Result<Self> {
        if !ctx.has_handles() {
            return Err(BridgeError::device_init(
                "Vulkan backend context is missing instance, device or queue handles",
            ));
        }

        let static_fn = vk::StaticFn {
            get_instance_proc_addr: ctx.get_instance_proc_addr,
        };
        let instance = unsafe { ash::Instance::load(&static_fn, ctx.instance) };
        let device = unsafe { ash::Device::load(instance.fp_v1_0(), ctx.device) };

        let properties = unsafe { instance.get_physical_device_properties(ctx.physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(ctx.physical_device) };
        let device_name = unsafe { std::ffi::CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let command_pool = unsafe {
            device.create_command_pool(
                &vk::CommandPoolCreateInfo::builder()
                    .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
                    .queue_family_index(ctx.graphics_queue_index)
                    .build(),
                None,
            )
        }
        .map_err(|e| BridgeError::device_init(format!("vkCreateCommandPool failed: {:?}", e)))?;

        info!(device = %device_name, queue_family = ctx.graphics_queue_index, "Vulkan driver created");

        Ok(Self {
            instance,
            device,
            queue: ctx.queue,
            queue_family_index: ctx.graphics_queue_index,
            memory_properties,
            device_name,
            lost: AtomicBool::new(false),
            state: Mutex::new(VulkanState {
                command_pool,
                owned: HashMap::new(),
                layouts: HashMap::new(),
                in_flight: VecDeque::new(),
                completed: FenceValue::ZERO,
            }),
        })
    }

    /// 把 Vulkan 错误转换为设备错误，设备丢失时记录状态
    fn device_error(&self, what: &str, result: vk::Result) -> BridgeError {
        if result == vk::Result::ERROR_DEVICE_LOST {
            self.lost.store(true, Ordering::Release);
            error!(device = %self.device_name, "Vulkan device lost during {}", what);
        }
        BridgeError::device(format!("{} failed: {:?}", what, result))
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.lost.load(Ordering::Acquire) {
            Err(BridgeError::device("Vulkan device is lost"))
        } else {
            Ok(())
        }
    }

    unsafe fn allocate_memory(
        &self,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        let type_index = find_memory_type(&self.memory_properties, requirements.memory_type_bits, flags)
            .ok_or_else(|| BridgeError::allocation(format!("no memory type with {:?}", flags)))?;
        self.device
            .allocate_memory(
                &vk::MemoryAllocateInfo::builder()
                    .allocation_size(requirements.size)
                    .memory_type_index(type_index)
                    .build(),
                None,
            )
            .map_err(|e| BridgeError::allocation(format!("vkAllocateMemory failed: {:?}", e)))
    }

    /// 创建并填充一个主机可见的暂存缓冲
    unsafe fn create_staging(&self, data: &[u8]) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let buffer = self
            .device
            .create_buffer(
                &vk::BufferCreateInfo::builder()
                    .size(data.len() as u64)
                    .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .build(),
                None,
            )
            .map_err(|e| BridgeError::allocation(format!("vkCreateBuffer failed: {:?}", e)))?;

        let requirements = self.device.get_buffer_memory_requirements(buffer);
        let memory = match self.allocate_memory(
            requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                self.device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        let upload = || -> std::result::Result<(), vk::Result> {
            self.device.bind_buffer_memory(buffer, memory, 0)?;
            let ptr = self
                .device
                .map_memory(memory, 0, data.len() as u64, vk::MemoryMapFlags::empty())?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), ptr as *mut u8, data.len());
            self.device.unmap_memory(memory);
            Ok(())
        };
        if let Err(e) = upload() {
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(memory, None);
            return Err(self.device_error("staging upload", e));
        }
        Ok((buffer, memory))
    }

    unsafe fn retire(&self, entry: InFlight, command_pool: vk::CommandPool) {
        self.device.destroy_fence(entry.fence, None);
        self.device.free_command_buffers(command_pool, &[entry.command_buffer]);
        if let Some((buffer, memory)) = entry.staging {
            self.device.destroy_buffer(buffer, None);
            self.device.free_memory(memory, None);
        }
    }

    /// 回收已完成的提交
    fn reap(&self, state: &mut VulkanState) -> Result<()> {
        while let Some(entry) = state.in_flight.front() {
            // 空栅栏标记一次失败的提交，此前的工作完成后即可回收
            let signaled = entry.fence == vk::Fence::null()
                || unsafe { self.device.get_fence_status(entry.fence) }
                    .map_err(|e| self.device_error("vkGetFenceStatus", e))?;
            if !signaled {
                break;
            }
            if let Some(entry) = state.in_flight.pop_front() {
                state.completed = entry.value;
                unsafe { self.retire(entry, state.command_pool) };
            }
        }
        Ok(())
    }

    /// 把一批 pass 录制进命令缓冲
    ///
    /// 布局转换写入 `staged`，提交成功后才并入 `known`。
    unsafe fn record(
        &self,
        known: &HashMap<vk::Image, vk::ImageLayout>,
        staged: &mut HashMap<vk::Image, vk::ImageLayout>,
        command_buffer: vk::CommandBuffer,
        passes: &[&RecordedPass],
        staging: Option<vk::Buffer>,
        offsets: &[u64],
    ) -> Result<()> {
        let mut offsets = offsets.iter();
        for pass in passes {
            let target = pass.target();
            let handle = match target.backend_texture().handle() {
                BackendTextureHandle::Vulkan(handle) => handle,
                _ => return Err(BridgeError::device("pass targets a non-Vulkan texture")),
            };
            let color_type = target.image_info().color_type();
            if let Some(old_layout) = stage_transfer_dst(known, staged, handle.image, handle.layout) {
                let barrier = vk::ImageMemoryBarrier::builder()
                    .src_access_mask(vk::AccessFlags::MEMORY_WRITE)
                    .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
                    .old_layout(old_layout)
                    .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(handle.image)
                    .subresource_range(color_range())
                    .build();
                self.device.cmd_pipeline_barrier(
                    command_buffer,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }

            for command in pass.commands() {
                match *command {
                    DrawCommand::Clear(color) => {
                        self.device.cmd_clear_color_image(
                            command_buffer,
                            handle.image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &vk::ClearColorValue {
                                float32: color.clear_channels(color_type),
                            },
                            &[color_range()],
                        );
                    }
                    DrawCommand::FillRect { rect, .. } => {
                        let (Some(buffer), Some(offset)) = (staging, offsets.next()) else {
                            return Err(BridgeError::device("missing staging data for rect fill"));
                        };
                        self.device.cmd_copy_buffer_to_image(
                            command_buffer,
                            buffer,
                            handle.image,
                            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                            &[vk::BufferImageCopy {
                                buffer_offset: *offset,
                                image_subresource: vk::ImageSubresourceLayers {
                                    aspect_mask: vk::ImageAspectFlags::COLOR,
                                    mip_level: 0,
                                    base_array_layer: 0,
                                    layer_count: 1,
                                },
                                image_offset: vk::Offset3D {
                                    x: rect.left,
                                    y: rect.top,
                                    z: 0,
                                },
                                image_extent: vk::Extent3D {
                                    width: rect.width() as u32,
                                    height: rect.height() as u32,
                                    depth: 1,
                                },
                                ..Default::default()
                            }],
                        );
                    }
                }
            }
        }
        Ok(())
    }
}

/// 为所有矩形填充生成暂存数据，返回数据与每个矩形的偏移
fn build_staging(passes: &[&RecordedPass]) -> (Vec<u8>, Vec<u64>) {
    let mut data = Vec::new();
    let mut offsets = Vec::new();
    for pass in passes {
        let color_type: ColorType = pass.target().image_info().color_type();
        for command in pass.commands() {
            if let DrawCommand::FillRect { rect, color } = command {
                let offset = align_to(data.len() as u64, 4);
                data.resize(offset as usize, 0);
                let pixel = color.to_pixel(color_type);
                let count = (rect.width().max(0) * rect.height().max(0)) as usize;
                for _ in 0..count {
                    data.extend_from_slice(&pixel);
                }
                offsets.push(offset);
            }
        }
    }
    (data, offsets)
}

impl DeviceDriver for VulkanDriver {
    fn api(&self) -> BackendApi {
        BackendApi::Vulkan
    }

    fn device_name(&self) -> String {
        self.device_name.clone()
    }

    fn is_device_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn create_render_target(&self, info: &ImageInfo, mipmapped: Mipmapped) -> Result<BackendTexture> {
        self.ensure_alive()?;
        let format = format_for(info.color_type()).ok_or_else(|| {
            BridgeError::InvalidDescriptor(DescriptorError::InvalidImageInfo(format!(
                "no Vulkan format for {:?}",
                info.color_type()
            )))
        })?;
        let dims = info.dimensions();
        let mip_levels = mipmapped.level_count(dims);

        unsafe {
            let image = self
                .device
                .create_image(
                    &vk::ImageCreateInfo::builder()
                        .image_type(vk::ImageType::TYPE_2D)
                        .format(format)
                        .extent(vk::Extent3D {
                            width: dims.width as u32,
                            height: dims.height as u32,
                            depth: 1,
                        })
                        .mip_levels(mip_levels)
                        .array_layers(1)
                        .samples(vk::SampleCountFlags::TYPE_1)
                        .tiling(vk::ImageTiling::OPTIMAL)
                        .usage(render_target_usage())
                        .sharing_mode(vk::SharingMode::EXCLUSIVE)
                        .initial_layout(vk::ImageLayout::UNDEFINED)
                        .build(),
                    None,
                )
                .map_err(|e| BridgeError::allocation(format!("vkCreateImage failed: {:?}", e)))?;

            let requirements = self.device.get_image_memory_requirements(image);
            let memory = match self.allocate_memory(requirements, vk::MemoryPropertyFlags::DEVICE_LOCAL) {
                Ok(memory) => memory,
                Err(e) => {
                    self.device.destroy_image(image, None);
                    return Err(e);
                }
            };
            if let Err(e) = self.device.bind_image_memory(image, memory, 0) {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
                return Err(BridgeError::allocation(format!("vkBindImageMemory failed: {:?}", e)));
            }

            let mut state = self.state.lock();
            state.owned.insert(image, memory);
            state.layouts.insert(image, vk::ImageLayout::UNDEFINED);
            debug!(width = dims.width, height = dims.height, mip_levels, "Vulkan render target allocated");

            Ok(BackendTexture::new_vulkan(
                dims,
                &VulkanTextureInfo::for_render_target(format, mipmapped),
                vk::ImageLayout::UNDEFINED,
                self.queue_family_index,
                image,
                VulkanAlloc {
                    memory,
                    offset: 0,
                    size: requirements.size,
                },
            ))
        }
    }

    fn destroy_render_target(&self, texture: &BackendTexture) {
        let BackendTextureHandle::Vulkan(handle) = texture.handle() else {
            return;
        };
        let mut state = self.state.lock();
        state.layouts.remove(&handle.image);
        if let Some(memory) = state.owned.remove(&handle.image) {
            unsafe {
                self.device.destroy_image(handle.image, None);
                self.device.free_memory(memory, None);
            }
        }
    }

    fn forget_wrapped(&self, texture: &BackendTexture) {
        if let BackendTextureHandle::Vulkan(handle) = texture.handle() {
            self.state.lock().forget_layout(handle.image);
        }
    }

    fn validate_wrap(&self, texture: &BackendTexture, color_type: ColorType) -> Result<()> {
        if let Some(info) = texture.info().vulkan_texture_info() {
            if info.is_ycbcr() {
                return Err(BridgeError::InvalidDescriptor(DescriptorError::InvalidTextureInfo(
                    "YCbCr textures cannot be used as render targets".into(),
                )));
            }
            if !info.image_usage_flags.contains(vk::ImageUsageFlags::TRANSFER_DST) {
                return Err(BridgeError::InvalidDescriptor(DescriptorError::InvalidTextureInfo(
                    "wrapped image must allow TRANSFER_DST usage".into(),
                )));
            }
        }
        check_wrappable(BackendApi::Vulkan, texture, color_type)
    }

    fn submit(&self, passes: &[&RecordedPass], fence: FenceValue) -> Result<()> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        self.reap(&mut state)?;

        let (data, offsets) = build_staging(passes);
        // 空句柄可以安全地销毁，因此失败时统一走 retire 清理
        let mut entry = InFlight {
            value: fence,
            fence: vk::Fence::null(),
            command_buffer: vk::CommandBuffer::null(),
            staging: None,
        };
        let pool = state.command_pool;
        let mut staged = HashMap::new();

        let result = unsafe {
            (|| -> Result<()> {
                if !data.is_empty() {
                    entry.staging = Some(self.create_staging(&data)?);
                }
                entry.command_buffer = self
                    .device
                    .allocate_command_buffers(
                        &vk::CommandBufferAllocateInfo::builder()
                            .command_pool(pool)
                            .level(vk::CommandBufferLevel::PRIMARY)
                            .command_buffer_count(1)
                            .build(),
                    )
                    .map_err(|e| self.device_error("vkAllocateCommandBuffers", e))?[0];
                entry.fence = self
                    .device
                    .create_fence(&vk::FenceCreateInfo::builder().build(), None)
                    .map_err(|e| self.device_error("vkCreateFence", e))?;

                self.device
                    .begin_command_buffer(
                        entry.command_buffer,
                        &vk::CommandBufferBeginInfo::builder()
                            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)
                            .build(),
                    )
                    .map_err(|e| self.device_error("vkBeginCommandBuffer", e))?;
                self.record(
                    &state.layouts,
                    &mut staged,
                    entry.command_buffer,
                    passes,
                    entry.staging.map(|(buffer, _)| buffer),
                    &offsets,
                )?;
                self.device
                    .end_command_buffer(entry.command_buffer)
                    .map_err(|e| self.device_error("vkEndCommandBuffer", e))?;
                self.device
                    .queue_submit(
                        self.queue,
                        &[vk::SubmitInfo::builder()
                            .command_buffers(&[entry.command_buffer])
                            .build()],
                        entry.fence,
                    )
                    .map_err(|e| self.device_error("vkQueueSubmit", e))
            })()
        };

        if let Err(e) = result {
            warn!(fence = fence.value(), error = %e, "Vulkan submission failed");
            unsafe { self.retire(entry, pool) };
            state.in_flight.push_back(InFlight {
                value: fence,
                fence: vk::Fence::null(),
                command_buffer: vk::CommandBuffer::null(),
                staging: None,
            });
            return Err(e);
        }
        state.layouts.extend(staged);
        state.in_flight.push_back(entry);
        debug!(fence = fence.value(), passes = passes.len(), "Vulkan batch submitted");
        Ok(())
    }

    fn wait_for(&self, fence: FenceValue) -> Result<()> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        let fences: Vec<vk::Fence> = state
            .in_flight
            .iter()
            .filter(|entry| entry.value <= fence && entry.fence != vk::Fence::null())
            .map(|entry| entry.fence)
            .collect();
        if !fences.is_empty() {
            unsafe { self.device.wait_for_fences(&fences, true, u64::MAX) }
                .map_err(|e| self.device_error("vkWaitForFences", e))?;
        }
        self.reap(&mut state)
    }

    fn poll(&self) -> Result<FenceValue> {
        self.ensure_alive()?;
        let mut state = self.state.lock();
        self.reap(&mut state)?;
        Ok(state.completed)
    }
}

impl Drop for VulkanDriver {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        unsafe {
            if !self.lost.load(Ordering::Acquire) {
                let _ = self.device.device_wait_idle();
            }
            let pool = state.command_pool;
            for entry in std::mem::take(&mut state.in_flight) {
                self.device.destroy_fence(entry.fence, None);
                if let Some((buffer, memory)) = entry.staging {
                    self.device.destroy_buffer(buffer, None);
                    self.device.free_memory(memory, None);
                }
            }
            for (image, memory) in state.owned.drain() {
                self.device.destroy_image(image, None);
                self.device.free_memory(memory, None);
            }
            // 销毁命令池会一并释放其中的命令缓冲
            self.device.destroy_command_pool(pool, None);
        }
        debug!(device = %self.device_name, "Vulkan driver destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use crate::gfx::headless::HeadlessDevice;
    use crate::gpu::command::{CommandSink, RenderTarget};
    use crate::gpu::types::{Color4f, IRect};
    use std::sync::Arc;

    unsafe extern "system" fn null_proc_addr(
        _instance: vk::Instance,
        _name: *const std::os::raw::c_char,
    ) -> vk::PFN_vkVoidFunction {
        None
    }

    #[test]
    fn test_missing_handles_fail_construction() {
        let ctx = VulkanBackendContext {
            instance: vk::Instance::null(),
            physical_device: vk::PhysicalDevice::null(),
            device: vk::Device::null(),
            queue: vk::Queue::null(),
            graphics_queue_index: 0,
            get_instance_proc_addr: null_proc_addr,
        };
        let err = VulkanDriver::new(&ctx).err().unwrap();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::ConstructionFailure);
    }

    #[test]
    fn test_find_memory_type() {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        properties.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        properties.memory_types[2].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(
            find_memory_type(&properties, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
        assert_eq!(
            find_memory_type(&properties, 0b111, vk::MemoryPropertyFlags::HOST_VISIBLE),
            Some(2)
        );
        assert_eq!(
            find_memory_type(&properties, 0b011, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }

    #[test]
    fn test_staging_offsets_are_aligned() {
        let device = HeadlessDevice::new("staging");
        let image = device.create_image((8, 8), ColorType::Gray8).unwrap();
        let info = ImageInfo::new((8, 8), ColorType::Gray8, Default::default(), None);
        let target = Arc::new(RenderTarget::wrapped(image.backend_texture(), info, None));

        let mut sink = CommandSink::default();
        sink.record(&target, DrawCommand::Clear(Color4f::BLACK));
        sink.record(&target, DrawCommand::FillRect { rect: IRect::from_xywh(0, 0, 3, 1), color: Color4f::WHITE });
        sink.record(&target, DrawCommand::FillRect { rect: IRect::from_xywh(1, 1, 2, 2), color: Color4f::WHITE });
        let passes = sink.take();
        let refs: Vec<&RecordedPass> = passes.iter().collect();

        let (data, offsets) = build_staging(&refs);
        assert_eq!(offsets, vec![0, 4]);
        assert_eq!(data.len(), 8);
        assert_eq!(&data[..3], &[255, 255, 255]);
    }

    #[test]
    fn test_layout_transitions_are_staged() {
        let image = vk::Image::from_raw(0x10);
        let mut known = HashMap::new();

        let mut staged = HashMap::new();
        assert_eq!(
            stage_transfer_dst(&known, &mut staged, image, vk::ImageLayout::UNDEFINED),
            Some(vk::ImageLayout::UNDEFINED)
        );
        assert_eq!(stage_transfer_dst(&known, &mut staged, image, vk::ImageLayout::UNDEFINED), None);
        assert!(known.is_empty());

        // 提交失败时丢弃 staged，下一次仍然发出屏障
        drop(staged);
        let mut retry = HashMap::new();
        assert_eq!(
            stage_transfer_dst(&known, &mut retry, image, vk::ImageLayout::UNDEFINED),
            Some(vk::ImageLayout::UNDEFINED)
        );

        known.extend(retry);
        let mut next = HashMap::new();
        assert_eq!(stage_transfer_dst(&known, &mut next, image, vk::ImageLayout::UNDEFINED), None);
    }

    #[test]
    fn test_forget_layout_keeps_owned_images() {
        let owned = vk::Image::from_raw(0x20);
        let wrapped = vk::Image::from_raw(0x30);
        let mut state = VulkanState {
            command_pool: vk::CommandPool::null(),
            owned: HashMap::from([(owned, vk::DeviceMemory::null())]),
            layouts: HashMap::from([
                (owned, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
                (wrapped, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            ]),
            in_flight: VecDeque::new(),
            completed: FenceValue::ZERO,
        };

        state.forget_layout(wrapped);
        state.forget_layout(owned);
        assert!(state.layouts.contains_key(&owned));
        assert!(!state.layouts.contains_key(&wrapped));
    }
}

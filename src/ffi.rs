//! C ABI
//!
//! 以 `db_` 为前缀的 `extern "C"` 接口。所有对象都通过非零 `u64` 句柄访问，`0` 表示空句柄。
//!
//! 句柄来自每个线程各自的代际句柄表：对象销毁或被消费后，旧句柄永远不会再解析成功，
//! 因此重复销毁、重复插入、销毁后使用都是可检查的失败（返回 `false` 或 `0`），
//! 不会造成悬垂访问。Recorder 与 Surface 是单线程对象，句柄只在创建它的线程上有效。
//!
//! 每次调用开始时清除错误状态，失败时记录错误类别，可通过 `db_last_error_kind` 查询。
//! 值类型总是复制到调用者提供的输出参数中。

use std::cell::RefCell;
#[cfg(target_os = "macos")]
use std::ffi::c_void;
use std::ffi::{c_char, CStr};

use ash::vk;
use ash::vk::Handle;
use slotmap::{new_key_type, Key, KeyData, SlotMap};

use crate::core::error::{BridgeError, ErrorKind, Result, StateError};
use crate::gfx::headless::{HeadlessBackendContext, HeadlessDevice, HeadlessImage};
use crate::gfx::vulkan::{VulkanAlloc, VulkanBackendContext, VulkanTextureInfo, YcbcrConversionInfo};
use crate::gpu::{
    surface, BackendContext, BackendTexture, Color4f, ColorType, Context, ContextOptions, IRect,
    ImageInfo, Mipmapped, Recorder, RecorderOptions, Recording, Surface, SyncToCpu,
};

/// 对象句柄，0 为空
pub type DbHandle = u64;

new_key_type! {
    struct DeviceKey;
    struct ImageKey;
    struct ContextKey;
    struct RecorderKey;
    struct RecordingKey;
    struct SurfaceKey;
    struct TextureKey;
}

/// 每线程句柄表
///
/// 字段按声明顺序释放：Context 先于 Recorder，Recorder 只持有弱引用，线程退出时同样安全。
#[derive(Default)]
struct Registry {
    contexts: SlotMap<ContextKey, Context>,
    recorders: SlotMap<RecorderKey, Recorder>,
    recordings: SlotMap<RecordingKey, Recording>,
    surfaces: SlotMap<SurfaceKey, Surface>,
    textures: SlotMap<TextureKey, BackendTexture>,
    images: SlotMap<ImageKey, HeadlessImage>,
    devices: SlotMap<DeviceKey, HeadlessDevice>,
    last_error: Option<ErrorKind>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

fn to_key<K: Key>(raw: DbHandle) -> Result<K> {
    if raw == 0 {
        Err(StateError::InvalidHandle(raw).into())
    } else {
        Ok(KeyData::from_ffi(raw).into())
    }
}

fn to_raw<K: Key>(key: K) -> DbHandle {
    key.data().as_ffi()
}

fn lookup<K: Key, V>(map: &SlotMap<K, V>, raw: DbHandle) -> Result<&V> {
    map.get(to_key(raw)?).ok_or_else(|| StateError::InvalidHandle(raw).into())
}

fn lookup_mut<K: Key, V>(map: &mut SlotMap<K, V>, raw: DbHandle) -> Result<&mut V> {
    map.get_mut(to_key(raw)?)
        .ok_or_else(|| StateError::InvalidHandle(raw).into())
}

fn take<K: Key, V>(map: &mut SlotMap<K, V>, raw: DbHandle) -> Result<V> {
    map.remove(to_key(raw)?)
        .ok_or_else(|| StateError::InvalidHandle(raw).into())
}

/// 在句柄表上执行一次调用，并记录失败的错误类别
fn call<R>(f: impl FnOnce(&mut Registry) -> Result<R>) -> Option<R> {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        registry.last_error = None;
        match f(&mut *registry) {
            Ok(value) => Some(value),
            Err(err) => {
                crate::bridge_warn!(error = %err, "C ABI call failed");
                registry.last_error = Some(err.kind());
                None
            }
        }
    })
}

fn call_handle(f: impl FnOnce(&mut Registry) -> Result<DbHandle>) -> DbHandle {
    call(f).unwrap_or(0)
}

fn call_bool(f: impl FnOnce(&mut Registry) -> Result<()>) -> bool {
    call(f).is_some()
}

/// 把 Context 记录的失败原因转换为错误
fn context_failure(context: &Context) -> BridgeError {
    match context.last_error() {
        Some(err) => clone_error(err),
        None => StateError::ContextInvalid.into(),
    }
}

/// 只保留错误类别与描述
fn clone_error(err: &BridgeError) -> BridgeError {
    match err {
        BridgeError::InvalidState(state) => BridgeError::InvalidState(state.clone()),
        BridgeError::InvalidDescriptor(desc) => BridgeError::InvalidDescriptor(desc.clone()),
        BridgeError::Unsupported(msg) => BridgeError::Unsupported(msg.clone()),
        BridgeError::Construction(_) => BridgeError::allocation(err.to_string()),
        _ => BridgeError::device(err.to_string()),
    }
}

unsafe fn write_out<T>(out: *mut T, value: T) -> Result<()> {
    if out.is_null() {
        return Err(StateError::InvalidHandle(0).into());
    }
    out.write(value);
    Ok(())
}

// ---------------------------------------------------------------------------
// 值类型
// ---------------------------------------------------------------------------

/// `ContextOptions` 的 C 表示
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbContextOptions {
    pub max_pending_recordings: usize,
    pub require_ordered_recordings: bool,
}

impl From<&ContextOptions> for DbContextOptions {
    fn from(options: &ContextOptions) -> Self {
        Self {
            max_pending_recordings: options.max_pending_recordings,
            require_ordered_recordings: options.require_ordered_recordings,
        }
    }
}

impl From<&DbContextOptions> for ContextOptions {
    fn from(options: &DbContextOptions) -> Self {
        Self {
            max_pending_recordings: options.max_pending_recordings,
            require_ordered_recordings: options.require_ordered_recordings,
            ..ContextOptions::default()
        }
    }
}

/// `RecorderOptions` 的 C 表示，`gpu_budget_bytes` 为 0 表示不限制
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRecorderOptions {
    pub gpu_budget_bytes: u64,
}

impl From<&DbRecorderOptions> for RecorderOptions {
    fn from(options: &DbRecorderOptions) -> Self {
        Self {
            gpu_budget_bytes: (options.gpu_budget_bytes != 0).then_some(options.gpu_budget_bytes),
            label: None,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DbISize {
    pub width: i32,
    pub height: i32,
}

/// 图像描述，`color_type` 取 `ColorType` 的数值
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbImageInfo {
    pub width: i32,
    pub height: i32,
    pub color_type: u32,
}

/// 纹理描述摘要，`backend` 取 `BackendApi` 的数值
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DbTextureInfo {
    pub is_valid: bool,
    pub backend: u32,
    pub sample_count: u32,
    pub mipmapped: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DbColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl From<DbColor> for Color4f {
    fn from(color: DbColor) -> Self {
        Color4f::new(color.r, color.g, color.b, color.a)
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Vulkan 后端上下文的 C 表示，句柄以原始值传递
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DbVulkanBackendContext {
    pub instance: u64,
    pub physical_device: u64,
    pub device: u64,
    pub queue: u64,
    pub graphics_queue_index: u32,
    pub get_instance_proc_addr: Option<vk::PFN_vkGetInstanceProcAddr>,
}

/// YCbCr 转换描述，枚举与位标志都取 Vulkan 的原始值
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DbYcbcrConversionInfo {
    pub format: i32,
    pub external_format: u64,
    pub ycbcr_model: i32,
    pub ycbcr_range: i32,
    pub x_chroma_offset: i32,
    pub y_chroma_offset: i32,
    pub chroma_filter: i32,
    pub force_explicit_reconstruction: u32,
    pub format_features: u32,
}

impl From<&DbYcbcrConversionInfo> for YcbcrConversionInfo {
    fn from(info: &DbYcbcrConversionInfo) -> Self {
        Self {
            format: vk::Format::from_raw(info.format),
            external_format: info.external_format,
            ycbcr_model: vk::SamplerYcbcrModelConversion::from_raw(info.ycbcr_model),
            ycbcr_range: vk::SamplerYcbcrRange::from_raw(info.ycbcr_range),
            x_chroma_offset: vk::ChromaLocation::from_raw(info.x_chroma_offset),
            y_chroma_offset: vk::ChromaLocation::from_raw(info.y_chroma_offset),
            chroma_filter: vk::Filter::from_raw(info.chroma_filter),
            force_explicit_reconstruction: info.force_explicit_reconstruction,
            format_features: vk::FormatFeatureFlags::from_raw(info.format_features),
        }
    }
}

/// `VulkanTextureInfo` 的 C 表示
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DbVulkanTextureInfo {
    pub sample_count: u32,
    pub mipmapped: bool,
    pub flags: u32,
    pub format: i32,
    pub image_tiling: i32,
    pub image_usage_flags: u32,
    pub sharing_mode: i32,
    pub aspect_mask: u32,
    pub ycbcr_conversion_info: DbYcbcrConversionInfo,
}

impl From<&DbVulkanTextureInfo> for VulkanTextureInfo {
    fn from(info: &DbVulkanTextureInfo) -> Self {
        Self {
            sample_count: info.sample_count,
            mipmapped: Mipmapped::from(info.mipmapped),
            flags: vk::ImageCreateFlags::from_raw(info.flags),
            format: vk::Format::from_raw(info.format),
            image_tiling: vk::ImageTiling::from_raw(info.image_tiling),
            image_usage_flags: vk::ImageUsageFlags::from_raw(info.image_usage_flags),
            sharing_mode: vk::SharingMode::from_raw(info.sharing_mode),
            aspect_mask: vk::ImageAspectFlags::from_raw(info.aspect_mask),
            ycbcr_conversion_info: YcbcrConversionInfo::from(&info.ycbcr_conversion_info),
        }
    }
}

/// 图像绑定的设备内存
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DbVulkanAlloc {
    pub memory: u64,
    pub offset: u64,
    pub size: u64,
}

// ---------------------------------------------------------------------------
// 选项
// ---------------------------------------------------------------------------

/// # Safety
///
/// `out` 必须指向可写的 `DbContextOptions`。
#[no_mangle]
pub unsafe extern "C" fn db_context_options_default(out: *mut DbContextOptions) -> bool {
    call_bool(|_| write_out(out, DbContextOptions::from(&ContextOptions::default())))
}

/// # Safety
///
/// `out` 必须指向可写的 `DbRecorderOptions`。
#[no_mangle]
pub unsafe extern "C" fn db_recorder_options_default(out: *mut DbRecorderOptions) -> bool {
    let defaults = RecorderOptions::default();
    call_bool(|_| {
        write_out(
            out,
            DbRecorderOptions {
                gpu_budget_bytes: defaults.gpu_budget_bytes.unwrap_or(0),
            },
        )
    })
}

// ---------------------------------------------------------------------------
// Headless 设备与调用者图像
// ---------------------------------------------------------------------------

/// 创建 headless 设备，`name` 可以为空
///
/// # Safety
///
/// `name` 为空或指向以 NUL 结尾的字符串。
#[no_mangle]
pub unsafe extern "C" fn db_headless_device_create(name: *const c_char) -> DbHandle {
    let name = if name.is_null() {
        "headless".to_string()
    } else {
        CStr::from_ptr(name).to_string_lossy().into_owned()
    };
    call_handle(|registry| Ok(to_raw(registry.devices.insert(HeadlessDevice::new(&name)))))
}

#[no_mangle]
pub extern "C" fn db_headless_device_destroy(device: DbHandle) -> bool {
    call_bool(|registry| take(&mut registry.devices, device).map(drop))
}

/// 在设备上分配一张调用者拥有的清零图像
#[no_mangle]
pub extern "C" fn db_headless_image_create(device: DbHandle, width: i32, height: i32, color_type: u32) -> DbHandle {
    call_handle(|registry| {
        let image = lookup(&registry.devices, device)?.create_image((width, height), ColorType::from_raw(color_type))?;
        Ok(to_raw(registry.images.insert(image)))
    })
}

/// 释放图像内存；仍包装它的 Surface 之后提交的工作会报告设备错误
#[no_mangle]
pub extern "C" fn db_headless_image_destroy(image: DbHandle) -> bool {
    call_bool(|registry| take(&mut registry.images, image).map(drop))
}

/// 为图像创建一个新的纹理描述句柄
#[no_mangle]
pub extern "C" fn db_headless_image_backend_texture(image: DbHandle) -> DbHandle {
    call_handle(|registry| {
        let texture = lookup(&registry.images, image)?.backend_texture();
        Ok(to_raw(registry.textures.insert(texture)))
    })
}

/// 读取图像像素
///
/// # Safety
///
/// `dst` 必须指向至少 `len` 字节的可写内存。
#[no_mangle]
pub unsafe extern "C" fn db_headless_image_read_pixels(image: DbHandle, dst: *mut u8, len: usize) -> bool {
    call_bool(|registry| {
        let pixels = lookup(&registry.images, image)?.read_pixels();
        if dst.is_null() || len < pixels.len() {
            return Err(crate::core::error::DescriptorError::InvalidImageInfo(format!(
                "destination holds {} bytes, {} required",
                len,
                pixels.len()
            ))
            .into());
        }
        std::ptr::copy_nonoverlapping(pixels.as_ptr(), dst, pixels.len());
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

fn make_context(registry: &mut Registry, backend: BackendContext, options: Option<&DbContextOptions>) -> Result<DbHandle> {
    let options = options.map(ContextOptions::from);
    let context = Context::make(&backend, options.as_ref())?;
    Ok(to_raw(registry.contexts.insert(context)))
}

/// 在 headless 设备上创建 Context，`options` 为空时使用默认选项
///
/// # Safety
///
/// `options` 为空或指向有效的 `DbContextOptions`。
#[no_mangle]
pub unsafe extern "C" fn db_context_make_headless(device: DbHandle, options: *const DbContextOptions) -> DbHandle {
    let options = options.as_ref();
    call_handle(|registry| {
        let device = lookup(&registry.devices, device)?.clone();
        make_context(registry, HeadlessBackendContext::new(device).into(), options)
    })
}

/// 使用调用者的 Vulkan 句柄创建 Context
///
/// # Safety
///
/// `backend` 必须指向有效的 `DbVulkanBackendContext`，其中的句柄必须是调用者创建的存活对象，
/// 并在 Context 销毁前保持有效。`options` 为空或指向有效的 `DbContextOptions`。
#[no_mangle]
pub unsafe extern "C" fn db_context_make_vulkan(
    backend: *const DbVulkanBackendContext,
    options: *const DbContextOptions,
) -> DbHandle {
    let backend = backend.as_ref().copied();
    let options = options.as_ref();
    call_handle(|registry| {
        let backend = backend.ok_or(StateError::InvalidHandle(0))?;
        let get_instance_proc_addr = backend
            .get_instance_proc_addr
            .ok_or_else(|| BridgeError::device_init("vkGetInstanceProcAddr is null"))?;
        let ctx = VulkanBackendContext {
            instance: vk::Instance::from_raw(backend.instance),
            physical_device: vk::PhysicalDevice::from_raw(backend.physical_device),
            device: vk::Device::from_raw(backend.device),
            queue: vk::Queue::from_raw(backend.queue),
            graphics_queue_index: backend.graphics_queue_index,
            get_instance_proc_addr,
        };
        make_context(registry, ctx.into(), options)
    })
}

/// 使用调用者的 `id<MTLDevice>` 与 `id<MTLCommandQueue>` 创建 Context
///
/// Context 对两者各 retain 一次，调用者保留自己的引用。
///
/// # Safety
///
/// 非空指针必须分别指向存活的 `MTLDevice` 与属于它的 `MTLCommandQueue`。
/// `options` 为空或指向有效的 `DbContextOptions`。
#[cfg(target_os = "macos")]
#[no_mangle]
pub unsafe extern "C" fn db_context_make_metal(
    device: *const c_void,
    queue: *const c_void,
    options: *const DbContextOptions,
) -> DbHandle {
    let options = options.as_ref();
    call_handle(|registry| {
        let ctx = crate::gfx::metal::MtlBackendContext::new(device, queue)?;
        make_context(registry, ctx.into(), options)
    })
}

/// 销毁 Context，等待其未完成的工作
#[no_mangle]
pub extern "C" fn db_context_destroy(context: DbHandle) -> bool {
    call_bool(|registry| take(&mut registry.contexts, context).map(drop))
}

/// # Safety
///
/// `options` 为空或指向有效的 `DbRecorderOptions`。
#[no_mangle]
pub unsafe extern "C" fn db_context_make_recorder(context: DbHandle, options: *const DbRecorderOptions) -> DbHandle {
    let options = options.as_ref().map(RecorderOptions::from);
    call_handle(|registry| {
        let recorder = lookup(&registry.contexts, context)?.make_recorder(options.as_ref())?;
        Ok(to_raw(registry.recorders.insert(recorder)))
    })
}

/// 插入 Recording；只要 Recording 句柄有效，无论成功与否它都被消费
#[no_mangle]
pub extern "C" fn db_context_insert_recording(context: DbHandle, recording: DbHandle) -> bool {
    call_bool(|registry| {
        let recording = take(&mut registry.recordings, recording)?;
        let context = lookup_mut(&mut registry.contexts, context)?;
        if context.insert_recording(recording) {
            Ok(())
        } else {
            Err(context_failure(context))
        }
    })
}

/// 提交所有已插入的 Recording，`sync` 非 0 时阻塞到执行完毕
#[no_mangle]
pub extern "C" fn db_context_submit(context: DbHandle, sync: u32) -> bool {
    call_bool(|registry| {
        let context = lookup_mut(&mut registry.contexts, context)?;
        if context.submit(Some(SyncToCpu::from(sync != 0))) {
            Ok(())
        } else {
            Err(context_failure(context))
        }
    })
}

#[no_mangle]
pub extern "C" fn db_context_check_async_work_completion(context: DbHandle) -> bool {
    call_bool(|registry| {
        lookup_mut(&mut registry.contexts, context)?.check_async_work_completion();
        Ok(())
    })
}

/// 读回 Surface 像素
///
/// # Safety
///
/// `dst` 必须指向至少 `len` 字节的可写内存。
#[no_mangle]
pub unsafe extern "C" fn db_context_read_pixels(
    context: DbHandle,
    surface: DbHandle,
    dst: *mut u8,
    len: usize,
    row_bytes: usize,
) -> bool {
    call_bool(|registry| {
        if dst.is_null() {
            return Err(StateError::InvalidHandle(0).into());
        }
        let dst = std::slice::from_raw_parts_mut(dst, len);
        let surface = lookup(&registry.surfaces, surface)?;
        let context = lookup_mut(&mut registry.contexts, context)?;
        if context.read_pixels(surface, dst, row_bytes) {
            Ok(())
        } else {
            Err(context_failure(context))
        }
    })
}

// ---------------------------------------------------------------------------
// Recorder / Recording
// ---------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn db_recorder_destroy(recorder: DbHandle) -> bool {
    call_bool(|registry| take(&mut registry.recorders, recorder).map(drop))
}

#[no_mangle]
pub extern "C" fn db_recorder_snap(recorder: DbHandle) -> DbHandle {
    call_handle(|registry| {
        let recording = lookup_mut(&mut registry.recorders, recorder)?.snap()?;
        Ok(to_raw(registry.recordings.insert(recording)))
    })
}

/// 销毁一个未插入的 Recording
#[no_mangle]
pub extern "C" fn db_recording_destroy(recording: DbHandle) -> bool {
    call_bool(|registry| take(&mut registry.recordings, recording).map(drop))
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

/// # Safety
///
/// `info` 必须指向有效的 `DbImageInfo`。
#[no_mangle]
pub unsafe extern "C" fn db_surface_make(recorder: DbHandle, info: *const DbImageInfo, mipmapped: bool) -> DbHandle {
    let info = info.as_ref().copied();
    call_handle(|registry| {
        let info = info.ok_or(StateError::InvalidHandle(0))?;
        let image_info = ImageInfo::new(
            (info.width, info.height),
            ColorType::from_raw(info.color_type),
            Default::default(),
            None,
        );
        let recorder = lookup_mut(&mut registry.recorders, recorder)?;
        let surface = surface::make(recorder, &image_info, Some(Mipmapped::from(mipmapped)), None)?;
        Ok(to_raw(registry.surfaces.insert(surface)))
    })
}

#[no_mangle]
pub extern "C" fn db_surface_wrap_backend_texture(recorder: DbHandle, texture: DbHandle, color_type: u32) -> DbHandle {
    call_handle(|registry| {
        let texture = lookup(&registry.textures, texture)?;
        let recorder = lookup_mut(&mut registry.recorders, recorder)?;
        let surface = surface::wrap_backend_texture(recorder, texture, ColorType::from_raw(color_type), None, None)?;
        Ok(to_raw(registry.surfaces.insert(surface)))
    })
}

#[no_mangle]
pub extern "C" fn db_surface_destroy(surface: DbHandle) -> bool {
    call_bool(|registry| take(&mut registry.surfaces, surface).map(drop))
}

#[no_mangle]
pub extern "C" fn db_surface_clear(surface: DbHandle, color: DbColor) -> bool {
    call_bool(|registry| lookup_mut(&mut registry.surfaces, surface)?.canvas().clear(color.into()))
}

#[no_mangle]
pub extern "C" fn db_surface_fill_rect(surface: DbHandle, rect: DbRect, color: DbColor) -> bool {
    call_bool(|registry| {
        let rect = IRect::from_ltrb(rect.left, rect.top, rect.right, rect.bottom);
        lookup_mut(&mut registry.surfaces, surface)?
            .canvas()
            .draw_rect(rect, color.into())
    })
}

/// 为 Surface 的渲染目标创建一个新的纹理描述句柄
#[no_mangle]
pub extern "C" fn db_surface_backend_texture(surface: DbHandle) -> DbHandle {
    call_handle(|registry| {
        let texture = lookup(&registry.surfaces, surface)?.backend_texture();
        Ok(to_raw(registry.textures.insert(texture)))
    })
}

// ---------------------------------------------------------------------------
// BackendTexture
// ---------------------------------------------------------------------------

#[no_mangle]
pub extern "C" fn db_backend_texture_is_valid(texture: DbHandle) -> bool {
    call(|registry| Ok(lookup(&registry.textures, texture)?.is_valid())).unwrap_or(false)
}

/// # Safety
///
/// `out` 必须指向可写的 `DbISize`。
#[no_mangle]
pub unsafe extern "C" fn db_backend_texture_dimensions(texture: DbHandle, out: *mut DbISize) -> bool {
    call_bool(|registry| {
        let size = lookup(&registry.textures, texture)?.dimensions();
        write_out(
            out,
            DbISize {
                width: size.width,
                height: size.height,
            },
        )
    })
}

/// 把纹理描述复制到 `out`
///
/// # Safety
///
/// `out` 必须指向可写的 `DbTextureInfo`。
#[no_mangle]
pub unsafe extern "C" fn db_backend_texture_info(texture: DbHandle, out: *mut DbTextureInfo) -> bool {
    call_bool(|registry| {
        let info = lookup(&registry.textures, texture)?.info();
        write_out(
            out,
            DbTextureInfo {
                is_valid: info.is_valid(),
                backend: info.backend().map_or(u32::MAX, |api| api as u32),
                sample_count: info.sample_count(),
                mipmapped: info.mipmapped() == Mipmapped::Yes,
            },
        )
    })
}

/// 描述一张调用者分配的 `VkImage`
///
/// 只复制描述，不检查句柄；无效的描述在包装时以 `InvalidDescriptor` 失败。
///
/// # Safety
///
/// `info` 必须指向有效的 `DbVulkanTextureInfo`，`alloc` 为空或指向有效的 `DbVulkanAlloc`。
/// 在包装它的所有 Surface 销毁且相关工作完成前，调用者不得释放图像。
#[no_mangle]
pub unsafe extern "C" fn db_backend_texture_make_vulkan(
    width: i32,
    height: i32,
    info: *const DbVulkanTextureInfo,
    layout: i32,
    queue_family_index: u32,
    image: u64,
    alloc: *const DbVulkanAlloc,
) -> DbHandle {
    let info = info.as_ref().copied();
    let alloc = alloc.as_ref().copied().unwrap_or_default();
    call_handle(|registry| {
        let info = info.ok_or(StateError::InvalidHandle(0))?;
        let texture = BackendTexture::new_vulkan(
            (width, height),
            &VulkanTextureInfo::from(&info),
            vk::ImageLayout::from_raw(layout),
            queue_family_index,
            vk::Image::from_raw(image),
            VulkanAlloc {
                memory: vk::DeviceMemory::from_raw(alloc.memory),
                offset: alloc.offset,
                size: alloc.size,
            },
        );
        Ok(to_raw(registry.textures.insert(texture)))
    })
}

/// 描述一张调用者的 `id<MTLTexture>`
///
/// # Safety
///
/// `texture` 为空或指向存活的 `MTLTexture`，生命周期要求同 `db_backend_texture_make_vulkan`。
#[cfg(target_os = "macos")]
#[no_mangle]
pub unsafe extern "C" fn db_backend_texture_make_metal(width: i32, height: i32, texture: *const c_void) -> DbHandle {
    call_handle(|registry| {
        let texture = BackendTexture::new_metal((width, height), crate::gfx::metal::MtlHandle(texture));
        Ok(to_raw(registry.textures.insert(texture)))
    })
}

/// 销毁纹理描述句柄；不影响底层纹理
#[no_mangle]
pub extern "C" fn db_backend_texture_destroy(texture: DbHandle) -> bool {
    call_bool(|registry| take(&mut registry.textures, texture).map(drop))
}

// ---------------------------------------------------------------------------
// 错误通道
// ---------------------------------------------------------------------------

/// 当前线程上一次调用的错误类别，成功时为 `ErrorKind::None`
#[no_mangle]
pub extern "C" fn db_last_error_kind() -> u32 {
    REGISTRY.with(|registry| registry.borrow().last_error.unwrap_or(ErrorKind::None) as u32)
}

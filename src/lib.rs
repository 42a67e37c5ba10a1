//! dist_bridge - 多后端 GPU 上下文绑定层
//!
//! 本库定义了不透明原生 GPU 对象的创建、跨边界移交与销毁协议：
//! 每个对象恰好销毁一次，不泄漏也不重复释放 GPU 资源。
//! 同一套生命周期层适用于 Headless、Vulkan、Dawn（wgpu）与 Metal 后端。
//!
//! # 模块结构
//!
//! - `core`: 环境性功能（日志、配置、错误处理）
//! - `gpu`: 与图形 API 无关的 Context / Recorder / Recording / Surface 层
//! - `gfx`: 各原生后端的设备驱动
//! - `ffi`: `db_` 前缀的 C ABI
//!
//! # 使用示例
//!
//! ```no_run
//! use dist_bridge::gfx::headless::{HeadlessBackendContext, HeadlessDevice};
//! use dist_bridge::gpu::{surface, BackendContext, Color4f, Context, ImageInfo, SyncToCpu};
//!
//! let device = HeadlessDevice::new("example");
//! let backend = BackendContext::from(HeadlessBackendContext::new(device));
//! let mut context = Context::make(&backend, None)?;
//! let mut recorder = context.make_recorder(None)?;
//!
//! let info = ImageInfo::new_n32_premul((64, 64), None);
//! let mut surface = surface::make(&mut recorder, &info, None, None)?;
//! surface.canvas().clear(Color4f::BLUE)?;
//!
//! let recording = recorder.snap()?;
//! context.insert_recording(recording);
//! context.submit(Some(SyncToCpu::Yes));
//! # Ok::<(), dist_bridge::core::BridgeError>(())
//! ```

pub mod core;
pub mod ffi;
pub mod gfx;
pub mod gpu;

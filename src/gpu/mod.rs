//! GPU 绑定层
//!
//! 与具体图形 API 无关的生命周期与所有权层：Context、Recorder、Recording、Surface
//! 以及纹理描述符。原生设备只通过 `driver::DeviceDriver` 访问。
//!
//! # 模块组织
//!
//! - `backend_context`：后端标签与原生设备句柄
//! - `context` / `direct_context`：延迟模式与立即模式的图形上下文
//! - `recorder` / `recording` / `surface`：录制会话、命令包与渲染表面
//! - `texture_info` / `backend_texture` / `types`：描述符与值类型
//! - `sync` / `tracker` / `handle`：栅栏记账、资源追踪与引用计数守卫

pub mod backend_context;
pub mod backend_texture;
pub mod command;
pub mod context;
pub mod direct_context;
pub mod driver;
pub mod handle;
pub mod options;
pub mod recorder;
pub mod recording;
pub mod surface;
pub mod sync;
pub mod texture_info;
pub mod tracker;
pub mod types;

pub use backend_context::{BackendApi, BackendContext};
pub use backend_texture::BackendTexture;
pub use command::{DrawCommand, RecordedPass, RenderTarget};
pub use context::Context;
pub use direct_context::DirectContext;
pub use driver::DeviceDriver;
pub use handle::{Retained, RetainRelease};
pub use options::{ContextOptions, RecorderOptions};
pub use recorder::{GpuBudget, Recorder};
pub use recording::{Recording, RecordingState};
pub use surface::{Canvas, Surface};
pub use sync::{FenceManager, FenceValue, SyncToCpu};
pub use texture_info::{TextureInfo, TextureInfoData};
pub use tracker::{ResourceKind, ResourceTracker};
pub use types::{
    AlphaType, Color4f, ColorSpace, ColorType, IRect, ISize, ImageInfo, Mipmapped, PixelGeometry,
    SurfaceProps,
};

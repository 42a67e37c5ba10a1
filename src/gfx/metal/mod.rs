//! Metal 后端模块
//!
//! 纹理描述类型在所有平台上可用；设备上下文与驱动仅在 macOS 上编译。

pub mod texture;
#[cfg(target_os = "macos")]
pub mod context;
#[cfg(target_os = "macos")]
pub mod driver;

pub use texture::{MtlHandle, MtlTextureInfo};
#[cfg(target_os = "macos")]
pub use texture::texture_info_from_handle;
#[cfg(target_os = "macos")]
pub use context::MtlBackendContext;
#[cfg(target_os = "macos")]
pub use driver::MetalDriver;
